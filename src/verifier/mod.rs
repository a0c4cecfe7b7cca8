use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
    config::{BaseUrl, Config, VerifierOptions},
    core::{
        authorization_request::{
            parameters::{Nonce, State, WalletNonce},
            AuthorizationRequest, REQUEST_OBJECT_TYP,
        },
        credential::{CredentialExtractor, VerificationContext},
        crypto::DidDocument,
        did::{DidResolver, Identifier, KeyMaterialResolver},
        object::{TypedParameter, UntypedObject},
        presentation_definition::PresentationDefinition,
        response::AuthorizationResponse,
        status_list::StatusListResolver,
        util::{AsyncHttpClient, ReqwestClient},
    },
};

use presentations::PresentationStore;
use request_builder::RequestBuilder;
use request_signer::{make_jwt, KeySigner, RequestSigner};
use rp::{OfferStatus, PresentationQuery, RpSession, RpStatus, VpResult};
use session::{MemoryStore, SessionStore};

pub mod presentations;
pub mod request_builder;
pub mod request_signer;
pub mod rp;
pub mod session;

/// The scheme wallets are invoked with.
const WALLET_INVOCATION_URL: &str = "openid4vp://";

/// What a frontend needs to start an exchange with a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub state: String,
    /// The URL handed to the wallet, usually rendered as a QR code.
    pub request_uri: Url,
    /// Where the frontend polls for the outcome.
    pub check_uri: Url,
}

/// One verifier tenant, also known as the client.
#[derive(Debug, Clone)]
pub struct Verifier {
    options: VerifierOptions,
    base: BaseUrl,
    identifier: Option<Identifier>,
    signer: Arc<dyn RequestSigner + Send + Sync>,
    session_store: Arc<dyn SessionStore + Send + Sync>,
    presentation_store: Arc<dyn PresentationStore + Send + Sync>,
    extractor: CredentialExtractor,
    default_request_params: UntypedObject,
}

impl Verifier {
    /// Build a new verifier.
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// The DID of the verifier.
    pub fn client_id(&self) -> &str {
        &self.options.did
    }

    /// The `client_id` sent in requests for `query`.
    pub(crate) fn request_client_id(&self, query: &PresentationQuery) -> String {
        if self.options.client_id_prefix && query.is_dcql() {
            format!("{}{}", VerificationContext::CLIENT_ID_PREFIX, self.client_id())
        } else {
            self.client_id().to_owned()
        }
    }

    pub fn extractor(&self) -> &CredentialExtractor {
        &self.extractor
    }

    /// An endpoint below the verifier's path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url: Url = (*self.base).clone();
        {
            let Ok(mut path) = url.path_segments_mut() else {
                bail!("invalid base URL for the verifier endpoints")
            };
            path.pop_if_empty()
                .extend(self.options.path().split('/').filter(|s| !s.is_empty()))
                .extend(segments);
        }
        Ok(url)
    }

    /// Begin building a request object, starting from the default parameters.
    pub fn build_authorization_request(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(self)
    }

    /// Start an exchange for one of the verifier's presentations.
    ///
    /// The wallet is pointed at the `get-offer` endpoint, from which it retrieves the signed
    /// request object by reference.
    pub async fn create_offer(&self, presentation_id: &str) -> Result<Offer> {
        let query = self.presentation_query(presentation_id).await?;

        let now = Utc::now();
        let mut session = RpSession::new(
            State::random().0,
            self.options.name.clone(),
            presentation_id.to_owned(),
            query,
            Nonce::random().0,
            now,
        );
        let request_object = self
            .build_authorization_request()
            .build(&session)
            .context("unable to build the request object")?;
        let client_id = request_object.client_id().0.clone();
        session.request_object = Some(request_object);
        session.transition(RpStatus::AuthorizationRequestCreated, now);

        let state = session.state.clone();
        let request_uri = AuthorizationRequest {
            client_id,
            request_uri: self.endpoint(&["get-offer", &state])?,
        }
        .to_url(WALLET_INVOCATION_URL.parse()?)
        .context("unable to generate authorization request URL")?;
        let check_uri = self.endpoint(&["check-offer", &state])?;

        self.session_store
            .set(session)
            .await
            .context("failed to store the session in the session store")?;

        info!(
            verifier = %self.options.name,
            presentation = presentation_id,
            %state,
            "authorization request created"
        );
        Ok(Offer {
            state,
            request_uri,
            check_uri,
        })
    }

    /// Retrieve the signed request object of a session.
    ///
    /// This should be triggered by a request from the wallet. A `wallet_nonce` sent by the wallet
    /// is echoed in the signed request.
    ///
    /// ## Returns
    /// The request object as a JWT of type `oauth-authz-req+jwt`.
    pub async fn retrieve_authorization_request(
        &self,
        state: &str,
        wallet_nonce: Option<String>,
    ) -> Result<String> {
        let mut session = self.session(state).await?;
        let mut request_object = session
            .request_object
            .clone()
            .context("session has no request object")?;
        if let Some(wallet_nonce) = wallet_nonce {
            request_object.set_wallet_nonce(WalletNonce(wallet_nonce))?;
        }

        let jwt = make_jwt(REQUEST_OBJECT_TYP, &request_object, self.signer.as_ref())
            .await
            .context("unable to sign the request object")?;

        if session.status < RpStatus::AuthorizationRequestRetrieved {
            session.transition(RpStatus::AuthorizationRequestRetrieved, Utc::now());
            self.session_store
                .set(session)
                .await
                .context("failed to update session status")?;
        }
        info!(verifier = %self.options.name, state, "authorization request retrieved");
        Ok(jwt)
    }

    /// The presentation definition served at `presentation_definition_uri`.
    pub async fn presentation_definition(&self, id: &str) -> Result<PresentationDefinition> {
        match self.presentation_query(id).await? {
            PresentationQuery::PresentationExchange(definition) => Ok(definition),
            PresentationQuery::Dcql(_) => {
                bail!("presentation '{id}' is a DCQL query, not a presentation definition")
            }
        }
    }

    /// Verify the wallet response posted for the session `state`.
    ///
    /// ## Errors
    /// When there is no live session for `state` or its request was never retrieved. Problems
    /// with the response itself are reported in the messages of the [VpResult].
    pub async fn process_response(
        &self,
        state: &str,
        response: AuthorizationResponse,
    ) -> Result<VpResult> {
        let mut session = self.session(state).await?;
        if session.status < RpStatus::AuthorizationRequestRetrieved {
            bail!("authorization request for session '{state}' was not retrieved")
        }
        if session.status >= RpStatus::ResponseProcessing {
            bail!("a response for session '{state}' was already received")
        }

        let response_state = response.state().map(|state| state.0);
        let result = session
            .process_response(
                response_state.as_deref(),
                &response,
                self.client_id(),
                &self.extractor,
            )
            .await;
        self.session_store
            .set(session)
            .await
            .context("failed to store the response result")?;

        info!(
            verifier = %self.options.name,
            state,
            messages = result.messages.len(),
            "response processed"
        );
        Ok(result)
    }

    /// The status of a session, with the result once the response was received.
    pub async fn check_offer(&self, state: &str) -> Result<OfferStatus> {
        Ok(self.session(state).await?.offer_status())
    }

    /// The `did:web` document of the verifier, with its services pointing at the verifier path.
    pub fn did_document(&self) -> Result<DidDocument> {
        let identifier = self
            .identifier
            .as_ref()
            .context("verifier has no identifier")?;
        identifier.did_web_document(Some(&self.endpoint(&[])?))
    }

    /// Drop expired sessions.
    pub async fn clear_expired_sessions(&self) -> Result<usize> {
        let cleared = self.session_store.clear_expired(Utc::now()).await?;
        if cleared > 0 {
            debug!(verifier = %self.options.name, cleared, "expired sessions removed");
        }
        Ok(cleared)
    }

    async fn session(&self, state: &str) -> Result<RpSession> {
        self.session_store
            .get(state)
            .await
            .context("failed to retrieve session")?
            .context(format!("no session for state '{state}'"))
    }

    async fn presentation_query(&self, id: &str) -> Result<PresentationQuery> {
        if !self.options.allows_presentation(id) {
            bail!(
                "verifier '{}' does not serve presentation '{id}'",
                self.options.name
            )
        }
        self.presentation_store
            .get(id)
            .await?
            .context(format!("unknown presentation '{id}'"))?
            .query()
    }
}

/// Builder struct for [Verifier].
#[derive(Debug, Clone, Default)]
pub struct VerifierBuilder {
    options: Option<VerifierOptions>,
    base: Option<BaseUrl>,
    identifier: Option<Identifier>,
    signer: Option<Arc<dyn RequestSigner + Send + Sync>>,
    session_store: Option<Arc<dyn SessionStore + Send + Sync>>,
    presentation_store: Option<Arc<dyn PresentationStore + Send + Sync>>,
    did_resolver: Option<Arc<dyn DidResolver + Send + Sync>>,
    status_lists: Option<Arc<StatusListResolver>>,
    http_client: Option<Arc<dyn AsyncHttpClient + Send + Sync>>,
    status_list_ttl: Option<Duration>,
    default_request_params: UntypedObject,
}

impl VerifierBuilder {
    /// Build the verifier.
    ///
    /// Without an explicit signer, requests are signed with the identifier's key named by
    /// `key_id`. Missing resolvers are created on top of the HTTP client.
    pub fn build(self) -> Result<Verifier> {
        let Self {
            options,
            base,
            identifier,
            signer,
            session_store,
            presentation_store,
            did_resolver,
            status_lists,
            http_client,
            status_list_ttl,
            default_request_params,
        } = self;

        let Some(options) = options else {
            bail!("verifier options are required, see `with_options`")
        };

        let Some(base) = base else {
            bail!("base url is required, see `with_base_url`")
        };

        let Some(presentation_store) = presentation_store else {
            bail!("presentation store is required, see `with_presentation_store`")
        };

        if let Some(identifier) = &identifier {
            if identifier.did() != options.did {
                bail!(
                    "identifier '{}' does not match the verifier DID '{}'",
                    identifier.did(),
                    options.did
                )
            }
        }

        let signer = match (signer, &identifier) {
            (Some(signer), _) => signer,
            (None, Some(identifier)) => Arc::new(KeySigner::from_identifier(
                identifier,
                options.key_id.as_deref(),
            )?),
            (None, None) => bail!("request signer is required, see `with_signer`"),
        };

        let http_client = match http_client {
            Some(http_client) => http_client,
            None => Arc::new(ReqwestClient::new()?),
        };
        let did_resolver = did_resolver.unwrap_or_else(|| {
            Arc::new(KeyMaterialResolver::new().with_http_client(http_client.clone()))
        });
        let status_lists = match status_lists {
            Some(status_lists) => status_lists,
            None => {
                let resolver = StatusListResolver::new(http_client, did_resolver.clone());
                Arc::new(match status_list_ttl {
                    Some(ttl) => resolver.with_ttl(ttl),
                    None => resolver,
                })
            }
        };

        Ok(Verifier {
            options,
            base,
            identifier,
            signer,
            session_store: session_store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            presentation_store,
            extractor: CredentialExtractor::new(did_resolver, status_lists),
            default_request_params,
        })
    }

    pub fn with_options(mut self, options: VerifierOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the URL all verifier endpoints live below.
    pub fn with_base_url(mut self, base: BaseUrl) -> Self {
        self.base = Some(base);
        self
    }

    /// Take the base url, options of `name` and status list TTL from a [Config].
    pub fn with_config(mut self, config: &Config, name: &str) -> Result<Self> {
        let options = config
            .verifier(name)
            .context(format!("no verifier named '{name}' is configured"))?;
        self.options = Some(options.clone());
        self.base = Some(config.base.clone());
        if let Some(ttl) = config.status_list_ttl_seconds {
            self.status_list_ttl = Some(Duration::seconds(i64::try_from(ttl)?));
        }
        Ok(self)
    }

    /// Set the DID and keys of the verifier, used for signing and the `did:web` document.
    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner + Send + Sync>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Set the [SessionStore] that the [Verifier] will use to maintain session state across
    /// transactions. Defaults to a [MemoryStore].
    pub fn with_session_store(
        mut self,
        session_store: Arc<dyn SessionStore + Send + Sync>,
    ) -> Self {
        self.session_store = Some(session_store);
        self
    }

    pub fn with_presentation_store(
        mut self,
        presentation_store: Arc<dyn PresentationStore + Send + Sync>,
    ) -> Self {
        self.presentation_store = Some(presentation_store);
        self
    }

    pub fn with_did_resolver(mut self, did_resolver: Arc<dyn DidResolver + Send + Sync>) -> Self {
        self.did_resolver = Some(did_resolver);
        self
    }

    /// Share a status list resolver, and with it its cache, between verifiers.
    pub fn with_status_list_resolver(mut self, status_lists: Arc<StatusListResolver>) -> Self {
        self.status_lists = Some(status_lists);
        self
    }

    /// Set the HTTP client used to fetch status lists and `did:web` documents.
    pub fn with_http_client(mut self, http_client: Arc<dyn AsyncHttpClient + Send + Sync>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_status_list_ttl(mut self, ttl: Duration) -> Self {
        self.status_list_ttl = Some(ttl);
        self
    }

    /// Set default parameters that every request object will contain.
    pub fn with_default_request_parameter<T: TypedParameter>(mut self, t: T) -> Result<Self> {
        self.default_request_params.insert(t)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PresentationRecord,
        core::crypto::{CryptoKey, KeyAlgorithm},
        verifier::presentations::MemoryPresentationStore,
    };

    fn verifier(path: Option<&str>) -> Verifier {
        let key = CryptoKey::generate(KeyAlgorithm::Ed25519);
        let identifier = Identifier::new("did:web:verifier.example", key, None).unwrap();
        let mut options = VerifierOptions::new("alpha", "did:web:verifier.example")
            .with_presentation("employee");
        options.path = path.map(ToOwned::to_owned);
        Verifier::builder()
            .with_options(options)
            .with_base_url("https://verifier.example/oid4vp".parse().unwrap())
            .with_identifier(identifier)
            .with_presentation_store(Arc::new(MemoryPresentationStore::new([
                PresentationRecord::presentation_exchange(
                    "employee",
                    vec![serde_json::json!({"id": "employee"})],
                ),
            ])))
            .with_did_resolver(Arc::new(KeyMaterialResolver::new()))
            .with_status_list_resolver(Arc::new(StatusListResolver::new(
                Arc::new(ReqwestClient::new().unwrap()),
                Arc::new(KeyMaterialResolver::new()),
            )))
            .with_http_client(Arc::new(ReqwestClient::new().unwrap()))
            .build()
            .unwrap()
    }

    #[test]
    fn endpoints() {
        assert_eq!(
            verifier(None)
                .endpoint(&["response", "abc"])
                .unwrap()
                .as_str(),
            "https://verifier.example/oid4vp/alpha/response/abc"
        );
        assert_eq!(
            verifier(Some("/tenants/a/"))
                .endpoint(&[])
                .unwrap()
                .as_str(),
            "https://verifier.example/oid4vp/tenants/a"
        );
    }

    #[tokio::test]
    async fn unknown_presentations_are_rejected() {
        let verifier = verifier(None);
        assert!(verifier.create_offer("pid").await.is_err());
        assert!(verifier.presentation_definition("employee").await.is_ok());
        assert!(verifier.check_offer("missing").await.is_err());
    }

    #[tokio::test]
    async fn siop_request_object() {
        let verifier = verifier(None);
        let offer = verifier.create_offer("employee").await.unwrap();
        assert!(offer.request_uri.as_str().starts_with("openid4vp://?client_id=did%3Aweb"));

        let jwt = verifier
            .retrieve_authorization_request(&offer.state, Some("wallet-nonce".into()))
            .await
            .unwrap();
        let jwt = crate::core::jwt::Jwt::decode(&jwt).unwrap();
        assert_eq!(jwt.header_str("typ"), Some(REQUEST_OBJECT_TYP));
        assert_eq!(jwt.claim_str("response_type"), Some("vp_token id_token"));
        assert_eq!(jwt.claim_str("scope"), Some("openid"));
        assert_eq!(jwt.claim_str("wallet_nonce"), Some("wallet-nonce"));
        assert_eq!(jwt.claim_str("aud"), Some("https://self-issued.me/v2"));
        assert_eq!(
            jwt.claim_str("presentation_definition_uri"),
            Some("https://verifier.example/oid4vp/alpha/presentations/employee")
        );

        let status = verifier.check_offer(&offer.state).await.unwrap();
        assert_eq!(status.status, RpStatus::AuthorizationRequestRetrieved);
        assert!(verifier.did_document().is_ok());
    }
}
