use std::ops::Deref;

use anyhow::{bail, Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use self::parameters::{
    ClientId, ClientIdScheme, ClientMetadata, Nonce, PresentationDefinitionUri, ResponseMode,
    ResponseType, ResponseUri, State, WalletNonce,
};

use super::{
    dcql_query::DcqlQuery,
    object::{ParsingErrorContext, UntypedObject},
};

pub mod parameters;

/// The JWT `typ` of a signed request object.
pub const REQUEST_OBJECT_TYP: &str = "oauth-authz-req+jwt";

/// A request object as issued by a verifier.
///
/// The typed fields are checked on construction, every other parameter is kept in the
/// underlying [UntypedObject].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "UntypedObject", into = "UntypedObject")]
pub struct AuthorizationRequestObject(
    UntypedObject,
    ClientId,
    ResponseType,
    ResponseUri,
    Nonce,
    State,
    QueryIndirection,
);

/// How the credentials of a request are asked for.
#[derive(Debug, Clone)]
pub enum QueryIndirection {
    /// An inline `dcql_query`.
    Dcql(DcqlQuery),
    /// A Presentation Exchange definition served at `presentation_definition_uri`.
    PresentationDefinitionUri(Url),
}

/// An Authorization Request that passes its request object by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub request_uri: Url,
}

impl AuthorizationRequest {
    /// Encode as [Url], using the `authorization_endpoint` as a base.
    /// ```
    /// # use openid4vp_verifier::core::authorization_request::AuthorizationRequest;
    /// # use url::Url;
    /// let authorization_endpoint: Url = "openid4vp://".parse().unwrap();
    /// let authorization_request = AuthorizationRequest {
    ///     client_id: "did:web:verifier.example".to_string(),
    ///     request_uri: "https://verifier.example/get-offer/123".parse().unwrap(),
    /// };
    ///
    /// let url = authorization_request.to_url(authorization_endpoint).unwrap();
    ///
    /// assert_eq!(
    ///     url.as_str(),
    ///     "openid4vp://?client_id=did%3Aweb%3Averifier.example&request_uri=https%3A%2F%2Fverifier.example%2Fget-offer%2F123"
    /// );
    /// ```
    pub fn to_url(self, mut authorization_endpoint: Url) -> Result<Url> {
        let query = serde_urlencoded::to_string(self)?;
        authorization_endpoint.set_query(Some(&query));
        Ok(authorization_endpoint)
    }
}

impl AuthorizationRequestObject {
    pub fn client_id(&self) -> &ClientId {
        &self.1
    }

    pub fn client_id_scheme(&self) -> Option<ClientIdScheme> {
        self.0.get().and_then(Result::ok)
    }

    pub fn response_type(&self) -> &ResponseType {
        &self.2
    }

    pub fn is_id_token_requested(&self) -> bool {
        self.2 == ResponseType::VpTokenIdToken
    }

    pub fn response_uri(&self) -> &Url {
        &self.3 .0
    }

    pub fn nonce(&self) -> &Nonce {
        &self.4
    }

    pub fn state(&self) -> &State {
        &self.5
    }

    pub fn query(&self) -> &QueryIndirection {
        &self.6
    }

    pub fn client_metadata(&self) -> Option<Result<ClientMetadata>> {
        self.0.get()
    }

    /// Echo the nonce a wallet sent when fetching the request.
    pub fn set_wallet_nonce(&mut self, wallet_nonce: WalletNonce) -> Result<()> {
        self.0.insert(wallet_nonce).map(|_| ())
    }
}

impl Deref for AuthorizationRequestObject {
    type Target = UntypedObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<AuthorizationRequestObject> for UntypedObject {
    fn from(value: AuthorizationRequestObject) -> Self {
        value.0
    }
}

impl TryFrom<UntypedObject> for AuthorizationRequestObject {
    type Error = Error;

    fn try_from(value: UntypedObject) -> Result<Self, Self::Error> {
        let client_id = value.get().parsing_error()?;
        let response_type = match value.get().parsing_error()? {
            ResponseType::Unsupported(t) => bail!("unsupported 'response_type' ({t})"),
            response_type => response_type,
        };
        match value.get_or_default::<ResponseMode>().parsing_error()? {
            ResponseMode::DirectPost => {}
            other => bail!("unsupported 'response_mode' ({other})"),
        }
        let response_uri = value.get().parsing_error()?;
        let nonce = value.get().parsing_error()?;
        let state = value.get().parsing_error()?;

        let query = match (
            value.get::<DcqlQuery>(),
            value.get::<PresentationDefinitionUri>(),
        ) {
            (None, None) => {
                bail!("one of 'dcql_query' and 'presentation_definition_uri' is required")
            }
            (Some(_), Some(_)) => {
                bail!("'dcql_query' and 'presentation_definition_uri' are mutually exclusive")
            }
            (Some(dcql), None) => QueryIndirection::Dcql(dcql.parsing_error()?),
            (None, Some(uri)) => QueryIndirection::PresentationDefinitionUri(uri.parsing_error()?.0),
        };

        Ok(Self(
            value,
            client_id,
            response_type,
            response_uri,
            nonce,
            state,
            query,
        ))
    }
}
