use anyhow::{Context, Result};

use crate::core::{
    authorization_request::{
        parameters::{
            Audience, ClientId, ClientIdScheme, ClientMetadata, IdTokenType, Nonce,
            PresentationDefinitionUri, ResponseMode, ResponseType, ResponseUri, Scope, State,
            SUPPORTED_SIGNING_ALGORITHMS,
        },
        AuthorizationRequestObject,
    },
    credential_format::supported_vp_formats,
    object::{TypedParameter, UntypedObject},
};

use super::{
    rp::{PresentationQuery, RpSession},
    Verifier,
};

/// The audience of requests answered with a self-issued `id_token`.
pub const SELF_ISSUED_AUDIENCE: &str = "https://self-issued.me/v2";

/// Assembles the request object a wallet retrieves for a session.
#[derive(Debug, Clone)]
#[must_use]
pub struct RequestBuilder<'a> {
    request_parameters: UntypedObject,
    verifier: &'a Verifier,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(verifier: &'a Verifier) -> Self {
        Self {
            request_parameters: verifier.default_request_params.clone(),
            verifier,
        }
    }

    /// Set or override the default authorization request parameters.
    ///
    /// Parameters that tie the request to its session are always set by [RequestBuilder::build].
    pub fn with_request_parameter<T: TypedParameter>(mut self, t: T) -> Result<Self> {
        self.request_parameters.insert(t)?;
        Ok(self)
    }

    /// Build the request object for `session`.
    ///
    /// A DCQL query is sent inline and answered with a `vp_token`. A presentation definition is
    /// served from the verifier's `presentations` endpoint and answered with a `vp_token` and a
    /// self-issued `id_token`.
    pub fn build(mut self, session: &RpSession) -> Result<AuthorizationRequestObject> {
        let verifier = self.verifier;
        let params = &mut self.request_parameters;

        params.insert(ClientId(verifier.request_client_id(&session.query)))?;
        params.insert(ClientIdScheme::Did)?;
        params.insert(ResponseMode::DirectPost)?;
        params.insert(ResponseUri(
            verifier.endpoint(&["response", &session.state])?,
        ))?;
        params.insert(Nonce(session.nonce.clone()))?;
        params.insert(State(session.state.clone()))?;
        params.insert(
            ClientMetadata::for_verifier(&supported_vp_formats(&SUPPORTED_SIGNING_ALGORITHMS))
                .context("unable to build client metadata")?,
        )?;

        match &session.query {
            PresentationQuery::Dcql(query) => {
                params.insert(ResponseType::VpToken)?;
                params.insert(Audience(verifier.client_id().to_owned()))?;
                params.insert(query.clone())?;
            }
            PresentationQuery::PresentationExchange(definition) => {
                params.insert(ResponseType::VpTokenIdToken)?;
                params.insert(Scope("openid".into()))?;
                params.insert(Audience(SELF_ISSUED_AUDIENCE.into()))?;
                params.insert(IdTokenType::attester_and_subject_signed())?;
                params.insert(PresentationDefinitionUri(
                    verifier.endpoint(&["presentations", definition.id()])?,
                ))?;
            }
        }

        self.request_parameters.try_into().context(
            "unable to construct the Authorization Request from provided request parameters",
        )
    }
}
