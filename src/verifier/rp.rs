//! The relying party side of one presentation exchange.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use crate::core::{
    authorization_request::AuthorizationRequestObject,
    credential::{check_validity, CredentialExtractor, ExtractedCredential, VerificationContext},
    crypto::CryptoKey,
    dcql_query::DcqlQuery,
    jwt::Jwt,
    message::{codes, Message},
    presentation_definition::PresentationDefinition,
    response::AuthorizationResponse,
    submission::{DcqlSubmission, PexSubmission, SubmissionResult},
};

/// How long a session can be completed after it was created.
pub const SESSION_TTL_HOURS: i64 = 4;

/// Progress of an exchange. The order of the variants is the order they are reached in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpStatus {
    Initialized,
    AuthorizationRequestCreated,
    AuthorizationRequestRetrieved,
    ResponseProcessing,
    ResponseReceived,
}

/// The credentials a session asks the wallet for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresentationQuery {
    Dcql(DcqlQuery),
    PresentationExchange(PresentationDefinition),
}

impl PresentationQuery {
    pub fn is_dcql(&self) -> bool {
        matches!(self, Self::Dcql(_))
    }
}

/// Outcome of processing a wallet response.
///
/// `credentials` is `None` when the response was rejected before any credential was looked at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpResult {
    pub state: String,
    /// The subject of the SIOP `id_token`, when one was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, Vec<ExtractedCredential>>>,
    pub messages: Vec<Message>,
}

impl VpResult {
    pub fn has_code(&self, code: &str) -> bool {
        self.messages.iter().any(|m| m.is(code))
    }
}

/// What the application frontend sees when polling an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferStatus {
    pub status: RpStatus,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VpResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpSession {
    pub state: String,
    pub verifier: String,
    pub presentation_id: String,
    pub query: PresentationQuery,
    pub nonce: String,
    pub status: RpStatus,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_object: Option<AuthorizationRequestObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VpResult>,
}

impl RpSession {
    pub fn new(
        state: String,
        verifier: String,
        presentation_id: String,
        query: PresentationQuery,
        nonce: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state,
            verifier,
            presentation_id,
            query,
            nonce,
            status: RpStatus::Initialized,
            created: now,
            last_update: now,
            expires: now + Duration::hours(SESSION_TTL_HOURS),
            request_object: None,
            result: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    pub fn transition(&mut self, status: RpStatus, now: DateTime<Utc>) {
        debug!("session {}: {:?} -> {:?}", self.state, self.status, status);
        self.status = status;
        self.last_update = now;
    }

    pub fn offer_status(&self) -> OfferStatus {
        OfferStatus {
            status: self.status,
            created: self.created,
            last_update: self.last_update,
            result: self
                .result
                .clone()
                .filter(|_| self.status == RpStatus::ResponseReceived),
        }
    }

    /// Validate a wallet response and record the result.
    ///
    /// A `state` that does not belong to this session stops processing with a single
    /// `INVALID_STATE` message. Every other problem is reported as a message while the remaining
    /// checks still run.
    pub async fn process_response(
        &mut self,
        state: Option<&str>,
        response: &AuthorizationResponse,
        client_id: &str,
        extractor: &CredentialExtractor,
    ) -> VpResult {
        self.transition(RpStatus::ResponseProcessing, Utc::now());
        let mut result = VpResult {
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            ..Default::default()
        };

        if state != Some(self.state.as_str()) {
            result.messages.push(
                Message::new(codes::INVALID_STATE, "state does not match the session")
                    .with("expected", self.state.as_str())
                    .with("received", state.map(Json::from).unwrap_or_default()),
            );
            return self.finish(result);
        }

        let context = VerificationContext::new(client_id, self.nonce.as_str());
        if let Some(id_token) = response.id_token() {
            match id_token {
                Ok(id_token) => {
                    let (issuer, messages) =
                        validate_id_token(&id_token.0, &context, extractor).await;
                    result.issuer = issuer;
                    result.messages.extend(messages);
                }
                Err(e) => result.messages.push(Message::new(
                    codes::INVALID_ID_TOKEN,
                    format!("id_token is not a string: {e:#}"),
                )),
            }
        }

        let SubmissionResult {
            credentials,
            messages,
        } = match &self.query {
            PresentationQuery::Dcql(query) => {
                DcqlSubmission::new(query, extractor, &context)
                    .validate(response.vp_token())
                    .await
            }
            PresentationQuery::PresentationExchange(definition) => {
                PexSubmission::new(definition, extractor, &context)
                    .validate(
                        response.vp_token(),
                        response
                            .presentation_submission()
                            .map(|submission| submission.map(|s| s.into_parsed())),
                    )
                    .await
            }
        };
        result.credentials = Some(credentials);
        result.messages.extend(messages);
        self.finish(result)
    }

    fn finish(&mut self, result: VpResult) -> VpResult {
        self.result = Some(result.clone());
        self.transition(RpStatus::ResponseReceived, Utc::now());
        result
    }
}

/// Check a SIOP self-issued `id_token`.
///
/// ## Returns
/// The subject of the token and the messages raised for it.
async fn validate_id_token(
    token: &str,
    context: &VerificationContext,
    extractor: &CredentialExtractor,
) -> (Option<String>, Vec<Message>) {
    let mut messages = vec![];
    let mut jwt = match Jwt::decode(token) {
        Ok(jwt) => jwt,
        Err(e) => {
            messages.push(Message::new(
                codes::INVALID_ID_TOKEN,
                format!("id_token is not a valid JWT: {e}"),
            ));
            return (None, messages);
        }
    };

    let iss = jwt.claim_str("iss").map(ToOwned::to_owned);
    let sub = jwt.claim_str("sub").map(ToOwned::to_owned);
    if let (Some(iss), Some(sub)) = (&iss, &sub) {
        if iss != sub {
            messages.push(
                Message::new(
                    codes::INVALID_ID_TOKEN,
                    "self-issued id_token must have the same iss and sub",
                )
                .with("iss", iss.as_str())
                .with("sub", sub.as_str()),
            );
        }
    }

    let key = match jwt.find_signing_key(extractor.did_resolver()).await {
        Some(key) => Some(key),
        None => jwt
            .claim("sub_jwk")
            .and_then(|jwk| CryptoKey::from_jwk(jwk).ok()),
    };
    match key {
        Some(key) if jwt.verify(&key) => messages.push(Message::new(
            codes::JWT_VERIFIED,
            "id_token signature verified",
        )),
        _ => messages.push(Message::new(
            codes::INVALID_ID_TOKEN,
            "id_token signature could not be verified",
        )),
    }

    if !context.audience_matches(jwt.claim("aud")) {
        messages.push(
            Message::new(codes::INVALID_ID_TOKEN, "id_token audience does not match")
                .with("expected", context.client_id.as_str()),
        );
    }
    if !context.nonce_matches(jwt.claim("nonce")) {
        messages.push(
            Message::new(codes::INVALID_ID_TOKEN, "id_token nonce does not match")
                .with("expected", context.nonce.as_str()),
        );
    }
    messages.extend(check_validity(&jwt.payload, Utc::now(), "id_token"));

    (sub.or(iss), messages)
}
