//! Verification and claim extraction for individual credential tokens.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::core::{
    did::DidResolver,
    jwt::Jwt,
    message::{codes, Message},
    status_list::StatusListResolver,
};

mod sd_jwt;
mod vcdm;

pub use sd_jwt::{SdJwt, SdJwtError};

/// The data model a credential was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialFormat {
    #[serde(rename = "VCDM1.1")]
    Vcdm1_1,
    #[serde(rename = "VCDM2.0")]
    Vcdm2,
    #[serde(rename = "dc+sd-jwt")]
    SdJwt,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_lists: Vec<Json>,
}

/// The verified content of one credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedCredential {
    pub format: CredentialFormat,
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,
    /// Holder key reference: a DID, or the confirmation key of an SD-JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<Json>,
    pub claims: Map<String, Json>,
    pub metadata: CredentialMetadata,
}

/// A credential (if one could be extracted) and the messages raised while processing it.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub credential: Option<ExtractedCredential>,
    pub messages: Vec<Message>,
}

/// The audience and nonce a presentation must be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationContext {
    pub client_id: String,
    pub nonce: String,
}

impl VerificationContext {
    pub const CLIENT_ID_PREFIX: &'static str = "decentralized_identifier:";

    pub fn new(client_id: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            nonce: nonce.into(),
        }
    }

    /// Whether an `aud` claim (a string or an array) names this verifier, with or without the
    /// client identifier prefix.
    pub fn audience_matches(&self, aud: Option<&Json>) -> bool {
        let bare = self
            .client_id
            .strip_prefix(Self::CLIENT_ID_PREFIX)
            .unwrap_or(&self.client_id);
        let matches = |value: &Json| {
            value.as_str().is_some_and(|aud| {
                aud == bare || aud.strip_prefix(Self::CLIENT_ID_PREFIX) == Some(bare)
            })
        };
        match aud {
            Some(Json::Array(values)) => values.iter().any(matches),
            Some(value) => matches(value),
            None => false,
        }
    }

    pub fn nonce_matches(&self, nonce: Option<&Json>) -> bool {
        nonce.and_then(Json::as_str) == Some(self.nonce.as_str())
    }
}

/// Convert a JWT NumericDate or an RFC 3339 string into a timestamp.
pub(crate) fn timestamp(value: &Json) -> Option<DateTime<Utc>> {
    match value {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Json::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

/// Check the `nbf`, `iat` and `exp` claims of a JWT payload against `now`.
///
/// `label` names the token in the messages, for example `presentation` or `credential`.
pub fn check_validity(payload: &Map<String, Json>, now: DateTime<Utc>, label: &str) -> Vec<Message> {
    let mut messages = vec![];
    let claim = |name: &str| payload.get(name).and_then(timestamp);

    if let Some(nbf) = claim("nbf") {
        if nbf > now {
            messages.push(
                Message::new(codes::NBF_ERROR, format!("{label} is not yet valid"))
                    .with("nbf", nbf.timestamp()),
            );
        }
    }
    if let Some(iat) = claim("iat") {
        if iat > now {
            messages.push(
                Message::new(codes::IAT_ERROR, format!("{label} was issued in the future"))
                    .with("iat", iat.timestamp()),
            );
        }
    }
    if let Some(exp) = claim("exp") {
        if exp <= now {
            messages.push(
                Message::new(codes::EXP_ERROR, format!("{label} has expired"))
                    .with("exp", exp.timestamp()),
            );
        }
    }
    messages
}

/// Wrap a single value into a list; arrays are kept, `null` and absence yield an empty list.
pub(crate) fn as_list(value: Option<&Json>) -> Vec<Json> {
    match value {
        None | Some(Json::Null) => vec![],
        Some(Json::Array(values)) => values.clone(),
        Some(value) => vec![value.clone()],
    }
}

/// IETF token status list references (`status.status_list`) in the form used by
/// [StatusListResolver].
pub(crate) fn ietf_status_entries(payload: &Map<String, Json>) -> Vec<Json> {
    payload
        .get("status")
        .and_then(|status| status.get("status_list"))
        .and_then(Json::as_object)
        .map(|list| {
            let mut entry = list.clone();
            entry.insert("type".into(), json!("status+jwt"));
            vec![Json::Object(entry)]
        })
        .unwrap_or_default()
}

/// Verifies credential tokens and extracts their claims.
#[derive(Debug, Clone)]
pub struct CredentialExtractor {
    did_resolver: Arc<dyn DidResolver + Send + Sync>,
    status_lists: Arc<StatusListResolver>,
}

impl CredentialExtractor {
    pub fn new(
        did_resolver: Arc<dyn DidResolver + Send + Sync>,
        status_lists: Arc<StatusListResolver>,
    ) -> Self {
        Self {
            did_resolver,
            status_lists,
        }
    }

    pub fn did_resolver(&self) -> &(dyn DidResolver + Send + Sync) {
        self.did_resolver.as_ref()
    }

    /// Resolve the signing key of `jwt` and check its signature.
    ///
    /// Reports `JWT_VERIFIED` or `JWT_UNVERIFIED`, returning whether the signature verified.
    pub(crate) async fn verify_signature(
        &self,
        jwt: &mut Jwt,
        label: &str,
        messages: &mut Vec<Message>,
    ) -> bool {
        let verified = match jwt.find_signing_key(self.did_resolver()).await {
            Some(key) => jwt.verify(&key),
            None => false,
        };
        let kid = jwt.key_id().unwrap_or_default();
        messages.push(if verified {
            Message::new(codes::JWT_VERIFIED, format!("{label} signature verified")).with("kid", kid)
        } else {
            Message::new(
                codes::JWT_UNVERIFIED,
                format!("{label} signature could not be verified"),
            )
            .with("kid", kid)
        });
        verified
    }

    async fn status_messages(&self, credential: &ExtractedCredential) -> Vec<Message> {
        self.status_lists
            .validate_status_lists(&credential.metadata.status_lists)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_with_and_without_prefix() {
        let context = VerificationContext::new("did:web:verifier.example", "n-0S6_WzA2Mj");
        assert!(context.audience_matches(Some(&json!("did:web:verifier.example"))));
        assert!(context.audience_matches(Some(&json!(
            "decentralized_identifier:did:web:verifier.example"
        ))));
        assert!(context.audience_matches(Some(&json!(["other", "did:web:verifier.example"]))));
        assert!(!context.audience_matches(Some(&json!("did:web:other.example"))));
        assert!(!context.audience_matches(None));

        let prefixed =
            VerificationContext::new("decentralized_identifier:did:web:verifier.example", "n");
        assert!(prefixed.audience_matches(Some(&json!("did:web:verifier.example"))));
    }

    #[test]
    fn temporal_checks() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let payload = json!({
            "nbf": 1_700_000_100,
            "iat": "2023-11-14T22:15:00Z",
            "exp": 1_700_000_000
        });
        let messages = check_validity(payload.as_object().unwrap(), now, "credential");
        let codes: Vec<&str> = messages.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["NBF_ERROR", "IAT_ERROR", "EXP_ERROR"]);

        let valid = json!({"nbf": 1_699_999_000, "iat": 1_699_999_000, "exp": 1_700_000_001});
        assert!(check_validity(valid.as_object().unwrap(), now, "credential").is_empty());
    }

    #[test]
    fn ietf_status_reference() {
        let payload = json!({"status": {"status_list": {"idx": 3, "uri": "https://s.example/1"}}});
        let entries = ietf_status_entries(payload.as_object().unwrap());
        assert_eq!(
            entries,
            vec![json!({"idx": 3, "uri": "https://s.example/1", "type": "status+jwt"})]
        );
    }
}
