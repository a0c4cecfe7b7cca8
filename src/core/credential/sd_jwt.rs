use base64::prelude::*;
use chrono::Utc;
use serde_json::{Map, Value as Json};
use sha2::{Digest, Sha256};
use ssi_sd_jwt::{RevealError, SdJwtBuf};
use tracing::debug;

use super::{
    check_validity, ietf_status_entries, timestamp, CredentialExtractor, CredentialFormat,
    CredentialMetadata, ExtractedCredential, Extraction, VerificationContext,
};
use crate::core::{
    crypto::CryptoKey,
    jwt::Jwt,
    message::{codes, Message},
};

/// Claims of an SD-JWT payload that describe the token rather than the subject.
const NON_SUBJECT_CLAIMS: [&str; 11] = [
    "iss", "sub", "iat", "nbf", "exp", "cnf", "status", "vct", "_sd_alg", "jti", "aud",
];

#[derive(Debug, thiserror::Error)]
pub enum SdJwtError {
    #[error("malformed SD-JWT: {0}")]
    Malformed(String),
    #[error("unable to reveal the disclosed claims: {0}")]
    Reveal(#[from] RevealError),
    #[error("revealed claims are not a JSON object")]
    NotAnObject,
}

fn digest(input: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(input.as_bytes()))
}

/// A parsed `<issuer-jwt>~<disclosure>~...~<kb-jwt>` token.
#[derive(Debug, Clone)]
pub struct SdJwt {
    pub jwt: Jwt,
    pub key_binding: Option<String>,
    /// Everything up to and including the last `~`, the input of `sd_hash`.
    presented: SdJwtBuf,
}

impl SdJwt {
    /// Whether `token` looks like an SD-JWT rather than a plain JWT.
    pub fn is_sd_jwt(token: &str) -> bool {
        token.contains('~')
    }

    pub fn parse(token: &str) -> Result<Self, SdJwtError> {
        let token = token.trim();
        let Some(last_tilde) = token.rfind('~') else {
            return Err(SdJwtError::Malformed("no '~' separator".into()));
        };
        let presented: SdJwtBuf = token[..=last_tilde]
            .parse()
            .map_err(|e| SdJwtError::Malformed(format!("{e}")))?;
        let key_binding = Some(&token[last_tilde + 1..])
            .filter(|kb| !kb.is_empty())
            .map(ToOwned::to_owned);
        let issuer_jwt = token.split('~').next().unwrap_or_default();
        let jwt = Jwt::decode(issuer_jwt).map_err(|e| SdJwtError::Malformed(e.to_string()))?;

        Ok(Self {
            jwt,
            key_binding,
            presented,
        })
    }

    pub fn disclosure_count(&self) -> usize {
        self.presented.disclosures().count()
    }

    /// The value the key binding JWT must carry in `sd_hash`.
    pub fn sd_hash(&self) -> String {
        digest(self.presented.as_str())
    }

    /// The payload with every disclosure substituted and `_sd` digests removed.
    ///
    /// Fails on disclosures that are malformed, reused, unreferenced or colliding with a
    /// plain claim.
    pub fn disclosed_claims(&self) -> Result<Map<String, Json>, SdJwtError> {
        let revealed = self.presented.decode_reveal_any()?;
        match serde_json::to_value(revealed.claims()).map_err(RevealError::from)? {
            Json::Object(claims) => Ok(claims),
            _ => Err(SdJwtError::NotAnObject),
        }
    }
}

impl CredentialExtractor {
    /// Verify an SD-JWT credential with its key binding JWT and extract the disclosed claims.
    pub async fn extract_sd_jwt(&self, token: &str, context: &VerificationContext) -> Extraction {
        let mut messages = vec![];
        let mut sd_jwt = match SdJwt::parse(token) {
            Ok(sd_jwt) => sd_jwt,
            Err(e) => {
                messages.push(Message::new(
                    codes::INVALID_JWT,
                    format!("credential is not a valid SD-JWT: {e}"),
                ));
                return Extraction {
                    credential: None,
                    messages,
                };
            }
        };

        match &sd_jwt.key_binding {
            Some(kb) => messages.extend(self.validate_key_binding(kb, &sd_jwt, context).await),
            None => messages.push(Message::new(
                codes::MISSING_KB,
                "SD-JWT has no key binding JWT",
            )),
        }

        match sd_jwt.jwt.find_signing_key(self.did_resolver()).await {
            None => messages.push(Message::new(
                codes::INVALID_SDJWT,
                "unable to find the SD-JWT issuer key",
            )),
            Some(key) if !sd_jwt.jwt.verify(&key) => messages.push(Message::new(
                codes::INVALID_SDJWT,
                "SD-JWT issuer signature does not verify",
            )),
            Some(_) => messages.push(Message::new(
                codes::JWT_VERIFIED,
                "SD-JWT issuer signature verified",
            )),
        }

        let now = Utc::now();
        messages.extend(check_validity(&sd_jwt.jwt.payload, now, "credential"));

        let mut claims = match sd_jwt.disclosed_claims() {
            Ok(claims) => {
                debug!("revealed {} disclosures", sd_jwt.disclosure_count());
                claims
            }
            Err(e) => {
                messages.push(Message::new(codes::INVALID_SDJWT, e.to_string()));
                let mut claims = sd_jwt.jwt.payload.clone();
                claims.remove("_sd");
                claims
            }
        };

        let payload = &sd_jwt.jwt.payload;
        let holder = payload.get("cnf").and_then(|cnf| {
            cnf.get("kid")
                .or_else(|| cnf.get("jwk"))
                .or_else(|| cnf.get("x5c"))
                .cloned()
        });
        let metadata = CredentialMetadata {
            issued_at: payload.get("iat").and_then(timestamp),
            not_before: payload.get("nbf").and_then(timestamp),
            expires: payload.get("exp").and_then(timestamp),
            evidence: vec![],
            status_lists: ietf_status_entries(payload),
        };
        let issuer = payload
            .get("iss")
            .and_then(Json::as_str)
            .map(ToOwned::to_owned)
            .or_else(|| sd_jwt.jwt.issuer().map(ToOwned::to_owned));
        for claim in NON_SUBJECT_CLAIMS {
            claims.remove(claim);
        }

        let credential = ExtractedCredential {
            format: CredentialFormat::SdJwt,
            issuer,
            issuer_name: None,
            holder,
            claims,
            metadata,
        };
        messages.extend(self.status_messages(&credential).await);

        Extraction {
            credential: Some(credential),
            messages,
        }
    }

    async fn holder_key(&self, sd_jwt: &SdJwt) -> Option<CryptoKey> {
        let cnf = sd_jwt.jwt.payload.get("cnf")?;
        if let Some(kid) = cnf.get("kid").and_then(Json::as_str) {
            return match self.did_resolver().resolve(kid).await {
                Ok(key) => key,
                Err(e) => {
                    debug!("unable to resolve holder key '{kid}': {e:#}");
                    None
                }
            };
        }
        CryptoKey::from_jwk(cnf.get("jwk")?).ok()
    }

    /// Check the key binding JWT of an SD-JWT against the holder key and the request.
    async fn validate_key_binding(
        &self,
        token: &str,
        sd_jwt: &SdJwt,
        context: &VerificationContext,
    ) -> Vec<Message> {
        let mut messages = vec![];
        let kb = match Jwt::decode(token) {
            Ok(kb) => kb,
            Err(e) => {
                messages.push(Message::new(
                    codes::INVALID_JWT,
                    format!("key binding is not a valid JWT: {e}"),
                ));
                return messages;
            }
        };

        match self.holder_key(sd_jwt).await {
            None => messages.push(Message::new(
                codes::INVALID_SDJWT,
                "SD-JWT does not carry a supported holder key",
            )),
            Some(key) if kb.verify(&key) => messages.push(Message::new(
                codes::JWT_VERIFIED,
                "key binding signature verified",
            )),
            Some(_) => messages.push(Message::new(
                codes::JWT_UNVERIFIED,
                "key binding signature could not be verified",
            )),
        }

        if kb.header_str("typ") != Some("kb+jwt") {
            messages.push(Message::new(
                codes::INVALID_KB,
                "key binding JWT must have typ kb+jwt",
            ));
        }
        messages.extend(check_validity(&kb.payload, Utc::now(), "key binding"));
        if !context.audience_matches(kb.claim("aud")) {
            messages.push(
                Message::new(codes::INVALID_KB, "key binding audience does not match")
                    .with("expected", context.client_id.clone()),
            );
        }
        if !context.nonce_matches(kb.claim("nonce")) {
            messages.push(
                Message::new(codes::INVALID_KB, "key binding nonce does not match")
                    .with("expected", context.nonce.clone()),
            );
        }
        match kb.claim_str("sd_hash") {
            None => messages.push(Message::new(codes::INVALID_KB, "key binding has no sd_hash")),
            Some(hash) if hash != sd_jwt.sd_hash() => messages.push(Message::new(
                codes::INVALID_KB,
                "key binding sd_hash does not match the presented SD-JWT",
            )),
            Some(_) => {}
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::crypto::KeyAlgorithm;

    /// An encoded disclosure and its digest.
    fn disclosure(parts: Json) -> (String, String) {
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&parts).unwrap());
        let digest = digest(&encoded);
        (encoded, digest)
    }

    fn issue(payload: Json, disclosures: &[&(String, String)]) -> String {
        let key = CryptoKey::generate(KeyAlgorithm::Ed25519);
        let mut jwt = Jwt::new(
            json!({"typ": "dc+sd-jwt"}).as_object().unwrap().clone(),
            payload.as_object().unwrap().clone(),
        );
        let token = jwt.sign(&key, None).unwrap();
        let encoded: Vec<&str> = disclosures.iter().map(|(e, _)| e.as_str()).collect();
        format!("{token}~{}~", encoded.join("~"))
    }

    #[test]
    fn digest_of_known_disclosure() {
        // Example from the SD-JWT specification.
        assert_eq!(
            digest("WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsICJmYW1pbHlfbmFtZSIsICJNw7ZiaXVzIl0"),
            "X9yH0Ajrdm1Oij4tWso9UzzKJvPoDxwmuEcO3XAdRC0"
        );
    }

    #[test]
    fn substitutes_object_and_array_disclosures() {
        let name = disclosure(json!(["salt1", "given_name", "Alice"]));
        let nationality = disclosure(json!(["salt2", "DE"]));
        let street = disclosure(json!(["salt3", "street", "Main St"]));
        let token = issue(
            json!({
                "iss": "https://issuer.example",
                "_sd_alg": "sha-256",
                "_sd": [name.1, "decoy-digest"],
                "nationalities": [{"...": nationality.1}, "FR", {"...": "undisclosed"}],
                "address": {"_sd": [street.1], "country": "NL"}
            }),
            &[&name, &nationality, &street],
        );

        let sd_jwt = SdJwt::parse(&token).unwrap();
        assert!(sd_jwt.key_binding.is_none());
        assert_eq!(sd_jwt.disclosure_count(), 3);
        let claims = sd_jwt.disclosed_claims().unwrap();
        assert_eq!(claims["given_name"], "Alice");
        assert_eq!(claims["nationalities"], json!(["DE", "FR"]));
        assert_eq!(claims["address"], json!({"country": "NL", "street": "Main St"}));
        assert!(claims.get("_sd").is_none());
        assert!(claims.get("_sd_alg").is_none());
    }

    #[test]
    fn rejects_unreferenced_and_reused_disclosures() {
        let name = disclosure(json!(["salt1", "given_name", "Alice"]));
        let extra = disclosure(json!(["salt9", "family_name", "Smith"]));
        let token = issue(
            json!({"_sd_alg": "sha-256", "_sd": [name.1]}),
            &[&name, &extra],
        );
        assert!(matches!(
            SdJwt::parse(&token).unwrap().disclosed_claims(),
            Err(SdJwtError::Reveal(_))
        ));

        let token = issue(
            json!({"_sd_alg": "sha-256", "_sd": [name.1], "nested": {"_sd": [name.1]}}),
            &[&name],
        );
        assert!(matches!(
            SdJwt::parse(&token).unwrap().disclosed_claims(),
            Err(SdJwtError::Reveal(_))
        ));

        let token = issue(json!({"_sd_alg": "sha-512", "_sd": []}), &[]);
        assert!(SdJwt::parse(&token).unwrap().disclosed_claims().is_err());
    }

    #[test]
    fn sd_hash_covers_token_up_to_last_tilde() {
        let name = disclosure(json!(["salt1", "given_name", "Alice"]));
        let presented = issue(json!({"_sd_alg": "sha-256", "_sd": [name.1]}), &[&name]);
        let with_kb = format!("{presented}kb.jwt.sig");
        let sd_jwt = SdJwt::parse(&with_kb).unwrap();
        assert_eq!(sd_jwt.key_binding.as_deref(), Some("kb.jwt.sig"));
        assert_eq!(sd_jwt.sd_hash(), digest(&presented));
    }

    #[test]
    fn malformed_tokens() {
        assert!(SdJwt::parse("a.b.c").is_err());
        assert!(SdJwt::parse("not-a-jwt~").is_err());
        assert!(SdJwt::parse("e30.e30.c2ln~not base64!~").is_err());
    }
}
