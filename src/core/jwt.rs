//! Compact JWS tokens: decoding, key discovery, signing and verification.

use base64::prelude::*;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::core::{
    crypto::{CryptoKey, KeyError},
    did::DidResolver,
};

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("malformed JWT: {0}")]
    Malformed(String),
    #[error("JWT could not be verified: {0}")]
    Unverified(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to serialize JWT segment: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JwtError {
    pub fn code(&self) -> &'static str {
        match self {
            JwtError::Malformed(_) | JwtError::Serialization(_) => "INVALID_JWT",
            JwtError::Unverified(_) => "JWT_UNVERIFIED",
            JwtError::Key(e) => e.code(),
        }
    }
}

/// A JWT in compact serialization.
///
/// The header and payload are kept as JSON objects. The encoded segments are retained so that
/// verification uses the exact bytes that were signed.
#[derive(Debug, Clone, Default)]
pub struct Jwt {
    pub header: Map<String, Json>,
    pub payload: Map<String, Json>,
    header_part: String,
    payload_part: String,
    signature_part: String,
    issuer: Option<String>,
}

fn decode_segment(name: &str, segment: &str) -> Result<Map<String, Json>, JwtError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JwtError::Malformed(format!("{name} is not base64url: {e}")))?;
    match serde_json::from_slice(&bytes) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(JwtError::Malformed(format!("{name} is not a JSON object"))),
        Err(e) => Err(JwtError::Malformed(format!("{name} is not JSON: {e}"))),
    }
}

fn encode_segment(map: &Map<String, Json>) -> Result<String, JwtError> {
    Ok(BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(map)?))
}

impl Jwt {
    /// An unsigned token with the given header and payload.
    pub fn new(header: Map<String, Json>, payload: Map<String, Json>) -> Self {
        Self {
            header,
            payload,
            ..Default::default()
        }
    }

    /// Decode a compact JWS. The signature is not checked.
    pub fn decode(token: &str) -> Result<Self, JwtError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [header_part, payload_part, signature_part] = parts.as_slice() else {
            return Err(JwtError::Malformed(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        };
        if [header_part, payload_part, signature_part]
            .iter()
            .any(|part| part.is_empty())
        {
            return Err(JwtError::Malformed("empty segment".into()));
        }

        Ok(Self {
            header: decode_segment("header", header_part)?,
            payload: decode_segment("payload", payload_part)?,
            header_part: header_part.to_string(),
            payload_part: payload_part.to_string(),
            signature_part: signature_part.to_string(),
            issuer: None,
        })
    }

    pub fn header_part(&self) -> &str {
        &self.header_part
    }

    pub fn payload_part(&self) -> &str {
        &self.payload_part
    }

    pub fn signature_part(&self) -> &str {
        &self.signature_part
    }

    /// The compact serialization. Empty until the token has been decoded or signed.
    pub fn token(&self) -> String {
        if self.signature_part.is_empty() {
            return String::new();
        }
        format!(
            "{}.{}.{}",
            self.header_part, self.payload_part, self.signature_part
        )
    }

    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header_part, self.payload_part)
    }

    /// The DID of the key found by [Jwt::find_signing_key].
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn claim(&self, name: &str) -> Option<&Json> {
        self.payload.get(name)
    }

    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Json::as_str)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Json::as_str)
    }

    /// The DID URL of the signing key.
    ///
    /// A header `kid` that is an absolute reference is used as is. A relative `kid` (`#frag`) is
    /// appended to the first of header `iss`, payload `iss` or payload `sub`.
    pub fn key_id(&self) -> Option<String> {
        let kid = self
            .header_str("kid")
            .map(str::trim)
            .filter(|kid| !kid.is_empty());
        if let Some(kid) = kid.filter(|kid| !kid.starts_with('#')) {
            return Some(kid.to_owned());
        }

        let fragment = kid.unwrap_or_default();
        [
            self.header_str("iss"),
            self.claim_str("iss"),
            self.claim_str("sub"),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|base| !base.is_empty())
        .map(|base| format!("{base}{fragment}"))
    }

    /// Locate the key that signed this token.
    ///
    /// The key id is resolved through `resolver`. When that yields nothing, a `jwk` in the header
    /// is used. Sets [Jwt::issuer] to the DID part of the key id.
    pub async fn find_signing_key<R: DidResolver + Send + Sync + ?Sized>(
        &mut self,
        resolver: &R,
    ) -> Option<CryptoKey> {
        if let Some(kid) = self.key_id() {
            self.issuer = kid.split('#').next().map(ToOwned::to_owned);
            match resolver.resolve(&kid).await {
                Ok(Some(key)) => return Some(key),
                Ok(None) => debug!("no key resolved for '{kid}'"),
                Err(e) => warn!("unable to resolve key '{kid}': {e:#}"),
            }
        }

        let jwk = self.header.get("jwk")?;
        match CryptoKey::from_jwk(jwk) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("unable to use header jwk: {e}");
                None
            }
        }
    }

    /// Check the signature with `key`, using the header `alg` or the key's default algorithm.
    pub fn verify(&self, key: &CryptoKey) -> bool {
        let algorithm = self
            .header_str("alg")
            .unwrap_or_else(|| key.default_algorithm());
        key.verify_encoded(
            algorithm,
            &self.signature_part,
            self.signing_input().as_bytes(),
        )
    }

    /// Encode the header and payload, returning the signing input.
    pub fn encode_parts(&mut self) -> Result<String, JwtError> {
        self.header_part = encode_segment(&self.header)?;
        self.payload_part = encode_segment(&self.payload)?;
        self.signature_part.clear();
        Ok(self.signing_input())
    }

    pub fn set_signature(&mut self, signature: &[u8]) {
        self.signature_part = BASE64_URL_SAFE_NO_PAD.encode(signature);
    }

    /// Sign with a raw signer function over the signing input.
    pub fn sign_with<F>(&mut self, signer: F) -> Result<String, JwtError>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>, KeyError>,
    {
        let input = self.encode_parts()?;
        let signature = signer(input.as_bytes())?;
        self.set_signature(&signature);
        Ok(self.token())
    }

    /// Sign with `key`, setting `alg` and a `did:key` `kid` in the header.
    pub fn sign(&mut self, key: &CryptoKey, algorithm: Option<&str>) -> Result<String, JwtError> {
        let algorithm = algorithm
            .or_else(|| self.header_str("alg"))
            .unwrap_or_else(|| key.default_algorithm())
            .to_owned();
        self.header.insert("alg".into(), algorithm.clone().into());
        self.header.insert("kid".into(), key.did_key_url().into());
        self.sign_with(|input| key.sign_raw(&algorithm, input))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::{crypto::KeyAlgorithm, did::KeyMaterialResolver};

    fn object(value: Json) -> Map<String, Json> {
        match value {
            Json::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn sign_decode_verify() {
        for algorithm in KeyAlgorithm::ALL {
            let key = CryptoKey::generate(algorithm);
            let mut jwt = Jwt::new(
                object(json!({"typ": "JWT"})),
                object(json!({"iss": "someone", "nonce": "n"})),
            );
            let token = jwt.sign(&key, None).unwrap();

            let mut decoded = Jwt::decode(&token).unwrap();
            assert_eq!(decoded.token(), token);
            assert_eq!(decoded.header_str("alg"), Some(key.default_algorithm()));
            assert_eq!(decoded.claim_str("nonce"), Some("n"));

            let found = decoded
                .find_signing_key(&KeyMaterialResolver::new())
                .await
                .unwrap();
            assert_eq!(found, key);
            assert_eq!(decoded.issuer(), Some(key.did_key().as_str()));
            assert!(decoded.verify(&found));
            assert!(!decoded.verify(&CryptoKey::generate(algorithm)));
        }
    }

    #[test]
    fn tampered_payload_fails() {
        let key = CryptoKey::generate(KeyAlgorithm::Ed25519);
        let mut jwt = Jwt::new(object(json!({})), object(json!({"sub": "a"})));
        let token = jwt.sign(&key, None).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = BASE64_URL_SAFE_NO_PAD.encode(br#"{"sub":"b"}"#);
        let forged = format!("{}.{forged_payload}.{}", parts[0], parts[2]);
        assert!(!Jwt::decode(&forged).unwrap().verify(&key));
    }

    #[test]
    fn malformed_tokens() {
        for token in [
            "",
            "abc",
            "a.b",
            "a.b.c.d",
            "eyJhbGciOiJFUzI1NiJ9..sig",
            "bm90IGpzb24.eyJhIjoxfQ.c2ln",
            "W10.eyJhIjoxfQ.c2ln",
        ] {
            let err = Jwt::decode(token).unwrap_err();
            assert_eq!(err.code(), "INVALID_JWT", "{token}");
        }
    }

    #[test]
    fn empty_objects_round_trip() {
        let key = CryptoKey::generate(KeyAlgorithm::Secp256r1);
        let mut jwt = Jwt::new(Map::new(), Map::new());
        let token = jwt.sign_with(|input| key.sign_raw("ES256", input)).unwrap();
        assert!(token.starts_with("e30.e30."));

        let decoded = Jwt::decode(&token).unwrap();
        assert!(decoded.header.is_empty());
        assert!(decoded.payload.is_empty());
        assert!(decoded.verify(&key));

        let signed = Jwt::new(Map::new(), Map::new()).sign(&key, None).unwrap();
        assert!(Jwt::decode(&signed).unwrap().payload.is_empty());
    }

    #[test]
    fn key_id_resolution_order() {
        let jwt = |header: Json, payload: Json| Jwt::new(object(header), object(payload));

        assert_eq!(
            jwt(json!({"kid": "did:key:z6Mkabc#z6Mkabc"}), json!({"iss": "x"})).key_id(),
            Some("did:key:z6Mkabc#z6Mkabc".to_owned())
        );
        assert_eq!(
            jwt(json!({"kid": "#key-1", "iss": "did:web:h"}), json!({"iss": "x"})).key_id(),
            Some("did:web:h#key-1".to_owned())
        );
        assert_eq!(
            jwt(json!({"kid": "#key-1"}), json!({"iss": "did:web:p"})).key_id(),
            Some("did:web:p#key-1".to_owned())
        );
        assert_eq!(
            jwt(json!({"alg": "ES256"}), json!({"sub": "did:jwk:abc"})).key_id(),
            Some("did:jwk:abc".to_owned())
        );
        assert_eq!(jwt(json!({"alg": "ES256"}), json!({"a": 1})).key_id(), None);
    }

    #[tokio::test]
    async fn falls_back_to_header_jwk() {
        let key = CryptoKey::generate(KeyAlgorithm::Secp256r1);
        let mut jwt = Jwt::new(
            object(json!({"jwk": key.to_jwk()})),
            object(json!({"iss": "https://issuer.example"})),
        );
        jwt.sign_with(|input| key.sign_raw("ES256", input)).unwrap();
        let mut decoded = Jwt::decode(&jwt.token()).unwrap();
        let found = decoded
            .find_signing_key(&KeyMaterialResolver::new())
            .await
            .unwrap();
        // No alg in the header: the key's default algorithm is used.
        assert!(decoded.verify(&found));
    }
}
