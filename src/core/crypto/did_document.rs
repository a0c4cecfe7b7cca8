use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value as Json};

use super::{CryptoKey, KeyAlgorithm, KeyError};

const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// How a verification method carries its public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethodFormat {
    JsonWebKey2020,
    Multikey,
    Ed25519VerificationKey2020,
    Ed25519VerificationKey2018,
    EcdsaSecp256r1VerificationKey2019,
}

impl VerificationMethodFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JsonWebKey2020 => "JsonWebKey2020",
            Self::Multikey => "Multikey",
            Self::Ed25519VerificationKey2020 => "Ed25519VerificationKey2020",
            Self::Ed25519VerificationKey2018 => "Ed25519VerificationKey2018",
            Self::EcdsaSecp256r1VerificationKey2019 => "EcdsaSecp256r1VerificationKey2019",
        }
    }

    pub fn context(&self) -> &'static str {
        match self {
            Self::JsonWebKey2020 => "https://w3id.org/security/suites/jws-2020/v1",
            Self::Multikey => "https://w3id.org/security/multikey/v1",
            Self::Ed25519VerificationKey2020 => "https://w3id.org/security/suites/ed25519-2020/v1",
            Self::Ed25519VerificationKey2018 => "https://w3id.org/security/suites/ed25519-2018/v1",
            Self::EcdsaSecp256r1VerificationKey2019 => {
                "https://w3id.org/security/suites/ecdsa-2019/v1"
            }
        }
    }

    fn supported_by(&self, algorithm: KeyAlgorithm) -> bool {
        match algorithm {
            KeyAlgorithm::Ed25519 => matches!(
                self,
                Self::JsonWebKey2020
                    | Self::Multikey
                    | Self::Ed25519VerificationKey2020
                    | Self::Ed25519VerificationKey2018
            ),
            KeyAlgorithm::Secp256r1 => matches!(
                self,
                Self::JsonWebKey2020 | Self::Multikey | Self::EcdsaSecp256r1VerificationKey2019
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,
}

impl VerificationMethod {
    pub fn from_key(
        key: &CryptoKey,
        id: String,
        controller: String,
        format: VerificationMethodFormat,
    ) -> Result<Self, KeyError> {
        if !format.supported_by(key.algorithm()) {
            return Err(KeyError::UnsupportedPublicKeyType(format!(
                "{} keys cannot be expressed as {}",
                key.algorithm(),
                format.name()
            )));
        }
        let mut method = Self {
            id,
            type_: format.name().to_owned(),
            controller,
            public_key_jwk: None,
            public_key_multibase: None,
            public_key_base58: None,
        };
        match format {
            VerificationMethodFormat::JsonWebKey2020
            | VerificationMethodFormat::EcdsaSecp256r1VerificationKey2019 => {
                method.public_key_jwk = Some(key.to_jwk())
            }
            VerificationMethodFormat::Multikey
            | VerificationMethodFormat::Ed25519VerificationKey2020 => {
                method.public_key_multibase = Some(key.did_key_identifier())
            }
            VerificationMethodFormat::Ed25519VerificationKey2018 => {
                method.public_key_base58 = Some(bs58::encode(key.public_key()).into_string())
            }
        }
        Ok(method)
    }

    /// Extract the public key this method carries.
    pub fn to_key(&self) -> Result<CryptoKey, KeyError> {
        if let Some(jwk) = &self.public_key_jwk {
            return CryptoKey::from_jwk(jwk);
        }
        if let Some(multibase) = &self.public_key_multibase {
            return CryptoKey::from_multibase(multibase);
        }
        if let Some(base58) = &self.public_key_base58 {
            if self.type_ != VerificationMethodFormat::Ed25519VerificationKey2018.name() {
                return Err(KeyError::UnsupportedPublicKeyType(format!(
                    "publicKeyBase58 on {}",
                    self.type_
                )));
            }
            let bytes = bs58::decode(base58)
                .into_vec()
                .map_err(|e| KeyError::InvalidKeyMaterial(format!("invalid base58: {e}")))?;
            return CryptoKey::from_public(KeyAlgorithm::Ed25519, &bytes);
        }
        Err(KeyError::UnsupportedPublicKeyType(format!(
            "verification method '{}' carries no supported public key",
            self.id
        )))
    }

    /// Whether this method is identified by `id`, which may be a full DID URL or a bare fragment.
    fn is(&self, id: &str) -> bool {
        let fragment = |s: &str| s.rsplit_once('#').map(|(_, f)| f.to_owned());
        self.id == id
            || (id.starts_with('#') && self.id.ends_with(id))
            || fragment(&self.id).is_some_and(|f| f == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub service_endpoint: Json,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(
        rename = "@context",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub context: Vec<Json>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_invocation: Vec<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_delegation: Vec<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Json>, D::Error> {
    Ok(match Json::deserialize(deserializer)? {
        Json::Array(values) => values,
        Json::Null => vec![],
        value => vec![value],
    })
}

impl DidDocument {
    /// A document with a single method referenced by every verification relationship.
    pub fn with_method(id: String, method: VerificationMethod) -> Self {
        let format_context = [
            VerificationMethodFormat::JsonWebKey2020,
            VerificationMethodFormat::Multikey,
            VerificationMethodFormat::Ed25519VerificationKey2020,
            VerificationMethodFormat::Ed25519VerificationKey2018,
            VerificationMethodFormat::EcdsaSecp256r1VerificationKey2019,
        ]
        .into_iter()
        .find(|f| f.name() == method.type_)
        .map(|f| f.context());

        let mut document = Self {
            context: std::iter::once(DID_CONTEXT)
                .chain(format_context)
                .map(Json::from)
                .collect(),
            id,
            ..Default::default()
        };
        document.add_method(method);
        document
    }

    /// Add a method and reference it from the authentication and assertion relationships.
    pub fn add_method(&mut self, method: VerificationMethod) {
        let reference = json!(method.id);
        self.authentication.push(reference.clone());
        self.assertion_method.push(reference.clone());
        self.capability_invocation.push(reference.clone());
        self.capability_delegation.push(reference);
        self.verification_method.push(method);
    }

    /// Find a verification method by DID URL or fragment, falling back to the first method when
    /// no id is given. Methods embedded in verification relationships are searched too.
    pub fn find_method(&self, id: Option<&str>) -> Option<VerificationMethod> {
        let embedded = self
            .authentication
            .iter()
            .chain(&self.assertion_method)
            .filter(|value| value.is_object())
            .filter_map(|value| serde_json::from_value::<VerificationMethod>(value.clone()).ok());
        let mut methods = self.verification_method.iter().cloned().chain(embedded);

        match id {
            Some(id) => methods.find(|vm| vm.is(id)),
            None => methods.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_round_trip_the_key() {
        let ed = CryptoKey::generate(KeyAlgorithm::Ed25519);
        for format in [
            VerificationMethodFormat::JsonWebKey2020,
            VerificationMethodFormat::Multikey,
            VerificationMethodFormat::Ed25519VerificationKey2020,
            VerificationMethodFormat::Ed25519VerificationKey2018,
        ] {
            let document = ed.to_did_document(None, None, Some(format)).unwrap();
            assert_eq!(document.verification_method[0].type_, format.name());
            assert_eq!(document.find_method(None).unwrap().to_key().unwrap(), ed);
            assert_eq!(document.context.len(), 2);
        }

        let p256 = CryptoKey::generate(KeyAlgorithm::Secp256r1);
        for format in [
            VerificationMethodFormat::JsonWebKey2020,
            VerificationMethodFormat::Multikey,
            VerificationMethodFormat::EcdsaSecp256r1VerificationKey2019,
        ] {
            let document = p256.to_did_document(None, None, Some(format)).unwrap();
            assert_eq!(document.find_method(None).unwrap().to_key().unwrap(), p256);
        }
    }

    #[test]
    fn unsupported_format_for_key_type() {
        let p256 = CryptoKey::generate(KeyAlgorithm::Secp256r1);
        let err = p256
            .to_did_document(
                None,
                None,
                Some(VerificationMethodFormat::Ed25519VerificationKey2018),
            )
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PUBLIC_KEY_TYPE");
    }

    #[test]
    fn find_by_fragment() {
        let key = CryptoKey::generate(KeyAlgorithm::Ed25519);
        let document = key
            .to_did_document(Some("did:web:example.com"), Some("key-1"), None)
            .unwrap();
        assert_eq!(document.id, "did:web:example.com");
        assert!(document.find_method(Some("key-1")).is_some());
        assert!(document.find_method(Some("#key-1")).is_some());
        assert!(document
            .find_method(Some("did:web:example.com#key-1"))
            .is_some());
        assert!(document.find_method(Some("key-2")).is_none());
    }

    #[test]
    fn parses_string_context() {
        let document: DidDocument = serde_json::from_value(json!({
            "@context": "https://www.w3.org/ns/did/v1",
            "id": "did:web:example.com",
        }))
        .unwrap();
        assert_eq!(document.context, vec![json!(DID_CONTEXT)]);
    }
}
