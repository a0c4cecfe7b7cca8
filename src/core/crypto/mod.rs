//! Key material for the supported signature families.
//!
//! A [CryptoKey] wraps the raw bytes of an Ed25519 or P-256 key pair and exposes signing,
//! verification and the identifier encodings (`did:key`, `did:jwk`, JWK) used throughout the
//! verifier. Public keys are held in their compact form: 32 bytes for Ed25519 and the 33 byte
//! compressed SEC1 point for P-256.

use std::fmt;

use base64::prelude::*;
use serde_json::Value as Json;

mod did_document;
mod ed25519;
mod jwk;
mod secp256r1;

pub use did_document::{DidDocument, Service, VerificationMethod, VerificationMethodFormat};
pub use jwk::jwk_thumbprint;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("algorithm '{algorithm}' is not supported by {key_type} keys")]
    UnsupportedAlgorithm {
        algorithm: String,
        key_type: KeyAlgorithm,
    },
    #[error("unsupported public key representation: {0}")]
    UnsupportedPublicKeyType(String),
    #[error("invalid DID '{0}'")]
    InvalidDid(String),
    #[error("{0} key has no private key material")]
    MissingPrivateKey(KeyAlgorithm),
}

impl KeyError {
    pub fn code(&self) -> &'static str {
        match self {
            KeyError::InvalidKeyMaterial(_) => "INVALID_KEY_MATERIAL",
            KeyError::UnsupportedAlgorithm { .. } => "UNSUPPORTED_ALGORITHM",
            KeyError::UnsupportedPublicKeyType(_) => "UNSUPPORTED_PUBLIC_KEY_TYPE",
            KeyError::InvalidDid(_) => "INVALID_DID",
            KeyError::MissingPrivateKey(_) => "MISSING_PRIVATE_KEY",
        }
    }
}

/// The key families a [CryptoKey] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Ed25519,
    Secp256r1,
}

impl KeyAlgorithm {
    pub const ALL: [KeyAlgorithm; 2] = [KeyAlgorithm::Ed25519, KeyAlgorithm::Secp256r1];

    /// Multicodec code of the public key.
    pub const fn codec(&self) -> u64 {
        match self {
            KeyAlgorithm::Ed25519 => 0xed,
            KeyAlgorithm::Secp256r1 => 0x1200,
        }
    }

    /// Varint encoding of [KeyAlgorithm::codec].
    pub const fn multicodec_prefix(&self) -> &'static [u8] {
        match self {
            KeyAlgorithm::Ed25519 => &[0xed, 0x01],
            KeyAlgorithm::Secp256r1 => &[0x80, 0x24],
        }
    }

    /// The prefix every base58btc multibase identifier of this key type starts with.
    pub const fn did_key_prefix(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "z6Mk",
            KeyAlgorithm::Secp256r1 => "zDn",
        }
    }

    /// JOSE `alg` values accepted for this key type. The first entry is the default.
    pub const fn signature_algorithms(&self) -> &'static [&'static str] {
        match self {
            KeyAlgorithm::Ed25519 => &["EdDSA", "Ed25519"],
            KeyAlgorithm::Secp256r1 => &["ES256"],
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "Ed25519",
            KeyAlgorithm::Secp256r1 => "Secp256r1",
        }
    }

    /// Detect the key type from multicodec-prefixed bytes, returning the remaining key bytes.
    fn split_multicodec(bytes: &[u8]) -> Option<(Self, &[u8])> {
        Self::ALL.into_iter().find_map(|algorithm| {
            bytes
                .strip_prefix(algorithm.multicodec_prefix())
                .map(|rest| (algorithm, rest))
        })
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A public key, optionally accompanied by its private key.
#[derive(Clone)]
pub struct CryptoKey {
    algorithm: KeyAlgorithm,
    private_key: Option<Vec<u8>>,
    public_key: Vec<u8>,
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoKey")
            .field("algorithm", &self.algorithm)
            .field("public_key", &self.public_key_hex())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

impl PartialEq for CryptoKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.public_key == other.public_key
    }
}

impl Eq for CryptoKey {}

impl CryptoKey {
    /// Generate a fresh key pair.
    pub fn generate(algorithm: KeyAlgorithm) -> Self {
        let (private_key, public_key) = match algorithm {
            KeyAlgorithm::Ed25519 => ed25519::generate(),
            KeyAlgorithm::Secp256r1 => secp256r1::generate(),
        };
        Self {
            algorithm,
            private_key: Some(private_key),
            public_key,
        }
    }

    /// Import a private key, deriving the public key from it.
    pub fn import_private(algorithm: KeyAlgorithm, private_key: &[u8]) -> Result<Self, KeyError> {
        let (private_key, public_key) = match algorithm {
            KeyAlgorithm::Ed25519 => ed25519::from_private(private_key)?,
            KeyAlgorithm::Secp256r1 => secp256r1::from_private(private_key)?,
        };
        Ok(Self {
            algorithm,
            private_key: Some(private_key),
            public_key,
        })
    }

    pub fn import_private_hex(algorithm: KeyAlgorithm, private_key: &str) -> Result<Self, KeyError> {
        Self::import_private(algorithm, &hex_to_bytes(private_key)?)
    }

    /// Construct a verify-only key from public key bytes.
    ///
    /// P-256 keys may be given compressed or uncompressed; they are stored compressed.
    pub fn from_public(algorithm: KeyAlgorithm, public_key: &[u8]) -> Result<Self, KeyError> {
        Ok(Self {
            algorithm,
            private_key: None,
            public_key: normalize_public(algorithm, public_key)?,
        })
    }

    pub fn from_public_hex(algorithm: KeyAlgorithm, public_key: &str) -> Result<Self, KeyError> {
        Self::from_public(algorithm, &hex_to_bytes(public_key)?)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn key_type(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn algorithms(&self) -> &'static [&'static str] {
        self.algorithm.signature_algorithms()
    }

    pub fn default_algorithm(&self) -> &'static str {
        // Every key type lists at least one algorithm.
        self.algorithms().first().copied().unwrap_or_default()
    }

    pub fn supports(&self, algorithm: &str) -> bool {
        self.algorithms().contains(&algorithm)
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        bytes_to_hex(&self.public_key)
    }

    /// Replace the public key.
    ///
    /// # Errors
    /// Fails when the bytes are not a valid public key, or when they do not belong to the private
    /// key this instance holds.
    pub fn set_public_key(&mut self, public_key: &[u8]) -> Result<(), KeyError> {
        let public_key = normalize_public(self.algorithm, public_key)?;
        if self.has_private_key() && public_key != self.public_key {
            return Err(KeyError::InvalidKeyMaterial(
                "public key does not match the private key".into(),
            ));
        }
        self.public_key = public_key;
        Ok(())
    }

    pub fn set_public_key_hex(&mut self, public_key: &str) -> Result<(), KeyError> {
        self.set_public_key(&hex_to_bytes(public_key)?)
    }

    /// Hex encoding of the private key, if present.
    pub fn export_private_key(&self) -> Option<String> {
        self.private_key.as_deref().map(bytes_to_hex)
    }

    /// Sign `message`, returning the raw signature bytes.
    ///
    /// P-256 signatures use the fixed size `r || s` encoding required by JWS.
    pub fn sign_raw(&self, algorithm: &str, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.check_algorithm(algorithm)?;
        let Some(private_key) = &self.private_key else {
            return Err(KeyError::MissingPrivateKey(self.algorithm));
        };
        match self.algorithm {
            KeyAlgorithm::Ed25519 => ed25519::sign(private_key, message),
            KeyAlgorithm::Secp256r1 => secp256r1::sign(private_key, message),
        }
    }

    /// Sign `message`, returning the base64url encoded signature.
    pub fn sign(&self, algorithm: &str, message: &[u8]) -> Result<String, KeyError> {
        self.sign_raw(algorithm, message)
            .map(|signature| BASE64_URL_SAFE_NO_PAD.encode(signature))
    }

    /// Verify a raw signature. Any malformed input yields `false`.
    pub fn verify(&self, algorithm: &str, signature: &[u8], message: &[u8]) -> bool {
        if !self.supports(algorithm) {
            return false;
        }
        match self.algorithm {
            KeyAlgorithm::Ed25519 => ed25519::verify(&self.public_key, signature, message),
            KeyAlgorithm::Secp256r1 => secp256r1::verify(&self.public_key, signature, message),
        }
    }

    /// Verify a base64url encoded signature, as produced by [CryptoKey::sign].
    pub fn verify_encoded(&self, algorithm: &str, signature: &str, message: &[u8]) -> bool {
        BASE64_URL_SAFE_NO_PAD
            .decode(signature.trim_end_matches('='))
            .is_ok_and(|signature| self.verify(algorithm, &signature, message))
    }

    fn check_algorithm(&self, algorithm: &str) -> Result<(), KeyError> {
        if self.supports(algorithm) {
            Ok(())
        } else {
            Err(KeyError::UnsupportedAlgorithm {
                algorithm: algorithm.to_owned(),
                key_type: self.algorithm,
            })
        }
    }

    /// The multibase (base58btc) encoding of the multicodec-prefixed public key.
    pub fn did_key_identifier(&self) -> String {
        let bytes = [self.algorithm.multicodec_prefix(), &self.public_key].concat();
        multibase::encode(multibase::Base::Base58Btc, bytes)
    }

    pub fn did_key(&self) -> String {
        format!("did:key:{}", self.did_key_identifier())
    }

    /// The `did:key` DID URL of the (only) verification method of this key.
    pub fn did_key_url(&self) -> String {
        let id = self.did_key_identifier();
        format!("did:key:{id}#{id}")
    }

    /// Parse a `did:key` DID or DID URL, detecting the key type from its prefix.
    pub fn from_did_key(did: &str) -> Result<Self, KeyError> {
        let identifier = did_key_identifier(did)?;
        let Some(algorithm) = KeyAlgorithm::ALL
            .into_iter()
            .find(|a| identifier.starts_with(a.did_key_prefix()))
        else {
            return Err(KeyError::InvalidDid(did.to_owned()));
        };
        Self::from_did_key_as(algorithm, did)
    }

    /// Parse a `did:key` DID or DID URL that must hold a key of the given type.
    pub fn from_did_key_as(algorithm: KeyAlgorithm, did: &str) -> Result<Self, KeyError> {
        let identifier = did_key_identifier(did)?;
        if !identifier.starts_with(algorithm.did_key_prefix()) {
            return Err(KeyError::InvalidDid(did.to_owned()));
        }
        let (base, bytes) =
            multibase::decode(identifier).map_err(|_| KeyError::InvalidDid(did.to_owned()))?;
        if base != multibase::Base::Base58Btc {
            return Err(KeyError::InvalidDid(did.to_owned()));
        }
        match KeyAlgorithm::split_multicodec(&bytes) {
            Some((found, key)) if found == algorithm => Self::from_public(algorithm, key),
            _ => Err(KeyError::InvalidDid(did.to_owned())),
        }
    }

    /// Decode multicodec-prefixed multibase public key material.
    pub fn from_multibase(value: &str) -> Result<Self, KeyError> {
        let (_, bytes) = multibase::decode(value)
            .map_err(|e| KeyError::InvalidKeyMaterial(format!("invalid multibase value: {e}")))?;
        let Some((algorithm, key)) = KeyAlgorithm::split_multicodec(&bytes) else {
            return Err(KeyError::UnsupportedPublicKeyType(
                "unknown multicodec prefix".into(),
            ));
        };
        Self::from_public(algorithm, key)
    }

    /// The public key as a JWK object.
    pub fn to_jwk(&self) -> Json {
        jwk::to_jwk(self.algorithm, &self.public_key)
    }

    pub fn from_jwk(jwk: &Json) -> Result<Self, KeyError> {
        let (algorithm, public_key) = jwk::from_jwk(jwk)?;
        Self::from_public(algorithm, &public_key)
    }

    /// RFC 7638 thumbprint of [CryptoKey::to_jwk].
    pub fn thumbprint(&self) -> Result<String, KeyError> {
        jwk_thumbprint(&self.to_jwk())
    }

    pub fn did_jwk(&self) -> String {
        // Serializing a JSON value cannot fail.
        let jwk = serde_json::to_vec(&self.to_jwk()).unwrap_or_default();
        format!("did:jwk:{}", BASE64_URL_SAFE_NO_PAD.encode(jwk))
    }

    /// Parse a `did:jwk` DID or DID URL.
    pub fn from_did_jwk(did: &str) -> Result<Self, KeyError> {
        let encoded = did
            .strip_prefix("did:jwk:")
            .map(|rest| rest.split('#').next().unwrap_or(rest))
            .ok_or_else(|| KeyError::InvalidDid(did.to_owned()))?;
        let jwk: Json = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| KeyError::InvalidDid(did.to_owned()))?;
        Self::from_jwk(&jwk)
    }

    /// Build a DID document whose single verification method is this key.
    ///
    /// The DID is the `did:key` of the key, unless one is given. The format defaults to
    /// `JsonWebKey2020`.
    pub fn to_did_document(
        &self,
        did: Option<&str>,
        key_id: Option<&str>,
        format: Option<VerificationMethodFormat>,
    ) -> Result<DidDocument, KeyError> {
        let did = did.map(ToOwned::to_owned).unwrap_or_else(|| self.did_key());
        let key_id = key_id
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.did_key_identifier());
        let method = VerificationMethod::from_key(
            self,
            format!("{did}#{key_id}"),
            did.clone(),
            format.unwrap_or(VerificationMethodFormat::JsonWebKey2020),
        )?;
        Ok(DidDocument::with_method(did, method))
    }
}

fn normalize_public(algorithm: KeyAlgorithm, public_key: &[u8]) -> Result<Vec<u8>, KeyError> {
    match algorithm {
        KeyAlgorithm::Ed25519 => ed25519::normalize_public(public_key),
        KeyAlgorithm::Secp256r1 => secp256r1::normalize_public(public_key),
    }
}

fn did_key_identifier(did: &str) -> Result<&str, KeyError> {
    did.strip_prefix("did:key:")
        .and_then(|rest| rest.split('#').next())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| KeyError::InvalidDid(did.to_owned()))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex, tolerating a `0x` prefix and an odd number of digits.
pub fn hex_to_bytes(value: &str) -> Result<Vec<u8>, KeyError> {
    let value = value.trim();
    let value = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let padded;
    let value = if value.len() % 2 == 1 {
        padded = format!("0{value}");
        padded.as_str()
    } else {
        value
    };
    hex::decode(value).map_err(|e| KeyError::InvalidKeyMaterial(format!("invalid hex: {e}")))
}
