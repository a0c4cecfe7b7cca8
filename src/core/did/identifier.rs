use anyhow::{bail, Context, Result};
use serde_json::json;
use url::Url;

use crate::core::crypto::{
    CryptoKey, DidDocument, KeyAlgorithm, Service, VerificationMethod, VerificationMethodFormat,
};

/// DID methods a verifier can be identified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DidProvider {
    Web,
    Jwk,
    Key,
}

impl DidProvider {
    pub fn of(did: &str) -> Option<Self> {
        match did.split(':').take(2).collect::<Vec<_>>().as_slice() {
            ["did", "web"] => Some(Self::Web),
            ["did", "jwk"] => Some(Self::Jwk),
            ["did", "key"] => Some(Self::Key),
            _ => None,
        }
    }
}

/// A key controlled by an [Identifier].
#[derive(Debug, Clone)]
pub struct IdentifierKey {
    /// Explicit key reference, used as the DID URL fragment.
    pub kid: Option<String>,
    pub key: CryptoKey,
}

/// The DID a verifier signs requests as, together with its keys.
#[derive(Debug, Clone)]
pub struct Identifier {
    did: String,
    provider: DidProvider,
    alias: Option<String>,
    services: Vec<Service>,
    keys: Vec<IdentifierKey>,
}

impl Identifier {
    /// Create an identifier from a DID and its controller key.
    ///
    /// # Errors
    /// Fails for unsupported DID methods, and for `did:key`/`did:jwk` DIDs that do not encode
    /// `key`.
    pub fn new(did: impl Into<String>, key: CryptoKey, kid: Option<String>) -> Result<Self> {
        let did = did.into();
        let Some(provider) = DidProvider::of(&did) else {
            bail!("unsupported DID method for verifier identifier '{did}'")
        };
        let encoded = match provider {
            DidProvider::Key => Some(CryptoKey::from_did_key(&did)?),
            DidProvider::Jwk => Some(CryptoKey::from_did_jwk(&did)?),
            DidProvider::Web => None,
        };
        if encoded.is_some_and(|encoded| encoded != key) {
            bail!("'{did}' does not encode the provided key")
        }
        Ok(Self {
            did,
            provider,
            alias: None,
            services: vec![],
            keys: vec![IdentifierKey { kid, key }],
        })
    }

    /// Use the `did:key` of `key` as the identifier.
    pub fn from_did_key(key: CryptoKey) -> Self {
        Self {
            did: key.did_key(),
            provider: DidProvider::Key,
            alias: None,
            services: vec![],
            keys: vec![IdentifierKey { kid: None, key }],
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Add another key. Only `did:web` identifiers can hold more than one key.
    pub fn add_key(&mut self, key: CryptoKey, kid: Option<String>) -> Result<()> {
        if self.provider != DidProvider::Web {
            bail!("only did:web identifiers can hold multiple keys")
        }
        self.keys.push(IdentifierKey { kid, key });
        Ok(())
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn provider(&self) -> DidProvider {
        self.provider
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn keys(&self) -> &[IdentifierKey] {
        &self.keys
    }

    /// The key with the given reference, or the first key when no reference is given.
    pub fn key(&self, kid: Option<&str>) -> Result<&IdentifierKey> {
        match kid {
            None => self.keys.first().context("identifier has no keys"),
            Some(kid) => self
                .keys
                .iter()
                .find(|k| self.key_reference(k).ok().as_deref() == Some(kid))
                .context(format!("identifier '{}' has no key '{kid}'", self.did)),
        }
    }

    /// The fragment a key is referenced by: its explicit `kid`, otherwise the `did:key`
    /// identifier for `did:key`, `0` for `did:jwk` and the JWK thumbprint for `did:web`.
    pub fn key_reference(&self, key: &IdentifierKey) -> Result<String> {
        if let Some(kid) = &key.kid {
            return Ok(kid.clone());
        }
        Ok(match self.provider {
            DidProvider::Key => key.key.did_key_identifier(),
            DidProvider::Jwk => "0".to_owned(),
            DidProvider::Web => key.key.thumbprint()?,
        })
    }

    /// The DID URL (`did#keyref`) of a key, used as the `kid` of signed requests.
    pub fn key_url(&self, key: &IdentifierKey) -> Result<String> {
        Ok(format!("{}#{}", self.did, self.key_reference(key)?))
    }

    /// The DID document served for a `did:web` identifier.
    ///
    /// Every key is published as a `JsonWebKey2020` method, Ed25519 keys are also listed under
    /// `keyAgreement`. With an `endpoint`, one `OID4VP` service per key points at it.
    pub fn did_web_document(&self, endpoint: Option<&Url>) -> Result<DidDocument> {
        if self.provider != DidProvider::Web {
            bail!("'{}' is not a did:web identifier", self.did)
        }

        let mut document: Option<DidDocument> = None;
        for key in &self.keys {
            let key_url = self.key_url(key)?;
            let method = VerificationMethod::from_key(
                &key.key,
                key_url.clone(),
                self.did.clone(),
                VerificationMethodFormat::JsonWebKey2020,
            )?;
            let document = match &mut document {
                Some(document) => {
                    document.add_method(method);
                    document
                }
                None => document.insert(DidDocument::with_method(self.did.clone(), method)),
            };
            if key.key.algorithm() == KeyAlgorithm::Ed25519 {
                document.key_agreement.push(json!(key_url));
            }
            if let Some(endpoint) = endpoint {
                document.service.push(Service {
                    id: format!("{}#{}-oid4vp", self.did, self.key_reference(key)?),
                    type_: "OID4VP".to_owned(),
                    service_endpoint: json!(endpoint.as_str()),
                });
            }
        }

        let mut document = document.context("identifier has no keys")?;
        document.service.extend(self.services.iter().cloned());
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_references() {
        let key = CryptoKey::generate(KeyAlgorithm::Secp256r1);

        let did_key = Identifier::from_did_key(key.clone());
        let reference = did_key.key_reference(&did_key.keys()[0]).unwrap();
        assert_eq!(reference, key.did_key_identifier());

        let did_jwk = Identifier::new(key.did_jwk(), key.clone(), None).unwrap();
        assert_eq!(did_jwk.key_url(&did_jwk.keys()[0]).unwrap(), format!("{}#0", key.did_jwk()));

        let did_web = Identifier::new("did:web:example.com", key.clone(), None).unwrap();
        assert_eq!(
            did_web.key_reference(&did_web.keys()[0]).unwrap(),
            key.thumbprint().unwrap()
        );

        let explicit =
            Identifier::new("did:web:example.com", key, Some("signing".to_owned())).unwrap();
        assert_eq!(
            explicit.key_url(&explicit.keys()[0]).unwrap(),
            "did:web:example.com#signing"
        );
        assert!(explicit.key(Some("signing")).is_ok());
        assert!(explicit.key(Some("other")).is_err());
    }

    #[test]
    fn rejects_mismatched_did_key() {
        let key = CryptoKey::generate(KeyAlgorithm::Ed25519);
        let other = CryptoKey::generate(KeyAlgorithm::Ed25519);
        assert!(Identifier::new(other.did_key(), key.clone(), None).is_err());
        assert!(Identifier::new("did:example:123", key, None).is_err());
    }

    #[test]
    fn did_web_document_lists_every_key() {
        let first = CryptoKey::generate(KeyAlgorithm::Ed25519);
        let second = CryptoKey::generate(KeyAlgorithm::Secp256r1);
        let mut identifier =
            Identifier::new("did:web:example.com:v:alpha", first.clone(), None).unwrap();
        identifier
            .add_key(second.clone(), Some("p256".to_owned()))
            .unwrap();

        let endpoint: Url = "https://example.com/v/alpha/".parse().unwrap();
        let document = identifier.did_web_document(Some(&endpoint)).unwrap();
        assert_eq!(document.verification_method.len(), 2);
        assert_eq!(document.assertion_method.len(), 2);
        assert_eq!(document.key_agreement.len(), 1);
        assert_eq!(document.service.len(), 2);
        assert_eq!(document.service[1].id, "did:web:example.com:v:alpha#p256-oid4vp");
        assert_eq!(
            document.service[0].service_endpoint,
            "https://example.com/v/alpha/"
        );
        assert_eq!(
            document
                .find_method(Some("p256"))
                .unwrap()
                .to_key()
                .unwrap(),
            second
        );

        let did_key = Identifier::from_did_key(first);
        assert!(did_key.did_web_document(None).is_err());
    }
}
