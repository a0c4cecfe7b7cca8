//! Resolution of DIDs and DID URLs into verification keys.

use std::{fmt::Debug, sync::Arc};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::core::{
    crypto::{CryptoKey, DidDocument},
    util::{get_body, AsyncHttpClient},
};

mod identifier;

pub use identifier::{DidProvider, Identifier, IdentifierKey};

/// Resolves a DID, or a DID URL with a `#fragment`, into a key that can verify signatures.
#[async_trait]
pub trait DidResolver: Debug {
    /// ## Returns
    /// `None` when the DID method is not supported or the document has no usable key.
    async fn resolve(&self, did_or_kid: &str) -> Result<Option<CryptoKey>>;
}

/// Split a DID URL into the DID and its fragment (without the `#`).
pub fn split_fragment(did_url: &str) -> (&str, Option<&str>) {
    match did_url.split_once('#') {
        Some((did, fragment)) => (did, Some(fragment).filter(|f| !f.is_empty())),
        None => (did_url, None),
    }
}

/// Resolver for `did:key`, `did:jwk` and, when an HTTP client is configured, `did:web`.
#[derive(Debug, Clone, Default)]
pub struct KeyMaterialResolver {
    http_client: Option<Arc<dyn AsyncHttpClient + Send + Sync>>,
}

impl KeyMaterialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn AsyncHttpClient + Send + Sync>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    async fn resolve_did_web(&self, did: &str, fragment: Option<&str>) -> Result<Option<CryptoKey>> {
        let Some(http_client) = &self.http_client else {
            debug!("no http client configured, unable to resolve {did}");
            return Ok(None);
        };

        let url = did_web_url(did)?;
        let body = get_body(
            http_client.as_ref(),
            url.as_str(),
            "application/did+json, application/json",
        )
        .await
        .context(format!("failed to fetch DID document of '{did}'"))?;

        let document: DidDocument = serde_json::from_slice(&body)
            .context(format!("failed to parse DID document from '{url}'"))?;

        let Some(method) = document.find_method(fragment) else {
            debug!("no verification method {fragment:?} in DID document of {did}");
            return Ok(None);
        };

        method.to_key().map(Some).map_err(Into::into)
    }
}

#[async_trait]
impl DidResolver for KeyMaterialResolver {
    async fn resolve(&self, did_or_kid: &str) -> Result<Option<CryptoKey>> {
        let (did, fragment) = split_fragment(did_or_kid.trim());
        match DidProvider::of(did) {
            Some(DidProvider::Key) => Ok(Some(CryptoKey::from_did_key(did)?)),
            Some(DidProvider::Jwk) => Ok(Some(CryptoKey::from_did_jwk(did)?)),
            Some(DidProvider::Web) => self.resolve_did_web(did, fragment).await,
            None => {
                debug!("unsupported DID method: {did}");
                Ok(None)
            }
        }
    }
}

/// The HTTPS location of the DID document of a `did:web` DID.
pub fn did_web_url(did: &str) -> Result<Url> {
    let Some(rest) = did.strip_prefix("did:web:") else {
        bail!("'{did}' is not a did:web DID")
    };
    let mut segments = rest.split(':');
    let domain = segments
        .next()
        .filter(|d| !d.is_empty())
        .context(format!("'{did}' has no domain"))?
        .replace("%3A", ":")
        .replace("%3a", ":");
    let path: Vec<&str> = segments.collect();

    let mut url: Url = format!("https://{domain}/")
        .parse()
        .context(format!("invalid did:web domain in '{did}'"))?;
    {
        let Ok(mut url_path) = url.path_segments_mut() else {
            bail!("invalid did:web URL for '{did}'")
        };
        url_path.pop_if_empty();
        if path.is_empty() {
            url_path.push(".well-known");
        } else {
            url_path.extend(path);
        }
        url_path.push("did.json");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::KeyAlgorithm;

    #[test]
    fn did_web_locations() {
        assert_eq!(
            did_web_url("did:web:example.com").unwrap().as_str(),
            "https://example.com/.well-known/did.json"
        );
        assert_eq!(
            did_web_url("did:web:example.com:verifiers:alpha")
                .unwrap()
                .as_str(),
            "https://example.com/verifiers/alpha/did.json"
        );
        assert_eq!(
            did_web_url("did:web:localhost%3A8080").unwrap().as_str(),
            "https://localhost:8080/.well-known/did.json"
        );
        assert!(did_web_url("did:key:z6Mk").is_err());
    }

    #[tokio::test]
    async fn resolves_local_methods() {
        let resolver = KeyMaterialResolver::new();
        let key = CryptoKey::generate(KeyAlgorithm::Ed25519);

        let resolved = resolver.resolve(&key.did_key_url()).await.unwrap();
        assert_eq!(resolved, Some(key.clone()));

        let resolved = resolver
            .resolve(&format!("{}#0", key.did_jwk()))
            .await
            .unwrap();
        assert_eq!(resolved, Some(key));

        assert_eq!(resolver.resolve("did:example:123").await.unwrap(), None);
        assert_eq!(resolver.resolve("did:web:example.com").await.unwrap(), None);
    }
}
