use std::fmt::Debug;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::core::{crypto::CryptoKey, did::Identifier, jwt::Jwt};

#[async_trait]
pub trait RequestSigner: Debug {
    /// The algorithm that will be used to sign.
    fn alg(&self) -> &str;
    /// The DID URL of the signing key, used as the `kid` header.
    fn kid(&self) -> &str;
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Signs with a [CryptoKey] held in memory.
#[derive(Debug, Clone)]
pub struct KeySigner {
    key: CryptoKey,
    kid: String,
    alg: &'static str,
}

impl KeySigner {
    pub fn new(key: CryptoKey, kid: String) -> Result<Self> {
        if !key.has_private_key() {
            bail!("signing key '{kid}' has no private key")
        }
        Ok(Self {
            alg: key.default_algorithm(),
            key,
            kid,
        })
    }

    /// Sign with a key of `identifier`, the first one when `kid` is not given.
    pub fn from_identifier(identifier: &Identifier, kid: Option<&str>) -> Result<Self> {
        let key = identifier.key(kid)?;
        Self::new(key.key.clone(), identifier.key_url(key)?)
    }
}

#[async_trait]
impl RequestSigner for KeySigner {
    fn alg(&self) -> &str {
        self.alg
    }

    fn kid(&self) -> &str {
        &self.kid
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.key
            .sign_raw(self.alg, payload)
            .context("unable to sign request")
    }
}

/// Sign `body` as a compact JWT of type `typ`.
pub async fn make_jwt<S: RequestSigner + ?Sized, T: Serialize + Sync>(
    typ: &str,
    body: &T,
    signer: &S,
) -> Result<String> {
    let Json::Object(payload) = serde_json::to_value(body)? else {
        bail!("JWT body must serialize to a JSON object")
    };
    let header = Map::from_iter([
        ("alg".to_owned(), Json::from(signer.alg())),
        ("kid".to_owned(), Json::from(signer.kid())),
        ("typ".to_owned(), Json::from(typ)),
    ]);
    let mut jwt = Jwt::new(header, payload);
    let input = jwt.encode_parts()?;
    let signature = signer.sign(input.as_bytes()).await?;
    jwt.set_signature(&signature);
    Ok(jwt.token())
}
