#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    io::Write,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use flate2::{write::ZlibEncoder, Compression};
use http::{Request, Response};
use openid4vp_verifier::{
    config::{PresentationRecord, VerifierOptions},
    core::{
        crypto::{CryptoKey, KeyAlgorithm},
        did::Identifier,
        jwt::Jwt,
        util::AsyncHttpClient,
    },
    verifier::{presentations::MemoryPresentationStore, Verifier},
};
use serde_json::{json, Map, Value as Json};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

pub const VERIFIER_DID: &str = "did:web:verifier.example";
pub const STATUS_LIST_URL: &str = "https://issuer.example/statuslists/1";
const VCDM1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
const VCDM2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";

/// Serves fixed bodies by URL and counts the requests it receives.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: BTreeMap<String, String>,
    fetches: AtomicUsize,
}

impl MockHttpClient {
    pub fn with_response(mut self, url: &str, body: String) -> Self {
        self.responses.insert(url.to_owned(), body);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncHttpClient for MockHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let uri = request.uri().to_string();
        match self.responses.get(&uri) {
            Some(body) => Response::builder()
                .status(200)
                .body(body.clone().into_bytes())
                .context("failed to build response"),
            None => Response::builder()
                .status(404)
                .body(vec![])
                .context("failed to build response"),
        }
    }
}

pub fn object(value: Json) -> Map<String, Json> {
    match value {
        Json::Object(map) => map,
        other => panic!("expected an object, found {other}"),
    }
}

pub fn sign(key: &CryptoKey, header: Json, payload: Json) -> String {
    Jwt::new(object(header), object(payload))
        .sign(key, None)
        .unwrap()
}

/// An IETF token status list where the status at every index in `set` is 1.
pub fn status_list_token(issuer: &CryptoKey, set: &[usize]) -> String {
    let mut bits = vec![0u8; 16];
    for index in set {
        bits[index / 8] |= 0x80 >> (index % 8);
    }
    let mut encoder = ZlibEncoder::new(vec![], Compression::default());
    encoder.write_all(&bits).unwrap();
    let lst = BASE64_URL_SAFE_NO_PAD.encode(encoder.finish().unwrap());
    sign(
        issuer,
        json!({"typ": "statuslist+jwt"}),
        json!({
            "sub": STATUS_LIST_URL,
            "iat": Utc::now().timestamp(),
            "status_list": {"bits": 1, "lst": lst}
        }),
    )
}

/// A VCDM 2.0 credential issued to `holder`, with `extra` claims added to the JWT payload.
pub fn vcdm2_credential(issuer: &CryptoKey, holder: &str, subject: Json, extra: Json) -> String {
    let mut credential_subject = object(subject);
    credential_subject.insert("id".into(), holder.into());
    let mut payload = object(json!({
        "@context": [VCDM2_CONTEXT],
        "type": ["VerifiableCredential", "EmployeeCredential"],
        "issuer": issuer.did_key(),
        "credentialSubject": credential_subject,
        "iss": issuer.did_key(),
        "sub": holder,
        "iat": Utc::now().timestamp() - 60,
    }));
    payload.extend(object(extra));
    sign(issuer, json!({"typ": "vc+jwt"}), Json::Object(payload))
}

/// A VCDM 1.1 credential issued to `holder`, with the credential under the `vc` claim.
pub fn vcdm1_credential(issuer: &CryptoKey, holder: &str, subject: Json, extra: Json) -> String {
    let mut credential_subject = object(subject);
    credential_subject.insert("id".into(), holder.into());
    let mut payload = object(json!({
        "iss": issuer.did_key(),
        "sub": holder,
        "nbf": Utc::now().timestamp() - 60,
        "vc": {
            "@context": [VCDM1_CONTEXT],
            "type": ["VerifiableCredential", "EmployeeCredential"],
            "issuer": {"id": issuer.did_key(), "name": "Example Issuer"},
            "issuanceDate": "2024-01-01T00:00:00Z",
            "credentialSubject": credential_subject
        }
    }));
    payload.extend(object(extra));
    sign(issuer, json!({"typ": "JWT"}), Json::Object(payload))
}

/// A JWT VP of `holder` wrapping `credentials`, bound to `aud` and `nonce`.
pub fn presentation(holder: &CryptoKey, credentials: &[String], aud: &str, nonce: &str) -> String {
    sign(
        holder,
        json!({"typ": "JWT"}),
        json!({
            "iss": holder.did_key(),
            "aud": aud,
            "nonce": nonce,
            "iat": Utc::now().timestamp(),
            "vp": {
                "@context": [VCDM2_CONTEXT],
                "type": ["VerifiablePresentation"],
                "holder": holder.did_key(),
                "verifiableCredential": credentials
            }
        }),
    )
}

/// An SD-JWT where every entry of `disclosed` is an object property disclosure. The returned
/// token ends with `~` and carries no key binding.
pub fn sd_jwt(issuer: &CryptoKey, holder: &CryptoKey, disclosed: Json) -> String {
    let mut digests = vec![];
    let mut disclosures = vec![];
    for (i, (name, value)) in object(disclosed).into_iter().enumerate() {
        let encoded =
            BASE64_URL_SAFE_NO_PAD.encode(json!([format!("salt-{i}"), name, value]).to_string());
        digests.push(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(encoded.as_bytes())));
        disclosures.push(encoded);
    }
    let jwt = sign(
        issuer,
        json!({"typ": "dc+sd-jwt"}),
        json!({
            "iss": issuer.did_key(),
            "vct": "https://credentials.example/employee",
            "iat": Utc::now().timestamp() - 60,
            "cnf": {"jwk": holder.to_jwk()},
            "_sd_alg": "sha-256",
            "_sd": digests,
            "department": "engineering"
        }),
    );
    format!("{jwt}~{}~", disclosures.join("~"))
}

/// Append a key binding JWT to `presented`, binding it to `sd_hash`.
pub fn with_key_binding(
    holder: &CryptoKey,
    presented: &str,
    aud: &str,
    nonce: &str,
    sd_hash: &str,
) -> String {
    let kb = sign(
        holder,
        json!({"typ": "kb+jwt"}),
        json!({
            "aud": aud,
            "nonce": nonce,
            "iat": Utc::now().timestamp(),
            "sd_hash": sd_hash
        }),
    );
    format!("{presented}{kb}")
}

pub fn sd_hash(presented: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(presented.as_bytes()))
}

/// Log to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A verifier for [VERIFIER_DID] that serves every record in `presentations`.
pub fn verifier(presentations: Vec<PresentationRecord>, http_client: Arc<MockHttpClient>) -> Verifier {
    init_tracing();
    let key = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let identifier = Identifier::new(VERIFIER_DID, key, None).unwrap();
    let options = presentations
        .iter()
        .fold(VerifierOptions::new("alpha", VERIFIER_DID), |options, record| {
            options.with_presentation(record.id.clone())
        });
    Verifier::builder()
        .with_options(options)
        .with_base_url("https://verifier.example".parse().unwrap())
        .with_identifier(identifier)
        .with_presentation_store(Arc::new(MemoryPresentationStore::new(presentations)))
        .with_http_client(http_client)
        .build()
        .unwrap()
}

/// What a wallet learns from the signed request object.
pub struct WalletRequest {
    pub state: String,
    pub nonce: String,
    pub client_id: String,
    pub payload: Map<String, Json>,
}

/// Create an offer and retrieve its request object, the way a wallet would.
pub async fn start_exchange(verifier: &Verifier, presentation_id: &str) -> WalletRequest {
    let offer = verifier.create_offer(presentation_id).await.unwrap();
    let token = verifier
        .retrieve_authorization_request(&offer.state, None)
        .await
        .unwrap();
    let jwt = Jwt::decode(&token).unwrap();
    assert_eq!(jwt.claim_str("state"), Some(offer.state.as_str()));
    WalletRequest {
        state: offer.state,
        nonce: jwt.claim_str("nonce").unwrap().to_owned(),
        client_id: jwt.claim_str("client_id").unwrap().to_owned(),
        payload: jwt.payload.clone(),
    }
}
