use std::fmt;

use crate::core::{
    credential_format::ClaimFormatMap,
    object::{TypedParameter, UntypedObject},
};
use anyhow::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use url::Url;

const DID: &str = "did";
const REDIRECT_URI: &str = "redirect_uri";
const X509_SAN_DNS: &str = "x509_san_dns";

/// The algorithms request objects and ID tokens are signed with.
pub const SUPPORTED_SIGNING_ALGORITHMS: [&str; 2] = ["EdDSA", "ES256"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl TypedParameter for ClientId {
    const KEY: &'static str = "client_id";
}

impl TryFrom<Json> for ClientId {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<ClientId> for Json {
    fn from(value: ClientId) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIdScheme {
    Did,
    RedirectUri,
    X509SanDns,
    Other(String),
}

impl TypedParameter for ClientIdScheme {
    const KEY: &'static str = "client_id_scheme";
}

impl From<String> for ClientIdScheme {
    fn from(s: String) -> Self {
        match s.as_str() {
            DID => ClientIdScheme::Did,
            REDIRECT_URI => ClientIdScheme::RedirectUri,
            X509_SAN_DNS => ClientIdScheme::X509SanDns,
            _ => ClientIdScheme::Other(s),
        }
    }
}

impl From<ClientIdScheme> for String {
    fn from(scheme: ClientIdScheme) -> Self {
        match scheme {
            ClientIdScheme::Other(other) => other,
            known => known.to_string(),
        }
    }
}

impl TryFrom<Json> for ClientIdScheme {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
            .map(String::into)
            .map_err(Error::from)
    }
}

impl From<ClientIdScheme> for Json {
    fn from(value: ClientIdScheme) -> Self {
        Json::String(value.into())
    }
}

impl fmt::Display for ClientIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdScheme::Did => DID,
            ClientIdScheme::RedirectUri => REDIRECT_URI,
            ClientIdScheme::X509SanDns => X509_SAN_DNS,
            ClientIdScheme::Other(o) => o,
        }
        .fmt(f)
    }
}

/// `client_metadata` field in the Authorization Request.
#[derive(Debug, Clone)]
pub struct ClientMetadata(pub UntypedObject);

impl ClientMetadata {
    /// Metadata of a DID-identified verifier accepting `vp_formats`.
    pub fn for_verifier(vp_formats: &ClaimFormatMap) -> Result<Self, Error> {
        let metadata = json!({
            "id_token_signing_alg_values_supported": SUPPORTED_SIGNING_ALGORITHMS,
            "request_object_signing_alg_values_supported": SUPPORTED_SIGNING_ALGORITHMS,
            "response_types_supported": [VP_TOKEN, "id_token", VP_TOKEN_ID_TOKEN],
            "scopes_supported": ["openid"],
            "subject_types_supported": ["pairwise"],
            "subject_syntax_types_supported": ["did:jwk", "did:key"],
            "vp_formats": serde_json::to_value(vp_formats)?,
        });
        Ok(Self(metadata.try_into()?))
    }

    pub fn vp_formats(&self) -> Option<Result<ClaimFormatMap, Error>> {
        let value = self.0.get_raw("vp_formats")?.clone();
        Some(serde_json::from_value(value).map_err(Error::from))
    }
}

impl TypedParameter for ClientMetadata {
    const KEY: &'static str = "client_metadata";
}

impl From<ClientMetadata> for Json {
    fn from(cm: ClientMetadata) -> Self {
        cm.0.into()
    }
}

impl TryFrom<Json> for ClientMetadata {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        value.try_into().map(ClientMetadata)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(pub String);

impl Nonce {
    /// A fresh random nonce.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl TypedParameter for Nonce {
    const KEY: &'static str = "nonce";
}

impl TryFrom<Json> for Nonce {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Nonce> for Json {
    fn from(value: Nonce) -> Self {
        Json::String(value.0)
    }
}

/// `wallet_nonce` sent by the wallet when fetching a request object, echoed back inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletNonce(pub String);

impl TypedParameter for WalletNonce {
    const KEY: &'static str = "wallet_nonce";
}

impl TryFrom<Json> for WalletNonce {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<WalletNonce> for Json {
    fn from(value: WalletNonce) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone)]
pub struct Audience(pub String);

impl TypedParameter for Audience {
    const KEY: &'static str = "aud";
}

impl TryFrom<Json> for Audience {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Audience> for Json {
    fn from(value: Audience) -> Json {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope(pub String);

impl TypedParameter for Scope {
    const KEY: &'static str = "scope";
}

impl TryFrom<Json> for Scope {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Scope> for Json {
    fn from(value: Scope) -> Json {
        Json::String(value.0)
    }
}

/// `id_token_type` of SIOP requests, a space separated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTokenType(pub Vec<String>);

impl IdTokenType {
    pub fn attester_and_subject_signed() -> Self {
        Self(vec![
            "attester_signed_id_token".to_owned(),
            "subject_signed_id_token".to_owned(),
        ])
    }
}

impl TypedParameter for IdTokenType {
    const KEY: &'static str = "id_token_type";
}

impl TryFrom<Json> for IdTokenType {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(Self(s.split_whitespace().map(ToOwned::to_owned).collect()))
    }
}

impl From<IdTokenType> for Json {
    fn from(value: IdTokenType) -> Json {
        Json::String(value.0.join(" "))
    }
}

/// `response_uri` field in the Authorization Request.
#[derive(Debug, Clone)]
pub struct ResponseUri(pub Url);

impl TypedParameter for ResponseUri {
    const KEY: &'static str = "response_uri";
}

impl From<ResponseUri> for Json {
    fn from(uri: ResponseUri) -> Self {
        uri.0.to_string().into()
    }
}

impl TryFrom<Json> for ResponseUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(ResponseUri)?)
    }
}

const DIRECT_POST: &str = "direct_post";
const DIRECT_POST_JWT: &str = "direct_post.jwt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResponseMode {
    /// The `direct_post` response mode as defined in OID4VP.
    DirectPost,
    /// The `direct_post.jwt` response mode, which needs response encryption.
    DirectPostJwt,
    /// A ResponseMode that is unsupported by this library.
    Unsupported(String),
}

impl TypedParameter for ResponseMode {
    const KEY: &'static str = "response_mode";
}

impl From<String> for ResponseMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            DIRECT_POST => ResponseMode::DirectPost,
            DIRECT_POST_JWT => ResponseMode::DirectPostJwt,
            _ => ResponseMode::Unsupported(s),
        }
    }
}

impl From<ResponseMode> for String {
    fn from(s: ResponseMode) -> Self {
        match s {
            ResponseMode::DirectPost => DIRECT_POST.into(),
            ResponseMode::DirectPostJwt => DIRECT_POST_JWT.into(),
            ResponseMode::Unsupported(u) => u,
        }
    }
}

impl TryFrom<Json> for ResponseMode {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(s.into())
    }
}

impl From<ResponseMode> for Json {
    fn from(rm: ResponseMode) -> Self {
        String::from(rm).into()
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::DirectPost => DIRECT_POST,
            ResponseMode::DirectPostJwt => DIRECT_POST_JWT,
            ResponseMode::Unsupported(u) => u,
        }
        .fmt(f)
    }
}

impl Default for ResponseMode {
    fn default() -> Self {
        Self::DirectPost
    }
}

const VP_TOKEN: &str = "vp_token";
const VP_TOKEN_ID_TOKEN: &str = "vp_token id_token";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(into = "String", from = "String")]
pub enum ResponseType {
    VpToken,
    /// SIOPv2 combined with OID4VP.
    VpTokenIdToken,
    Unsupported(String),
}

impl From<ResponseType> for String {
    fn from(rt: ResponseType) -> Self {
        match rt {
            ResponseType::VpToken => VP_TOKEN.into(),
            ResponseType::VpTokenIdToken => VP_TOKEN_ID_TOKEN.into(),
            ResponseType::Unsupported(s) => s,
        }
    }
}

impl From<String> for ResponseType {
    fn from(s: String) -> Self {
        match s.as_str() {
            VP_TOKEN => ResponseType::VpToken,
            VP_TOKEN_ID_TOKEN => ResponseType::VpTokenIdToken,
            _ => ResponseType::Unsupported(s),
        }
    }
}

impl TypedParameter for ResponseType {
    const KEY: &'static str = "response_type";
}

impl TryFrom<Json> for ResponseType {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(s.into())
    }
}

impl From<ResponseType> for Json {
    fn from(rt: ResponseType) -> Self {
        Json::String(rt.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State(pub String);

impl State {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl TypedParameter for State {
    const KEY: &'static str = "state";
}

impl TryFrom<Json> for State {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<State> for Json {
    fn from(value: State) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone)]
pub struct PresentationDefinitionUri(pub Url);

impl TypedParameter for PresentationDefinitionUri {
    const KEY: &'static str = "presentation_definition_uri";
}

impl TryFrom<Json> for PresentationDefinitionUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(Self)?)
    }
}

impl From<PresentationDefinitionUri> for Json {
    fn from(value: PresentationDefinitionUri) -> Self {
        value.0.to_string().into()
    }
}
