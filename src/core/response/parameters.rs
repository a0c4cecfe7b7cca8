pub use crate::core::authorization_request::parameters::State;
use crate::core::object::TypedParameter;
use crate::core::presentation_submission::PresentationSubmission as PresentationSubmissionParsed;

use anyhow::{bail, Error};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdToken(pub String);

impl TypedParameter for IdToken {
    const KEY: &'static str = "id_token";
}

impl TryFrom<Json> for IdToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map(Self).map_err(Into::into)
    }
}

impl From<IdToken> for Json {
    fn from(value: IdToken) -> Self {
        value.0.into()
    }
}

/// The `vp_token` response parameter.
///
/// For DCQL requests it is an object from credential query id to presentations. For
/// Presentation Exchange requests it is a single presentation or an array of them.
#[derive(Debug, Clone, PartialEq)]
pub enum VpToken {
    Single(String),
    Many(Vec<Json>),
    ByQueryId(serde_json::Map<String, Json>),
}

impl VpToken {
    /// The token in its JSON form.
    pub fn as_json(&self) -> Json {
        self.clone().into()
    }
}

impl TypedParameter for VpToken {
    const KEY: &'static str = "vp_token";
}

impl TryFrom<Json> for VpToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            // Form encoded bodies carry objects and arrays as JSON strings.
            Json::String(s) if s.trim_start().starts_with(['{', '[']) => {
                Self::try_from(serde_json::from_str::<Json>(&s)?)
            }
            Json::String(s) => Ok(Self::Single(s)),
            Json::Array(values) => Ok(Self::Many(values)),
            Json::Object(map) => Ok(Self::ByQueryId(map)),
            _ => bail!("vp_token must be a string, an array or an object"),
        }
    }
}

impl From<VpToken> for Json {
    fn from(value: VpToken) -> Self {
        match value {
            VpToken::Single(s) => Json::String(s),
            VpToken::Many(values) => Json::Array(values),
            VpToken::ByQueryId(map) => Json::Object(map),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PresentationSubmission {
    raw: Json,
    parsed: PresentationSubmissionParsed,
}

impl PresentationSubmission {
    pub fn into_parsed(self) -> PresentationSubmissionParsed {
        self.parsed
    }

    pub fn parsed(&self) -> &PresentationSubmissionParsed {
        &self.parsed
    }
}

impl TypedParameter for PresentationSubmission {
    const KEY: &'static str = "presentation_submission";
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        let raw = match raw {
            Json::String(s) => serde_json::from_str(&s)?,
            raw => raw,
        };
        let parsed = serde_json::from_value(raw.clone())?;
        Ok(Self { raw, parsed })
    }
}

impl From<PresentationSubmission> for Json {
    fn from(value: PresentationSubmission) -> Self {
        value.raw
    }
}
