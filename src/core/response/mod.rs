use anyhow::{Context, Error, Result};
use serde_json::{Map, Value as Json};

use self::parameters::{IdToken, PresentationSubmission, State, VpToken};

use super::object::{ParsingErrorContext, UntypedObject};

pub mod parameters;

/// A wallet's authorization response, posted to the verifier's response endpoint.
#[derive(Debug, Clone)]
pub struct AuthorizationResponse(UntypedObject, VpToken);

impl AuthorizationResponse {
    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn from_x_www_form_urlencoded(bytes: &[u8]) -> Result<Self> {
        let params: Map<String, Json> = serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
            .context("failed to parse form encoded authorization response")?
            .into_iter()
            .map(|(k, v)| (k, Json::String(v)))
            .collect();
        UntypedObject(params).try_into()
    }

    /// Parse a JSON body.
    pub fn from_json(value: Json) -> Result<Self> {
        UntypedObject::try_from(value)
            .context("authorization response must be a JSON object")?
            .try_into()
    }

    /// Parse a body by its content type, defaulting to form encoding.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let is_json = content_type
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case("application/json"));
        if is_json {
            let value = serde_json::from_slice(body).context("invalid JSON response body")?;
            Self::from_json(value)
        } else {
            Self::from_x_www_form_urlencoded(body)
        }
    }

    pub fn vp_token(&self) -> &VpToken {
        &self.1
    }

    pub fn state(&self) -> Option<State> {
        self.0.get().and_then(Result::ok)
    }

    pub fn id_token(&self) -> Option<Result<IdToken>> {
        self.0.get()
    }

    pub fn presentation_submission(&self) -> Option<Result<PresentationSubmission>> {
        self.0.get()
    }

    pub fn as_query(self) -> Result<String, Error> {
        Ok(serde_urlencoded::to_string(self.0)?)
    }
}

impl TryFrom<UntypedObject> for AuthorizationResponse {
    type Error = Error;

    fn try_from(value: UntypedObject) -> Result<Self, Self::Error> {
        let vp_token = value.get().parsing_error()?;
        Ok(Self(value, vp_token))
    }
}
