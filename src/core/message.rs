//! Diagnostic messages accumulated while verifying a presentation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Message codes reported in verification results.
pub mod codes {
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const INVALID_JWT: &str = "INVALID_JWT";
    pub const JWT_VERIFIED: &str = "JWT_VERIFIED";
    pub const JWT_UNVERIFIED: &str = "JWT_UNVERIFIED";
    pub const INVALID_PRESENTATION: &str = "INVALID_PRESENTATION";
    pub const INVALID_ID_TOKEN: &str = "INVALID_ID_TOKEN";
    pub const INVALID_SUBMISSION: &str = "INVALID_SUBMISSION";
    pub const MISSING_CREDENTIAL: &str = "MISSING_CREDENTIAL";
    pub const UNSUPPORTED_FORMAT: &str = "UNSUPPORTED_FORMAT";
    pub const NBF_ERROR: &str = "NBF_ERROR";
    pub const IAT_ERROR: &str = "IAT_ERROR";
    pub const EXP_ERROR: &str = "EXP_ERROR";
    pub const VC_ERROR: &str = "VC_ERROR";
    pub const VCDM1_1: &str = "VCDM1.1";
    pub const VCDM2_0: &str = "VCDM2.0";
    pub const INVALID_SDJWT: &str = "INVALID_SDJWT";
    pub const MISSING_KB: &str = "MISSING_KB";
    pub const INVALID_KB: &str = "INVALID_KB";
    pub const NO_STATUS_LIST: &str = "NO_STATUS_LIST";
    pub const STATUS_LIST_VALID: &str = "STATUS_LIST_VALID";
    pub const STATUS_LIST_REVOKED: &str = "STATUS_LIST_REVOKED";
    pub const STATUS_LIST_SUSPENDED: &str = "STATUS_LIST_SUSPENDED";
    pub const STATUS_LIST_MESSAGE: &str = "STATUS_LIST_MESSAGE";
    pub const STATUS_LIST_INVALID: &str = "STATUS_LIST_INVALID";
}

/// A coded message with optional structured context (`credentialId`, `expected`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub context: Map<String, Json>,
}

impl Message {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
            context: Map::new(),
        }
    }

    /// Attach a context field.
    pub fn with(mut self, key: &str, value: impl Into<Json>) -> Self {
        self.context.insert(key.to_owned(), value.into());
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

pub fn contains_code(messages: &[Message], code: &str) -> bool {
    messages.iter().any(|m| m.is(code))
}
