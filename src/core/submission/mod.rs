//! Validation of a whole `vp_token` against the query that was sent to the wallet.
//!
//! Both validators collect every diagnostic instead of stopping at the first failure: each
//! presented token is verified on its own and its messages are merged into the result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    credential::{CredentialExtractor, ExtractedCredential, VerificationContext},
    credential_format::{ClaimFormatDesignation, FormatFamily},
    message::{codes, Message},
};

mod dcql;
mod pex;

pub use dcql::DcqlSubmission;
pub use pex::PexSubmission;

/// Extracted credentials grouped by credential query or input descriptor id, with the messages
/// raised while validating them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub credentials: BTreeMap<String, Vec<ExtractedCredential>>,
    pub messages: Vec<Message>,
}

impl SubmissionResult {
    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn add_credentials(&mut self, id: &str, credentials: Vec<ExtractedCredential>) {
        self.credentials
            .entry(id.to_owned())
            .or_default()
            .extend(credentials);
    }
}

/// Tag messages with the query id they were raised for, keeping any tag already present.
fn tag(mut messages: Vec<Message>, key: &str, id: &str) -> Vec<Message> {
    for message in &mut messages {
        message
            .context
            .entry(key)
            .or_insert_with(|| id.into());
    }
    messages
}

/// Verify one presented token of the given format.
async fn extract_token(
    extractor: &CredentialExtractor,
    format: &ClaimFormatDesignation,
    token: &str,
    context: &VerificationContext,
) -> (Vec<ExtractedCredential>, Vec<Message>) {
    match format.family() {
        Some(FormatFamily::Vcdm) => extractor.extract_presentation(token, context).await,
        Some(FormatFamily::SdJwt) => {
            let extraction = extractor.extract_sd_jwt(token, context).await;
            (
                extraction.credential.into_iter().collect(),
                extraction.messages,
            )
        }
        None => (
            vec![],
            vec![Message::new(
                codes::UNSUPPORTED_FORMAT,
                format!("credential format '{format}' is not supported"),
            )
            .with("format", format.name())],
        ),
    }
}
