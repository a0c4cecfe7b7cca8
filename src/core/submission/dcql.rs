use serde_json::Value as Json;
use tracing::debug;

use super::{extract_token, tag, SubmissionResult};
use crate::core::{
    credential::{CredentialExtractor, VerificationContext},
    dcql_query::DcqlQuery,
    message::{codes, Message},
    response::parameters::VpToken,
};

const CREDENTIAL_ID: &str = "credentialId";

/// Validates a `vp_token` answering a [DcqlQuery]: an object from credential query id to the
/// presentations for that query.
#[derive(Debug, Clone, Copy)]
pub struct DcqlSubmission<'a> {
    query: &'a DcqlQuery,
    extractor: &'a CredentialExtractor,
    context: &'a VerificationContext,
}

impl<'a> DcqlSubmission<'a> {
    pub fn new(
        query: &'a DcqlQuery,
        extractor: &'a CredentialExtractor,
        context: &'a VerificationContext,
    ) -> Self {
        Self {
            query,
            extractor,
            context,
        }
    }

    pub async fn validate(&self, vp_token: &VpToken) -> SubmissionResult {
        let mut result = SubmissionResult::default();
        let VpToken::ByQueryId(presentations) = vp_token else {
            result.push(Message::new(
                codes::INVALID_PRESENTATION,
                "vp_token must be an object keyed by credential query id",
            ));
            return result;
        };

        let mut presented = vec![];
        for (id, value) in presentations {
            let Some(credential_query) = self.query.credential(id) else {
                result.push(
                    Message::new(
                        codes::INVALID_PRESENTATION,
                        "presentation for a credential that was not requested",
                    )
                    .with(CREDENTIAL_ID, id.as_str()),
                );
                continue;
            };

            let tokens = match value {
                Json::Array(tokens) => tokens.as_slice(),
                single => {
                    debug!("presentation for '{id}' is not wrapped in an array");
                    std::slice::from_ref(single)
                }
            };
            if tokens.is_empty() {
                continue;
            }
            presented.push(id.as_str());

            if tokens.len() > 1 && !credential_query.multiple() {
                result.push(
                    Message::new(
                        codes::INVALID_PRESENTATION,
                        "multiple presentations for a credential query that allows one",
                    )
                    .with(CREDENTIAL_ID, id.as_str())
                    .with("count", tokens.len()),
                );
            }

            for token in tokens {
                let Some(token) = token.as_str() else {
                    result.push(
                        Message::new(
                            codes::INVALID_PRESENTATION,
                            "presentation must be a string",
                        )
                        .with(CREDENTIAL_ID, id.as_str()),
                    );
                    continue;
                };
                let (credentials, messages) = extract_token(
                    self.extractor,
                    credential_query.format(),
                    token,
                    self.context,
                )
                .await;
                result.add_credentials(id, credentials);
                result
                    .messages
                    .extend(tag(messages, CREDENTIAL_ID, id));
            }
        }

        for missing in self.query.missing_credentials(&presented) {
            result.push(
                Message::new(
                    codes::MISSING_CREDENTIAL,
                    "a required credential was not presented",
                )
                .with(CREDENTIAL_ID, missing),
            );
        }
        result
    }
}
