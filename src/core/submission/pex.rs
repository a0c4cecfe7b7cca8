use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value as Json;

use super::{extract_token, tag, SubmissionResult};
use crate::core::{
    credential::{CredentialExtractor, ExtractedCredential, SdJwt, VerificationContext},
    credential_format::ClaimFormatDesignation,
    message::{codes, Message},
    presentation_definition::PresentationDefinition,
    presentation_submission::PresentationSubmission,
    response::parameters::VpToken,
};

const DESCRIPTOR_ID: &str = "descriptorId";

/// Validates a Presentation Exchange `vp_token` and its `presentation_submission`.
///
/// Descriptor paths only locate whole presentations in the `vp_token`; every credential inside
/// a located presentation is extracted for its descriptor.
#[derive(Debug, Clone, Copy)]
pub struct PexSubmission<'a> {
    definition: &'a PresentationDefinition,
    extractor: &'a CredentialExtractor,
    context: &'a VerificationContext,
}

impl<'a> PexSubmission<'a> {
    pub fn new(
        definition: &'a PresentationDefinition,
        extractor: &'a CredentialExtractor,
        context: &'a VerificationContext,
    ) -> Self {
        Self {
            definition,
            extractor,
            context,
        }
    }

    pub async fn validate(
        &self,
        vp_token: &VpToken,
        submission: Option<Result<PresentationSubmission>>,
    ) -> SubmissionResult {
        let mut result = SubmissionResult::default();
        let vp_token = match vp_token {
            VpToken::ByQueryId(_) => {
                result.push(Message::new(
                    codes::INVALID_PRESENTATION,
                    "vp_token must be a presentation or an array of presentations",
                ));
                return result;
            }
            token => token.as_json(),
        };

        let submission = match submission {
            Some(Ok(submission)) => submission,
            Some(Err(e)) => {
                result.push(Message::new(
                    codes::INVALID_SUBMISSION,
                    format!("presentation_submission is invalid: {e:#}"),
                ));
                self.extract_all(&vp_token, &mut result).await;
                return result;
            }
            None => {
                result.push(Message::new(
                    codes::INVALID_SUBMISSION,
                    "presentation_submission is missing",
                ));
                self.extract_all(&vp_token, &mut result).await;
                return result;
            }
        };

        if submission.definition_id() != self.definition.id() {
            result.push(
                Message::new(
                    codes::INVALID_SUBMISSION,
                    "presentation_submission answers a different presentation definition",
                )
                .with("expected", self.definition.id())
                .with("received", submission.definition_id()),
            );
        }

        // Presentations located by more than one descriptor are verified once.
        let mut verified: HashMap<String, Vec<ExtractedCredential>> = HashMap::new();
        for descriptor in submission.descriptor_map() {
            let id = descriptor.id.as_str();
            if self.definition.input_descriptor(id).is_none() {
                result.push(
                    Message::new(
                        codes::INVALID_SUBMISSION,
                        "descriptor does not match any input descriptor",
                    )
                    .with(DESCRIPTOR_ID, id),
                );
                continue;
            }

            let token = match descriptor.select(&vp_token).as_slice() {
                [Json::String(token)] => token.clone(),
                selected => {
                    result.push(
                        Message::new(
                            codes::INVALID_SUBMISSION,
                            "descriptor path must select exactly one presentation",
                        )
                        .with(DESCRIPTOR_ID, id)
                        .with("path", descriptor.path.to_string())
                        .with("selected", selected.len()),
                    );
                    continue;
                }
            };

            let credentials = match verified.get(&token) {
                Some(credentials) => credentials.clone(),
                None => {
                    let (credentials, messages) =
                        extract_token(self.extractor, &descriptor.format, &token, self.context)
                            .await;
                    result.messages.extend(tag(messages, DESCRIPTOR_ID, id));
                    verified.insert(token, credentials.clone());
                    credentials
                }
            };
            result.add_credentials(id, credentials);
        }

        let mapped = submission.descriptor_map_by_id();
        for descriptor in self.definition.input_descriptors() {
            if !mapped.contains_key(descriptor.id.as_str()) {
                result.push(
                    Message::new(
                        codes::MISSING_CREDENTIAL,
                        "no presentation was submitted for an input descriptor",
                    )
                    .with(DESCRIPTOR_ID, descriptor.id.as_str()),
                );
            }
        }
        result
    }

    /// Without a usable submission, verify every presentation and group the credentials under
    /// the definition id.
    async fn extract_all(&self, vp_token: &Json, result: &mut SubmissionResult) {
        let tokens = match vp_token {
            Json::Array(tokens) => tokens.iter().collect(),
            token => vec![token],
        };
        for token in tokens {
            let Some(token) = token.as_str() else {
                result.push(Message::new(
                    codes::INVALID_PRESENTATION,
                    "presentation must be a string",
                ));
                continue;
            };
            let format = if SdJwt::is_sd_jwt(token) {
                ClaimFormatDesignation::DcSdJwt
            } else {
                ClaimFormatDesignation::JwtVpJson
            };
            let (credentials, messages) =
                extract_token(self.extractor, &format, token, self.context).await;
            result.messages.extend(messages);
            result.add_credentials(self.definition.id(), credentials);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::core::{
        did::KeyMaterialResolver, status_list::StatusListResolver, util::ReqwestClient,
    };

    fn extractor() -> CredentialExtractor {
        let did_resolver = Arc::new(KeyMaterialResolver::new());
        CredentialExtractor::new(
            did_resolver.clone(),
            Arc::new(StatusListResolver::new(
                Arc::new(ReqwestClient::new().unwrap()),
                did_resolver,
            )),
        )
    }

    fn definition() -> PresentationDefinition {
        PresentationDefinition::from_descriptors(
            "employment".into(),
            &[json!({"id": "employee"}), json!({"id": "badge"})],
        )
        .unwrap()
    }

    fn submission(definition_id: &str, descriptors: Json) -> Option<Result<PresentationSubmission>> {
        Some(Ok(serde_json::from_value(json!({
            "id": "submission",
            "definition_id": definition_id,
            "descriptor_map": descriptors
        }))
        .unwrap()))
    }

    fn count(result: &SubmissionResult, code: &str) -> usize {
        result.messages.iter().filter(|m| m.is(code)).count()
    }

    #[tokio::test]
    async fn rejects_keyed_tokens() {
        let (definition, extractor) = (definition(), extractor());
        let context = VerificationContext::new("did:web:verifier.example", "nonce");
        let token = VpToken::try_from(json!({"employee": ["a.b.c"]})).unwrap();

        let result = PexSubmission::new(&definition, &extractor, &context)
            .validate(&token, None)
            .await;
        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].is(codes::INVALID_PRESENTATION));
    }

    #[tokio::test]
    async fn without_submission_everything_is_extracted() {
        let (definition, extractor) = (definition(), extractor());
        let context = VerificationContext::new("did:web:verifier.example", "nonce");
        let token = VpToken::try_from(json!(["first", "second"])).unwrap();

        let result = PexSubmission::new(&definition, &extractor, &context)
            .validate(&token, None)
            .await;
        assert_eq!(count(&result, codes::INVALID_SUBMISSION), 1);
        assert_eq!(count(&result, codes::INVALID_JWT), 2);
        assert!(result.credentials.contains_key("employment"));
    }

    #[tokio::test]
    async fn mismatched_submission() {
        let (definition, extractor) = (definition(), extractor());
        let context = VerificationContext::new("did:web:verifier.example", "nonce");
        let token = VpToken::try_from(json!("not-a-jwt")).unwrap();
        let submission = submission(
            "other",
            json!([
                {"id": "unknown", "format": "jwt_vp_json", "path": "$"},
                {"id": "employee", "format": "jwt_vp_json", "path": "$[5]"}
            ]),
        );

        let result = PexSubmission::new(&definition, &extractor, &context)
            .validate(&token, submission)
            .await;
        assert_eq!(count(&result, codes::INVALID_SUBMISSION), 3);
        assert_eq!(count(&result, codes::MISSING_CREDENTIAL), 1);
        assert_eq!(count(&result, codes::INVALID_JWT), 0);
        let missing = result
            .messages
            .iter()
            .find(|m| m.is(codes::MISSING_CREDENTIAL))
            .unwrap();
        assert_eq!(missing.context[DESCRIPTOR_ID], "badge");
    }

    #[tokio::test]
    async fn shared_presentation_is_verified_once() {
        let (definition, extractor) = (definition(), extractor());
        let context = VerificationContext::new("did:web:verifier.example", "nonce");
        let token = VpToken::try_from(json!("not-a-jwt")).unwrap();
        let submission = submission(
            "employment",
            json!([
                {"id": "employee", "format": "jwt_vp_json", "path": "$"},
                {"id": "badge", "format": "jwt_vp_json", "path": "$"}
            ]),
        );

        let result = PexSubmission::new(&definition, &extractor, &context)
            .validate(&token, submission)
            .await;
        assert_eq!(count(&result, codes::INVALID_JWT), 1);
        assert_eq!(count(&result, codes::INVALID_SUBMISSION), 0);
        assert_eq!(count(&result, codes::MISSING_CREDENTIAL), 0);
        assert!(result.credentials.contains_key("employee"));
        assert!(result.credentials.contains_key("badge"));
    }
}
