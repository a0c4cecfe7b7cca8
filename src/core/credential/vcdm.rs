use chrono::Utc;
use serde_json::{Map, Value as Json};
use tracing::debug;

use super::{
    as_list, check_validity, ietf_status_entries, timestamp, CredentialExtractor,
    CredentialFormat, CredentialMetadata, ExtractedCredential, Extraction, SdJwt,
    VerificationContext,
};
use crate::core::{
    jwt::Jwt,
    message::{codes, Message},
};

const VCDM1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
const VCDM2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";
const ENVELOPED_JWT: &str = "data:application/vc+jwt,";
const ENVELOPED_SD_JWT: &str = "data:application/vc+sd-jwt,";

fn has_type(object: &Map<String, Json>, expected: &str) -> bool {
    as_list(object.get("type"))
        .iter()
        .any(|t| t.as_str() == Some(expected))
}

fn has_context(object: &Map<String, Json>, expected: &str) -> bool {
    as_list(object.get("@context"))
        .iter()
        .any(|c| c.as_str() == Some(expected))
}

/// Locate the credential body and its data model.
fn classify(payload: &Map<String, Json>) -> Option<(CredentialFormat, &Map<String, Json>)> {
    if let Some(vc) = payload.get("vc").and_then(Json::as_object) {
        if vc.contains_key("credentialSubject") && has_context(vc, VCDM1_CONTEXT) {
            return Some((CredentialFormat::Vcdm1_1, vc));
        }
    }
    if payload.contains_key("credentialSubject") {
        if has_context(payload, VCDM2_CONTEXT) {
            return Some((CredentialFormat::Vcdm2, payload));
        }
        if has_context(payload, VCDM1_CONTEXT) {
            return Some((CredentialFormat::Vcdm1_1, payload));
        }
    }
    None
}

/// The presentation object of a VP token: the `vp` claim or a top level presentation.
fn presentation_body(payload: &Map<String, Json>) -> Option<&Map<String, Json>> {
    if let Some(vp) = payload.get("vp").and_then(Json::as_object) {
        return Some(vp);
    }
    Some(payload).filter(|payload| has_type(payload, "VerifiablePresentation"))
}

fn issuer_of(vc: &Map<String, Json>, payload: &Map<String, Json>) -> (Option<String>, Option<String>) {
    match vc.get("issuer") {
        Some(Json::String(id)) => (Some(id.clone()), None),
        Some(Json::Object(issuer)) => (
            issuer.get("id").and_then(Json::as_str).map(ToOwned::to_owned),
            issuer.get("name").and_then(Json::as_str).map(ToOwned::to_owned),
        ),
        _ => (
            payload.get("iss").and_then(Json::as_str).map(ToOwned::to_owned),
            None,
        ),
    }
}

fn subject_claims(subject: &Json) -> Map<String, Json> {
    match subject {
        Json::Object(claims) => claims.clone(),
        Json::Array(subjects) if subjects.len() == 1 && subjects[0].is_object() => {
            subject_claims(&subjects[0])
        }
        other => Map::from_iter([("credentialSubject".to_owned(), other.clone())]),
    }
}

/// Check that a presented token is bound to this verifier and session.
fn binding_messages(jwt: &Jwt, context: &VerificationContext, label: &str) -> Vec<Message> {
    let mut messages = vec![];
    if !context.audience_matches(jwt.claim("aud")) {
        messages.push(
            Message::new(
                codes::INVALID_PRESENTATION,
                format!("{label} audience does not match the verifier"),
            )
            .with("expected", context.client_id.clone())
            .with("received", jwt.claim("aud").cloned().unwrap_or_default()),
        );
    }
    if !context.nonce_matches(jwt.claim("nonce")) {
        messages.push(
            Message::new(
                codes::INVALID_PRESENTATION,
                format!("{label} nonce does not match the request"),
            )
            .with("expected", context.nonce.clone())
            .with("received", jwt.claim("nonce").cloned().unwrap_or_default()),
        );
    }
    messages
}

/// A credential embedded in a presentation.
enum Embedded {
    Jwt(String),
    SdJwt(String),
    Unsupported(Json),
}

fn embedded_credentials(presentation: &Map<String, Json>) -> Vec<Embedded> {
    as_list(presentation.get("verifiableCredential"))
        .into_iter()
        .map(|credential| match &credential {
            Json::String(token) if SdJwt::is_sd_jwt(token) => Embedded::SdJwt(token.clone()),
            Json::String(token) => Embedded::Jwt(token.clone()),
            Json::Object(envelope) => {
                let id = envelope.get("id").and_then(Json::as_str).unwrap_or_default();
                if let Some(token) = id.strip_prefix(ENVELOPED_SD_JWT) {
                    Embedded::SdJwt(token.to_owned())
                } else if let Some(token) = id.strip_prefix(ENVELOPED_JWT) {
                    Embedded::Jwt(token.to_owned())
                } else {
                    Embedded::Unsupported(credential.clone())
                }
            }
            _ => Embedded::Unsupported(credential.clone()),
        })
        .collect()
}

impl CredentialExtractor {
    /// Verify a JWT secured W3C credential (VCDM 1.1 or 2.0) and extract its claims.
    pub async fn extract_vcdm(&self, token: &str) -> Extraction {
        let mut messages = vec![];
        let mut jwt = match Jwt::decode(token) {
            Ok(jwt) => jwt,
            Err(e) => {
                messages.push(Message::new(
                    codes::INVALID_JWT,
                    format!("credential is not a valid JWT: {e}"),
                ));
                return Extraction {
                    credential: None,
                    messages,
                };
            }
        };

        self.verify_signature(&mut jwt, "credential", &mut messages)
            .await;
        let now = Utc::now();
        messages.extend(check_validity(&jwt.payload, now, "credential"));

        let Some((format, vc)) = classify(&jwt.payload) else {
            messages.push(Message::new(
                codes::VC_ERROR,
                "credential is missing claims",
            ));
            return Extraction {
                credential: None,
                messages,
            };
        };
        messages.push(match format {
            CredentialFormat::Vcdm1_1 => {
                Message::new(codes::VCDM1_1, "credential uses the VCDM 1.1 data model")
            }
            _ => Message::new(codes::VCDM2_0, "credential uses the VCDM 2.0 data model"),
        });

        let (issuer, issuer_name) = issuer_of(vc, &jwt.payload);
        if issuer.is_none() {
            messages.push(Message::new(
                codes::VC_ERROR,
                "credential is missing issuer information",
            ));
        }

        let subject = vc.get("credentialSubject").cloned().unwrap_or_default();
        let holder = subject
            .get("id")
            .or_else(|| jwt.payload.get("sub"))
            .cloned();

        let date = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| jwt.payload.get(*name).or_else(|| vc.get(*name)))
                .and_then(timestamp)
        };
        let metadata = CredentialMetadata {
            issued_at: date(&["iat", "issuanceDate", "validFrom"]),
            not_before: date(&["nbf", "validFrom"]),
            expires: date(&["exp", "expirationDate", "validUntil"]),
            evidence: as_list(vc.get("evidence")),
            status_lists: as_list(vc.get("credentialStatus"))
                .into_iter()
                .chain(ietf_status_entries(&jwt.payload))
                .collect(),
        };

        // Data model validity only applies when the JWT itself carries no such claim.
        if !jwt.payload.contains_key("exp") && metadata.expires.is_some_and(|exp| exp <= now) {
            messages.push(Message::new(codes::EXP_ERROR, "credential has expired"));
        }
        if !jwt.payload.contains_key("nbf") && metadata.not_before.is_some_and(|nbf| nbf > now) {
            messages.push(Message::new(codes::NBF_ERROR, "credential is not yet valid"));
        }

        let credential = ExtractedCredential {
            format,
            issuer: issuer.or_else(|| jwt.issuer().map(ToOwned::to_owned)),
            issuer_name,
            holder,
            claims: subject_claims(&subject),
            metadata,
        };
        messages.extend(self.status_messages(&credential).await);

        Extraction {
            credential: Some(credential),
            messages,
        }
    }

    /// Verify a JWT VP token and the credentials it carries.
    ///
    /// A token that is a credential rather than a presentation is extracted directly.
    pub async fn extract_presentation(
        &self,
        token: &str,
        context: &VerificationContext,
    ) -> (Vec<ExtractedCredential>, Vec<Message>) {
        let mut messages = vec![];
        let mut jwt = match Jwt::decode(token) {
            Ok(jwt) => jwt,
            Err(e) => {
                messages.push(Message::new(
                    codes::INVALID_JWT,
                    format!("presentation is not a valid JWT: {e}"),
                ));
                return (vec![], messages);
            }
        };

        let Some(presentation) = presentation_body(&jwt.payload).cloned() else {
            debug!("token is not a presentation, extracting it as a credential");
            let mut extraction = self.extract_vcdm(token).await;
            extraction
                .messages
                .extend(binding_messages(&jwt, context, "credential"));
            return (extraction.credential.into_iter().collect(), extraction.messages);
        };

        self.verify_signature(&mut jwt, "presentation", &mut messages)
            .await;
        messages.extend(binding_messages(&jwt, context, "presentation"));
        messages.extend(check_validity(&jwt.payload, Utc::now(), "presentation"));

        let mut credentials = vec![];
        let embedded = embedded_credentials(&presentation);
        if embedded.is_empty() {
            messages.push(Message::new(
                codes::INVALID_PRESENTATION,
                "presentation contains no credentials",
            ));
        }
        for credential in embedded {
            let extraction = match credential {
                Embedded::Jwt(token) => self.extract_vcdm(&token).await,
                Embedded::SdJwt(token) => self.extract_sd_jwt(&token, context).await,
                Embedded::Unsupported(_) => {
                    messages.push(Message::new(
                        codes::UNSUPPORTED_FORMAT,
                        "presentation contains a credential in an unsupported format",
                    ));
                    continue;
                }
            };
            messages.extend(extraction.messages);
            credentials.extend(extraction.credential);
        }

        (credentials, messages)
    }
}
