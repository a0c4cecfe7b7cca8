use std::sync::Arc;

use chrono::Utc;
use openid4vp_verifier::{
    config::PresentationRecord,
    core::{
        crypto::{CryptoKey, KeyAlgorithm},
        message::codes,
        response::AuthorizationResponse,
    },
    verifier::rp::{RpStatus, VpResult},
};
use serde_json::json;

mod jwt_vc;

use jwt_vc::{MockHttpClient, STATUS_LIST_URL, VERIFIER_DID};

fn employee_dcql() -> PresentationRecord {
    let query = serde_json::from_value(json!({
        "credentials": [{"id": "cred1", "format": "jwt_vc_json"}]
    }))
    .unwrap();
    PresentationRecord::dcql("employee", query)
}

fn pid_dcql() -> PresentationRecord {
    let query = serde_json::from_value(json!({
        "credentials": [{"id": "pid", "format": "dc+sd-jwt"}]
    }))
    .unwrap();
    PresentationRecord::dcql("pid", query)
}

fn invalid_codes(result: &VpResult) -> Vec<&str> {
    result
        .messages
        .iter()
        .map(|m| m.code.as_str())
        .filter(|code| code.starts_with("INVALID_"))
        .collect()
}

fn form_response(state: &str, vp_token: serde_json::Value) -> AuthorizationResponse {
    let body = serde_urlencoded::to_string([
        ("state", state.to_owned()),
        ("vp_token", vp_token.to_string()),
    ])
    .unwrap();
    AuthorizationResponse::from_body(
        Some("application/x-www-form-urlencoded"),
        body.as_bytes(),
    )
    .unwrap()
}

#[tokio::test]
async fn dcql_vcdm2_direct_post() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let http_client = Arc::new(
        MockHttpClient::default()
            .with_response(STATUS_LIST_URL, jwt_vc::status_list_token(&issuer, &[5])),
    );
    let verifier = jwt_vc::verifier(vec![employee_dcql()], http_client);

    let offer = verifier.create_offer("employee").await.unwrap();
    assert!(offer
        .request_uri
        .as_str()
        .starts_with("openid4vp://?client_id=did%3Aweb%3Averifier.example&request_uri="));
    assert_eq!(
        verifier.check_offer(&offer.state).await.unwrap().status,
        RpStatus::AuthorizationRequestCreated
    );

    let token = verifier
        .retrieve_authorization_request(&offer.state, None)
        .await
        .unwrap();
    let request = openid4vp_verifier::core::jwt::Jwt::decode(&token).unwrap();
    assert_eq!(request.claim_str("response_type"), Some("vp_token"));
    assert_eq!(request.claim_str("response_mode"), Some("direct_post"));
    assert_eq!(request.claim_str("client_id"), Some(VERIFIER_DID));
    assert_eq!(
        request.claim_str("response_uri").map(ToOwned::to_owned),
        Some(format!("https://verifier.example/alpha/response/{}", offer.state))
    );
    assert_eq!(request.claim("dcql_query").unwrap()["credentials"][0]["id"], "cred1");
    assert!(request.claim("client_metadata").unwrap()["vp_formats"]["jwt_vp"].is_object());
    assert_eq!(
        verifier.check_offer(&offer.state).await.unwrap().status,
        RpStatus::AuthorizationRequestRetrieved
    );

    let nonce = request.claim_str("nonce").unwrap();
    let credential = jwt_vc::vcdm2_credential(
        &issuer,
        &holder.did_key(),
        json!({"given_name": "Alice", "employer": "Example Corp"}),
        json!({"status": {"status_list": {"idx": 3, "uri": STATUS_LIST_URL}}}),
    );
    let vp = jwt_vc::presentation(&holder, &[credential], VERIFIER_DID, nonce);

    let result = verifier
        .process_response(&offer.state, form_response(&offer.state, json!({"cred1": [vp]})))
        .await
        .unwrap();

    assert!(invalid_codes(&result).is_empty(), "{:?}", result.messages);
    assert!(result.has_code(codes::JWT_VERIFIED));
    assert!(result.has_code(codes::VCDM2_0));
    assert!(result.has_code(codes::STATUS_LIST_VALID));
    let credentials = &result.credentials.as_ref().unwrap()["cred1"];
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].claims["given_name"], "Alice");
    assert_eq!(credentials[0].issuer.as_deref(), Some(issuer.did_key().as_str()));

    let status = verifier.check_offer(&offer.state).await.unwrap();
    assert_eq!(status.status, RpStatus::ResponseReceived);
    assert_eq!(status.result, Some(result));

    // A second response for the same session is refused.
    assert!(verifier
        .process_response(&offer.state, form_response(&offer.state, json!({"cred1": []})))
        .await
        .is_err());
}

#[tokio::test]
async fn dcql_bare_credential_bound_to_the_session() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let verifier = jwt_vc::verifier(vec![employee_dcql()], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "employee").await;

    let credential = jwt_vc::vcdm2_credential(
        &issuer,
        &holder.did_key(),
        json!({"given_name": "Frank"}),
        json!({"aud": request.client_id, "nonce": request.nonce}),
    );
    let result = verifier
        .process_response(
            &request.state,
            form_response(&request.state, json!({"cred1": [credential]})),
        )
        .await
        .unwrap();

    assert!(invalid_codes(&result).is_empty(), "{:?}", result.messages);
    assert!(result.has_code(codes::VCDM2_0));
    let credentials = &result.credentials.as_ref().unwrap()["cred1"];
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].claims["given_name"], "Frank");
    assert_eq!(
        verifier.check_offer(&request.state).await.unwrap().status,
        RpStatus::ResponseReceived
    );
}

#[tokio::test]
async fn replayed_bare_credential_is_flagged() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let verifier = jwt_vc::verifier(vec![employee_dcql()], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "employee").await;

    let credential = jwt_vc::vcdm2_credential(
        &issuer,
        &holder.did_key(),
        json!({"given_name": "Grace"}),
        json!({"aud": "did:web:someone-else.example", "nonce": "replayed-nonce"}),
    );
    let result = verifier
        .process_response(
            &request.state,
            form_response(&request.state, json!({"cred1": [credential]})),
        )
        .await
        .unwrap();

    assert_eq!(
        invalid_codes(&result),
        vec![codes::INVALID_PRESENTATION, codes::INVALID_PRESENTATION],
        "{:?}",
        result.messages
    );
}

#[tokio::test]
async fn dcql_vcdm1_presentation() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let holder = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let verifier = jwt_vc::verifier(vec![employee_dcql()], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "employee").await;

    let credential = jwt_vc::vcdm1_credential(
        &issuer,
        &holder.did_key(),
        json!({"given_name": "Heidi", "role": "auditor"}),
        json!({}),
    );
    let vp = jwt_vc::presentation(&holder, &[credential], &request.client_id, &request.nonce);
    let response = AuthorizationResponse::from_json(json!({
        "state": request.state,
        "vp_token": {"cred1": [vp]}
    }))
    .unwrap();
    let result = verifier
        .process_response(&request.state, response)
        .await
        .unwrap();

    assert!(invalid_codes(&result).is_empty(), "{:?}", result.messages);
    assert!(result.has_code(codes::VCDM1_1));
    assert!(!result.has_code(codes::VCDM2_0));
    assert!(result.has_code(codes::NO_STATUS_LIST));
    let credential = &result.credentials.as_ref().unwrap()["cred1"][0];
    assert_eq!(credential.claims["role"], "auditor");
    assert_eq!(credential.issuer.as_deref(), Some(issuer.did_key().as_str()));
    assert_eq!(credential.issuer_name.as_deref(), Some("Example Issuer"));
    assert!(credential.metadata.issued_at.is_some());
}

#[tokio::test]
async fn expired_and_revoked_credentials_are_still_extracted() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let http_client = Arc::new(
        MockHttpClient::default()
            .with_response(STATUS_LIST_URL, jwt_vc::status_list_token(&issuer, &[5])),
    );
    let verifier = jwt_vc::verifier(vec![employee_dcql()], http_client);
    let request = jwt_vc::start_exchange(&verifier, "employee").await;

    let credential = jwt_vc::vcdm2_credential(
        &issuer,
        &holder.did_key(),
        json!({"given_name": "Bob"}),
        json!({
            "exp": Utc::now().timestamp() - 3600,
            "status": {"status_list": {"idx": 5, "uri": STATUS_LIST_URL}}
        }),
    );
    let vp = jwt_vc::presentation(&holder, &[credential], &request.client_id, &request.nonce);
    let response = AuthorizationResponse::from_json(json!({
        "state": request.state,
        "vp_token": {"cred1": [vp]}
    }))
    .unwrap();

    let result = verifier
        .process_response(&request.state, response)
        .await
        .unwrap();

    assert!(result.has_code(codes::EXP_ERROR));
    assert!(result.has_code(codes::STATUS_LIST_REVOKED));
    let credentials = &result.credentials.as_ref().unwrap()["cred1"];
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].claims["given_name"], "Bob");
    let expiry = result
        .messages
        .iter()
        .find(|m| m.is(codes::EXP_ERROR))
        .unwrap();
    assert_eq!(expiry.context["credentialId"], "cred1");
}

#[tokio::test]
async fn sd_jwt_key_binding_mismatch() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let holder = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let verifier = jwt_vc::verifier(vec![pid_dcql()], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "pid").await;

    let presented = jwt_vc::sd_jwt(
        &issuer,
        &holder,
        json!({"given_name": "Carol", "family_name": "Doe"}),
    );
    let token = jwt_vc::with_key_binding(
        &holder,
        &presented,
        &request.client_id,
        &request.nonce,
        &jwt_vc::sd_hash("some other presentation~"),
    );
    let response = AuthorizationResponse::from_json(json!({
        "state": request.state,
        "vp_token": {"pid": [token]}
    }))
    .unwrap();

    let result = verifier
        .process_response(&request.state, response)
        .await
        .unwrap();

    assert_eq!(invalid_codes(&result), vec![codes::INVALID_KB], "{:?}", result.messages);
    assert!(result.has_code(codes::NO_STATUS_LIST));
    let credentials = &result.credentials.as_ref().unwrap()["pid"];
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].claims["given_name"], "Carol");
    assert_eq!(credentials[0].claims["family_name"], "Doe");
    assert_eq!(credentials[0].claims["department"], "engineering");
    assert!(!credentials[0].claims.contains_key("_sd"));
    assert!(!credentials[0].claims.contains_key("cnf"));
}

#[tokio::test]
async fn sd_jwt_with_valid_key_binding() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let verifier = jwt_vc::verifier(vec![pid_dcql()], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "pid").await;

    let presented = jwt_vc::sd_jwt(&issuer, &holder, json!({"given_name": "Dave"}));
    let token = jwt_vc::with_key_binding(
        &holder,
        &presented,
        &request.client_id,
        &request.nonce,
        &jwt_vc::sd_hash(&presented),
    );
    let response = AuthorizationResponse::from_json(json!({
        "state": request.state,
        "vp_token": {"pid": token}
    }))
    .unwrap();

    let result = verifier
        .process_response(&request.state, response)
        .await
        .unwrap();

    assert!(invalid_codes(&result).is_empty(), "{:?}", result.messages);
    assert!(!result.has_code(codes::MISSING_KB));
    let verified = result
        .messages
        .iter()
        .filter(|m| m.is(codes::JWT_VERIFIED))
        .count();
    assert_eq!(verified, 2);
    assert_eq!(
        result.credentials.as_ref().unwrap()["pid"][0].claims["given_name"],
        "Dave"
    );
}

#[tokio::test]
async fn state_mismatch_is_fatal() {
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let verifier = jwt_vc::verifier(vec![employee_dcql()], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "employee").await;

    let credential = jwt_vc::vcdm2_credential(&holder, &holder.did_key(), json!({}), json!({}));
    let vp = jwt_vc::presentation(&holder, &[credential], &request.client_id, &request.nonce);
    let result = verifier
        .process_response(&request.state, form_response("another-state", json!({"cred1": [vp]})))
        .await
        .unwrap();

    assert_eq!(result.messages.len(), 1);
    assert!(result.has_code(codes::INVALID_STATE));
    assert!(result.credentials.is_none());
    assert_eq!(
        verifier.check_offer(&request.state).await.unwrap().status,
        RpStatus::ResponseReceived
    );
}

#[tokio::test]
async fn response_before_retrieval_is_rejected() {
    let verifier = jwt_vc::verifier(vec![employee_dcql()], Arc::new(MockHttpClient::default()));
    let offer = verifier.create_offer("employee").await.unwrap();

    let response = form_response(&offer.state, json!({"cred1": []}));
    assert!(verifier.process_response(&offer.state, response).await.is_err());

    let response = form_response("unknown", json!({"cred1": []}));
    assert!(verifier.process_response("unknown", response).await.is_err());
}

#[tokio::test]
async fn presentation_exchange_with_id_token() {
    let issuer = CryptoKey::generate(KeyAlgorithm::Secp256r1);
    let holder = CryptoKey::generate(KeyAlgorithm::Ed25519);
    let record = PresentationRecord::presentation_exchange(
        "employment",
        vec![json!({
            "id": "employee",
            "constraints": {"fields": [{"path": ["$.vc.type"]}]}
        })],
    );
    let verifier = jwt_vc::verifier(vec![record], Arc::new(MockHttpClient::default()));
    let request = jwt_vc::start_exchange(&verifier, "employment").await;
    assert_eq!(request.payload["response_type"], "vp_token id_token");
    assert_eq!(request.payload["scope"], "openid");
    assert_eq!(
        request.payload["presentation_definition_uri"],
        "https://verifier.example/alpha/presentations/employment"
    );
    let definition = verifier.presentation_definition("employment").await.unwrap();
    assert_eq!(definition.input_descriptors()[0].id, "employee");

    let credential = jwt_vc::vcdm2_credential(
        &issuer,
        &holder.did_key(),
        json!({"given_name": "Erin"}),
        json!({}),
    );
    let vp = jwt_vc::presentation(&holder, &[credential], VERIFIER_DID, &request.nonce);
    let id_token = jwt_vc::sign(
        &holder,
        json!({"typ": "JWT"}),
        json!({
            "iss": holder.did_key(),
            "sub": holder.did_key(),
            "aud": VERIFIER_DID,
            "nonce": request.nonce,
            "iat": Utc::now().timestamp()
        }),
    );
    let submission = json!({
        "id": "submission-1",
        "definition_id": "employment",
        "descriptor_map": [{"id": "employee", "format": "jwt_vp_json", "path": "$"}]
    });
    let body = serde_urlencoded::to_string([
        ("state", request.state.clone()),
        ("vp_token", vp),
        ("id_token", id_token),
        ("presentation_submission", submission.to_string()),
    ])
    .unwrap();
    let response = AuthorizationResponse::from_x_www_form_urlencoded(body.as_bytes()).unwrap();

    let result = verifier
        .process_response(&request.state, response)
        .await
        .unwrap();

    assert!(invalid_codes(&result).is_empty(), "{:?}", result.messages);
    assert!(!result.has_code(codes::MISSING_CREDENTIAL));
    assert_eq!(result.issuer.as_deref(), Some(holder.did_key().as_str()));
    let credentials = &result.credentials.as_ref().unwrap()["employee"];
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].claims["given_name"], "Erin");
}
