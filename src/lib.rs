//! A multi-tenant relying party for [OID4VP] and [SIOPv2] presentation exchanges.
//!
//! [OID4VP]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//! [SIOPv2]: <https://openid.net/specs/openid-connect-self-issued-v2-1_0.html>
//!
//! # Verifier Usage
//!
//! Each configured tenant is a [`Verifier`], bound to a DID, the key it signs requests with and
//! the presentations it may ask for:
//!
//! ```ignore
//! use std::sync::Arc;
//! use openid4vp_verifier::config::Config;
//! use openid4vp_verifier::core::did::Identifier;
//! use openid4vp_verifier::core::response::AuthorizationResponse;
//! use openid4vp_verifier::verifier::{presentations::MemoryPresentationStore, Verifier};
//!
//! let config = Config::from_json_str(&config_json)?;
//! let verifier = Verifier::builder()
//!     .with_config(&config, "alpha")?
//!     .with_identifier(Identifier::new(did, key, None)?)
//!     .with_presentation_store(Arc::new(MemoryPresentationStore::from_config(&config)))
//!     .build()?;
//!
//! // Start an exchange and show `offer.request_uri` to the holder, e.g. as a QR code.
//! let offer = verifier.create_offer("employee").await?;
//!
//! // The wallet fetches the signed request object from the `get-offer` endpoint.
//! let request_jwt = verifier
//!     .retrieve_authorization_request(&offer.state, wallet_nonce)
//!     .await?;
//!
//! // The wallet posts its response to the `response` endpoint.
//! let response = AuthorizationResponse::from_body(content_type, &body)?;
//! let result = verifier.process_response(&offer.state, response).await?;
//!
//! // The frontend polls the `check-offer` endpoint.
//! let status = verifier.check_offer(&offer.state).await?;
//! ```
//!
//! # Verification Results
//!
//! Processing a response never stops at the first problem. Every check contributes a
//! [`Message`] with a stable code, and callers decide acceptance from the collected messages.
//! The one exception is a `state` that does not belong to the session, which is reported as
//! `INVALID_STATE` without looking at any credential.
//!
//! Supported credential formats:
//! - **JWT VC** (`jwt_vc`, `jwt_vc_json`, `vc+jwt`): W3C VCDM 1.1 and 2.0 credentials in JWT
//!   presentations.
//! - **SD-JWT VC** (`dc+sd-jwt`): selective disclosure JWTs with key binding.
//!
//! Credentials are checked against their status lists (IETF token status lists, Bitstring
//! status lists and the legacy 2020/2021 lists), which are cached per URL.
//!
//! [`Verifier`]: crate::verifier::Verifier
//! [`Message`]: crate::core::message::Message

pub mod config;
pub mod core;
pub mod utils;
pub mod verifier;

pub use serde_json_path::JsonPath;
