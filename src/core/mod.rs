pub mod authorization_request;
pub mod credential;
pub mod credential_format;
pub mod crypto;
pub mod dcql_query;
pub mod did;
pub mod jwt;
pub mod message;
pub mod object;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod response;
pub mod status_list;
pub mod submission;
pub mod util;
