//! Credential status checks against published status lists.
//!
//! Supports W3C Bitstring Status Lists, the older StatusList2021 and Revocation/Suspension List
//! entries, and IETF Token Status Lists (`status+jwt`). Lists are fetched as signed JWTs, verified
//! against their issuer's key and cached by URL.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::core::{
    did::DidResolver,
    jwt::Jwt,
    message::{codes, Message},
    util::{get_body, AsyncHttpClient},
};

mod cache;
mod encoding;

pub use cache::{CachedStatusList, StatusListCache};
pub use encoding::{decode_list, default_messages, read_status, MAX_STATUS_SIZE};

/// Default lifetime of a cached status list.
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum StatusListError {
    #[error("{0}")]
    Unreachable(String),
    #[error("{0}")]
    Invalid(String),
    #[error("unsupported status list entry type '{0}'")]
    UnsupportedType(String),
    #[error("index {index} is outside of the status list ({length} bits)")]
    IndexOutOfRange { index: u64, length: u64 },
}

impl StatusListError {
    pub fn code(&self) -> &'static str {
        match self {
            StatusListError::Unreachable(_) => "STATUSLIST_UNREACHABLE",
            StatusListError::Invalid(_) | StatusListError::IndexOutOfRange { .. } => {
                "STATUSLIST_INVALID"
            }
            StatusListError::UnsupportedType(_) => "STATUSLIST_UNSUPPORTED",
        }
    }

    fn value(&self) -> i64 {
        match self {
            StatusListError::Unreachable(_) => -1,
            StatusListError::Invalid(_) | StatusListError::IndexOutOfRange { .. } => -2,
            StatusListError::UnsupportedType(_) => -3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusListType {
    /// IETF Token Status List.
    Ietf,
    /// W3C Bitstring Status List.
    Bitstring,
    /// StatusList2021 and the Revocation/Suspension List family.
    StatusList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPurpose {
    Revocation,
    Suspension,
    Message,
    Other,
}

impl StatusPurpose {
    fn parse(purpose: Option<&str>) -> Self {
        match purpose {
            Some("revocation") => Self::Revocation,
            Some("suspension") => Self::Suspension,
            Some("message") => Self::Message,
            _ => Self::Other,
        }
    }
}

/// A normalized reference to one status in a status list.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusListEntry {
    pub entry_type: String,
    pub list_type: StatusListType,
    pub purpose: StatusPurpose,
    pub url: String,
    pub index: u64,
    pub size: Option<u32>,
    pub messages: Option<BTreeMap<u64, String>>,
}

fn first_str<'a>(entry: &'a Map<String, Json>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| entry.get(*key).and_then(Json::as_str))
}

fn first_u64(entry: &Map<String, Json>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match entry.get(*key)? {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl StatusListEntry {
    pub fn from_json(value: &Json) -> Result<Self, StatusListError> {
        let entry = value
            .as_object()
            .ok_or_else(|| StatusListError::Invalid("status entry is not an object".into()))?;

        let entry_type = match first_str(entry, &["type"]) {
            Some(t) => t.to_owned(),
            None if entry.contains_key("uri") && entry.contains_key("idx") => {
                "status+jwt".to_owned()
            }
            None => return Err(StatusListError::UnsupportedType("<missing>".into())),
        };

        let declared_purpose = StatusPurpose::parse(first_str(entry, &["statusPurpose"]));
        let (list_type, purpose) = match entry_type.as_str() {
            "BitstringStatusListEntry" => (StatusListType::Bitstring, declared_purpose),
            "StatusList2021Entry" | "StatusListStatus" => {
                (StatusListType::StatusList, declared_purpose)
            }
            "RevocationList2020Status" | "RevocationList2021Status" => {
                (StatusListType::StatusList, StatusPurpose::Revocation)
            }
            "SuspensionList2020Status" | "SuspensionList2021Status" => {
                (StatusListType::StatusList, StatusPurpose::Suspension)
            }
            "status+jwt" => (StatusListType::Ietf, StatusPurpose::Revocation),
            other => return Err(StatusListError::UnsupportedType(other.to_owned())),
        };

        let url = first_str(
            entry,
            &[
                "statusListCredential",
                "revocationListCredential",
                "suspensionListCredential",
                "uri",
            ],
        )
        .ok_or_else(|| StatusListError::Invalid("status entry has no list URL".into()))?
        .to_owned();

        let index = first_u64(
            entry,
            &[
                "statusListIndex",
                "revocationListIndex",
                "suspensionListIndex",
                "idx",
            ],
        )
        .ok_or_else(|| StatusListError::Invalid("status entry has no valid index".into()))?;

        let size = first_u64(entry, &["statusSize"])
            .map(|size| u32::try_from(size).unwrap_or(u32::MAX));

        Ok(Self {
            entry_type,
            list_type,
            purpose,
            url,
            index,
            size,
            messages: encoding::entry_messages(entry),
        })
    }
}

/// Outcome of a status check. Failures carry a negative value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCheck {
    pub value: i64,
    pub code: String,
    pub message: String,
}

impl StatusCheck {
    pub const OK: &'static str = "CREDENTIAL_OK";
    pub const REVOKED: &'static str = "CREDENTIAL_REVOKED";
    pub const SUSPENDED: &'static str = "CREDENTIAL_SUSPENDED";
    pub const STATUS_SET: &'static str = "CREDENTIAL_STATUS_SET";

    fn resolved(value: u64, message: String) -> Self {
        let text = message.to_lowercase();
        let code = if value == 0 {
            Self::OK
        } else if text.contains("revoked") || text.contains("invalid") {
            Self::REVOKED
        } else if text.contains("suspended") {
            Self::SUSPENDED
        } else {
            Self::STATUS_SET
        };
        Self {
            value: i64::try_from(value).unwrap_or(i64::MAX),
            code: code.to_owned(),
            message,
        }
    }

    fn failed(error: &StatusListError) -> Self {
        Self {
            value: error.value(),
            code: error.code().to_owned(),
            message: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.value < 0
    }
}

/// Fetches, verifies and caches status lists.
#[derive(Debug)]
pub struct StatusListResolver {
    http_client: Arc<dyn AsyncHttpClient + Send + Sync>,
    did_resolver: Arc<dyn DidResolver + Send + Sync>,
    cache: StatusListCache,
    ttl: Duration,
}

impl StatusListResolver {
    pub fn new(
        http_client: Arc<dyn AsyncHttpClient + Send + Sync>,
        did_resolver: Arc<dyn DidResolver + Send + Sync>,
    ) -> Self {
        Self {
            http_client,
            did_resolver,
            cache: StatusListCache::default(),
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &StatusListCache {
        &self.cache
    }

    /// Check the status referenced by a credential status entry. Never fails: any problem is
    /// reported as a [StatusCheck] with a negative value.
    pub async fn check(&self, entry: &Json) -> StatusCheck {
        self.check_at(entry, Utc::now()).await
    }

    pub async fn check_at(&self, entry: &Json, now: DateTime<Utc>) -> StatusCheck {
        let result = match StatusListEntry::from_json(entry) {
            Ok(entry) => self.check_entry(&entry, now).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!("status check failed: {e}");
            StatusCheck::failed(&e)
        })
    }

    async fn check_entry(
        &self,
        entry: &StatusListEntry,
        now: DateTime<Utc>,
    ) -> Result<StatusCheck, StatusListError> {
        let list = self.status_list(entry, now).await?;
        let size = list.size.or(entry.size).unwrap_or(1);
        let value = read_status(&list.bits, entry.index, size)?;
        let message = entry
            .messages
            .clone()
            .unwrap_or_else(|| default_messages(entry.list_type, entry.purpose, size))
            .remove(&value)
            .unwrap_or_else(|| value.to_string());
        debug!(
            "status {value} ({message}) at index {} of {}",
            entry.index, entry.url
        );
        Ok(StatusCheck::resolved(value, message))
    }

    async fn status_list(
        &self,
        entry: &StatusListEntry,
        now: DateTime<Utc>,
    ) -> Result<Arc<CachedStatusList>, StatusListError> {
        if let Some(list) = self.cache.get(&entry.url, now).await {
            return Ok(list);
        }

        let accept = match entry.list_type {
            StatusListType::Ietf => "application/statuslist+jwt",
            _ => "application/vc+jwt, application/jwt",
        };
        let body = get_body(self.http_client.as_ref(), &entry.url, accept)
            .await
            .map_err(|e| StatusListError::Unreachable(format!("{e:#}")))?;
        let token = String::from_utf8(body)
            .map_err(|_| StatusListError::Invalid("status list is not text".into()))?;

        let payload = self.verified_payload(token.trim()).await?;
        let (bits, size) = decode_list(entry.list_type, &payload)?;

        debug!("caching status list {} ({} bytes)", entry.url, bits.len());
        Ok(self
            .cache
            .insert(CachedStatusList {
                url: entry.url.clone(),
                list_type: entry.list_type,
                purpose: entry.purpose,
                size,
                bits,
                retrieved: now,
                expires: now + self.ttl,
            })
            .await)
    }

    async fn verified_payload(&self, token: &str) -> Result<Map<String, Json>, StatusListError> {
        let mut jwt = Jwt::decode(token).map_err(|e| StatusListError::Invalid(e.to_string()))?;
        let Some(key) = jwt.find_signing_key(self.did_resolver.as_ref()).await else {
            return Err(StatusListError::Invalid(
                "unable to find the status list signing key".into(),
            ));
        };
        if !jwt.verify(&key) {
            return Err(StatusListError::Invalid(
                "status list signature does not verify".into(),
            ));
        }
        Ok(jwt.payload)
    }

    /// Check every status entry of a credential and report one message per entry.
    pub async fn validate_status_lists(&self, entries: &[Json]) -> Vec<Message> {
        if entries.is_empty() {
            return vec![Message::new(
                codes::NO_STATUS_LIST,
                "credential does not implement a status list",
            )];
        }

        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            let check = self.check(entry).await;
            let code = match check.code.as_str() {
                StatusCheck::OK => codes::STATUS_LIST_VALID,
                StatusCheck::REVOKED => codes::STATUS_LIST_REVOKED,
                StatusCheck::SUSPENDED => codes::STATUS_LIST_SUSPENDED,
                StatusCheck::STATUS_SET => codes::STATUS_LIST_MESSAGE,
                _ => codes::STATUS_LIST_INVALID,
            };
            messages.push(Message::new(code, check.message).with("value", check.value));
        }
        messages
    }
}
