use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{StatusListType, StatusPurpose};

/// A decoded status list as retrieved from its URL.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedStatusList {
    pub url: String,
    pub list_type: StatusListType,
    pub purpose: StatusPurpose,
    /// Bit width declared by the list itself (IETF token status lists only).
    pub size: Option<u32>,
    pub bits: Vec<u8>,
    pub retrieved: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl CachedStatusList {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// Process-wide cache of status lists keyed by URL.
///
/// Entries are immutable once inserted; a refresh replaces the whole entry.
#[derive(Debug, Default)]
pub struct StatusListCache {
    lists: RwLock<HashMap<String, Arc<CachedStatusList>>>,
}

impl StatusListCache {
    /// The cached list for `url`, if it has not expired at `now`.
    pub async fn get(&self, url: &str, now: DateTime<Utc>) -> Option<Arc<CachedStatusList>> {
        self.lists
            .read()
            .await
            .get(url)
            .filter(|list| list.is_fresh(now))
            .cloned()
    }

    pub async fn insert(&self, list: CachedStatusList) -> Arc<CachedStatusList> {
        let list = Arc::new(list);
        self.lists
            .write()
            .await
            .insert(list.url.clone(), list.clone());
        list
    }

    pub async fn len(&self) -> usize {
        self.lists.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lists.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.lists.write().await.clear()
    }
}
