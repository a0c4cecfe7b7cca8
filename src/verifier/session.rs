use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::rp::RpSession;

/// Storage interface for session information, keyed by `state`.
#[async_trait]
pub trait SessionStore: Debug {
    /// Get a session that has not expired yet.
    async fn get(&self, state: &str) -> Result<Option<RpSession>>;

    /// Insert or replace a session.
    async fn set(&self, session: RpSession) -> Result<()>;

    async fn remove(&self, state: &str) -> Result<()>;

    /// Drop every session that expired before `now`, returning how many were dropped.
    async fn clear_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// A local in-memory store.
///
/// # Warning
/// This in-memory store will not work for a distributed deployment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<BTreeMap<String, RpSession>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, state: &str) -> Result<Option<RpSession>> {
        Ok(self
            .store
            .lock()
            .await
            .get(state)
            .filter(|session| !session.is_expired(Utc::now()))
            .cloned())
    }

    async fn set(&self, session: RpSession) -> Result<()> {
        self.store
            .lock()
            .await
            .insert(session.state.clone(), session);
        Ok(())
    }

    async fn remove(&self, state: &str) -> Result<()> {
        self.store.lock().await.remove(state);
        Ok(())
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut store = self.store.lock().await;
        let before = store.len();
        store.retain(|_, session| !session.is_expired(now));
        Ok(before - store.len())
    }
}
