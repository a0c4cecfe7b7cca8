use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::{Config, PresentationRecord};

/// Read access to the stored presentation requests, keyed by their short id.
#[async_trait]
pub trait PresentationStore: Debug {
    async fn get(&self, id: &str) -> Result<Option<PresentationRecord>>;
}

/// Presentation requests held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresentationStore {
    records: Arc<RwLock<BTreeMap<String, PresentationRecord>>>,
}

impl MemoryPresentationStore {
    pub fn new(records: impl IntoIterator<Item = PresentationRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.presentations.iter().cloned())
    }

    /// Add or replace a record.
    pub async fn insert(&self, record: PresentationRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl PresentationStore for MemoryPresentationStore {
    async fn get(&self, id: &str) -> Result<Option<PresentationRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }
}
