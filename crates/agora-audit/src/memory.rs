use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entry::{AuditEntry, verify_chain};
use crate::traits::AuditLog;
use agora_types::{JobId, MarketEvent, Result};

/// In-memory audit log (default).
#[derive(Debug, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    index_by_id: Arc<DashMap<Uuid, usize>>,
    index_by_job: Arc<DashMap<JobId, Vec<usize>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            index_by_id: Arc::new(DashMap::new()),
            index_by_job: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, event: &MarketEvent) -> Result<AuditEntry> {
        let mut entries = self.entries.write().await;
        let idx = entries.len();
        let previous = entries.last().map(|e| e.hash.clone());
        let entry = AuditEntry::from_event(event, idx as u64, previous)?;

        self.index_by_id.insert(entry.id, idx);
        if let Some(job_id) = entry.job_id {
            self.index_by_job.entry(job_id).or_default().push(idx);
        }

        entries.push(entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(self
            .index_by_id
            .get(&id)
            .and_then(|idx| entries.get(*idx).cloned()))
    }

    async fn latest_hash(&self) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.last().map(|e| e.hash.clone()))
    }

    async fn query_by_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(self
            .index_by_job
            .get(&job_id)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|i| entries.get(*i).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query_by_kind(&self, kind: &str) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.kind == kind).cloned().collect())
    }

    async fn all_entries(&self) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn verify_integrity(&self) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(verify_chain(&entries))
    }
}
