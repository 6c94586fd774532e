use async_trait::async_trait;
use rs_merkle::{Hasher, MerkleTree, algorithms::Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entry::{AuditEntry, verify_chain};
use crate::traits::AuditLog;
use agora_types::{JobId, MarketEvent, Result};

/// Merkle tree-backed audit log; supports inclusion proofs for individual entries.
#[derive(Clone)]
pub struct MerkleAuditLog {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    entries: Vec<AuditEntry>,
    tree: MerkleTree<Sha256>,
}

impl MerkleAuditLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: Vec::new(),
                tree: MerkleTree::<Sha256>::new(),
            })),
        }
    }

    /// Get the Merkle root hash.
    pub async fn root_hex(&self) -> Option<String> {
        self.inner.read().await.tree.root_hex()
    }

    /// Generate an inclusion proof for the entry at `index`.
    pub async fn proof(&self, index: usize) -> Option<Vec<u8>> {
        let inner = self.inner.read().await;
        if index >= inner.entries.len() {
            return None;
        }
        Some(inner.tree.proof(&[index]).to_bytes())
    }
}

impl Default for MerkleAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_to_leaf(entry: &AuditEntry) -> [u8; 32] {
    let data = format!("{}:{}", entry.id, entry.hash);
    Sha256::hash(data.as_bytes())
}

#[async_trait]
impl AuditLog for MerkleAuditLog {
    async fn record(&self, event: &MarketEvent) -> Result<AuditEntry> {
        let mut inner = self.inner.write().await;
        let sequence = inner.entries.len() as u64;
        let previous = inner.entries.last().map(|e| e.hash.clone());
        let entry = AuditEntry::from_event(event, sequence, previous)?;

        inner.tree.insert(entry_to_leaf(&entry));
        inner.tree.commit();
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn latest_hash(&self) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.entries.last().map(|e| e.hash.clone()))
    }

    async fn query_by_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn query_by_kind(&self, kind: &str) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.inner.read().await.entries.clone())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.read().await.entries.len())
    }

    async fn verify_integrity(&self) -> Result<bool> {
        let inner = self.inner.read().await;
        if inner.entries.is_empty() {
            return Ok(true);
        }
        if !verify_chain(&inner.entries) {
            return Ok(false);
        }

        let leaves: Vec<[u8; 32]> = inner.entries.iter().map(entry_to_leaf).collect();
        let indices: Vec<usize> = (0..inner.entries.len()).collect();
        match inner.tree.root() {
            Some(root) => {
                let proof = inner.tree.proof(&indices);
                Ok(proof.verify(root, &indices, &leaves, leaves.len()))
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_merkle_record_and_root() {
        let log = MerkleAuditLog::new();
        assert!(log.root_hex().await.is_none());

        log.record(&MarketEvent::JobCancelled { job_id: 1 })
            .await
            .unwrap();
        assert!(log.root_hex().await.is_some());
        assert!(log.proof(0).await.is_some());
        assert!(log.proof(1).await.is_none());
    }

    #[tokio::test]
    async fn test_merkle_integrity() {
        let log = MerkleAuditLog::new();
        for job_id in 0..5 {
            log.record(&MarketEvent::JobCancelled { job_id })
                .await
                .unwrap();
        }
        assert!(log.verify_integrity().await.unwrap());
        assert_eq!(log.query_by_job(3).await.unwrap().len(), 1);
    }
}
