use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use agora_types::{AgoraError, JobId, MarketEvent, Result};

/// An immutable, hash-chained audit record of one market event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub job_id: Option<JobId>,
    pub actor: Option<Uuid>,
    pub payload: serde_json::Value,
    pub previous_hash: Option<String>,
    pub hash: String,
}

impl AuditEntry {
    pub fn new(
        sequence: u64,
        kind: impl Into<String>,
        job_id: Option<JobId>,
        actor: Option<Uuid>,
        payload: serde_json::Value,
        previous_hash: Option<String>,
    ) -> Self {
        let mut entry = Self {
            id: Uuid::new_v4(),
            sequence,
            kind: kind.into(),
            timestamp: Utc::now(),
            job_id,
            actor,
            payload,
            previous_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    pub fn from_event(
        event: &MarketEvent,
        sequence: u64,
        previous_hash: Option<String>,
    ) -> Result<Self> {
        let payload =
            serde_json::to_value(event).map_err(|e| AgoraError::Serialization(e.to_string()))?;
        Ok(Self::new(
            sequence,
            event.kind(),
            event.job_id(),
            event.actor(),
            payload,
            previous_hash,
        ))
    }

    /// SHA-256 over every field except the hash itself.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.kind.as_bytes());
        hasher.update(
            self.timestamp
                .timestamp_nanos_opt()
                .unwrap_or(0)
                .to_be_bytes(),
        );
        hasher.update(self.job_id.unwrap_or(0).to_be_bytes());
        hasher.update(self.actor.unwrap_or_default().as_bytes());
        hasher.update(self.payload.to_string().as_bytes());
        hasher.update(self.previous_hash.as_deref().unwrap_or("genesis").as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }
}

/// Check links and self-hashes of an ordered slice of entries.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    for (i, entry) in entries.iter().enumerate() {
        if !entry.verify_hash() || entry.sequence != i as u64 {
            return false;
        }
        let expected = if i == 0 {
            None
        } else {
            Some(&entries[i - 1].hash)
        };
        if entry.previous_hash.as_ref() != expected {
            return false;
        }
    }
    true
}
