use async_trait::async_trait;
use uuid::Uuid;

use crate::entry::AuditEntry;
use agora_types::{JobId, MarketEvent, Result};

/// Append-only audit trail of market events.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Chain the event onto the latest entry and append it atomically.
    async fn record(&self, event: &MarketEvent) -> Result<AuditEntry>;

    /// Get an entry by its ID.
    async fn get(&self, id: Uuid) -> Result<Option<AuditEntry>>;

    /// Get the latest entry hash.
    async fn latest_hash(&self) -> Result<Option<String>>;

    async fn query_by_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>>;

    async fn query_by_kind(&self, kind: &str) -> Result<Vec<AuditEntry>>;

    /// Get all entries (for auditing).
    async fn all_entries(&self) -> Result<Vec<AuditEntry>>;

    async fn len(&self) -> Result<usize>;

    /// Verify the chain integrity.
    async fn verify_integrity(&self) -> Result<bool>;
}
