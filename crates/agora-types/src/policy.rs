use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{AgoraError, Result};

/// Fee/tax terms that participants must acknowledge before moving funds.
///
/// Bumping the version invalidates every earlier acknowledgement.
#[derive(Debug)]
pub struct TaxPolicy {
    version: AtomicU64,
    uri: parking_lot::RwLock<String>,
    acknowledged: DashMap<Uuid, u64>,
}

impl TaxPolicy {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            version: AtomicU64::new(1),
            uri: parking_lot::RwLock::new(uri.into()),
            acknowledged: DashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn uri(&self) -> String {
        self.uri.read().clone()
    }

    pub fn acknowledge(&self, who: Uuid) -> u64 {
        let version = self.version();
        self.acknowledged.insert(who, version);
        version
    }

    pub fn has_acknowledged(&self, who: Uuid) -> bool {
        self.acknowledged
            .get(&who)
            .is_some_and(|v| *v == self.version())
    }

    pub fn ensure_acknowledged(&self, who: Uuid) -> Result<()> {
        if self.has_acknowledged(who) {
            Ok(())
        } else {
            Err(AgoraError::TaxPolicyNotAcknowledged(who))
        }
    }

    /// Publish new terms.
    pub fn bump_version(&self, uri: impl Into<String>) -> u64 {
        *self.uri.write() = uri.into();
        let next = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(version = next, "tax policy updated");
        next
    }
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self::new("")
    }
}
