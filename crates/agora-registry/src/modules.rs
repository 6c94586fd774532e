use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use agora_dispute::DisputeEngine;
use agora_stake::StakeManager;
use agora_types::{AgoraError, JobId, ReputationRegistry, Result};
use agora_validation::ValidationEngine;

/// Module interface versions this registry speaks.
pub const VALIDATION_INTERFACE_VERSION: u32 = 1;
pub const DISPUTE_INTERFACE_VERSION: u32 = 1;

/// Receives successful completions, e.g. to mint a credential. Its outcome never affects
/// settlement.
pub trait CertificateSink: Send + Sync {
    fn job_completed(&self, job_id: JobId, agent: Uuid);
}

/// Certificate sink that records what it was told.
#[derive(Debug, Default)]
pub struct CertificateLog {
    issued: Mutex<Vec<(JobId, Uuid)>>,
}

impl CertificateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<(JobId, Uuid)> {
        self.issued.lock().clone()
    }
}

impl CertificateSink for CertificateLog {
    fn job_completed(&self, job_id: JobId, agent: Uuid) {
        self.issued.lock().push((job_id, agent));
    }
}

/// The swappable collaborators the registry orchestrates. Cloning copies the pointers, so a
/// call works against one consistent set even if governance swaps a module meanwhile.
#[derive(Clone)]
pub struct Modules {
    pub stake: Arc<StakeManager>,
    pub validation: Arc<dyn ValidationEngine>,
    pub dispute: Arc<dyn DisputeEngine>,
    pub reputation: Arc<dyn ReputationRegistry>,
}

impl Modules {
    pub fn new(
        stake: Arc<StakeManager>,
        validation: Arc<dyn ValidationEngine>,
        dispute: Arc<dyn DisputeEngine>,
        reputation: Arc<dyn ReputationRegistry>,
    ) -> Result<Self> {
        check_version("validation", validation.version(), VALIDATION_INTERFACE_VERSION)?;
        check_version("dispute", dispute.version(), DISPUTE_INTERFACE_VERSION)?;
        Ok(Self {
            stake,
            validation,
            dispute,
            reputation,
        })
    }
}

pub(crate) fn check_version(module: &str, got: u32, expected: u32) -> Result<()> {
    if got != expected {
        return Err(AgoraError::InvalidModule(format!(
            "{module} module version {got}, expected {expected}"
        )));
    }
    Ok(())
}
