use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_stake::StakeManager;
use agora_types::{Hash32, Job, JobId, Result};

pub struct DisputeContext<'a> {
    pub stake: &'a StakeManager,
    pub now: u64,
}

/// Public view of a dispute case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub job_id: JobId,
    pub raised_by: Uuid,
    pub evidence: Hash32,
    pub commit_deadline: u64,
    pub reveal_deadline: u64,
    pub committed: usize,
    pub revealed: usize,
    pub favor_employer: Option<bool>,
}

/// Dispute component as seen by the job registry. A verdict is `true` when it favors the
/// employer.
pub trait DisputeEngine: Send + Sync {
    fn version(&self) -> u32;

    fn open(&self, ctx: &DisputeContext<'_>, job: &Job, raised_by: Uuid, evidence: Hash32) -> Result<()>;

    fn commit(&self, ctx: &DisputeContext<'_>, job_id: JobId, juror: Uuid, commitment: Hash32) -> Result<()>;

    fn reveal(
        &self,
        ctx: &DisputeContext<'_>,
        job_id: JobId,
        juror: Uuid,
        favor_employer: bool,
        salt: Hash32,
    ) -> Result<()>;

    /// Produce the verdict for the job, once one is available.
    fn finalize(&self, ctx: &DisputeContext<'_>, job: &Job) -> Result<bool>;

    fn case(&self, job_id: JobId) -> Option<CaseSummary>;

    /// Drop the case, e.g. after governance resolved it directly.
    fn close(&self, job_id: JobId);
}
