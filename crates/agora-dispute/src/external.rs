use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use agora_types::{AgoraError, Hash32, Job, JobId, Result};

use crate::engine::{CaseSummary, DisputeContext, DisputeEngine};

pub const EXTERNAL_ARBITRATOR_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct ExternalCase {
    raised_by: Uuid,
    evidence: Hash32,
    opened_at: u64,
    verdict: Option<bool>,
}

/// Defers disputes to an off-system arbitration oracle, which delivers each verdict once.
pub struct ExternalArbitrator {
    oracle: Uuid,
    cases: DashMap<JobId, ExternalCase>,
}

impl ExternalArbitrator {
    pub fn new(oracle: Uuid) -> Self {
        Self {
            oracle,
            cases: DashMap::new(),
        }
    }

    pub fn oracle(&self) -> Uuid {
        self.oracle
    }

    /// Oracle callback carrying the ruling for `job_id`.
    pub fn deliver(&self, caller: Uuid, job_id: JobId, favor_employer: bool) -> Result<()> {
        if caller != self.oracle {
            return Err(AgoraError::Unauthorized("arbitration oracle".into()));
        }
        let mut case = self
            .cases
            .get_mut(&job_id)
            .ok_or(AgoraError::DisputeNotFound(job_id))?;
        if case.verdict.is_some() {
            return Err(AgoraError::AlreadyResolved(job_id));
        }
        case.verdict = Some(favor_employer);
        drop(case);
        info!(job_id, favor_employer, "arbitration ruling delivered");
        Ok(())
    }
}

impl DisputeEngine for ExternalArbitrator {
    fn version(&self) -> u32 {
        EXTERNAL_ARBITRATOR_VERSION
    }

    fn open(&self, ctx: &DisputeContext<'_>, job: &Job, raised_by: Uuid, evidence: Hash32) -> Result<()> {
        if self.cases.get(&job.id).is_some_and(|c| c.verdict.is_none()) {
            return Err(AgoraError::DisputeAlreadyOpen(job.id));
        }
        self.cases.insert(
            job.id,
            ExternalCase {
                raised_by,
                evidence,
                opened_at: ctx.now,
                verdict: None,
            },
        );
        info!(job_id = job.id, %raised_by, "case referred to arbitration oracle");
        Ok(())
    }

    fn commit(&self, _ctx: &DisputeContext<'_>, _job_id: JobId, _juror: Uuid, _commitment: Hash32) -> Result<()> {
        Err(AgoraError::Unsupported("external arbitration has no juror vote".into()))
    }

    fn reveal(
        &self,
        _ctx: &DisputeContext<'_>,
        _job_id: JobId,
        _juror: Uuid,
        _favor_employer: bool,
        _salt: Hash32,
    ) -> Result<()> {
        Err(AgoraError::Unsupported("external arbitration has no juror vote".into()))
    }

    fn finalize(&self, _ctx: &DisputeContext<'_>, job: &Job) -> Result<bool> {
        let case = self
            .cases
            .get(&job.id)
            .ok_or(AgoraError::DisputeNotFound(job.id))?;
        case.verdict.ok_or(AgoraError::DisputeUnresolved(job.id))
    }

    fn case(&self, job_id: JobId) -> Option<CaseSummary> {
        self.cases.get(&job_id).map(|c| CaseSummary {
            job_id,
            raised_by: c.raised_by,
            evidence: c.evidence,
            commit_deadline: c.opened_at,
            reveal_deadline: c.opened_at,
            committed: 0,
            revealed: 0,
            favor_employer: c.verdict,
        })
    }

    fn close(&self, job_id: JobId) {
        self.cases.remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use agora_stake::{InMemoryToken, StakeConfig, StakeManager};
    use agora_types::EventBuffer;

    #[test]
    fn test_oracle_delivers_once() {
        let stake = StakeManager::new(
            StakeConfig::new(Uuid::new_v4()),
            Arc::new(InMemoryToken::new()),
            Arc::new(EventBuffer::new()),
        )
        .unwrap();
        let ctx = DisputeContext { stake: &stake, now: 5 };
        let oracle = Uuid::new_v4();
        let arbitrator = ExternalArbitrator::new(oracle);
        let job = Job::new(4, Uuid::new_v4(), 10, 0, 0, 100, [0; 32], "", 0);

        arbitrator.open(&ctx, &job, job.employer, [1; 32]).unwrap();
        assert!(matches!(
            arbitrator.finalize(&ctx, &job),
            Err(AgoraError::DisputeUnresolved(4))
        ));
        assert!(matches!(
            arbitrator.deliver(Uuid::new_v4(), 4, true),
            Err(AgoraError::Unauthorized(_))
        ));
        arbitrator.deliver(oracle, 4, false).unwrap();
        assert!(matches!(
            arbitrator.deliver(oracle, 4, true),
            Err(AgoraError::AlreadyResolved(4))
        ));
        assert!(!arbitrator.finalize(&ctx, &job).unwrap());
        assert!(matches!(
            arbitrator.commit(&ctx, 4, oracle, [0; 32]),
            Err(AgoraError::Unsupported(_))
        ));
    }
}
