use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::{
    AgoraError, EventSink, Hash32, HashBuilder, Job, JobId, MarketEvent, Result, Role,
};

use crate::engine::{CaseSummary, DisputeContext, DisputeEngine};

pub const COMMITTEE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeConfig {
    #[serde(default = "default_window")]
    pub commit_window: u64,
    #[serde(default = "default_window")]
    pub reveal_window: u64,
    /// Fixed stake amount slashed from a juror who does not reveal.
    #[serde(default)]
    pub absentee_slash: u64,
}

fn default_window() -> u64 {
    86_400
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            commit_window: default_window(),
            reveal_window: default_window(),
            absentee_slash: 0,
        }
    }
}

pub fn juror_commitment(juror: &Uuid, job_id: JobId, favor_employer: bool, salt: &Hash32) -> Hash32 {
    HashBuilder::new("agora.dispute.commit")
        .uuid(juror)
        .u64(job_id)
        .bool(favor_employer)
        .hash(salt)
        .finish()
}

#[derive(Debug, Clone)]
struct Case {
    employer: Uuid,
    raised_by: Uuid,
    evidence: Hash32,
    jurors: Vec<Uuid>,
    commit_deadline: u64,
    reveal_deadline: u64,
    commits: HashMap<Uuid, Hash32>,
    votes: HashMap<Uuid, bool>,
    verdict: Option<bool>,
}

impl Case {
    fn summary(&self, job_id: JobId) -> CaseSummary {
        CaseSummary {
            job_id,
            raised_by: self.raised_by,
            evidence: self.evidence,
            commit_deadline: self.commit_deadline,
            reveal_deadline: self.reveal_deadline,
            committed: self.commits.len(),
            revealed: self.votes.len(),
            favor_employer: self.verdict,
        }
    }
}

/// Fixed committee of jurors voting by commit-reveal. The juror set is snapshotted per case.
pub struct ArbitratorCommittee {
    governance: Uuid,
    config: RwLock<CommitteeConfig>,
    jurors: RwLock<Vec<Uuid>>,
    paused: AtomicBool,
    cases: DashMap<JobId, Case>,
    events: Arc<dyn EventSink>,
}

impl ArbitratorCommittee {
    pub fn new(config: CommitteeConfig, governance: Uuid, jurors: Vec<Uuid>, events: Arc<dyn EventSink>) -> Self {
        Self {
            governance,
            config: RwLock::new(config),
            jurors: RwLock::new(jurors),
            paused: AtomicBool::new(false),
            cases: DashMap::new(),
            events,
        }
    }

    fn ensure_governance(&self, caller: Uuid) -> Result<()> {
        if caller != self.governance {
            return Err(AgoraError::Unauthorized("committee governance".into()));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.paused.load(Ordering::SeqCst) {
            return Err(AgoraError::Paused);
        }
        Ok(())
    }

    pub fn jurors(&self) -> Vec<Uuid> {
        self.jurors.read().clone()
    }

    /// Applies to cases opened afterwards.
    pub fn set_jurors(&self, caller: Uuid, jurors: Vec<Uuid>) -> Result<()> {
        self.ensure_governance(caller)?;
        *self.jurors.write() = jurors;
        Ok(())
    }

    pub fn set_config(&self, caller: Uuid, config: CommitteeConfig) -> Result<()> {
        self.ensure_governance(caller)?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause(&self, caller: Uuid) -> Result<()> {
        self.ensure_governance(caller)?;
        if !self.paused.swap(true, Ordering::SeqCst) {
            self.events.emit(MarketEvent::Paused {
                module: "dispute".into(),
            });
            warn!("dispute committee paused");
        }
        Ok(())
    }

    pub fn unpause(&self, caller: Uuid) -> Result<()> {
        self.ensure_governance(caller)?;
        if self.paused.swap(false, Ordering::SeqCst) {
            self.events.emit(MarketEvent::Unpaused {
                module: "dispute".into(),
            });
            info!("dispute committee unpaused");
        }
        Ok(())
    }
}

impl DisputeEngine for ArbitratorCommittee {
    fn version(&self) -> u32 {
        COMMITTEE_VERSION
    }

    fn open(&self, ctx: &DisputeContext<'_>, job: &Job, raised_by: Uuid, evidence: Hash32) -> Result<()> {
        self.ensure_active()?;
        if self.cases.get(&job.id).is_some_and(|c| c.verdict.is_none()) {
            return Err(AgoraError::DisputeAlreadyOpen(job.id));
        }
        let jurors = self.jurors();
        if jurors.is_empty() {
            return Err(AgoraError::InsufficientValidators {
                required: 1,
                available: 0,
            });
        }
        let config = self.config.read().clone();
        let commit_deadline = ctx.now.saturating_add(config.commit_window);
        self.cases.insert(
            job.id,
            Case {
                employer: job.employer,
                raised_by,
                evidence,
                jurors,
                commit_deadline,
                reveal_deadline: commit_deadline.saturating_add(config.reveal_window),
                commits: HashMap::new(),
                votes: HashMap::new(),
                verdict: None,
            },
        );
        info!(job_id = job.id, %raised_by, "dispute case opened");
        Ok(())
    }

    fn commit(&self, ctx: &DisputeContext<'_>, job_id: JobId, juror: Uuid, commitment: Hash32) -> Result<()> {
        self.ensure_active()?;
        let mut case = self
            .cases
            .get_mut(&job_id)
            .ok_or(AgoraError::DisputeNotFound(job_id))?;
        if !case.jurors.contains(&juror) {
            return Err(AgoraError::NotJuror(juror));
        }
        if case.verdict.is_some() || ctx.now >= case.commit_deadline {
            return Err(AgoraError::CommitPhaseClosed);
        }
        if case.commits.contains_key(&juror) {
            return Err(AgoraError::AlreadyCommitted);
        }
        case.commits.insert(juror, commitment);
        drop(case);

        self.events.emit(MarketEvent::JurorCommitted { job_id, juror });
        Ok(())
    }

    fn reveal(
        &self,
        ctx: &DisputeContext<'_>,
        job_id: JobId,
        juror: Uuid,
        favor_employer: bool,
        salt: Hash32,
    ) -> Result<()> {
        self.ensure_active()?;
        let mut case = self
            .cases
            .get_mut(&job_id)
            .ok_or(AgoraError::DisputeNotFound(job_id))?;
        if !case.jurors.contains(&juror) {
            return Err(AgoraError::NotJuror(juror));
        }
        if case.verdict.is_some() || ctx.now >= case.reveal_deadline {
            return Err(AgoraError::RevealPhaseClosed);
        }
        if ctx.now < case.commit_deadline && case.commits.len() < case.jurors.len() {
            return Err(AgoraError::CommitPhaseActive);
        }
        let committed = *case.commits.get(&juror).ok_or(AgoraError::NotCommitted)?;
        if case.votes.contains_key(&juror) {
            return Err(AgoraError::AlreadyRevealed);
        }
        if juror_commitment(&juror, job_id, favor_employer, &salt) != committed {
            return Err(AgoraError::InvalidReveal);
        }
        case.votes.insert(juror, favor_employer);
        drop(case);

        self.events.emit(MarketEvent::JurorRevealed { job_id, juror });
        Ok(())
    }

    /// Majority of revealed votes; a tie favors the agent. Jurors that did not reveal lose
    /// the configured fixed slash, capped at their stake.
    fn finalize(&self, ctx: &DisputeContext<'_>, job: &Job) -> Result<bool> {
        self.ensure_active()?;
        let case = self
            .cases
            .get(&job.id)
            .map(|c| c.value().clone())
            .ok_or(AgoraError::DisputeNotFound(job.id))?;
        if case.verdict.is_some() {
            return Err(AgoraError::AlreadyResolved(job.id));
        }
        if case.votes.len() < case.jurors.len() && ctx.now < case.reveal_deadline {
            return Err(AgoraError::DeadlineNotReached);
        }

        let absentee_slash = self.config.read().absentee_slash;
        for juror in case.jurors.iter().filter(|j| !case.votes.contains_key(j)) {
            let amount = absentee_slash.min(ctx.stake.stake_of(*juror, Role::Validator));
            if amount == 0 {
                continue;
            }
            ctx.stake
                .slash(*juror, Role::Validator, amount, case.employer, &[])?;
            self.events.emit(MarketEvent::JurorSlashed {
                job_id: job.id,
                juror: *juror,
                amount,
                employer: case.employer,
            });
            warn!(job_id = job.id, %juror, amount, "absent juror slashed");
        }

        let for_employer = case.votes.values().filter(|v| **v).count();
        let for_agent = case.votes.len() - for_employer;
        let favor_employer = for_employer > for_agent;
        if let Some(mut stored) = self.cases.get_mut(&job.id) {
            stored.verdict = Some(favor_employer);
        }
        info!(job_id = job.id, for_employer, for_agent, favor_employer, "committee verdict");
        Ok(favor_employer)
    }

    fn case(&self, job_id: JobId) -> Option<CaseSummary> {
        self.cases.get(&job_id).map(|c| c.summary(job_id))
    }

    fn close(&self, job_id: JobId) {
        self.cases.remove(&job_id);
    }
}
