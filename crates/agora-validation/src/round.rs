use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_types::{Hash32, JobId, ValidationOutcome};

/// Where a round stands at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    Commit,
    Reveal,
    /// Reveal window closed, waiting for `finalize`.
    Tally,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reveal {
    pub approve: bool,
    pub burn_tx: Hash32,
    /// Validator stake when the reveal was accepted.
    pub weight: u64,
}

/// One commit-reveal round, keyed by job and nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRound {
    pub job_id: JobId,
    pub nonce: u64,
    pub seed: Hash32,
    pub validators: Vec<Uuid>,
    pub commit_deadline: u64,
    pub reveal_deadline: u64,
    pub commits: HashMap<Uuid, Hash32>,
    pub reveals: HashMap<Uuid, Reveal>,
    pub outcome: Option<ValidationOutcome>,
}

impl ValidationRound {
    pub fn new(
        job_id: JobId,
        nonce: u64,
        seed: Hash32,
        validators: Vec<Uuid>,
        commit_deadline: u64,
        reveal_deadline: u64,
    ) -> Self {
        Self {
            job_id,
            nonce,
            seed,
            validators,
            commit_deadline,
            reveal_deadline,
            commits: HashMap::new(),
            reveals: HashMap::new(),
            outcome: None,
        }
    }

    pub fn is_selected(&self, validator: Uuid) -> bool {
        self.validators.contains(&validator)
    }

    pub fn all_committed(&self) -> bool {
        self.commits.len() == self.validators.len()
    }

    pub fn all_revealed(&self) -> bool {
        self.reveals.len() == self.validators.len()
    }

    /// Reveals open at the commit deadline, or as soon as everyone has committed.
    pub fn reveal_open(&self, now: u64) -> bool {
        now >= self.commit_deadline || self.all_committed()
    }

    pub fn phase(&self, now: u64) -> RoundPhase {
        if self.outcome.is_some() {
            RoundPhase::Finalized
        } else if now >= self.reveal_deadline {
            RoundPhase::Tally
        } else if self.reveal_open(now) {
            RoundPhase::Reveal
        } else {
            RoundPhase::Commit
        }
    }

    /// Validators that committed but never revealed, in selection order.
    pub fn absentees(&self) -> Vec<Uuid> {
        self.validators
            .iter()
            .filter(|v| self.commits.contains_key(v) && !self.reveals.contains_key(v))
            .copied()
            .collect()
    }

    pub fn summary(&self, now: u64) -> RoundSummary {
        RoundSummary {
            job_id: self.job_id,
            nonce: self.nonce,
            validators: self.validators.clone(),
            commit_deadline: self.commit_deadline,
            reveal_deadline: self.reveal_deadline,
            committed: self.commits.len(),
            revealed: self.reveals.len(),
            phase: self.phase(now),
            outcome: self.outcome,
        }
    }
}

/// Read-only view of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub job_id: JobId,
    pub nonce: u64,
    pub validators: Vec<Uuid>,
    pub commit_deadline: u64,
    pub reveal_deadline: u64,
    pub committed: usize,
    pub revealed: usize,
    pub phase: RoundPhase,
    pub outcome: Option<ValidationOutcome>,
}
