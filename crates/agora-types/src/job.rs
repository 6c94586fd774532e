use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgoraError, Result};
use crate::hash::Hash32;

pub type JobId = u64;

/// Multiplier percentage meaning "no bonus".
pub const BASE_PCT: u32 = 100;

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Applied,
    Submitted,
    Completed,
    Disputed,
    Finalized,
    Expired,
    Cancelled,
}

/// Events that drive job state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobEvent {
    Apply,
    Submit,
    Complete,
    Dispute,
    Finalize,
    Cancel,
    Expire,
}

impl JobState {
    /// Attempt a state transition given an event.
    pub fn transition(self, event: JobEvent) -> Result<JobState> {
        match (self, event) {
            (JobState::Created, JobEvent::Apply) => Ok(JobState::Applied),
            (JobState::Applied, JobEvent::Submit) => Ok(JobState::Submitted),

            // Validation outcome
            (JobState::Submitted, JobEvent::Complete) => Ok(JobState::Completed),
            (JobState::Submitted, JobEvent::Dispute) => Ok(JobState::Disputed),
            (JobState::Completed, JobEvent::Dispute) => Ok(JobState::Disputed),

            // Settlement
            (JobState::Completed, JobEvent::Finalize) => Ok(JobState::Finalized),
            (JobState::Disputed, JobEvent::Finalize) => Ok(JobState::Finalized),

            // Side exits
            (JobState::Created | JobState::Applied, JobEvent::Cancel) => Ok(JobState::Cancelled),
            (JobState::Applied | JobState::Submitted, JobEvent::Expire) => Ok(JobState::Expired),

            (state, event) => Err(AgoraError::InvalidStateTransition { from: state, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Finalized | JobState::Expired | JobState::Cancelled
        )
    }
}

/// Result of a validation tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Approved,
    Rejected,
    Disputed,
}

/// A validator's decided vote, kept on the job so settlement never depends on module state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorVote {
    pub validator: Uuid,
    pub approve: bool,
}

/// Employer-submitted evidence of an off-ledger fee burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnReceipt {
    pub burn_tx: Hash32,
    pub amount: u64,
    pub block: u64,
    pub submitted_at: u64,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeStatus {
    pub raised_by: Uuid,
    pub evidence: Hash32,
    pub raised_at: u64,
    /// `Some(true)` when resolved for the employer, `Some(false)` for the agent.
    pub favor_employer: Option<bool>,
    pub overridden: bool,
}

impl DisputeStatus {
    pub fn is_resolved(&self) -> bool {
        self.favor_employer.is_some()
    }
}

/// The canonical job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub employer: Uuid,
    pub agent: Option<Uuid>,
    pub reward: u64,
    pub fee: u64,
    /// Agent collateral locked at assignment.
    pub stake: u64,
    pub escrowed: u64,
    pub state: JobState,
    pub success: bool,
    /// Outcome reached without any validator reveal; settles without penalties.
    pub forced: bool,
    pub deadline: u64,
    pub created_at: u64,
    pub assigned_at: Option<u64>,
    pub outcome_at: Option<u64>,
    pub spec_hash: Hash32,
    pub uri: String,
    pub result_hash: Option<Hash32>,
    pub result_uri: Option<String>,
    /// Bonus multiplier captured at assignment.
    pub agent_pct: u32,
    pub validation_nonce: u64,
    pub validation_start_pending: bool,
    pub validators: Vec<Uuid>,
    pub votes: Vec<ValidatorVote>,
    pub burn_receipt: Option<BurnReceipt>,
    pub dispute: Option<DisputeStatus>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        employer: Uuid,
        reward: u64,
        fee: u64,
        stake: u64,
        deadline: u64,
        spec_hash: Hash32,
        uri: impl Into<String>,
        now: u64,
    ) -> Self {
        Self {
            id,
            employer,
            agent: None,
            reward,
            fee,
            stake,
            escrowed: reward.saturating_add(fee),
            state: JobState::Created,
            success: false,
            forced: false,
            deadline,
            created_at: now,
            assigned_at: None,
            outcome_at: None,
            spec_hash,
            uri: uri.into(),
            result_hash: None,
            result_uri: None,
            agent_pct: BASE_PCT,
            validation_nonce: 0,
            validation_start_pending: false,
            validators: Vec::new(),
            votes: Vec::new(),
            burn_receipt: None,
            dispute: None,
        }
    }

    /// Apply an event, transitioning the state machine.
    pub fn apply_event(&mut self, event: JobEvent) -> Result<()> {
        self.state = self.state.transition(event)?;
        Ok(())
    }

    /// Check a transition without applying it.
    pub fn ensure(&self, event: JobEvent) -> Result<JobState> {
        self.state.transition(event)
    }

    pub fn burn_confirmed(&self) -> bool {
        self.burn_receipt.as_ref().is_some_and(|r| r.confirmed)
    }

    pub fn vote_of(&self, validator: Uuid) -> Option<bool> {
        self.votes
            .iter()
            .find(|v| v.validator == validator)
            .map(|v| v.approve)
    }
}
