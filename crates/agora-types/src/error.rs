use thiserror::Error;
use uuid::Uuid;

use crate::job::{JobEvent, JobId, JobState};
use crate::role::Role;

/// Coarse classification of failures. Callers use it to decide how to surface an error
/// (the HTTP layer maps it onto status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Authorization,
    State,
    Economic,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum AgoraError {
    // Authorization
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Only the employer of job {0} may do this")]
    OnlyEmployer(JobId),

    #[error("Only the assigned agent of job {0} may do this")]
    OnlyAgent(JobId),

    #[error("Account {0} is blacklisted")]
    Blacklisted(Uuid),

    #[error("Agent {0} is not authorized")]
    UnauthorizedAgent(Uuid),

    #[error("Validator {0} is not authorized")]
    UnauthorizedValidator(Uuid),

    #[error("Validator {validator} is not selected for job {job_id}")]
    NotSelected { job_id: JobId, validator: Uuid },

    #[error("Validator {validator} is banned until {until}")]
    ValidatorBanned { validator: Uuid, until: u64 },

    #[error("{0} is not a juror")]
    NotJuror(Uuid),

    #[error("Tax policy not acknowledged by {0}")]
    TaxPolicyNotAcknowledged(Uuid),

    // State
    #[error("State transition error: cannot transition from {from:?} via {event:?}")]
    InvalidStateTransition { from: JobState, event: JobEvent },

    #[error("Commit phase closed")]
    CommitPhaseClosed,

    #[error("Commit phase still active")]
    CommitPhaseActive,

    #[error("Reveal phase closed")]
    RevealPhaseClosed,

    #[error("Reveal pending for job {0}")]
    RevealPending(JobId),

    #[error("Round for job {0} has reveals; finalize it instead")]
    RoundHasReveals(JobId),

    #[error("Already committed")]
    AlreadyCommitted,

    #[error("Already revealed")]
    AlreadyRevealed,

    #[error("No commitment on record")]
    NotCommitted,

    #[error("Reveal does not match commitment")]
    InvalidReveal,

    #[error("Stale round nonce: expected {expected}, got {got}")]
    StaleNonce { expected: u64, got: u64 },

    #[error("Insufficient validators: need {required}, have {available}")]
    InsufficientValidators { required: usize, available: usize },

    #[error("Burn evidence incomplete for job {0}")]
    BurnEvidenceIncomplete(JobId),

    #[error("Randomness for this tag is not available yet")]
    RandomnessPending,

    #[error("Deadline not reached")]
    DeadlineNotReached,

    #[error("Deadline passed")]
    DeadlinePassed,

    #[error("Paused")]
    Paused,

    #[error("Dispute for job {0} already resolved")]
    AlreadyResolved(JobId),

    #[error("Dispute for job {0} is not resolved")]
    DisputeUnresolved(JobId),

    #[error("Dispute already open for job {0}")]
    DisputeAlreadyOpen(JobId),

    #[error("Reentrant call rejected")]
    ReentrantCall,

    #[error("Unbond locked until {unlock_at}")]
    UnbondLocked { unlock_at: u64 },

    #[error("Withdrawal must go through the unbonding queue")]
    UnbondingRequired,

    #[error("No pending withdrawal")]
    NoPendingWithdrawal,

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    // Economic
    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Insufficient stake for {holder} ({role:?}): have {available}, need {required}")]
    InsufficientStake {
        holder: Uuid,
        role: Role,
        available: u64,
        required: u64,
    },

    #[error("Insufficient locked stake")]
    InsufficientLocked,

    #[error("Insufficient balance for {account}: have {available}, need {required}")]
    InsufficientBalance {
        account: Uuid,
        available: u64,
        required: u64,
    },

    #[error("Insufficient escrow for job {job_id}: have {available}, need {required}")]
    InsufficientEscrow {
        job_id: JobId,
        available: u64,
        required: u64,
    },

    #[error("Resulting stake {0} below minimum")]
    BelowMinimumStake(u64),

    #[error("Resulting stake {0} above maximum")]
    AboveMaximumStake(u64),

    #[error("Reward {reward} above cap {cap}")]
    RewardAboveCap { reward: u64, cap: u64 },

    #[error("Duration above cap")]
    DurationAboveCap,

    #[error("Agent {0} has too many active jobs")]
    MaxActiveJobs(Uuid),

    #[error("Invalid percentage")]
    InvalidPercentage,

    #[error("Invalid recipient")]
    InvalidRecipient,

    #[error("Invalid treasury")]
    InvalidTreasury,

    #[error("Invalid validator bounds")]
    InvalidValidatorBounds,

    // Lookup
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("No validation round for job {0}")]
    RoundNotFound(JobId),

    #[error("No dispute for job {0}")]
    DisputeNotFound(JobId),

    // Wiring
    #[error("Module not set: {0}")]
    ModuleNotSet(&'static str),

    #[error("Invalid module: {0}")]
    InvalidModule(String),

    #[error("Module in use: {0}")]
    ModuleInUse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgoraError {
    pub fn class(&self) -> ErrorClass {
        use AgoraError::*;
        match self {
            Unauthorized(_)
            | OnlyEmployer(_)
            | OnlyAgent(_)
            | Blacklisted(_)
            | UnauthorizedAgent(_)
            | UnauthorizedValidator(_)
            | NotSelected { .. }
            | ValidatorBanned { .. }
            | NotJuror(_)
            | TaxPolicyNotAcknowledged(_) => ErrorClass::Authorization,

            InvalidAmount
            | InsufficientStake { .. }
            | InsufficientLocked
            | InsufficientBalance { .. }
            | InsufficientEscrow { .. }
            | BelowMinimumStake(_)
            | AboveMaximumStake(_)
            | RewardAboveCap { .. }
            | DurationAboveCap
            | MaxActiveJobs(_)
            | InvalidPercentage
            | InvalidRecipient
            | InvalidTreasury
            | InvalidValidatorBounds => ErrorClass::Economic,

            JobNotFound(_) | RoundNotFound(_) | DisputeNotFound(_) => ErrorClass::NotFound,

            ModuleNotSet(_) | Serialization(_) | Internal(_) => ErrorClass::Internal,

            _ => ErrorClass::State,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgoraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(AgoraError::OnlyEmployer(1).class(), ErrorClass::Authorization);
        assert_eq!(AgoraError::CommitPhaseClosed.class(), ErrorClass::State);
        assert_eq!(AgoraError::InvalidAmount.class(), ErrorClass::Economic);
        assert_eq!(AgoraError::JobNotFound(7).class(), ErrorClass::NotFound);
        assert_eq!(
            AgoraError::InvalidStateTransition {
                from: JobState::Applied,
                event: JobEvent::Apply,
            }
            .class(),
            ErrorClass::State
        );
    }
}
