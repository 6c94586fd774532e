use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash32;
use crate::job::{JobId, ValidationOutcome};
use crate::role::Role;

/// Canonical events emitted by the marketplace core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarketEvent {
    // Jobs
    JobCreated {
        job_id: JobId,
        employer: Uuid,
        reward: u64,
        fee: u64,
        stake: u64,
        deadline: u64,
        spec_hash: Hash32,
    },
    AgentAssigned {
        job_id: JobId,
        agent: Uuid,
        agent_pct: u32,
    },
    ResultSubmitted {
        job_id: JobId,
        agent: Uuid,
        result_hash: Hash32,
    },
    JobCompleted {
        job_id: JobId,
        success: bool,
    },
    JobPayout {
        job_id: JobId,
        agent: Uuid,
        payout: u64,
        fee: u64,
        burned: u64,
    },
    JobFinalized {
        job_id: JobId,
        agent: Option<Uuid>,
    },
    JobCancelled {
        job_id: JobId,
    },
    JobExpired {
        job_id: JobId,
        caller: Uuid,
    },
    BurnReceiptSubmitted {
        job_id: JobId,
        burn_tx: Hash32,
        amount: u64,
        block: u64,
    },
    BurnConfirmed {
        job_id: JobId,
        burn_tx: Hash32,
    },
    BurnDiscrepancy {
        job_id: JobId,
        claimed: u64,
        expected: u64,
    },
    ModuleUpdated {
        module: String,
        version: u32,
    },

    // Validation
    ValidationPending {
        job_id: JobId,
    },
    ValidatorsSelected {
        job_id: JobId,
        nonce: u64,
        validators: Vec<Uuid>,
    },
    ValidationCommitted {
        job_id: JobId,
        validator: Uuid,
        commitment: Hash32,
    },
    ValidationRevealed {
        job_id: JobId,
        validator: Uuid,
        approve: bool,
    },
    ValidationTallied {
        job_id: JobId,
        nonce: u64,
        approve_weight: u64,
        total_weight: u64,
        outcome: ValidationOutcome,
    },
    ValidatorPenalized {
        job_id: JobId,
        validator: Uuid,
        amount: u64,
        banned_until: u64,
    },

    // Disputes
    DisputeRaised {
        job_id: JobId,
        raised_by: Uuid,
        evidence: Hash32,
    },
    /// The dispute module refused the case; only governance can resolve the job.
    DisputeUnassigned {
        job_id: JobId,
        reason: String,
    },
    DisputeResolved {
        job_id: JobId,
        favor_employer: bool,
    },
    GovernanceOverride {
        job_id: JobId,
        governance: Uuid,
        favor_employer: bool,
        reason: String,
    },
    JurorCommitted {
        job_id: JobId,
        juror: Uuid,
    },
    JurorRevealed {
        job_id: JobId,
        juror: Uuid,
    },
    JurorSlashed {
        job_id: JobId,
        juror: Uuid,
        amount: u64,
        employer: Uuid,
    },
    Paused {
        module: String,
    },
    Unpaused {
        module: String,
    },

    // Stake and escrow
    StakeDeposited {
        holder: Uuid,
        role: Role,
        amount: u64,
    },
    WithdrawRequested {
        holder: Uuid,
        role: Role,
        amount: u64,
        unlock_at: u64,
    },
    StakeWithdrawn {
        holder: Uuid,
        role: Role,
        amount: u64,
    },
    StakeTimeLocked {
        holder: Uuid,
        role: Role,
        amount: u64,
        until: u64,
    },
    StakeUnlocked {
        holder: Uuid,
        role: Role,
        amount: u64,
    },
    StakeSlashed {
        holder: Uuid,
        role: Role,
        amount: u64,
        employer: Uuid,
        employer_share: u64,
        treasury_share: u64,
        validator_share: u64,
        burned: u64,
    },
    BoostUpdated {
        holder: Uuid,
        pct: u32,
    },
    RewardLocked {
        job_id: JobId,
        payer: Uuid,
        amount: u64,
    },
    RewardPaid {
        job_id: JobId,
        payee: Uuid,
        amount: u64,
    },
    EscrowRefunded {
        job_id: JobId,
        to: Uuid,
        amount: u64,
    },
    FeeDeposited {
        job_id: Option<JobId>,
        amount: u64,
    },
    TokensBurned {
        job_id: Option<JobId>,
        amount: u64,
    },

    // Randomness
    RandomnessCommitted {
        tag: Hash32,
        participant: Uuid,
    },
    RandomnessRevealed {
        tag: Hash32,
        participant: Uuid,
    },
    DepositForfeited {
        tag: Hash32,
        participant: Uuid,
        amount: u64,
    },
}

impl MarketEvent {
    /// Stable name of the event variant.
    pub fn kind(&self) -> &'static str {
        use MarketEvent::*;
        match self {
            JobCreated { .. } => "JobCreated",
            AgentAssigned { .. } => "AgentAssigned",
            ResultSubmitted { .. } => "ResultSubmitted",
            JobCompleted { .. } => "JobCompleted",
            JobPayout { .. } => "JobPayout",
            JobFinalized { .. } => "JobFinalized",
            JobCancelled { .. } => "JobCancelled",
            JobExpired { .. } => "JobExpired",
            BurnReceiptSubmitted { .. } => "BurnReceiptSubmitted",
            BurnConfirmed { .. } => "BurnConfirmed",
            BurnDiscrepancy { .. } => "BurnDiscrepancy",
            ModuleUpdated { .. } => "ModuleUpdated",
            ValidationPending { .. } => "ValidationPending",
            ValidatorsSelected { .. } => "ValidatorsSelected",
            ValidationCommitted { .. } => "ValidationCommitted",
            ValidationRevealed { .. } => "ValidationRevealed",
            ValidationTallied { .. } => "ValidationTallied",
            ValidatorPenalized { .. } => "ValidatorPenalized",
            DisputeRaised { .. } => "DisputeRaised",
            DisputeUnassigned { .. } => "DisputeUnassigned",
            DisputeResolved { .. } => "DisputeResolved",
            GovernanceOverride { .. } => "GovernanceOverride",
            JurorCommitted { .. } => "JurorCommitted",
            JurorRevealed { .. } => "JurorRevealed",
            JurorSlashed { .. } => "JurorSlashed",
            Paused { .. } => "Paused",
            Unpaused { .. } => "Unpaused",
            StakeDeposited { .. } => "StakeDeposited",
            WithdrawRequested { .. } => "WithdrawRequested",
            StakeWithdrawn { .. } => "StakeWithdrawn",
            StakeTimeLocked { .. } => "StakeTimeLocked",
            StakeUnlocked { .. } => "StakeUnlocked",
            StakeSlashed { .. } => "StakeSlashed",
            BoostUpdated { .. } => "BoostUpdated",
            RewardLocked { .. } => "RewardLocked",
            RewardPaid { .. } => "RewardPaid",
            EscrowRefunded { .. } => "EscrowRefunded",
            FeeDeposited { .. } => "FeeDeposited",
            TokensBurned { .. } => "TokensBurned",
            RandomnessCommitted { .. } => "RandomnessCommitted",
            RandomnessRevealed { .. } => "RandomnessRevealed",
            DepositForfeited { .. } => "DepositForfeited",
        }
    }

    /// Job the event concerns, if any.
    pub fn job_id(&self) -> Option<JobId> {
        use MarketEvent::*;
        match self {
            JobCreated { job_id, .. }
            | AgentAssigned { job_id, .. }
            | ResultSubmitted { job_id, .. }
            | JobCompleted { job_id, .. }
            | JobPayout { job_id, .. }
            | JobFinalized { job_id, .. }
            | JobCancelled { job_id }
            | JobExpired { job_id, .. }
            | BurnReceiptSubmitted { job_id, .. }
            | BurnConfirmed { job_id, .. }
            | BurnDiscrepancy { job_id, .. }
            | ValidationPending { job_id }
            | ValidatorsSelected { job_id, .. }
            | ValidationCommitted { job_id, .. }
            | ValidationRevealed { job_id, .. }
            | ValidationTallied { job_id, .. }
            | ValidatorPenalized { job_id, .. }
            | DisputeRaised { job_id, .. }
            | DisputeUnassigned { job_id, .. }
            | DisputeResolved { job_id, .. }
            | GovernanceOverride { job_id, .. }
            | JurorCommitted { job_id, .. }
            | JurorRevealed { job_id, .. }
            | JurorSlashed { job_id, .. }
            | RewardLocked { job_id, .. }
            | RewardPaid { job_id, .. }
            | EscrowRefunded { job_id, .. } => Some(*job_id),
            FeeDeposited { job_id, .. } | TokensBurned { job_id, .. } => *job_id,
            _ => None,
        }
    }

    /// Account the event is primarily about, if any.
    pub fn actor(&self) -> Option<Uuid> {
        use MarketEvent::*;
        match self {
            JobCreated { employer, .. } => Some(*employer),
            AgentAssigned { agent, .. } | ResultSubmitted { agent, .. } => Some(*agent),
            JobPayout { agent, .. } => Some(*agent),
            JobFinalized { agent, .. } => *agent,
            JobExpired { caller, .. } => Some(*caller),
            ValidationCommitted { validator, .. }
            | ValidationRevealed { validator, .. }
            | ValidatorPenalized { validator, .. } => Some(*validator),
            DisputeRaised { raised_by, .. } => Some(*raised_by),
            GovernanceOverride { governance, .. } => Some(*governance),
            JurorCommitted { juror, .. }
            | JurorRevealed { juror, .. }
            | JurorSlashed { juror, .. } => Some(*juror),
            StakeDeposited { holder, .. }
            | WithdrawRequested { holder, .. }
            | StakeWithdrawn { holder, .. }
            | StakeTimeLocked { holder, .. }
            | StakeUnlocked { holder, .. }
            | StakeSlashed { holder, .. }
            | BoostUpdated { holder, .. } => Some(*holder),
            RewardLocked { payer, .. } => Some(*payer),
            RewardPaid { payee, .. } => Some(*payee),
            EscrowRefunded { to, .. } => Some(*to),
            RandomnessCommitted { participant, .. }
            | RandomnessRevealed { participant, .. }
            | DepositForfeited { participant, .. } => Some(*participant),
            _ => None,
        }
    }
}

/// Destination for emitted events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MarketEvent);
}

/// Buffers events until a consumer drains them.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Mutex<Vec<MarketEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&self) -> Vec<MarketEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<MarketEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventBuffer {
    fn emit(&self, event: MarketEvent) {
        tracing::debug!(kind = event.kind(), job_id = ?event.job_id(), "event");
        self.events.lock().push(event);
    }
}
