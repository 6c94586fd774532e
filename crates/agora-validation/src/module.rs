use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_randomness::{EntropySource, RandomnessSource, SystemEntropy};
use agora_stake::{StakeManager, bps_of, pct_of};
use agora_types::{
    AgoraError, EventSink, Hash32, IdentityClaim, IdentityRegistry, Job, JobId, MarketEvent,
    ReputationRegistry, Result, Role, ValidationOutcome, ValidatorVote,
};

use crate::commitment::{Ballot, vote_commitment};
use crate::config::ValidationConfig;
use crate::round::{Reveal, RoundSummary, ValidationRound};
use crate::selection::{fallback_entropy, select_weighted, selection_seed, selection_tag};
use crate::tally::tally_votes;

pub const VALIDATION_MODULE_VERSION: u32 = 1;

/// Collaborators a validation call may consult, plus the time read once for the call.
pub struct ValidationContext<'a> {
    pub stake: &'a StakeManager,
    pub identity: &'a dyn IdentityRegistry,
    pub reputation: &'a dyn ReputationRegistry,
    pub randomness: Option<&'a dyn RandomnessSource>,
    pub now: u64,
}

/// Result of a finalized round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub job_id: JobId,
    pub nonce: u64,
    pub outcome: ValidationOutcome,
    /// Closed without any reveals; no one is penalized.
    pub forced: bool,
    pub approve_weight: u64,
    pub total_weight: u64,
    pub votes: Vec<ValidatorVote>,
    /// Revealed validators whose vote matched a decided outcome.
    pub winners: Vec<Uuid>,
    pub penalized: Vec<Uuid>,
}

impl Verdict {
    pub fn success(&self) -> bool {
        self.outcome == ValidationOutcome::Approved
    }
}

/// Validation component as seen by the job registry.
pub trait ValidationEngine: Send + Sync {
    fn version(&self) -> u32;

    /// Select a committee for the job's current nonce and open its commit phase.
    fn start(&self, ctx: &ValidationContext<'_>, job: &Job) -> Result<RoundSummary>;

    fn commit(
        &self,
        ctx: &ValidationContext<'_>,
        job: &Job,
        validator: Uuid,
        commitment: Hash32,
        claim: &IdentityClaim,
    ) -> Result<()>;

    fn reveal(
        &self,
        ctx: &ValidationContext<'_>,
        job: &Job,
        validator: Uuid,
        ballot: &Ballot,
        claim: &IdentityClaim,
    ) -> Result<()>;

    /// Tally the round, penalizing validators that committed without revealing.
    fn finalize(&self, ctx: &ValidationContext<'_>, job: &Job) -> Result<Verdict>;

    /// Close a round nobody revealed in, once the hard deadline has passed.
    fn force_finalize(&self, ctx: &ValidationContext<'_>, job: &Job) -> Result<Verdict>;

    fn round(&self, job_id: JobId, now: u64) -> Option<RoundSummary>;

    /// Drop any round state for the job.
    fn reset(&self, job_id: JobId);
}

/// Default validation module: stake-weighted committee selection and commit-reveal voting.
pub struct ValidationModule {
    governance: Uuid,
    config: RwLock<ValidationConfig>,
    pool: RwLock<Vec<Uuid>>,
    rounds: DashMap<JobId, ValidationRound>,
    bans: DashMap<Uuid, u64>,
    events: Arc<dyn EventSink>,
    entropy: Arc<dyn EntropySource>,
}

impl ValidationModule {
    pub fn new(config: ValidationConfig, governance: Uuid, events: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            governance,
            config: RwLock::new(config),
            pool: RwLock::new(Vec::new()),
            rounds: DashMap::new(),
            bans: DashMap::new(),
            events,
            entropy: Arc::new(SystemEntropy::new()),
        })
    }

    /// Block entropy mixed into selection when the beacon has no output for a job.
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn config(&self) -> ValidationConfig {
        self.config.read().clone()
    }

    pub fn pool(&self) -> Vec<Uuid> {
        self.pool.read().clone()
    }

    pub fn ban_until(&self, validator: Uuid) -> Option<u64> {
        self.bans.get(&validator).map(|until| *until)
    }

    pub fn is_banned(&self, validator: Uuid, now: u64) -> bool {
        self.ban_until(validator).is_some_and(|until| now < until)
    }

    fn ensure_governance(&self, caller: Uuid) -> Result<()> {
        if caller != self.governance {
            return Err(AgoraError::Unauthorized("validation governance".into()));
        }
        Ok(())
    }

    pub fn set_config(&self, caller: Uuid, config: ValidationConfig) -> Result<()> {
        self.ensure_governance(caller)?;
        config.validate()?;
        *self.config.write() = config;
        info!("validation config updated");
        Ok(())
    }

    /// Replace the candidate pool. Duplicates are dropped, first occurrence wins.
    pub fn set_validator_pool(&self, caller: Uuid, validators: Vec<Uuid>) -> Result<()> {
        self.ensure_governance(caller)?;
        let mut pool: Vec<Uuid> = Vec::with_capacity(validators.len());
        for v in validators {
            if !pool.contains(&v) {
                pool.push(v);
            }
        }
        info!(size = pool.len(), "validator pool updated");
        *self.pool.write() = pool;
        Ok(())
    }

    pub fn add_validator(&self, caller: Uuid, validator: Uuid) -> Result<()> {
        self.ensure_governance(caller)?;
        let mut pool = self.pool.write();
        if !pool.contains(&validator) {
            pool.push(validator);
        }
        Ok(())
    }

    pub fn remove_validator(&self, caller: Uuid, validator: Uuid) -> Result<()> {
        self.ensure_governance(caller)?;
        self.pool.write().retain(|v| *v != validator);
        Ok(())
    }

    pub fn unban(&self, caller: Uuid, validator: Uuid) -> Result<()> {
        self.ensure_governance(caller)?;
        self.bans.remove(&validator);
        Ok(())
    }

    /// Pool members that may be selected for `job` right now, with their stake.
    fn eligible(&self, ctx: &ValidationContext<'_>, job: &Job, config: &ValidationConfig) -> Vec<(Uuid, u64)> {
        self.pool
            .read()
            .iter()
            .copied()
            .filter(|v| *v != job.employer && Some(*v) != job.agent)
            .filter(|v| !self.is_banned(*v, ctx.now))
            .filter(|v| !ctx.reputation.is_blacklisted(*v))
            .filter(|v| ctx.identity.is_authorized_validator(*v, "", &[]))
            .map(|v| (v, ctx.stake.stake_of(v, Role::Validator)))
            .filter(|(_, stake)| *stake > 0 && *stake >= config.min_validator_stake)
            .collect()
    }

    /// Checks repeated on every commit and reveal.
    fn ensure_can_vote(&self, ctx: &ValidationContext<'_>, validator: Uuid, claim: &IdentityClaim) -> Result<()> {
        if let Some(until) = self.ban_until(validator).filter(|until| ctx.now < *until) {
            return Err(AgoraError::ValidatorBanned { validator, until });
        }
        if ctx.reputation.is_blacklisted(validator) {
            return Err(AgoraError::Blacklisted(validator));
        }
        if !ctx
            .identity
            .is_authorized_validator(validator, &claim.label, &claim.proof)
        {
            return Err(AgoraError::UnauthorizedValidator(validator));
        }
        Ok(())
    }

    fn check_nonce(round: &ValidationRound, job: &Job) -> Result<()> {
        if round.nonce != job.validation_nonce {
            return Err(AgoraError::StaleNonce {
                expected: job.validation_nonce,
                got: round.nonce,
            });
        }
        Ok(())
    }

    /// Slash a validator after the round is closed. A refused slash is logged and counted
    /// as zero; the verdict stands either way.
    fn apply_slash(&self, ctx: &ValidationContext<'_>, job: &Job, validator: Uuid, amount: u64, winners: &[Uuid]) -> u64 {
        if amount == 0 {
            return 0;
        }
        match ctx
            .stake
            .slash(validator, Role::Validator, amount, job.employer, winners)
        {
            Ok(_) => amount,
            Err(err) => {
                warn!(job_id = job.id, %validator, amount, error = %err, "slash refused");
                0
            }
        }
    }

    fn penalize_absentee(
        &self,
        ctx: &ValidationContext<'_>,
        job: &Job,
        validator: Uuid,
        planned: u64,
        config: &ValidationConfig,
    ) {
        let amount = self.apply_slash(ctx, job, validator, planned, &[]);
        let banned_until = ctx.now.saturating_add(config.ban_cooldown);
        self.bans.insert(validator, banned_until);
        ctx.reputation.record_failure(validator);
        self.events.emit(MarketEvent::ValidatorPenalized {
            job_id: job.id,
            validator,
            amount,
            banned_until,
        });
        warn!(job_id = job.id, %validator, amount, banned_until, "validator penalized for missing reveal");
    }
}

impl ValidationEngine for ValidationModule {
    fn version(&self) -> u32 {
        VALIDATION_MODULE_VERSION
    }

    fn start(&self, ctx: &ValidationContext<'_>, job: &Job) -> Result<RoundSummary> {
        if let Some(existing) = self.rounds.get(&job.id) {
            if existing.nonce >= job.validation_nonce {
                return Err(AgoraError::StaleNonce {
                    expected: existing.nonce + 1,
                    got: job.validation_nonce,
                });
            }
        }

        let config = self.config();
        let candidates = self.eligible(ctx, job, &config);
        let beacon = ctx
            .randomness
            .map(|source| source.random(&selection_tag(job.id), ctx.now));
        let entropy = match beacon {
            Some(Ok(output)) => output,
            _ => {
                debug!(job_id = job.id, "beacon output unavailable, using fallback entropy");
                fallback_entropy(job, &self.entropy.block_entropy(ctx.now))
            }
        };
        let seed = selection_seed(&entropy, job.id, job.validation_nonce);
        let validators = select_weighted(
            &candidates,
            config.validators_per_job,
            config.selection_floor,
            &seed,
        )?;

        let commit_deadline = ctx.now.saturating_add(config.commit_window);
        let round = ValidationRound::new(
            job.id,
            job.validation_nonce,
            seed,
            validators.clone(),
            commit_deadline,
            commit_deadline.saturating_add(config.reveal_window),
        );
        let summary = round.summary(ctx.now);
        self.rounds.insert(job.id, round);

        self.events.emit(MarketEvent::ValidatorsSelected {
            job_id: job.id,
            nonce: job.validation_nonce,
            validators,
        });
        info!(job_id = job.id, nonce = job.validation_nonce, pool = candidates.len(), "validators selected");
        Ok(summary)
    }

    fn commit(
        &self,
        ctx: &ValidationContext<'_>,
        job: &Job,
        validator: Uuid,
        commitment: Hash32,
        claim: &IdentityClaim,
    ) -> Result<()> {
        let mut round = self
            .rounds
            .get_mut(&job.id)
            .ok_or(AgoraError::RoundNotFound(job.id))?;
        Self::check_nonce(&round, job)?;
        if round.outcome.is_some() || ctx.now >= round.commit_deadline {
            return Err(AgoraError::CommitPhaseClosed);
        }
        if !round.is_selected(validator) {
            return Err(AgoraError::NotSelected {
                job_id: job.id,
                validator,
            });
        }
        self.ensure_can_vote(ctx, validator, claim)?;
        if round.commits.contains_key(&validator) {
            return Err(AgoraError::AlreadyCommitted);
        }
        round.commits.insert(validator, commitment);
        let all_committed = round.all_committed();
        drop(round);

        self.events.emit(MarketEvent::ValidationCommitted {
            job_id: job.id,
            validator,
            commitment,
        });
        debug!(job_id = job.id, %validator, all_committed, "vote committed");
        Ok(())
    }

    fn reveal(
        &self,
        ctx: &ValidationContext<'_>,
        job: &Job,
        validator: Uuid,
        ballot: &Ballot,
        claim: &IdentityClaim,
    ) -> Result<()> {
        let scheme = self.config.read().commit_scheme.clone();
        let mut round = self
            .rounds
            .get_mut(&job.id)
            .ok_or(AgoraError::RoundNotFound(job.id))?;
        Self::check_nonce(&round, job)?;
        if round.outcome.is_some() || ctx.now >= round.reveal_deadline {
            return Err(AgoraError::RevealPhaseClosed);
        }
        if !round.reveal_open(ctx.now) {
            return Err(AgoraError::CommitPhaseActive);
        }
        if !round.is_selected(validator) {
            return Err(AgoraError::NotSelected {
                job_id: job.id,
                validator,
            });
        }
        self.ensure_can_vote(ctx, validator, claim)?;
        let committed = *round
            .commits
            .get(&validator)
            .ok_or(AgoraError::NotCommitted)?;
        if round.reveals.contains_key(&validator) {
            return Err(AgoraError::AlreadyRevealed);
        }
        let expected = vote_commitment(
            &scheme,
            job.id,
            round.nonce,
            &validator,
            ballot,
            &job.spec_hash,
        );
        if expected != committed {
            return Err(AgoraError::InvalidReveal);
        }

        let weight = ctx.stake.stake_of(validator, Role::Validator);
        round.reveals.insert(
            validator,
            Reveal {
                approve: ballot.approve,
                burn_tx: ballot.burn_tx,
                weight,
            },
        );
        drop(round);

        self.events.emit(MarketEvent::ValidationRevealed {
            job_id: job.id,
            validator,
            approve: ballot.approve,
        });
        debug!(job_id = job.id, %validator, approve = ballot.approve, weight, "vote revealed");
        Ok(())
    }

    fn finalize(&self, ctx: &ValidationContext<'_>, job: &Job) -> Result<Verdict> {
        let config = self.config();
        let (nonce, votes, weights, absentees, selected) = {
            let round = self
                .rounds
                .get(&job.id)
                .ok_or(AgoraError::RoundNotFound(job.id))?;
            Self::check_nonce(&round, job)?;
            if round.outcome.is_some() {
                return Err(AgoraError::AlreadyResolved(job.id));
            }
            if !round.all_revealed() && ctx.now < round.reveal_deadline.saturating_add(config.reveal_grace) {
                return Err(AgoraError::DeadlineNotReached);
            }
            if round.reveals.is_empty() {
                return Err(AgoraError::RevealPending(job.id));
            }
            let mut votes = Vec::new();
            let mut weights = Vec::new();
            for validator in &round.validators {
                if let Some(reveal) = round.reveals.get(validator) {
                    votes.push(ValidatorVote {
                        validator: *validator,
                        approve: reveal.approve,
                    });
                    weights.push((reveal.approve, reveal.weight));
                }
            }
            (round.nonce, votes, weights, round.absentees(), round.validators.len())
        };

        let tally = tally_votes(&weights, selected, config.approval_threshold_pct, config.quorum_pct);

        let decided = match tally.outcome {
            ValidationOutcome::Approved => Some(true),
            ValidationOutcome::Rejected => Some(false),
            ValidationOutcome::Disputed => None,
        };
        let winners: Vec<Uuid> = match decided {
            Some(side) => votes
                .iter()
                .filter(|v| v.approve == side)
                .map(|v| v.validator)
                .collect(),
            None => Vec::new(),
        };

        // Slashes are sized first and applied only once the round is closed.
        let absentee_slashes: Vec<(Uuid, u64)> = absentees
            .iter()
            .map(|v| (*v, bps_of(ctx.stake.stake_of(*v, Role::Validator), config.non_reveal_slash_bps)))
            .collect();
        let dissent_slashes: Vec<(Uuid, u64)> = match decided.filter(|_| config.dissent_slash_pct > 0) {
            Some(side) => votes
                .iter()
                .filter(|v| v.approve != side)
                .map(|v| {
                    let stake = ctx.stake.stake_of(v.validator, Role::Validator);
                    (v.validator, pct_of(stake, config.dissent_slash_pct))
                })
                .collect(),
            None => Vec::new(),
        };

        {
            let mut round = self
                .rounds
                .get_mut(&job.id)
                .ok_or(AgoraError::RoundNotFound(job.id))?;
            if round.outcome.is_some() {
                return Err(AgoraError::AlreadyResolved(job.id));
            }
            round.outcome = Some(tally.outcome);
        }

        for (validator, amount) in &absentee_slashes {
            self.penalize_absentee(ctx, job, *validator, *amount, &config);
        }
        for (validator, amount) in &dissent_slashes {
            self.apply_slash(ctx, job, *validator, *amount, &winners);
        }

        self.events.emit(MarketEvent::ValidationTallied {
            job_id: job.id,
            nonce,
            approve_weight: tally.approve_weight,
            total_weight: tally.total_weight,
            outcome: tally.outcome,
        });
        info!(
            job_id = job.id,
            nonce,
            approve_weight = tally.approve_weight,
            total_weight = tally.total_weight,
            outcome = ?tally.outcome,
            absentees = absentees.len(),
            "validation finalized"
        );

        Ok(Verdict {
            job_id: job.id,
            nonce,
            outcome: tally.outcome,
            forced: false,
            approve_weight: tally.approve_weight,
            total_weight: tally.total_weight,
            votes,
            winners,
            penalized: absentees,
        })
    }

    fn force_finalize(&self, ctx: &ValidationContext<'_>, job: &Job) -> Result<Verdict> {
        let config = self.config();
        let mut round = self
            .rounds
            .get_mut(&job.id)
            .ok_or(AgoraError::RoundNotFound(job.id))?;
        Self::check_nonce(&round, job)?;
        if round.outcome.is_some() {
            return Err(AgoraError::AlreadyResolved(job.id));
        }
        if !round.reveals.is_empty() {
            return Err(AgoraError::RoundHasReveals(job.id));
        }
        if ctx.now < round.reveal_deadline.saturating_add(config.force_finalize_grace) {
            return Err(AgoraError::DeadlineNotReached);
        }
        round.outcome = Some(ValidationOutcome::Rejected);
        let nonce = round.nonce;
        drop(round);

        self.events.emit(MarketEvent::ValidationTallied {
            job_id: job.id,
            nonce,
            approve_weight: 0,
            total_weight: 0,
            outcome: ValidationOutcome::Rejected,
        });
        warn!(job_id = job.id, nonce, "validation force-finalized without reveals");

        Ok(Verdict {
            job_id: job.id,
            nonce,
            outcome: ValidationOutcome::Rejected,
            forced: true,
            approve_weight: 0,
            total_weight: 0,
            votes: Vec::new(),
            winners: Vec::new(),
            penalized: Vec::new(),
        })
    }

    fn round(&self, job_id: JobId, now: u64) -> Option<RoundSummary> {
        self.rounds.get(&job_id).map(|round| round.summary(now))
    }

    fn reset(&self, job_id: JobId) {
        self.rounds.remove(&job_id);
    }
}
