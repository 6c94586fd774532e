use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use agora_dispute::{CaseSummary, DisputeContext, DisputeEngine};
use agora_randomness::RandomnessSource;
use agora_stake::StakeManager;
use agora_types::{
    AgoraError, BASE_PCT, BurnReceipt, Clock, DisputeStatus, EventSink, Hash32, IdentityClaim,
    IdentityRegistry, Job, JobEvent, JobId, JobState, MarketEvent, ReputationRegistry, Result, Role,
    TaxPolicy, ValidationOutcome, ZERO_HASH,
};
use agora_validation::{Ballot, RoundSummary, ValidationContext, ValidationEngine, Verdict};

use crate::burn;
use crate::config::RegistryConfig;
use crate::modules::{
    CertificateSink, DISPUTE_INTERFACE_VERSION, Modules, VALIDATION_INTERFACE_VERSION, check_version,
};
use crate::settlement::{
    Recipient, Settlement, refund_all, release_job_stake, settle_failure, settle_success,
};

/// Collaborators captured once per call.
struct Wiring {
    modules: Modules,
    identity: Arc<dyn IdentityRegistry>,
    randomness: Option<Arc<dyn RandomnessSource>>,
}

impl Wiring {
    fn validation(&self, now: u64) -> ValidationContext<'_> {
        ValidationContext {
            stake: &self.modules.stake,
            identity: self.identity.as_ref(),
            reputation: self.modules.reputation.as_ref(),
            randomness: self.randomness.as_deref(),
            now,
        }
    }

    fn dispute(&self, now: u64) -> DisputeContext<'_> {
        DisputeContext {
            stake: &self.modules.stake,
            now,
        }
    }
}

/// Owns the canonical job records and drives every job through its lifecycle.
///
/// State-changing calls are serialized behind a single writer lock and read the clock once.
/// Job records never depend on module state, so governance can swap any module between
/// calls without touching in-flight jobs.
pub struct JobRegistry {
    governance: Uuid,
    config: RwLock<RegistryConfig>,
    jobs: DashMap<JobId, Job>,
    next_id: AtomicU64,
    active: DashMap<Uuid, u32>,
    modules: RwLock<Modules>,
    identity: RwLock<Arc<dyn IdentityRegistry>>,
    randomness: RwLock<Option<Arc<dyn RandomnessSource>>>,
    certificates: RwLock<Option<Arc<dyn CertificateSink>>>,
    policy: Arc<TaxPolicy>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    writer: Mutex<()>,
}

impl JobRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RegistryConfig,
        governance: Uuid,
        modules: Modules,
        identity: Arc<dyn IdentityRegistry>,
        policy: Arc<TaxPolicy>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            governance,
            config: RwLock::new(config),
            jobs: DashMap::new(),
            next_id: AtomicU64::new(1),
            active: DashMap::new(),
            modules: RwLock::new(modules),
            identity: RwLock::new(identity),
            randomness: RwLock::new(None),
            certificates: RwLock::new(None),
            policy,
            clock,
            events,
            writer: Mutex::new(()),
        })
    }

    pub fn with_randomness(self, source: Arc<dyn RandomnessSource>) -> Self {
        *self.randomness.write() = Some(source);
        self
    }

    pub fn with_certificates(self, sink: Arc<dyn CertificateSink>) -> Self {
        *self.certificates.write() = Some(sink);
        self
    }

    // ---- reads -------------------------------------------------------------------------

    pub fn governance(&self) -> Uuid {
        self.governance
    }

    pub fn config(&self) -> RegistryConfig {
        self.config.read().clone()
    }

    pub fn policy(&self) -> Arc<TaxPolicy> {
        self.policy.clone()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn stake_manager(&self) -> Arc<StakeManager> {
        self.modules.read().stake.clone()
    }

    pub fn reputation(&self) -> Arc<dyn ReputationRegistry> {
        self.modules.read().reputation.clone()
    }

    pub fn job(&self, job_id: JobId) -> Result<Job> {
        self.jobs
            .get(&job_id)
            .map(|job| job.clone())
            .ok_or(AgoraError::JobNotFound(job_id))
    }

    /// All jobs in id order.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub fn jobs_in_state(&self, state: JobState) -> Vec<Job> {
        self.jobs().into_iter().filter(|j| j.state == state).collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn active_jobs_of(&self, agent: Uuid) -> u32 {
        self.active.get(&agent).map(|n| *n).unwrap_or(0)
    }

    pub fn validation_round(&self, job_id: JobId) -> Option<RoundSummary> {
        let validation = self.modules.read().validation.clone();
        validation.round(job_id, self.clock.now())
    }

    pub fn dispute_case(&self, job_id: JobId) -> Option<CaseSummary> {
        let dispute = self.modules.read().dispute.clone();
        dispute.case(job_id)
    }

    // ---- helpers -----------------------------------------------------------------------

    fn wiring(&self) -> Wiring {
        Wiring {
            modules: self.modules.read().clone(),
            identity: self.identity.read().clone(),
            randomness: self.randomness.read().clone(),
        }
    }

    fn store(&self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    fn ensure_governance(&self, caller: Uuid) -> Result<()> {
        if caller != self.governance {
            return Err(AgoraError::Unauthorized("registry governance".into()));
        }
        Ok(())
    }

    fn ensure_state(job: &Job, state: JobState, event: JobEvent) -> Result<()> {
        if job.state != state {
            return Err(AgoraError::InvalidStateTransition {
                from: job.state,
                event,
            });
        }
        Ok(())
    }

    fn release_slot(&self, agent: Uuid) {
        if let Some(mut count) = self.active.get_mut(&agent) {
            *count = count.saturating_sub(1);
        }
        self.active.remove_if(&agent, |_, count| *count == 0);
    }

    /// Where funds owed to `who` go: to them, or to the treasury (else burned) when they
    /// are blacklisted.
    fn route(wiring: &Wiring, who: Uuid) -> Recipient {
        if wiring.modules.reputation.is_blacklisted(who) {
            wiring
                .modules
                .stake
                .config()
                .treasury
                .map_or(Recipient::Burn, Recipient::Account)
        } else {
            Recipient::Account(who)
        }
    }

    // ---- job lifecycle -----------------------------------------------------------------

    /// Escrow `reward` plus the protocol fee and open a job.
    pub fn create_job(
        &self,
        employer: Uuid,
        reward: u64,
        deadline: u64,
        spec_hash: Hash32,
        uri: impl Into<String>,
    ) -> Result<JobId> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let config = self.config();

        if reward == 0 {
            return Err(AgoraError::InvalidAmount);
        }
        self.policy.ensure_acknowledged(employer)?;
        if wiring.modules.reputation.is_blacklisted(employer) {
            return Err(AgoraError::Blacklisted(employer));
        }
        if config.max_reward != 0 && reward > config.max_reward {
            return Err(AgoraError::RewardAboveCap {
                reward,
                cap: config.max_reward,
            });
        }
        if deadline <= now {
            return Err(AgoraError::DeadlinePassed);
        }
        if config.max_duration != 0 && deadline - now > config.max_duration {
            return Err(AgoraError::DurationAboveCap);
        }
        if deadline.checked_add(config.expiration_grace).is_none() {
            return Err(AgoraError::DurationAboveCap);
        }
        let fee = agora_stake::pct_of(reward, config.fee_pct);
        let escrow = reward.checked_add(fee).ok_or(AgoraError::InvalidAmount)?;
        if fee > 0 && !wiring.modules.stake.has_fee_pool() {
            return Err(AgoraError::ModuleNotSet("fee pool"));
        }

        let job_id = self.next_id.load(Ordering::SeqCst);
        wiring.modules.stake.lock_reward(job_id, employer, escrow)?;
        self.next_id.store(job_id + 1, Ordering::SeqCst);

        let job = Job::new(
            job_id,
            employer,
            reward,
            fee,
            config.job_stake,
            deadline,
            spec_hash,
            uri,
            now,
        );
        self.events.emit(MarketEvent::JobCreated {
            job_id,
            employer,
            reward,
            fee,
            stake: job.stake,
            deadline,
            spec_hash,
        });
        info!(job_id, %employer, reward, fee, deadline, "job created");
        self.store(job);
        Ok(job_id)
    }

    /// Take an open job. The first qualifying agent wins; the agent's bonus multiplier is
    /// captured here and used at settlement.
    pub fn apply_for_job(&self, agent: Uuid, job_id: JobId, claim: &IdentityClaim) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let config = self.config();
        let mut job = self.job(job_id)?;

        job.ensure(JobEvent::Apply)?;
        if now > job.deadline {
            return Err(AgoraError::DeadlinePassed);
        }
        if agent == job.employer {
            return Err(AgoraError::Unauthorized("employer cannot take its own job".into()));
        }
        self.policy.ensure_acknowledged(agent)?;
        if wiring.modules.reputation.is_blacklisted(agent) {
            return Err(AgoraError::Blacklisted(agent));
        }
        if !wiring
            .identity
            .is_authorized_agent(agent, &claim.label, &claim.proof)
        {
            return Err(AgoraError::UnauthorizedAgent(agent));
        }
        if config.max_active_jobs_per_agent != 0
            && self.active_jobs_of(agent) >= config.max_active_jobs_per_agent
        {
            return Err(AgoraError::MaxActiveJobs(agent));
        }

        let stake = &wiring.modules.stake;
        if job.stake > 0 {
            stake.lock_stake(
                agent,
                Role::Agent,
                job.stake,
                job.deadline.saturating_add(config.expiration_grace),
                now,
            )?;
        }
        let agent_pct = stake.refresh_boost(agent);

        job.agent = Some(agent);
        job.agent_pct = agent_pct;
        job.assigned_at = Some(now);
        job.apply_event(JobEvent::Apply)?;
        *self.active.entry(agent).or_default() += 1;

        self.events.emit(MarketEvent::AgentAssigned {
            job_id,
            agent,
            agent_pct,
        });
        info!(job_id, %agent, agent_pct, "agent assigned");
        self.store(job);
        Ok(())
    }

    /// Accept the current tax policy, then apply.
    pub fn acknowledge_and_apply(&self, agent: Uuid, job_id: JobId, claim: &IdentityClaim) -> Result<()> {
        self.policy.acknowledge(agent);
        self.apply_for_job(agent, job_id, claim)
    }

    /// Attach the agent's result and open validation, unless it waits on a burn receipt.
    pub fn submit(
        &self,
        agent: Uuid,
        job_id: JobId,
        result_hash: Hash32,
        result_uri: impl Into<String>,
    ) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        if job.agent != Some(agent) {
            return Err(AgoraError::OnlyAgent(job_id));
        }
        job.ensure(JobEvent::Submit)?;
        if now > job.deadline {
            return Err(AgoraError::DeadlinePassed);
        }
        if wiring.modules.reputation.is_blacklisted(agent) {
            return Err(AgoraError::Blacklisted(agent));
        }

        job.result_hash = Some(result_hash);
        job.result_uri = Some(result_uri.into());
        job.apply_event(JobEvent::Submit)?;

        let pending = self.config().require_burn_receipt && !job.burn_confirmed();
        if pending {
            job.validation_start_pending = true;
        } else {
            let summary = wiring.modules.validation.start(&wiring.validation(now), &job)?;
            job.validators = summary.validators;
        }

        self.events.emit(MarketEvent::ResultSubmitted {
            job_id,
            agent,
            result_hash,
        });
        if pending {
            self.events.emit(MarketEvent::ValidationPending { job_id });
        }
        info!(job_id, %agent, pending, "result submitted");
        self.store(job);
        Ok(())
    }

    /// Record the employer's evidence of the off-ledger fee burn. An amount that differs
    /// from the expected burn is reported but accepted.
    pub fn submit_burn_receipt(
        &self,
        employer: Uuid,
        job_id: JobId,
        burn_tx: Hash32,
        amount: u64,
        block: u64,
    ) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let mut job = self.job(job_id)?;

        if job.employer != employer {
            return Err(AgoraError::OnlyEmployer(job_id));
        }
        if job.state.is_terminal() || job.burn_confirmed() {
            return Err(AgoraError::InvalidStateTransition {
                from: job.state,
                event: JobEvent::Submit,
            });
        }

        let receipt = BurnReceipt {
            burn_tx,
            amount,
            block,
            submitted_at: now,
            confirmed: false,
        };
        let expected = burn::expected_burn(&job, self.config().expected_burn_pct);
        let discrepancy = burn::check_receipt(&receipt, expected);
        job.burn_receipt = Some(receipt);

        self.events.emit(MarketEvent::BurnReceiptSubmitted {
            job_id,
            burn_tx,
            amount,
            block,
        });
        if let Some(d) = discrepancy {
            self.events.emit(MarketEvent::BurnDiscrepancy {
                job_id,
                claimed: d.claimed,
                expected: d.expected,
            });
            warn!(job_id, claimed = d.claimed, expected = d.expected, "burn receipt discrepancy");
        }
        info!(job_id, block, amount, "burn receipt submitted");
        self.store(job);
        Ok(())
    }

    /// Confirm the submitted burn receipt. Starts validation if the job was waiting on it.
    pub fn confirm_employer_burn(&self, employer: Uuid, job_id: JobId, burn_tx: Hash32) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        if job.employer != employer {
            return Err(AgoraError::OnlyEmployer(job_id));
        }
        let receipt = job
            .burn_receipt
            .as_mut()
            .filter(|r| burn::matches(r, &burn_tx))
            .ok_or(AgoraError::BurnEvidenceIncomplete(job_id))?;
        if receipt.confirmed {
            return Err(AgoraError::AlreadyResolved(job_id));
        }
        receipt.confirmed = true;

        let start = job.validation_start_pending && job.state == JobState::Submitted;
        if start {
            let summary = wiring.modules.validation.start(&wiring.validation(now), &job)?;
            job.validators = summary.validators;
            job.validation_start_pending = false;
        }

        self.events.emit(MarketEvent::BurnConfirmed { job_id, burn_tx });
        info!(job_id, validation_started = start, "burn confirmed");
        self.store(job);
        Ok(())
    }

    // ---- validation --------------------------------------------------------------------

    fn validating_job(&self, job_id: JobId) -> Result<Job> {
        let job = self.job(job_id)?;
        Self::ensure_state(&job, JobState::Submitted, JobEvent::Complete)?;
        if job.validation_start_pending {
            return Err(AgoraError::BurnEvidenceIncomplete(job_id));
        }
        Ok(job)
    }

    pub fn commit_validation(
        &self,
        validator: Uuid,
        job_id: JobId,
        commitment: Hash32,
        claim: &IdentityClaim,
    ) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let job = self.validating_job(job_id)?;
        wiring
            .modules
            .validation
            .commit(&wiring.validation(now), &job, validator, commitment, claim)
    }

    pub fn reveal_validation(
        &self,
        validator: Uuid,
        job_id: JobId,
        ballot: &Ballot,
        claim: &IdentityClaim,
    ) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let job = self.validating_job(job_id)?;
        wiring
            .modules
            .validation
            .reveal(&wiring.validation(now), &job, validator, ballot, claim)
    }

    /// Tally the round and move the job to `Completed` or `Disputed`.
    pub fn finalize_validation(&self, job_id: JobId) -> Result<ValidationOutcome> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.validating_job(job_id)?;
        let verdict = wiring
            .modules
            .validation
            .finalize(&wiring.validation(now), &job)?;
        self.apply_verdict(&mut job, &verdict, &wiring, now)?;
        self.store(job);
        Ok(verdict.outcome)
    }

    /// Close a round nobody revealed in. The job completes as a forced failure: the
    /// employer is refunded and nobody is penalized.
    pub fn force_finalize_validation(&self, job_id: JobId) -> Result<ValidationOutcome> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.validating_job(job_id)?;
        let verdict = wiring
            .modules
            .validation
            .force_finalize(&wiring.validation(now), &job)?;
        self.apply_verdict(&mut job, &verdict, &wiring, now)?;
        self.store(job);
        Ok(verdict.outcome)
    }

    fn apply_verdict(&self, job: &mut Job, verdict: &Verdict, wiring: &Wiring, now: u64) -> Result<()> {
        job.votes = verdict.votes.clone();
        job.outcome_at = Some(now);
        match verdict.outcome {
            ValidationOutcome::Approved | ValidationOutcome::Rejected => {
                job.success = verdict.success();
                job.forced = verdict.forced;
                job.apply_event(JobEvent::Complete)?;
                self.events.emit(MarketEvent::JobCompleted {
                    job_id: job.id,
                    success: job.success,
                });
                info!(job_id = job.id, success = job.success, forced = job.forced, "job completed");
            }
            ValidationOutcome::Disputed => {
                job.apply_event(JobEvent::Dispute)?;
                self.escalate(job, Uuid::nil(), ZERO_HASH, wiring, now);
            }
        }
        Ok(())
    }

    /// Record a dispute on the job and open a case. The validation verdict is already
    /// settled at this point, so a refused case leaves the job `Disputed` for governance
    /// and is recorded as `DisputeUnassigned`.
    fn escalate(&self, job: &mut Job, raised_by: Uuid, evidence: Hash32, wiring: &Wiring, now: u64) {
        job.dispute = Some(DisputeStatus {
            raised_by,
            evidence,
            raised_at: now,
            favor_employer: None,
            overridden: false,
        });
        self.events.emit(MarketEvent::DisputeRaised {
            job_id: job.id,
            raised_by,
            evidence,
        });
        info!(job_id = job.id, %raised_by, "dispute raised");
        if let Err(err) = wiring
            .modules
            .dispute
            .open(&wiring.dispute(now), job, raised_by, evidence)
        {
            warn!(job_id = job.id, error = %err, "dispute module did not open a case");
            self.events.emit(MarketEvent::DisputeUnassigned {
                job_id: job.id,
                reason: err.to_string(),
            });
        }
    }

    /// Open a fresh round under a new nonce, e.g. after the validation module was swapped.
    /// Commitments made for the previous nonce become unusable.
    pub fn restart_validation(&self, caller: Uuid, job_id: JobId) -> Result<RoundSummary> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.validating_job(job_id)?;

        job.validation_nonce += 1;
        job.votes.clear();
        let summary = wiring.modules.validation.start(&wiring.validation(now), &job)?;
        job.validators = summary.validators.clone();

        info!(job_id, nonce = job.validation_nonce, "validation restarted");
        self.store(job);
        Ok(summary)
    }

    // ---- disputes ----------------------------------------------------------------------

    /// Contest a completed job before it is finalized.
    pub fn raise_dispute(&self, caller: Uuid, job_id: JobId, evidence: Hash32) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        if caller != job.employer && job.agent != Some(caller) {
            return Err(AgoraError::Unauthorized("only the employer or agent may dispute".into()));
        }
        Self::ensure_state(&job, JobState::Completed, JobEvent::Dispute)?;
        job.apply_event(JobEvent::Dispute)?;
        wiring
            .modules
            .dispute
            .open(&wiring.dispute(now), &job, caller, evidence)?;
        job.dispute = Some(DisputeStatus {
            raised_by: caller,
            evidence,
            raised_at: now,
            favor_employer: None,
            overridden: false,
        });

        self.events.emit(MarketEvent::DisputeRaised {
            job_id,
            raised_by: caller,
            evidence,
        });
        info!(job_id, %caller, "dispute raised");
        self.store(job);
        Ok(())
    }

    fn disputed_job(&self, job_id: JobId) -> Result<Job> {
        let job = self.job(job_id)?;
        Self::ensure_state(&job, JobState::Disputed, JobEvent::Finalize)?;
        Ok(job)
    }

    pub fn commit_dispute(&self, juror: Uuid, job_id: JobId, commitment: Hash32) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        self.disputed_job(job_id)?;
        wiring
            .modules
            .dispute
            .commit(&wiring.dispute(now), job_id, juror, commitment)
    }

    pub fn reveal_dispute(&self, juror: Uuid, job_id: JobId, favor_employer: bool, salt: Hash32) -> Result<()> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        self.disputed_job(job_id)?;
        wiring
            .modules
            .dispute
            .reveal(&wiring.dispute(now), job_id, juror, favor_employer, salt)
    }

    /// Take the dispute module's verdict and settle the job on it.
    pub fn resolve_dispute(&self, job_id: JobId) -> Result<Settlement> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.disputed_job(job_id)?;

        let favor_employer = wiring.modules.dispute.finalize(&wiring.dispute(now), &job)?;
        let settlement = self.settle_dispute(&mut job, favor_employer, &wiring, now)?;
        self.store(job);
        Ok(settlement)
    }

    /// Governance decision on a dispute nobody has resolved yet. A delivered verdict
    /// cannot be overridden.
    pub fn governance_resolve(
        &self,
        caller: Uuid,
        job_id: JobId,
        favor_employer: bool,
        reason: impl Into<String>,
    ) -> Result<Settlement> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.disputed_job(job_id)?;

        let delivered = wiring
            .modules
            .dispute
            .case(job_id)
            .is_some_and(|case| case.favor_employer.is_some());
        if delivered || job.dispute.as_ref().is_some_and(|d| d.is_resolved()) {
            return Err(AgoraError::AlreadyResolved(job_id));
        }
        wiring.modules.dispute.close(job_id);

        let reason = reason.into();
        if let Some(status) = job.dispute.as_mut() {
            status.overridden = true;
        }
        self.events.emit(MarketEvent::GovernanceOverride {
            job_id,
            governance: caller,
            favor_employer,
            reason: reason.clone(),
        });
        warn!(job_id, favor_employer, %reason, "dispute resolved by governance");

        let settlement = self.settle_dispute(&mut job, favor_employer, &wiring, now)?;
        self.store(job);
        Ok(settlement)
    }

    fn settle_dispute(&self, job: &mut Job, favor_employer: bool, wiring: &Wiring, now: u64) -> Result<Settlement> {
        job.success = !favor_employer;
        job.forced = false;
        job.outcome_at = Some(now);
        if let Some(status) = job.dispute.as_mut() {
            status.favor_employer = Some(favor_employer);
        }
        let settlement = self.settle(job, wiring, now)?;
        self.events.emit(MarketEvent::DisputeResolved {
            job_id: job.id,
            favor_employer,
        });
        info!(job_id = job.id, favor_employer, "dispute resolved");
        Ok(settlement)
    }

    // ---- settlement --------------------------------------------------------------------

    /// Pay out a completed job. The employer may always finalize; governance may when a
    /// party is blacklisted or the employer let the finalize window lapse.
    pub fn finalize(&self, caller: Uuid, job_id: JobId) -> Result<Settlement> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        match job.state {
            JobState::Completed => {}
            JobState::Disputed => return Err(AgoraError::DisputeUnresolved(job_id)),
            from => {
                return Err(AgoraError::InvalidStateTransition {
                    from,
                    event: JobEvent::Finalize,
                });
            }
        }
        if caller != job.employer {
            if caller != self.governance {
                return Err(AgoraError::OnlyEmployer(job_id));
            }
            let reputation = &wiring.modules.reputation;
            let blacklisted = reputation.is_blacklisted(job.employer)
                || job.agent.is_some_and(|a| reputation.is_blacklisted(a));
            let lapsed = job
                .outcome_at
                .is_some_and(|at| now >= at + self.config().employer_finalize_window);
            if !blacklisted && !lapsed {
                return Err(AgoraError::OnlyEmployer(job_id));
            }
        }

        let settlement = self.settle(&mut job, &wiring, now)?;
        self.store(job);
        Ok(settlement)
    }

    /// Distribute the escrow on the job's outcome and close it.
    fn settle(&self, job: &mut Job, wiring: &Wiring, now: u64) -> Result<Settlement> {
        let agent = job
            .agent
            .ok_or_else(|| AgoraError::Internal(format!("job {} settled without an agent", job.id)))?;
        let stake = &wiring.modules.stake;
        let winners: Vec<Uuid> = job
            .votes
            .iter()
            .filter(|v| v.approve == job.success)
            .map(|v| v.validator)
            .collect();

        let settlement = if job.success {
            let payee = Self::route(wiring, agent);
            let agent_pct = if payee == Recipient::Account(agent) {
                job.agent_pct
            } else {
                BASE_PCT
            };
            settle_success(stake, job, payee, agent_pct, &winners)?
        } else {
            let slash = (!job.forced).then_some(agent);
            settle_failure(stake, job, Self::route(wiring, job.employer), slash, &winners)?
        };
        release_job_stake(stake, job, now)?;

        job.escrowed = 0;
        job.apply_event(JobEvent::Finalize)?;
        self.release_slot(agent);

        let reputation = &wiring.modules.reputation;
        if job.success {
            reputation.record_success(agent);
            if let Some(sink) = self.certificates.read().clone() {
                sink.job_completed(job.id, agent);
            }
            self.events.emit(MarketEvent::JobPayout {
                job_id: job.id,
                agent,
                payout: settlement.payout,
                fee: settlement.fee,
                burned: settlement.burned,
            });
        } else if !job.forced {
            reputation.record_failure(agent);
        }
        self.events.emit(MarketEvent::JobFinalized {
            job_id: job.id,
            agent: Some(agent),
        });
        info!(
            job_id = job.id,
            %agent,
            success = job.success,
            payout = settlement.payout,
            refunded = settlement.refunded,
            slashed = settlement.slashed,
            "job finalized"
        );
        Ok(settlement)
    }

    // ---- side exits --------------------------------------------------------------------

    /// Employer withdraws a job nobody has taken.
    pub fn cancel_job(&self, caller: Uuid, job_id: JobId) -> Result<u64> {
        let _writer = self.writer.lock();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        if caller != job.employer {
            return Err(AgoraError::OnlyEmployer(job_id));
        }
        Self::ensure_state(&job, JobState::Created, JobEvent::Cancel)?;
        let refunded = refund_all(&wiring.modules.stake, &job, job.employer)?;
        job.escrowed = 0;
        job.apply_event(JobEvent::Cancel)?;

        self.events.emit(MarketEvent::JobCancelled { job_id });
        info!(job_id, refunded, "job cancelled");
        self.store(job);
        Ok(refunded)
    }

    /// Governance removes a job before work is submitted, refunding the employer and
    /// releasing the agent's stake.
    pub fn delist_job(&self, caller: Uuid, job_id: JobId) -> Result<u64> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        job.ensure(JobEvent::Cancel)?;
        let stake = &wiring.modules.stake;
        let refunded = refund_all(stake, &job, job.employer)?;
        release_job_stake(stake, &job, now)?;
        if let Some(agent) = job.agent {
            self.release_slot(agent);
        }
        job.escrowed = 0;
        job.apply_event(JobEvent::Cancel)?;

        self.events.emit(MarketEvent::JobCancelled { job_id });
        warn!(job_id, refunded, "job delisted");
        self.store(job);
        Ok(refunded)
    }

    /// Reclaim escrow from a job that missed its deadline plus grace without reaching an
    /// outcome. Refunds the employer and releases the agent's stake.
    pub fn cancel_expired_job(&self, caller: Uuid, job_id: JobId) -> Result<u64> {
        let _writer = self.writer.lock();
        let now = self.clock.now();
        let wiring = self.wiring();
        let mut job = self.job(job_id)?;

        if caller != job.employer && caller != self.governance {
            return Err(AgoraError::OnlyEmployer(job_id));
        }
        job.ensure(JobEvent::Expire)?;
        if now < job.deadline.saturating_add(self.config().expiration_grace) {
            return Err(AgoraError::DeadlineNotReached);
        }

        let stake = &wiring.modules.stake;
        let refunded = refund_all(stake, &job, job.employer)?;
        release_job_stake(stake, &job, now)?;
        if job.state == JobState::Submitted {
            wiring.modules.validation.reset(job_id);
        }
        if let Some(agent) = job.agent {
            self.release_slot(agent);
        }
        job.escrowed = 0;
        job.apply_event(JobEvent::Expire)?;

        self.events.emit(MarketEvent::JobExpired { job_id, caller });
        info!(job_id, %caller, refunded, "job expired");
        self.store(job);
        Ok(refunded)
    }

    pub fn claim_timeout(&self, caller: Uuid, job_id: JobId) -> Result<u64> {
        self.cancel_expired_job(caller, job_id)
    }

    // ---- governance --------------------------------------------------------------------

    pub fn set_config(&self, caller: Uuid, config: RegistryConfig) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        config.validate()?;
        *self.config.write() = config;
        info!("registry config updated");
        Ok(())
    }

    /// Replace the ledger. Refused while the current one still holds job escrow.
    pub fn set_stake_manager(&self, caller: Uuid, stake: Arc<StakeManager>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        let held = self.modules.read().stake.total_escrow();
        if held > 0 {
            return Err(AgoraError::ModuleInUse(format!(
                "stake manager holds {held} in job escrow"
            )));
        }
        self.modules.write().stake = stake;
        self.module_updated("stake", 0);
        Ok(())
    }

    /// Rounds already open in the old module are left behind; use `restart_validation`
    /// for jobs that were mid-vote.
    pub fn set_validation_module(&self, caller: Uuid, validation: Arc<dyn ValidationEngine>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        let version = validation.version();
        check_version("validation", version, VALIDATION_INTERFACE_VERSION)?;
        self.modules.write().validation = validation;
        self.module_updated("validation", version);
        Ok(())
    }

    pub fn set_dispute_module(&self, caller: Uuid, dispute: Arc<dyn DisputeEngine>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        let version = dispute.version();
        check_version("dispute", version, DISPUTE_INTERFACE_VERSION)?;
        self.modules.write().dispute = dispute;
        self.module_updated("dispute", version);
        Ok(())
    }

    pub fn set_reputation_module(&self, caller: Uuid, reputation: Arc<dyn ReputationRegistry>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        self.modules.write().reputation = reputation;
        self.module_updated("reputation", 0);
        Ok(())
    }

    pub fn set_identity_registry(&self, caller: Uuid, identity: Arc<dyn IdentityRegistry>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        *self.identity.write() = identity;
        self.module_updated("identity", 0);
        Ok(())
    }

    pub fn set_randomness_source(&self, caller: Uuid, source: Option<Arc<dyn RandomnessSource>>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        *self.randomness.write() = source;
        self.module_updated("randomness", 0);
        Ok(())
    }

    pub fn set_certificate_sink(&self, caller: Uuid, sink: Option<Arc<dyn CertificateSink>>) -> Result<()> {
        let _writer = self.writer.lock();
        self.ensure_governance(caller)?;
        *self.certificates.write() = sink;
        self.module_updated("certificates", 0);
        Ok(())
    }

    /// Unversioned collaborators report version 0.
    fn module_updated(&self, module: &str, version: u32) {
        self.events.emit(MarketEvent::ModuleUpdated {
            module: module.to_string(),
            version,
        });
        info!(module, version, "module updated");
    }
}
