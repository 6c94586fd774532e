use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use agora_types::{AgoraError, BASE_PCT, EventSink, JobId, MarketEvent, Result, Role, TaxPolicy};

use crate::account::{PendingUnbond, StakeAccount};
use crate::boost::{BoostTable, CredentialSource, boosted};
use crate::config::{StakeConfig, check_reward_split, check_slashing};
use crate::fee_pool::FeePool;
use crate::guard::CallGuard;
use crate::split::{ReleaseSplit, SlashSplit};
use crate::token::Token;

/// Where a slashed amount went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashReceipt {
    pub amount: u64,
    pub validators: Vec<(Uuid, u64)>,
    pub employer: u64,
    pub treasury: u64,
    pub burned: u64,
}

/// Where a released reward went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    pub amount: u64,
    pub validators: Vec<(Uuid, u64)>,
    pub fee: u64,
    pub burned: u64,
    pub payout: u64,
}

#[derive(Debug, Default)]
struct StakeBook {
    accounts: HashMap<(Uuid, Role), StakeAccount>,
    multipliers: HashMap<Uuid, u32>,
    escrow: HashMap<JobId, u64>,
    total_stake: HashMap<Role, u64>,
    total_boosted: HashMap<Role, u64>,
}

impl StakeBook {
    fn account(&self, holder: Uuid, role: Role) -> StakeAccount {
        self.accounts
            .get(&(holder, role))
            .cloned()
            .unwrap_or_default()
    }

    fn multiplier(&self, holder: Uuid) -> u32 {
        self.multipliers.get(&holder).copied().unwrap_or(BASE_PCT)
    }

    /// Write an account back, keeping the per-role aggregates current.
    fn store(&mut self, holder: Uuid, role: Role, mut account: StakeAccount) {
        let old = self.account(holder, role);
        account.boosted = boosted(account.balance, self.multiplier(holder));

        let total = self.total_stake.entry(role).or_default();
        *total = *total + account.balance - old.balance;
        let total = self.total_boosted.entry(role).or_default();
        *total = *total + account.boosted - old.boosted;

        if account == StakeAccount::default() {
            self.accounts.remove(&(holder, role));
        } else {
            self.accounts.insert((holder, role), account);
        }
    }

    fn set_multiplier(&mut self, holder: Uuid, pct: u32) -> bool {
        if self.multiplier(holder) == pct {
            return false;
        }
        self.multipliers.insert(holder, pct);
        for role in Role::ALL {
            if let Some(account) = self.accounts.get(&(holder, role)).cloned() {
                self.store(holder, role, account);
            }
        }
        true
    }

    fn holders(&self) -> HashSet<Uuid> {
        self.accounts
            .keys()
            .map(|(holder, _)| *holder)
            .chain(self.multipliers.keys().copied())
            .collect()
    }

    fn escrow(&self, job_id: JobId) -> u64 {
        self.escrow.get(&job_id).copied().unwrap_or(0)
    }

    fn take_escrow(&mut self, job_id: JobId, amount: u64) -> Result<()> {
        let available = self.escrow(job_id);
        if available < amount {
            return Err(AgoraError::InsufficientEscrow {
                job_id,
                available,
                required: amount,
            });
        }
        if available == amount {
            self.escrow.remove(&job_id);
        } else {
            self.escrow.insert(job_id, available - amount);
        }
        Ok(())
    }
}

/// Custodies stake and job escrow, and moves value only through audited entry points.
///
/// Every value-moving call runs inside a [`CallGuard`], so calls from different threads are
/// serialized and a call made from a token hook while another is in flight is rejected.
pub struct StakeManager {
    custody: Uuid,
    config: RwLock<StakeConfig>,
    token: Arc<dyn Token>,
    events: Arc<dyn EventSink>,
    fee_pool: RwLock<Option<Arc<dyn FeePool>>>,
    policy: RwLock<Option<Arc<TaxPolicy>>>,
    credentials: RwLock<Option<Arc<dyn CredentialSource>>>,
    boosts: RwLock<BoostTable>,
    guard: CallGuard,
    book: Mutex<StakeBook>,
}

impl StakeManager {
    pub fn new(config: StakeConfig, token: Arc<dyn Token>, events: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self {
            custody: Uuid::new_v4(),
            config: RwLock::new(config.validate()?),
            token,
            events,
            fee_pool: RwLock::new(None),
            policy: RwLock::new(None),
            credentials: RwLock::new(None),
            boosts: RwLock::new(BoostTable::new()),
            guard: CallGuard::new(),
            book: Mutex::new(StakeBook::default()),
        })
    }

    pub fn with_fee_pool(self, pool: Arc<dyn FeePool>) -> Self {
        *self.fee_pool.write() = Some(pool);
        self
    }

    pub fn with_policy(self, policy: Arc<TaxPolicy>) -> Self {
        *self.policy.write() = Some(policy);
        self
    }

    pub fn with_credentials(self, source: Arc<dyn CredentialSource>) -> Self {
        *self.credentials.write() = Some(source);
        self
    }

    /// Token account holding all stake and escrow.
    pub fn custody_account(&self) -> Uuid {
        self.custody
    }

    pub fn config(&self) -> StakeConfig {
        self.config.read().clone()
    }

    // ---- reads -------------------------------------------------------------------------

    pub fn stake_of(&self, holder: Uuid, role: Role) -> u64 {
        self.book.lock().account(holder, role).balance
    }

    pub fn account(&self, holder: Uuid, role: Role) -> StakeAccount {
        self.book.lock().account(holder, role)
    }

    pub fn locked_of(&self, holder: Uuid, role: Role, now: u64) -> u64 {
        self.book.lock().account(holder, role).active_lock(now)
    }

    pub fn boosted_stake_of(&self, holder: Uuid, role: Role) -> u64 {
        self.book.lock().account(holder, role).boosted
    }

    pub fn total_stake(&self, role: Role) -> u64 {
        self.book.lock().total_stake.get(&role).copied().unwrap_or(0)
    }

    /// Cached aggregate of boosted stake for `role`.
    pub fn total_boosted_stake(&self, role: Role) -> u64 {
        self.book.lock().total_boosted.get(&role).copied().unwrap_or(0)
    }

    pub fn has_fee_pool(&self) -> bool {
        self.fee_pool.read().is_some()
    }

    pub fn escrow_of(&self, job_id: JobId) -> u64 {
        self.book.lock().escrow(job_id)
    }

    pub fn total_escrow(&self) -> u64 {
        self.book.lock().escrow.values().sum()
    }

    /// Multiplier currently cached for `holder`.
    pub fn cached_multiplier(&self, holder: Uuid) -> u32 {
        self.book.lock().multiplier(holder)
    }

    /// Multiplier computed from the credential source right now.
    pub fn multiplier_of(&self, holder: Uuid) -> u32 {
        let source = self.credentials.read().clone();
        let cap = self.config.read().max_total_bonus_pct;
        match source {
            Some(source) => self.boosts.read().multiplier(source.as_ref(), holder, cap),
            None => BASE_PCT,
        }
    }

    // ---- holder operations -------------------------------------------------------------

    pub fn deposit(&self, holder: Uuid, role: Role, amount: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Err(AgoraError::InvalidAmount);
        }
        self.ensure_acknowledged(holder)?;
        let config = self.config();
        let current = self.book.lock().account(holder, role);
        let new_balance = current
            .balance
            .checked_add(amount)
            .ok_or(AgoraError::InvalidAmount)?;
        if new_balance < config.min_stake {
            return Err(AgoraError::BelowMinimumStake(new_balance));
        }
        if config.max_stake_per_address != 0 && new_balance > config.max_stake_per_address {
            return Err(AgoraError::AboveMaximumStake(new_balance));
        }

        self.token.transfer(holder, self.custody, amount)?;

        let pct = self.multiplier_of(holder);
        {
            let mut book = self.book.lock();
            book.set_multiplier(holder, pct);
            let mut account = book.account(holder, role);
            account.balance += amount;
            book.store(holder, role, account);
        }
        self.events.emit(MarketEvent::StakeDeposited {
            holder,
            role,
            amount,
        });
        info!(%holder, %role, amount, "stake deposited");
        Ok(())
    }

    /// Immediate withdrawal; only available when no unbonding period is configured.
    pub fn withdraw(&self, holder: Uuid, role: Role, amount: u64, now: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Err(AgoraError::InvalidAmount);
        }
        let config = self.config();
        if config.unbonding_period > 0 {
            return Err(AgoraError::UnbondingRequired);
        }
        let account = self.book.lock().account(holder, role);
        check_withdrawal(holder, role, &account, amount, account.pending_amount(), now, &config)?;
        self.pay_out_stake(holder, role, amount, now, false)
    }

    /// Start the unbonding timer for `amount`. Returns the unlock time.
    pub fn request_withdraw(&self, holder: Uuid, role: Role, amount: u64, now: u64) -> Result<u64> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Err(AgoraError::InvalidAmount);
        }
        let config = self.config();
        let mut book = self.book.lock();
        let mut account = book.account(holder, role);
        let total = account.pending_amount() + amount;
        check_withdrawal(holder, role, &account, total, 0, now, &config)?;

        let unlock_at = now.saturating_add(config.unbonding_period);
        account.pending = Some(PendingUnbond {
            amount: total,
            unlock_at,
        });
        book.store(holder, role, account);
        drop(book);

        self.events.emit(MarketEvent::WithdrawRequested {
            holder,
            role,
            amount,
            unlock_at,
        });
        info!(%holder, %role, amount, unlock_at, "withdrawal requested");
        Ok(unlock_at)
    }

    /// Pay out a matured withdrawal request. Returns the amount paid, which slashes during
    /// the unbonding period may have reduced.
    pub fn finalize_withdraw(&self, holder: Uuid, role: Role, now: u64) -> Result<u64> {
        let _entered = self.guard.enter()?;
        let config = self.config();
        let account = self.book.lock().account(holder, role);
        let pending = account.pending.ok_or(AgoraError::NoPendingWithdrawal)?;
        if now < pending.unlock_at {
            return Err(AgoraError::UnbondLocked {
                unlock_at: pending.unlock_at,
            });
        }
        if pending.amount == 0 {
            let mut book = self.book.lock();
            let mut account = book.account(holder, role);
            account.pending = None;
            book.store(holder, role, account);
            return Ok(0);
        }
        check_withdrawal(holder, role, &account, pending.amount, 0, now, &config)?;
        self.pay_out_stake(holder, role, pending.amount, now, true)?;
        Ok(pending.amount)
    }

    fn pay_out_stake(
        &self,
        holder: Uuid,
        role: Role,
        amount: u64,
        now: u64,
        clear_pending: bool,
    ) -> Result<()> {
        self.token.transfer(self.custody, holder, amount)?;

        let pct = self.multiplier_of(holder);
        let released = {
            let mut book = self.book.lock();
            book.set_multiplier(holder, pct);
            let mut account = book.account(holder, role);
            let released = account.expire_lock(now);
            account.balance -= amount;
            if clear_pending {
                account.pending = None;
            }
            account.clamp_to_balance();
            book.store(holder, role, account);
            released
        };

        if released > 0 {
            self.events.emit(MarketEvent::StakeUnlocked {
                holder,
                role,
                amount: released,
            });
        }
        self.events.emit(MarketEvent::StakeWithdrawn {
            holder,
            role,
            amount,
        });
        info!(%holder, %role, amount, "stake withdrawn");
        Ok(())
    }

    // ---- orchestrator operations -------------------------------------------------------

    /// Commit `amount` of existing stake until `until`. Locks on one account aggregate; the
    /// combined lock lasts until the latest `until`.
    pub fn lock_stake(&self, holder: Uuid, role: Role, amount: u64, until: u64, now: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Ok(());
        }
        let mut book = self.book.lock();
        let mut account = book.account(holder, role);
        account.expire_lock(now);
        let free = account
            .balance
            .saturating_sub(account.locked)
            .saturating_sub(account.pending_amount());
        if free < amount {
            return Err(AgoraError::InsufficientStake {
                holder,
                role,
                available: free,
                required: amount,
            });
        }
        account.locked += amount;
        account.locked_until = account.locked_until.max(until);
        let until = account.locked_until;
        book.store(holder, role, account);
        drop(book);

        self.events.emit(MarketEvent::StakeTimeLocked {
            holder,
            role,
            amount,
            until,
        });
        debug!(%holder, %role, amount, until, "stake locked");
        Ok(())
    }

    /// Release up to `amount` of an active lock ahead of its expiry. Returns the amount
    /// released, which is smaller when the lock already expired or was slashed.
    pub fn release_stake(&self, holder: Uuid, role: Role, amount: u64, now: u64) -> Result<u64> {
        let _entered = self.guard.enter()?;
        let mut book = self.book.lock();
        let mut account = book.account(holder, role);
        let mut released = account.expire_lock(now);
        let early = amount.min(account.locked);
        account.locked -= early;
        if account.locked == 0 {
            account.locked_until = 0;
        }
        released += early;
        book.store(holder, role, account);
        drop(book);

        if released > 0 {
            self.events.emit(MarketEvent::StakeUnlocked {
                holder,
                role,
                amount: released,
            });
        }
        Ok(released.min(amount))
    }

    /// Pull `amount` from `payer` into the escrow for `job_id`.
    pub fn lock_reward(&self, job_id: JobId, payer: Uuid, amount: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Err(AgoraError::InvalidAmount);
        }
        self.token.transfer(payer, self.custody, amount)?;
        *self.book.lock().escrow.entry(job_id).or_default() += amount;

        self.events.emit(MarketEvent::RewardLocked {
            job_id,
            payer,
            amount,
        });
        info!(job_id, %payer, amount, "reward escrowed");
        Ok(())
    }

    /// Release `amount` of escrow as a reward: validator share first, then fee and burn on
    /// the remaining base, then the payee.
    pub fn release_reward(
        &self,
        job_id: JobId,
        payer: Uuid,
        payee: Uuid,
        amount: u64,
        validators: &[Uuid],
    ) -> Result<ReleaseReceipt> {
        let _entered = self.guard.enter()?;
        let config = self.config();
        let (weights, available) = {
            let book = self.book.lock();
            let weights: Vec<u64> = validators
                .iter()
                .map(|v| book.account(*v, Role::Validator).boosted)
                .collect();
            (weights, book.escrow(job_id))
        };
        if available < amount {
            return Err(AgoraError::InsufficientEscrow {
                job_id,
                available,
                required: amount,
            });
        }
        let split = ReleaseSplit::compute(
            amount,
            config.fee_pct,
            config.burn_pct,
            config.validator_reward_pct,
            &weights,
        );
        let pool = self.fee_pool.read().clone();
        if split.fee > 0 && pool.is_none() {
            return Err(AgoraError::ModuleNotSet("fee pool"));
        }

        let mut paid_validators = Vec::new();
        for (validator, share) in validators.iter().zip(&split.validator_shares) {
            if *share > 0 {
                self.token.transfer(self.custody, *validator, *share)?;
                paid_validators.push((*validator, *share));
            }
        }
        if let Some(pool) = pool.as_ref().filter(|_| split.fee > 0) {
            self.token.transfer(self.custody, pool.account(), split.fee)?;
            pool.deposit_fee(split.fee);
        }
        self.token.burn(self.custody, split.burn)?;
        self.token.transfer(self.custody, payee, split.payout)?;
        self.book.lock().take_escrow(job_id, amount)?;

        for (validator, share) in &paid_validators {
            self.events.emit(MarketEvent::RewardPaid {
                job_id,
                payee: *validator,
                amount: *share,
            });
        }
        if split.fee > 0 {
            self.events.emit(MarketEvent::FeeDeposited {
                job_id: Some(job_id),
                amount: split.fee,
            });
        }
        if split.burn > 0 {
            self.events.emit(MarketEvent::TokensBurned {
                job_id: Some(job_id),
                amount: split.burn,
            });
        }
        self.events.emit(MarketEvent::RewardPaid {
            job_id,
            payee,
            amount: split.payout,
        });
        info!(job_id, %payer, %payee, amount, payout = split.payout, fee = split.fee, burned = split.burn, "reward released");

        Ok(ReleaseReceipt {
            amount,
            validators: paid_validators,
            fee: split.fee,
            burned: split.burn,
            payout: split.payout,
        })
    }

    /// Pay escrow to `to` without any split.
    pub fn pay_from_escrow(&self, job_id: JobId, to: Uuid, amount: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        self.ensure_escrow(job_id, amount)?;
        self.token.transfer(self.custody, to, amount)?;
        self.book.lock().take_escrow(job_id, amount)?;
        self.events.emit(MarketEvent::RewardPaid {
            job_id,
            payee: to,
            amount,
        });
        Ok(())
    }

    /// Return escrow to `to` (usually the employer).
    pub fn refund_escrow(&self, job_id: JobId, to: Uuid, amount: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        self.ensure_escrow(job_id, amount)?;
        self.token.transfer(self.custody, to, amount)?;
        self.book.lock().take_escrow(job_id, amount)?;
        self.events.emit(MarketEvent::EscrowRefunded { job_id, to, amount });
        info!(job_id, %to, amount, "escrow refunded");
        Ok(())
    }

    /// Route escrow to the fee pool.
    pub fn fee_from_escrow(&self, job_id: JobId, amount: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Ok(());
        }
        self.ensure_escrow(job_id, amount)?;
        let pool = self
            .fee_pool
            .read()
            .clone()
            .ok_or(AgoraError::ModuleNotSet("fee pool"))?;
        self.token.transfer(self.custody, pool.account(), amount)?;
        pool.deposit_fee(amount);
        self.book.lock().take_escrow(job_id, amount)?;
        self.events.emit(MarketEvent::FeeDeposited {
            job_id: Some(job_id),
            amount,
        });
        Ok(())
    }

    pub fn burn_from_escrow(&self, job_id: JobId, amount: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Ok(());
        }
        self.ensure_escrow(job_id, amount)?;
        self.token.burn(self.custody, amount)?;
        self.book.lock().take_escrow(job_id, amount)?;
        self.events.emit(MarketEvent::TokensBurned {
            job_id: Some(job_id),
            amount,
        });
        Ok(())
    }

    /// Forfeit `amount` of `holder`'s stake. With validator recipients, the validator reward
    /// share is paid to them by relative stake first; the rest is split between employer
    /// and treasury and the remainder burned.
    pub fn slash(
        &self,
        holder: Uuid,
        role: Role,
        amount: u64,
        employer: Uuid,
        validators: &[Uuid],
    ) -> Result<SlashReceipt> {
        let _entered = self.guard.enter()?;
        if amount == 0 {
            return Err(AgoraError::InvalidAmount);
        }
        let config = self.config();
        if employer.is_nil() && config.employer_slash_pct > 0 {
            return Err(AgoraError::InvalidRecipient);
        }

        let recipients: Vec<Uuid> = {
            let mut seen = HashSet::new();
            validators
                .iter()
                .copied()
                .filter(|v| *v != holder && seen.insert(*v))
                .collect()
        };
        let (balance, weights) = {
            let book = self.book.lock();
            let weights: Vec<u64> = recipients
                .iter()
                .map(|v| book.account(*v, Role::Validator).balance)
                .collect();
            (book.account(holder, role).balance, weights)
        };
        if balance < amount {
            return Err(AgoraError::InsufficientStake {
                holder,
                role,
                available: balance,
                required: amount,
            });
        }

        let split = SlashSplit::compute(
            amount,
            config.employer_slash_pct,
            config.treasury_slash_pct,
            config.validator_reward_pct,
            &weights,
        );

        let mut paid_validators = Vec::new();
        for (validator, share) in recipients.iter().zip(&split.validator_shares) {
            if *share > 0 {
                self.token.transfer(self.custody, *validator, *share)?;
                paid_validators.push((*validator, *share));
            }
        }
        self.token.transfer(self.custody, employer, split.employer)?;
        let mut burned = split.burn;
        match config.treasury {
            Some(treasury) => self.token.transfer(self.custody, treasury, split.treasury)?,
            None => burned += split.treasury,
        }
        self.token.burn(self.custody, burned)?;

        let pct = self.multiplier_of(holder);
        let unlocked = {
            let mut book = self.book.lock();
            book.set_multiplier(holder, pct);
            let mut account = book.account(holder, role);
            account.balance -= amount;
            let unlocked = account.clamp_to_balance();
            book.store(holder, role, account);
            unlocked
        };

        let treasury_share = if config.treasury.is_some() {
            split.treasury
        } else {
            0
        };
        self.events.emit(MarketEvent::StakeSlashed {
            holder,
            role,
            amount,
            employer,
            employer_share: split.employer,
            treasury_share,
            validator_share: split.validators_total(),
            burned,
        });
        if unlocked > 0 {
            self.events.emit(MarketEvent::StakeUnlocked {
                holder,
                role,
                amount: unlocked,
            });
        }
        if burned > 0 {
            self.events.emit(MarketEvent::TokensBurned {
                job_id: None,
                amount: burned,
            });
        }
        info!(%holder, %role, amount, employer_share = split.employer, treasury_share, burned, "stake slashed");

        Ok(SlashReceipt {
            amount,
            validators: paid_validators,
            employer: split.employer,
            treasury: treasury_share,
            burned,
        })
    }

    /// Recompute `holder`'s multiplier from the credential source and resync aggregates.
    pub fn refresh_boost(&self, holder: Uuid) -> u32 {
        let pct = self.multiplier_of(holder);
        if self.book.lock().set_multiplier(holder, pct) {
            self.events.emit(MarketEvent::BoostUpdated { holder, pct });
        }
        pct
    }

    fn refresh_all_boosts(&self) {
        let holders = self.book.lock().holders();
        for holder in holders {
            self.refresh_boost(holder);
        }
    }

    // ---- governance --------------------------------------------------------------------

    fn ensure_governance(&self, caller: Uuid) -> Result<()> {
        if caller != self.config.read().governance {
            return Err(AgoraError::Unauthorized("stake governance".into()));
        }
        Ok(())
    }

    pub fn set_slashing_percentages(&self, caller: Uuid, employer_pct: u32, treasury_pct: u32) -> Result<()> {
        self.ensure_governance(caller)?;
        check_slashing(employer_pct, treasury_pct)?;
        let mut config = self.config.write();
        config.employer_slash_pct = employer_pct;
        config.treasury_slash_pct = treasury_pct;
        info!(employer_pct, treasury_pct, "slashing percentages updated");
        Ok(())
    }

    pub fn set_reward_split(&self, caller: Uuid, fee_pct: u32, burn_pct: u32, validator_pct: u32) -> Result<()> {
        self.ensure_governance(caller)?;
        check_reward_split(fee_pct, burn_pct, validator_pct)?;
        let mut config = self.config.write();
        config.fee_pct = fee_pct;
        config.burn_pct = burn_pct;
        config.validator_reward_pct = validator_pct;
        Ok(())
    }

    pub fn set_treasury(&self, caller: Uuid, treasury: Option<Uuid>) -> Result<()> {
        self.ensure_governance(caller)?;
        if let Some(t) = treasury {
            if t.is_nil() || t == caller {
                return Err(AgoraError::InvalidTreasury);
            }
        }
        self.config.write().treasury = treasury;
        Ok(())
    }

    pub fn set_stake_bounds(&self, caller: Uuid, min_stake: u64, max_per_address: u64) -> Result<()> {
        self.ensure_governance(caller)?;
        if max_per_address != 0 && max_per_address < min_stake {
            return Err(AgoraError::InvalidAmount);
        }
        let mut config = self.config.write();
        config.min_stake = min_stake;
        config.max_stake_per_address = max_per_address;
        Ok(())
    }

    pub fn set_unbonding_period(&self, caller: Uuid, secs: u64) -> Result<()> {
        self.ensure_governance(caller)?;
        self.config.write().unbonding_period = secs;
        Ok(())
    }

    pub fn set_fee_pool(&self, caller: Uuid, pool: Arc<dyn FeePool>) -> Result<()> {
        self.ensure_governance(caller)?;
        *self.fee_pool.write() = Some(pool);
        Ok(())
    }

    pub fn set_policy(&self, caller: Uuid, policy: Arc<TaxPolicy>) -> Result<()> {
        self.ensure_governance(caller)?;
        *self.policy.write() = Some(policy);
        Ok(())
    }

    pub fn set_credential_source(&self, caller: Uuid, source: Arc<dyn CredentialSource>) -> Result<()> {
        self.ensure_governance(caller)?;
        *self.credentials.write() = Some(source);
        self.refresh_all_boosts();
        Ok(())
    }

    /// Returns false if the credential was already registered.
    pub fn register_bonus_credential(&self, caller: Uuid, id: &str, pct: u32) -> Result<bool> {
        self.ensure_governance(caller)?;
        let added = self.boosts.write().register(id, pct);
        if added {
            self.refresh_all_boosts();
        }
        Ok(added)
    }

    pub fn remove_bonus_credential(&self, caller: Uuid, id: &str) -> Result<bool> {
        self.ensure_governance(caller)?;
        let removed = self.boosts.write().remove(id);
        if removed {
            self.refresh_all_boosts();
        }
        Ok(removed)
    }

    pub fn set_max_total_bonus_pct(&self, caller: Uuid, pct: u32) -> Result<()> {
        self.ensure_governance(caller)?;
        self.config.write().max_total_bonus_pct = pct;
        self.refresh_all_boosts();
        Ok(())
    }

    // ---- helpers -----------------------------------------------------------------------

    fn ensure_acknowledged(&self, holder: Uuid) -> Result<()> {
        match self.policy.read().as_ref() {
            Some(policy) => policy.ensure_acknowledged(holder),
            None => Ok(()),
        }
    }

    fn ensure_escrow(&self, job_id: JobId, amount: u64) -> Result<()> {
        let available = self.book.lock().escrow(job_id);
        if available < amount {
            return Err(AgoraError::InsufficientEscrow {
                job_id,
                available,
                required: amount,
            });
        }
        Ok(())
    }
}

/// Shared checks for every withdrawal path. `reserved` is pending unbond that must stay put.
fn check_withdrawal(
    holder: Uuid,
    role: Role,
    account: &StakeAccount,
    amount: u64,
    reserved: u64,
    now: u64,
    config: &StakeConfig,
) -> Result<()> {
    let unreserved = account.balance.saturating_sub(reserved);
    if amount > unreserved {
        return Err(AgoraError::InsufficientStake {
            holder,
            role,
            available: unreserved,
            required: amount,
        });
    }
    if amount > unreserved.saturating_sub(account.active_lock(now)) {
        return Err(AgoraError::InsufficientLocked);
    }
    let remaining = account.balance - amount;
    if remaining != 0 && remaining < config.min_stake {
        return Err(AgoraError::BelowMinimumStake(remaining));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::boost::CredentialBook;
    use crate::fee_pool::FeeVault;
    use crate::token::InMemoryToken;
    use agora_types::EventBuffer;
    use proptest::prelude::*;

    struct Fixture {
        governance: Uuid,
        treasury: Uuid,
        token: Arc<InMemoryToken>,
        events: Arc<EventBuffer>,
        stake: StakeManager,
    }

    fn fixture(config: impl FnOnce(StakeConfig) -> StakeConfig) -> Fixture {
        let governance = Uuid::new_v4();
        let treasury = Uuid::new_v4();
        let token = Arc::new(InMemoryToken::new());
        let events = Arc::new(EventBuffer::new());
        let stake = StakeManager::new(
            config(StakeConfig::new(governance).with_treasury(treasury)),
            token.clone(),
            events.clone(),
        )
        .unwrap();
        Fixture {
            governance,
            treasury,
            token,
            events,
            stake,
        }
    }

    fn funded(f: &Fixture, amount: u64) -> Uuid {
        let who = Uuid::new_v4();
        f.token.mint(who, amount);
        who
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let f = fixture(|c| c);
        let agent = funded(&f, 500);
        f.stake.deposit(agent, Role::Agent, 300).unwrap();
        assert_eq!(f.stake.stake_of(agent, Role::Agent), 300);
        assert_eq!(f.stake.total_stake(Role::Agent), 300);
        assert_eq!(f.token.balance_of(f.stake.custody_account()), 300);

        f.stake.withdraw(agent, Role::Agent, 100, 0).unwrap();
        assert_eq!(f.stake.stake_of(agent, Role::Agent), 200);
        assert_eq!(f.token.balance_of(agent), 400);

        let err = f.stake.withdraw(agent, Role::Agent, 201, 0).unwrap_err();
        assert!(matches!(err, AgoraError::InsufficientStake { available: 200, .. }));
        assert!(matches!(
            f.stake.deposit(agent, Role::Agent, 0),
            Err(AgoraError::InvalidAmount)
        ));
    }

    #[test]
    fn test_roles_are_separate() {
        let f = fixture(|c| c);
        let who = funded(&f, 100);
        f.stake.deposit(who, Role::Agent, 40).unwrap();
        f.stake.deposit(who, Role::Validator, 60).unwrap();
        assert_eq!(f.stake.stake_of(who, Role::Agent), 40);
        assert_eq!(f.stake.stake_of(who, Role::Validator), 60);
        assert_eq!(f.stake.stake_of(who, Role::Platform), 0);
    }

    #[test]
    fn test_minimum_and_maximum_stake() {
        let f = fixture(|c| c.with_min_stake(50));
        f.stake.set_stake_bounds(f.governance, 50, 120).unwrap();
        let agent = funded(&f, 500);

        assert!(matches!(
            f.stake.deposit(agent, Role::Agent, 10),
            Err(AgoraError::BelowMinimumStake(10))
        ));
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        assert!(matches!(
            f.stake.deposit(agent, Role::Agent, 30),
            Err(AgoraError::AboveMaximumStake(130))
        ));
        assert!(matches!(
            f.stake.withdraw(agent, Role::Agent, 60, 0),
            Err(AgoraError::BelowMinimumStake(40))
        ));
        // A full exit is always allowed.
        f.stake.withdraw(agent, Role::Agent, 100, 0).unwrap();
        assert_eq!(f.stake.account(agent, Role::Agent), StakeAccount::default());
    }

    #[test]
    fn test_policy_acknowledgement_required() {
        let policy = Arc::new(TaxPolicy::new("ipfs://terms"));
        let f = fixture(|c| c);
        let stake = f.stake.with_policy(policy.clone());
        let agent = Uuid::new_v4();
        f.token.mint(agent, 100);

        assert!(matches!(
            stake.deposit(agent, Role::Agent, 10),
            Err(AgoraError::TaxPolicyNotAcknowledged(_))
        ));
        policy.acknowledge(agent);
        stake.deposit(agent, Role::Agent, 10).unwrap();
    }

    #[test]
    fn test_unbonding_flow() {
        let f = fixture(|c| c.with_unbonding_period(100));
        let agent = funded(&f, 300);
        f.stake.deposit(agent, Role::Agent, 300).unwrap();

        assert!(matches!(
            f.stake.withdraw(agent, Role::Agent, 10, 0),
            Err(AgoraError::UnbondingRequired)
        ));
        assert!(matches!(
            f.stake.finalize_withdraw(agent, Role::Agent, 0),
            Err(AgoraError::NoPendingWithdrawal)
        ));

        let unlock_at = f.stake.request_withdraw(agent, Role::Agent, 100, 10).unwrap();
        assert_eq!(unlock_at, 110);
        assert!(matches!(
            f.stake.finalize_withdraw(agent, Role::Agent, 109),
            Err(AgoraError::UnbondLocked { unlock_at: 110 })
        ));
        assert_eq!(f.stake.finalize_withdraw(agent, Role::Agent, 110).unwrap(), 100);
        assert_eq!(f.stake.stake_of(agent, Role::Agent), 200);
        assert_eq!(f.token.balance_of(agent), 100);
        assert!(f.stake.account(agent, Role::Agent).pending.is_none());
    }

    #[test]
    fn test_slash_during_unbonding_reduces_payout() {
        let f = fixture(|c| c.with_unbonding_period(100));
        let agent = funded(&f, 100);
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        f.stake.request_withdraw(agent, Role::Agent, 100, 0).unwrap();

        f.stake
            .slash(agent, Role::Agent, 70, Uuid::new_v4(), &[])
            .unwrap();
        assert_eq!(f.stake.account(agent, Role::Agent).pending_amount(), 30);
        assert_eq!(f.stake.finalize_withdraw(agent, Role::Agent, 100).unwrap(), 30);
        assert_eq!(f.stake.stake_of(agent, Role::Agent), 0);
    }

    #[test]
    fn test_locked_stake_cannot_leave() {
        let f = fixture(|c| c);
        let agent = funded(&f, 100);
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        f.stake.lock_stake(agent, Role::Agent, 60, 50, 0).unwrap();

        assert!(matches!(
            f.stake.withdraw(agent, Role::Agent, 50, 10),
            Err(AgoraError::InsufficientLocked)
        ));
        assert!(matches!(
            f.stake.lock_stake(agent, Role::Agent, 50, 50, 10),
            Err(AgoraError::InsufficientStake { available: 40, .. })
        ));
        f.stake.withdraw(agent, Role::Agent, 40, 10).unwrap();

        // Lock lapses at its deadline.
        f.stake.withdraw(agent, Role::Agent, 60, 50).unwrap();
        assert_eq!(f.stake.stake_of(agent, Role::Agent), 0);
    }

    #[test]
    fn test_release_stake_is_bounded_by_lock() {
        let f = fixture(|c| c);
        let agent = funded(&f, 100);
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        f.stake.lock_stake(agent, Role::Agent, 30, 100, 0).unwrap();
        f.stake.lock_stake(agent, Role::Agent, 20, 200, 0).unwrap();
        assert_eq!(f.stake.account(agent, Role::Agent).locked_until, 200);

        assert_eq!(f.stake.release_stake(agent, Role::Agent, 30, 10).unwrap(), 30);
        assert_eq!(f.stake.locked_of(agent, Role::Agent, 10), 20);
        assert_eq!(f.stake.release_stake(agent, Role::Agent, 50, 10).unwrap(), 20);
        assert_eq!(f.stake.locked_of(agent, Role::Agent, 10), 0);
    }

    #[test]
    fn test_slash_split_employer_and_treasury() {
        let f = fixture(|c| c.with_slashing(50, 50));
        let agent = funded(&f, 100);
        let employer = Uuid::new_v4();
        f.stake.deposit(agent, Role::Agent, 100).unwrap();

        let receipt = f.stake.slash(agent, Role::Agent, 100, employer, &[]).unwrap();
        assert_eq!((receipt.employer, receipt.treasury, receipt.burned), (50, 50, 0));
        assert_eq!(f.token.balance_of(employer), 50);
        assert_eq!(f.token.balance_of(f.treasury), 50);
        assert_eq!(f.stake.total_stake(Role::Agent), 0);
    }

    #[test]
    fn test_slash_rounding_burns_dust() {
        let f = fixture(|c| c.with_slashing(60, 40));
        let agent = funded(&f, 101);
        f.stake.deposit(agent, Role::Agent, 101).unwrap();
        let supply = f.token.total_supply();

        let receipt = f
            .stake
            .slash(agent, Role::Agent, 101, Uuid::new_v4(), &[])
            .unwrap();
        assert_eq!((receipt.employer, receipt.treasury, receipt.burned), (60, 40, 1));
        assert_eq!(f.token.total_supply(), supply - 1);
    }

    #[test]
    fn test_slash_pays_validators_by_stake() {
        let f = fixture(|c| c.with_reward_split(0, 0, 20));
        let agent = funded(&f, 40);
        let v1 = funded(&f, 100);
        let v2 = funded(&f, 300);
        f.stake.deposit(agent, Role::Agent, 40).unwrap();
        f.stake.deposit(v1, Role::Validator, 100).unwrap();
        f.stake.deposit(v2, Role::Validator, 300).unwrap();

        let receipt = f
            .stake
            .slash(agent, Role::Agent, 40, Uuid::new_v4(), &[v1, v2])
            .unwrap();
        assert_eq!(receipt.validators, vec![(v1, 2), (v2, 6)]);
        assert_eq!(receipt.treasury, 32);
        assert_eq!(f.token.balance_of(v1), 2);
    }

    /// Stake a holder and one validator per weight, then slash the holder once per amount.
    /// Returns the holder's remaining stake and what each validator received.
    fn slash_in_steps(amounts: &[u64], employer_pct: u32, validator_pct: u32, weights: &[u64]) -> (u64, Vec<u64>) {
        let f = fixture(|c| {
            c.with_slashing(employer_pct, 100 - employer_pct)
                .with_reward_split(0, 0, validator_pct)
        });
        let total: u64 = amounts.iter().sum();
        let holder = funded(&f, total + 1);
        f.stake.deposit(holder, Role::Agent, total + 1).unwrap();
        let recipients: Vec<Uuid> = weights
            .iter()
            .map(|w| {
                let v = funded(&f, *w);
                f.stake.deposit(v, Role::Validator, *w).unwrap();
                v
            })
            .collect();
        let employer = Uuid::new_v4();
        for amount in amounts {
            f.stake
                .slash(holder, Role::Agent, *amount, employer, &recipients)
                .unwrap();
        }
        let received = recipients.iter().map(|v| f.token.balance_of(*v)).collect();
        (f.stake.stake_of(holder, Role::Agent), received)
    }

    proptest! {
        #[test]
        fn prop_sequential_slash_matches_combined(
            first in 1u64..1_000_000,
            second in 1u64..1_000_000,
            employer_pct in 0u32..=100,
            validator_pct in 0u32..=100,
            weights in proptest::collection::vec(1u64..10_000, 0..5),
        ) {
            let (split_left, split_paid) = slash_in_steps(&[first, second], employer_pct, validator_pct, &weights);
            let (whole_left, whole_paid) = slash_in_steps(&[first + second], employer_pct, validator_pct, &weights);
            prop_assert_eq!(split_left, whole_left);
            prop_assert_eq!(split_left, 1);
            let bound = weights.len() as u64;
            for (a, b) in split_paid.iter().zip(&whole_paid) {
                prop_assert!(a.abs_diff(*b) <= bound, "{} vs {} over {} recipients", a, b, bound);
            }
        }
    }

    #[test]
    fn test_slash_requires_employer_when_employer_share() {
        let f = fixture(|c| c.with_slashing(50, 50));
        let agent = funded(&f, 100);
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        assert!(matches!(
            f.stake.slash(agent, Role::Agent, 10, Uuid::nil(), &[]),
            Err(AgoraError::InvalidRecipient)
        ));
        assert!(matches!(
            f.stake.slash(agent, Role::Agent, 101, Uuid::new_v4(), &[]),
            Err(AgoraError::InsufficientStake { .. })
        ));
    }

    #[test]
    fn test_slash_without_treasury_burns() {
        let f = fixture(|c| c);
        f.stake.set_treasury(f.governance, None).unwrap();
        let agent = funded(&f, 100);
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        let receipt = f.stake.slash(agent, Role::Agent, 100, Uuid::nil(), &[]).unwrap();
        assert_eq!(receipt.burned, 100);
        assert_eq!(f.token.total_supply(), 0);
    }

    #[test]
    fn test_slash_clamps_lock() {
        let f = fixture(|c| c);
        let agent = funded(&f, 100);
        f.stake.deposit(agent, Role::Agent, 100).unwrap();
        f.stake.lock_stake(agent, Role::Agent, 80, 1_000, 0).unwrap();
        f.stake.slash(agent, Role::Agent, 50, Uuid::nil(), &[]).unwrap();

        let account = f.stake.account(agent, Role::Agent);
        assert_eq!((account.balance, account.locked), (50, 50));
        assert!(f.events.snapshot().iter().any(|e| matches!(
            e,
            MarketEvent::StakeUnlocked { amount: 30, .. }
        )));
    }

    #[test]
    fn test_escrow_release_scenario() {
        let f = fixture(|c| c.with_reward_split(0, 10, 0));
        let employer = funded(&f, 120);
        let agent = Uuid::new_v4();
        let vault = Arc::new(FeeVault::new());
        f.stake.set_fee_pool(f.governance, vault.clone()).unwrap();

        f.stake.lock_reward(1, employer, 120).unwrap();
        assert_eq!(f.stake.escrow_of(1), 120);

        let receipt = f.stake.release_reward(1, employer, agent, 100, &[]).unwrap();
        assert_eq!((receipt.payout, receipt.burned, receipt.fee), (90, 10, 0));
        f.stake.fee_from_escrow(1, 20).unwrap();

        assert_eq!(f.token.balance_of(agent), 90);
        assert_eq!(vault.received(), 20);
        assert_eq!(f.token.balance_of(vault.account()), 20);
        assert_eq!(f.stake.escrow_of(1), 0);
        assert_eq!(f.token.total_supply(), 110);
    }

    #[test]
    fn test_escrow_bounds() {
        let f = fixture(|c| c);
        let employer = funded(&f, 50);
        f.stake.lock_reward(7, employer, 50).unwrap();
        assert!(matches!(
            f.stake.refund_escrow(7, employer, 51),
            Err(AgoraError::InsufficientEscrow { available: 50, .. })
        ));
        assert!(matches!(
            f.stake.fee_from_escrow(7, 5),
            Err(AgoraError::ModuleNotSet(_))
        ));
        f.stake.refund_escrow(7, employer, 50).unwrap();
        assert_eq!(f.token.balance_of(employer), 50);
        assert_eq!(f.stake.total_escrow(), 0);
    }

    #[test]
    fn test_release_pays_validator_share() {
        let f = fixture(|c| c.with_reward_split(0, 0, 10));
        let employer = funded(&f, 100);
        let v1 = funded(&f, 100);
        let v2 = funded(&f, 100);
        f.stake.deposit(v1, Role::Validator, 100).unwrap();
        f.stake.deposit(v2, Role::Validator, 100).unwrap();
        let agent = Uuid::new_v4();

        f.stake.lock_reward(3, employer, 100).unwrap();
        let receipt = f.stake.release_reward(3, employer, agent, 100, &[v1, v2]).unwrap();
        assert_eq!(receipt.validators, vec![(v1, 5), (v2, 5)]);
        assert_eq!(receipt.payout, 90);
    }

    #[test]
    fn test_governance_only_setters() {
        let f = fixture(|c| c);
        let stranger = Uuid::new_v4();
        assert!(matches!(
            f.stake.set_slashing_percentages(stranger, 10, 10),
            Err(AgoraError::Unauthorized(_))
        ));
        assert!(matches!(
            f.stake.set_slashing_percentages(f.governance, 60, 60),
            Err(AgoraError::InvalidPercentage)
        ));
        assert!(matches!(
            f.stake.set_treasury(f.governance, Some(f.governance)),
            Err(AgoraError::InvalidTreasury)
        ));
        assert!(matches!(
            f.stake.set_reward_split(f.governance, 60, 50, 0),
            Err(AgoraError::InvalidPercentage)
        ));
        f.stake.set_slashing_percentages(f.governance, 30, 70).unwrap();
        assert_eq!(f.stake.config().employer_slash_pct, 30);
    }

    #[test]
    fn test_boost_aggregate_tracks_credentials() {
        let f = fixture(|c| c);
        let book = Arc::new(CredentialBook::new());
        f.stake.set_credential_source(f.governance, book.clone()).unwrap();
        let v1 = funded(&f, 100);
        let v2 = funded(&f, 100);
        f.stake.deposit(v1, Role::Validator, 100).unwrap();
        f.stake.deposit(v2, Role::Validator, 100).unwrap();
        assert_eq!(f.stake.total_boosted_stake(Role::Validator), 200);

        assert!(f.stake.register_bonus_credential(f.governance, "gold", 50).unwrap());
        assert!(!f.stake.register_bonus_credential(f.governance, "gold", 80).unwrap());
        book.grant("gold", v1);
        assert_eq!(f.stake.multiplier_of(v1), 150);
        assert_eq!(f.stake.cached_multiplier(v1), 100);

        assert_eq!(f.stake.refresh_boost(v1), 150);
        assert_eq!(f.stake.boosted_stake_of(v1, Role::Validator), 150);
        assert_eq!(f.stake.total_boosted_stake(Role::Validator), 250);

        f.stake.withdraw(v1, Role::Validator, 50, 0).unwrap();
        assert_eq!(f.stake.total_boosted_stake(Role::Validator), 175);

        f.stake.remove_bonus_credential(f.governance, "gold").unwrap();
        assert_eq!(f.stake.total_boosted_stake(Role::Validator), 150);
    }

    struct HookedToken {
        inner: InMemoryToken,
        target: OnceLock<Arc<StakeManager>>,
        attacker: Uuid,
        observed: Mutex<Vec<AgoraError>>,
    }

    impl Token for HookedToken {
        fn balance_of(&self, who: Uuid) -> u64 {
            self.inner.balance_of(who)
        }

        fn transfer(&self, from: Uuid, to: Uuid, amount: u64) -> Result<()> {
            self.inner.transfer(from, to, amount)?;
            if to == self.attacker {
                if let Some(stake) = self.target.get() {
                    if let Err(err) = stake.withdraw(self.attacker, Role::Agent, 1, 0) {
                        self.observed.lock().push(err);
                    }
                }
            }
            Ok(())
        }

        fn burn(&self, from: Uuid, amount: u64) -> Result<()> {
            self.inner.burn(from, amount)
        }

        fn total_supply(&self) -> u64 {
            self.inner.total_supply()
        }
    }

    #[test]
    fn test_reentrant_withdraw_rejected() {
        let attacker = Uuid::new_v4();
        let token = Arc::new(HookedToken {
            inner: InMemoryToken::new(),
            target: OnceLock::new(),
            attacker,
            observed: Mutex::new(Vec::new()),
        });
        token.inner.mint(attacker, 100);
        let stake = Arc::new(
            StakeManager::new(
                StakeConfig::new(Uuid::new_v4()),
                token.clone(),
                Arc::new(EventBuffer::new()),
            )
            .unwrap(),
        );
        let _ = token.target.set(stake.clone());

        stake.deposit(attacker, Role::Agent, 100).unwrap();
        stake.withdraw(attacker, Role::Agent, 50, 0).unwrap();

        let observed = token.observed.lock();
        assert_eq!(observed.len(), 1);
        assert!(matches!(observed[0], AgoraError::ReentrantCall));
        assert_eq!(stake.stake_of(attacker, Role::Agent), 50);
        assert_eq!(token.balance_of(attacker), 50);
    }
}
