use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use agora_stake::StakeManager;
use agora_types::{AgoraError, BASE_PCT, Job, Result, Role};

/// Where a settlement leg is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Account(Uuid),
    /// No eligible account (e.g. blacklisted party and no treasury); the amount is burned.
    Burn,
}

/// How a job's escrow was distributed. Every field except `slashed` came out of escrow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub payee: Option<Uuid>,
    /// Total paid to the payee, bonus included.
    pub payout: u64,
    pub bonus: u64,
    pub fee: u64,
    pub burned: u64,
    pub validators: u64,
    pub refunded: u64,
    /// Agent stake forfeited on failure. Not escrow.
    pub slashed: u64,
}

impl Settlement {
    pub fn escrow_total(&self) -> u64 {
        self.payout + self.fee + self.burned + self.validators + self.refunded
    }
}

/// Bonus paid on top of `payout` for a multiplier of `agent_pct`, funded from and capped at
/// the job fee.
pub fn bonus_uplift(payout: u64, agent_pct: u32, fee: u64) -> u64 {
    if agent_pct <= BASE_PCT {
        return 0;
    }
    let uplift = payout as u128 * (agent_pct - BASE_PCT) as u128 / BASE_PCT as u128;
    uplift.min(fee as u128) as u64
}

/// Pay a successful job: the reward goes through the ledger's release split, the bonus
/// comes out of the fee, and the rest of the fee goes to the fee pool.
pub(crate) fn settle_success(
    stake: &StakeManager,
    job: &Job,
    payee: Recipient,
    agent_pct: u32,
    winners: &[Uuid],
) -> Result<Settlement> {
    if job.fee > 0 && !stake.has_fee_pool() {
        return Err(AgoraError::ModuleNotSet("fee pool"));
    }
    let available = stake.escrow_of(job.id);
    if available < job.reward + job.fee {
        return Err(AgoraError::InsufficientEscrow {
            job_id: job.id,
            available,
            required: job.reward + job.fee,
        });
    }

    let settlement = match payee {
        Recipient::Account(to) => {
            let receipt = stake.release_reward(job.id, job.employer, to, job.reward, winners)?;
            let bonus = bonus_uplift(receipt.payout, agent_pct, job.fee);
            if bonus > 0 {
                stake.pay_from_escrow(job.id, to, bonus)?;
            }
            stake.fee_from_escrow(job.id, job.fee - bonus)?;
            Settlement {
                payee: Some(to),
                payout: receipt.payout + bonus,
                bonus,
                fee: receipt.fee + job.fee - bonus,
                burned: receipt.burned,
                validators: receipt.validators.iter().map(|(_, share)| *share).sum(),
                ..Settlement::default()
            }
        }
        Recipient::Burn => {
            stake.burn_from_escrow(job.id, job.reward)?;
            stake.fee_from_escrow(job.id, job.fee)?;
            Settlement {
                fee: job.fee,
                burned: job.reward,
                ..Settlement::default()
            }
        }
    };
    debug!(job_id = job.id, payout = settlement.payout, bonus = settlement.bonus, "success settled");
    Ok(settlement)
}

/// Refund what the job still holds and, unless `slash_agent` is `None`, forfeit the agent's
/// job stake with `winners` as validator recipients.
pub(crate) fn settle_failure(
    stake: &StakeManager,
    job: &Job,
    refund_to: Recipient,
    slash_agent: Option<Uuid>,
    winners: &[Uuid],
) -> Result<Settlement> {
    let held = stake.escrow_of(job.id);
    let mut settlement = Settlement::default();
    match refund_to {
        Recipient::Account(to) => {
            if held > 0 {
                stake.refund_escrow(job.id, to, held)?;
            }
            settlement.refunded = held;
        }
        Recipient::Burn => {
            stake.burn_from_escrow(job.id, held)?;
            settlement.burned = held;
        }
    }

    if let Some(agent) = slash_agent {
        let amount = job.stake.min(stake.stake_of(agent, Role::Agent));
        if amount > 0 {
            let receipt = stake.slash(agent, Role::Agent, amount, job.employer, winners)?;
            settlement.slashed = receipt.amount;
        }
    }
    debug!(job_id = job.id, refunded = settlement.refunded, slashed = settlement.slashed, "failure settled");
    Ok(settlement)
}

/// Return escrow without any split. Used by cancel, delist and expiry.
pub(crate) fn refund_all(stake: &StakeManager, job: &Job, to: Uuid) -> Result<u64> {
    let held = stake.escrow_of(job.id);
    if held > 0 {
        stake.refund_escrow(job.id, to, held)?;
    }
    Ok(held)
}

/// Drop the agent's job lock. Whatever a slash or expiry already removed is skipped.
pub(crate) fn release_job_stake(stake: &StakeManager, job: &Job, now: u64) -> Result<u64> {
    match job.agent {
        Some(agent) if job.stake > 0 => stake.release_stake(agent, Role::Agent, job.stake, now),
        _ => Ok(0),
    }
}
