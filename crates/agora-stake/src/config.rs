use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_types::{AgoraError, Result};

/// Escrow ledger parameters. Percentages are whole percent (0..=100).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StakeConfig {
    /// Account allowed to change parameters.
    pub governance: Uuid,

    /// Receives the treasury share of slashes. `None` burns it instead.
    #[serde(default)]
    pub treasury: Option<Uuid>,

    /// Floor for any non-zero stake balance.
    #[serde(default)]
    pub min_stake: u64,

    /// Ceiling per (holder, role); zero disables it.
    #[serde(default)]
    pub max_stake_per_address: u64,

    /// Seconds between `request_withdraw` and `finalize_withdraw`. Zero allows direct withdrawal.
    #[serde(default)]
    pub unbonding_period: u64,

    /// Share of each released reward routed to the fee pool.
    #[serde(default)]
    pub fee_pct: u32,

    /// Share of each released reward that is burned.
    #[serde(default)]
    pub burn_pct: u32,

    /// Share of released rewards and slashes paid to validators when recipients are given.
    #[serde(default)]
    pub validator_reward_pct: u32,

    #[serde(default = "default_employer_slash_pct")]
    pub employer_slash_pct: u32,

    #[serde(default = "default_treasury_slash_pct")]
    pub treasury_slash_pct: u32,

    /// Cap on the summed credential bonus, on top of the 100% base.
    #[serde(default = "default_max_total_bonus_pct")]
    pub max_total_bonus_pct: u32,
}

fn default_employer_slash_pct() -> u32 {
    0
}

fn default_treasury_slash_pct() -> u32 {
    100
}

fn default_max_total_bonus_pct() -> u32 {
    50
}

impl StakeConfig {
    pub fn new(governance: Uuid) -> Self {
        Self {
            governance,
            treasury: None,
            min_stake: 0,
            max_stake_per_address: 0,
            unbonding_period: 0,
            fee_pct: 0,
            burn_pct: 0,
            validator_reward_pct: 0,
            employer_slash_pct: default_employer_slash_pct(),
            treasury_slash_pct: default_treasury_slash_pct(),
            max_total_bonus_pct: default_max_total_bonus_pct(),
        }
    }

    pub fn with_treasury(mut self, treasury: Uuid) -> Self {
        self.treasury = Some(treasury);
        self
    }

    pub fn with_slashing(mut self, employer_pct: u32, treasury_pct: u32) -> Self {
        self.employer_slash_pct = employer_pct;
        self.treasury_slash_pct = treasury_pct;
        self
    }

    pub fn with_reward_split(mut self, fee_pct: u32, burn_pct: u32, validator_pct: u32) -> Self {
        self.fee_pct = fee_pct;
        self.burn_pct = burn_pct;
        self.validator_reward_pct = validator_pct;
        self
    }

    pub fn with_min_stake(mut self, min_stake: u64) -> Self {
        self.min_stake = min_stake;
        self
    }

    pub fn with_unbonding_period(mut self, secs: u64) -> Self {
        self.unbonding_period = secs;
        self
    }

    /// Check invariants and normalise a 0/0 slash split to "all to treasury".
    pub fn validate(mut self) -> Result<Self> {
        check_slashing(self.employer_slash_pct, self.treasury_slash_pct)?;
        check_reward_split(self.fee_pct, self.burn_pct, self.validator_reward_pct)?;
        if self.treasury == Some(self.governance) {
            return Err(AgoraError::InvalidTreasury);
        }
        if self.max_stake_per_address != 0 && self.max_stake_per_address < self.min_stake {
            return Err(AgoraError::InvalidAmount);
        }
        if self.employer_slash_pct == 0 && self.treasury_slash_pct == 0 {
            self.treasury_slash_pct = 100;
        }
        Ok(self)
    }
}

pub(crate) fn check_slashing(employer_pct: u32, treasury_pct: u32) -> Result<()> {
    if employer_pct > 100 || treasury_pct > 100 || employer_pct + treasury_pct > 100 {
        return Err(AgoraError::InvalidPercentage);
    }
    Ok(())
}

pub(crate) fn check_reward_split(fee_pct: u32, burn_pct: u32, validator_pct: u32) -> Result<()> {
    if fee_pct > 100 || burn_pct > 100 || validator_pct > 100 {
        return Err(AgoraError::InvalidPercentage);
    }
    if fee_pct + burn_pct > 100 {
        return Err(AgoraError::InvalidPercentage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_split_defaults_to_treasury() {
        let config = StakeConfig::new(Uuid::new_v4())
            .with_slashing(0, 0)
            .validate()
            .unwrap();
        assert_eq!(config.treasury_slash_pct, 100);
    }

    #[test]
    fn test_invalid_percentages() {
        let gov = Uuid::new_v4();
        assert!(matches!(
            StakeConfig::new(gov).with_slashing(60, 50).validate(),
            Err(AgoraError::InvalidPercentage)
        ));
        assert!(matches!(
            StakeConfig::new(gov).with_slashing(101, 0).validate(),
            Err(AgoraError::InvalidPercentage)
        ));
        assert!(matches!(
            StakeConfig::new(gov).with_reward_split(60, 50, 0).validate(),
            Err(AgoraError::InvalidPercentage)
        ));
    }

    #[test]
    fn test_treasury_cannot_be_governance() {
        let gov = Uuid::new_v4();
        assert!(matches!(
            StakeConfig::new(gov).with_treasury(gov).validate(),
            Err(AgoraError::InvalidTreasury)
        ));
    }

    #[test]
    fn test_serde_defaults() {
        let gov = Uuid::new_v4();
        let json = serde_json::json!({ "governance": gov });
        let config: StakeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.treasury_slash_pct, 100);
        assert_eq!(config.max_total_bonus_pct, 50);
        assert_eq!(config.unbonding_period, 0);
    }
}
