use serde::{Deserialize, Serialize};

use agora_types::{AgoraError, Result};

/// Job registry parameters. Zero disables a cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Protocol fee escrowed on top of the reward, in whole percent of the reward.
    #[serde(default = "default_fee_pct")]
    pub fee_pct: u32,

    #[serde(default)]
    pub max_reward: u64,

    /// Longest allowed `deadline - created_at`, in seconds.
    #[serde(default)]
    pub max_duration: u64,

    #[serde(default)]
    pub max_active_jobs_per_agent: u32,

    /// Agent stake locked for each assigned job.
    #[serde(default)]
    pub job_stake: u64,

    /// Seconds past the deadline before an unfinished job can be expired.
    #[serde(default = "default_expiration_grace")]
    pub expiration_grace: u64,

    /// Seconds after the outcome during which only the employer may finalize.
    #[serde(default = "default_employer_finalize_window")]
    pub employer_finalize_window: u64,

    /// Hold validator selection until the employer confirms a burn receipt.
    #[serde(default)]
    pub require_burn_receipt: bool,

    /// Expected burn, in whole percent of the reward, checked against submitted receipts.
    #[serde(default)]
    pub expected_burn_pct: u32,
}

fn default_fee_pct() -> u32 {
    5
}

fn default_expiration_grace() -> u64 {
    3_600
}

fn default_employer_finalize_window() -> u64 {
    7 * 86_400
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fee_pct: default_fee_pct(),
            max_reward: 0,
            max_duration: 0,
            max_active_jobs_per_agent: 0,
            job_stake: 0,
            expiration_grace: default_expiration_grace(),
            employer_finalize_window: default_employer_finalize_window(),
            require_burn_receipt: false,
            expected_burn_pct: 0,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fee_pct > 100 || self.expected_burn_pct > 100 {
            return Err(AgoraError::InvalidPercentage);
        }
        Ok(())
    }

    pub fn with_fee_pct(mut self, pct: u32) -> Self {
        self.fee_pct = pct;
        self
    }

    pub fn with_job_stake(mut self, stake: u64) -> Self {
        self.job_stake = stake;
        self
    }

    pub fn with_caps(mut self, max_reward: u64, max_duration: u64) -> Self {
        self.max_reward = max_reward;
        self.max_duration = max_duration;
        self
    }

    pub fn with_burn_receipts(mut self, expected_burn_pct: u32) -> Self {
        self.require_burn_receipt = true;
        self.expected_burn_pct = expected_burn_pct;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml_shape() {
        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.fee_pct, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_percentages() {
        assert!(RegistryConfig::default().with_fee_pct(101).validate().is_err());
        assert!(RegistryConfig::default().with_burn_receipts(150).validate().is_err());
    }
}
