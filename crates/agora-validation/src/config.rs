use serde::{Deserialize, Serialize};

use agora_types::{AgoraError, Result};

use crate::commitment::CommitScheme;

/// Validation round parameters. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_window")]
    pub commit_window: u64,
    #[serde(default = "default_window")]
    pub reveal_window: u64,
    /// Extra time after the reveal deadline before `finalize` may run with missing reveals.
    #[serde(default = "default_reveal_grace")]
    pub reveal_grace: u64,
    /// Extra time after the reveal deadline before a round with no reveals may be forced.
    #[serde(default = "default_force_grace")]
    pub force_finalize_grace: u64,
    #[serde(default = "default_validators_per_job")]
    pub validators_per_job: usize,
    /// Approval share (percent of revealed stake) needed for success; 51..=100.
    #[serde(default = "default_threshold")]
    pub approval_threshold_pct: u32,
    /// Share of selected validators that must reveal for a decided outcome.
    #[serde(default = "default_quorum")]
    pub quorum_pct: u32,
    #[serde(default = "default_non_reveal_slash_bps")]
    pub non_reveal_slash_bps: u32,
    #[serde(default = "default_ban_cooldown")]
    pub ban_cooldown: u64,
    /// Stake share slashed from revealed validators who voted against a decided outcome.
    #[serde(default)]
    pub dissent_slash_pct: u32,
    #[serde(default)]
    pub min_validator_stake: u64,
    /// Weight added to every candidate's stake during selection.
    #[serde(default = "default_selection_floor")]
    pub selection_floor: u64,
    #[serde(default)]
    pub commit_scheme: CommitScheme,
}

fn default_window() -> u64 {
    3_600
}

fn default_reveal_grace() -> u64 {
    600
}

fn default_force_grace() -> u64 {
    86_400
}

fn default_validators_per_job() -> usize {
    3
}

fn default_threshold() -> u32 {
    66
}

fn default_quorum() -> u32 {
    50
}

fn default_non_reveal_slash_bps() -> u32 {
    50
}

fn default_ban_cooldown() -> u64 {
    86_400
}

fn default_selection_floor() -> u64 {
    1
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            commit_window: default_window(),
            reveal_window: default_window(),
            reveal_grace: default_reveal_grace(),
            force_finalize_grace: default_force_grace(),
            validators_per_job: default_validators_per_job(),
            approval_threshold_pct: default_threshold(),
            quorum_pct: default_quorum(),
            non_reveal_slash_bps: default_non_reveal_slash_bps(),
            ban_cooldown: default_ban_cooldown(),
            dissent_slash_pct: 0,
            min_validator_stake: 0,
            selection_floor: default_selection_floor(),
            commit_scheme: CommitScheme::default(),
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.validators_per_job == 0 {
            return Err(AgoraError::InvalidValidatorBounds);
        }
        if self.commit_window == 0 || self.reveal_window == 0 {
            return Err(AgoraError::Unsupported("validation windows must be non-zero".into()));
        }
        if !(51..=100).contains(&self.approval_threshold_pct)
            || self.quorum_pct > 100
            || self.dissent_slash_pct > 100
            || self.non_reveal_slash_bps > 10_000
        {
            return Err(AgoraError::InvalidPercentage);
        }
        if self.selection_floor == 0 {
            return Err(AgoraError::InvalidValidatorBounds);
        }
        Ok(())
    }

    pub fn with_committee(mut self, validators_per_job: usize) -> Self {
        self.validators_per_job = validators_per_job;
        self
    }

    pub fn with_threshold(mut self, pct: u32) -> Self {
        self.approval_threshold_pct = pct;
        self
    }

    pub fn with_windows(mut self, commit_window: u64, reveal_window: u64) -> Self {
        self.commit_window = commit_window;
        self.reveal_window = reveal_window;
        self
    }
}
