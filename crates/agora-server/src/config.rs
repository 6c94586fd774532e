use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_dispute::CommitteeConfig;
use agora_randomness::BeaconConfig;
use agora_registry::RegistryConfig;
use agora_stake::StakeConfig;
use agora_validation::ValidationConfig;

/// Top-level configuration for an agora node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Location of the tax policy participants acknowledge.
    #[serde(default = "default_policy_uri")]
    pub policy_uri: String,

    /// Initial validator pool.
    #[serde(default)]
    pub validators: Vec<Uuid>,

    /// Juror committee used when no external arbitrator is configured.
    #[serde(default)]
    pub jurors: Vec<Uuid>,

    /// Hand disputes to this arbitration oracle instead of the committee.
    #[serde(default)]
    pub arbitrator: Option<Uuid>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Ledger parameters. `stake.governance` governs every module of the node.
    #[serde(default = "default_stake")]
    pub stake: StakeConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub committee: CommitteeConfig,

    /// Seed selection from a commit-reveal beacon. Without it selection falls back to the
    /// node's process-seeded block entropy, which the operator can observe but agents cannot.
    #[serde(default)]
    pub beacon: Option<BeaconConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_policy_uri() -> String {
    "ipfs://agora/tax-policy/v1".to_string()
}

fn default_stake() -> StakeConfig {
    StakeConfig::new(Uuid::new_v4())
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            policy_uri: default_policy_uri(),
            validators: Vec::new(),
            jurors: Vec::new(),
            arbitrator: None,
            telemetry: TelemetryConfig::default(),
            stake: default_stake(),
            registry: RegistryConfig::default(),
            validation: ValidationConfig::default(),
            committee: CommitteeConfig::default(),
            beacon: None,
        }
    }
}

impl MarketConfig {
    pub fn governance(&self) -> Uuid {
        self.stake.governance
    }

    /// Config file path within the data directory.
    pub fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join("agora.toml")
    }

    /// Load config from disk. Returns default if not found.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::config_path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to disk.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = Self::config_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Check every module section before anything is wired.
    pub fn validate(&self) -> Result<()> {
        self.stake.clone().validate().context("Invalid [stake] section")?;
        self.registry.validate().context("Invalid [registry] section")?;
        self.validation.validate().context("Invalid [validation] section")?;
        if let Some(beacon) = &self.beacon {
            beacon.validate().context("Invalid [beacon] section")?;
        }
        if self.arbitrator.is_none() && self.jurors.is_empty() {
            tracing::warn!("no jurors configured; escalated disputes wait for governance");
        }
        Ok(())
    }
}
