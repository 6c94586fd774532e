use std::sync::Arc;

use tracing::{debug, info};

use agora_audit::AuditLog;
use agora_dispute::{ArbitratorCommittee, DisputeEngine, ExternalArbitrator};
use agora_randomness::{RandomnessBeacon, SystemEntropy};
use agora_registry::{CertificateLog, JobRegistry, Modules};
use agora_stake::{FeeVault, InMemoryToken, StakeManager};
use agora_types::{Clock, EventBuffer, InMemoryReputation, OpenIdentity, Result, SystemClock, TaxPolicy};
use agora_validation::ValidationModule;

use crate::config::MarketConfig;

/// Dispute backend selected by configuration.
#[derive(Clone)]
pub enum Arbitration {
    Committee(Arc<ArbitratorCommittee>),
    External(Arc<ExternalArbitrator>),
}

impl Arbitration {
    fn engine(&self) -> Arc<dyn DisputeEngine> {
        match self {
            Arbitration::Committee(committee) => committee.clone(),
            Arbitration::External(arbitrator) => arbitrator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub token: Arc<InMemoryToken>,
    pub fee_vault: Arc<FeeVault>,
    pub validation: Arc<ValidationModule>,
    pub arbitration: Arbitration,
    pub beacon: Option<Arc<RandomnessBeacon>>,
    pub policy: Arc<TaxPolicy>,
    pub certificates: Arc<CertificateLog>,
    pub events: Arc<EventBuffer>,
    pub audit: Arc<dyn AuditLog>,
}

impl AppState {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Wire every module from `config` on a shared token, event buffer and clock.
    pub fn with_clock(config: &MarketConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let governance = config.governance();
        let events = Arc::new(EventBuffer::new());
        let token = Arc::new(InMemoryToken::new());
        let fee_vault = Arc::new(FeeVault::new());
        let policy = Arc::new(TaxPolicy::new(config.policy_uri.clone()));
        let entropy = Arc::new(SystemEntropy::new());

        let stake = Arc::new(
            StakeManager::new(config.stake.clone(), token.clone(), events.clone())?
                .with_fee_pool(fee_vault.clone())
                .with_policy(policy.clone()),
        );

        let validation = Arc::new(
            ValidationModule::new(config.validation.clone(), governance, events.clone())?
                .with_entropy(entropy.clone()),
        );
        if !config.validators.is_empty() {
            validation.set_validator_pool(governance, config.validators.clone())?;
        }

        let arbitration = match config.arbitrator {
            Some(oracle) => Arbitration::External(Arc::new(ExternalArbitrator::new(oracle))),
            None => Arbitration::Committee(Arc::new(ArbitratorCommittee::new(
                config.committee.clone(),
                governance,
                config.jurors.clone(),
                events.clone(),
            ))),
        };

        let modules = Modules::new(
            stake,
            validation.clone(),
            arbitration.engine(),
            Arc::new(InMemoryReputation::new()),
        )?;
        let certificates = Arc::new(CertificateLog::new());
        let mut registry = JobRegistry::new(
            config.registry.clone(),
            governance,
            modules,
            Arc::new(OpenIdentity),
            policy.clone(),
            clock,
            events.clone(),
        )?
        .with_certificates(certificates.clone());

        let beacon = match &config.beacon {
            Some(beacon_config) => {
                let beacon = Arc::new(RandomnessBeacon::new(
                    beacon_config.clone(),
                    token.clone(),
                    entropy.clone(),
                    events.clone(),
                )?);
                registry = registry.with_randomness(beacon.clone());
                Some(beacon)
            }
            None => None,
        };

        info!(%governance, beacon = beacon.is_some(), "market wired");
        Ok(Self {
            registry: Arc::new(registry),
            token,
            fee_vault,
            validation,
            arbitration,
            beacon,
            policy,
            certificates,
            events,
            audit: audit_log(),
        })
    }

    pub fn governance(&self) -> uuid::Uuid {
        self.registry.governance()
    }

    /// Move buffered events into the audit log, oldest first.
    pub async fn flush_events(&self) -> Result<usize> {
        let events = self.events.drain();
        for event in &events {
            self.audit.record(event).await?;
        }
        if !events.is_empty() {
            debug!(count = events.len(), "events audited");
        }
        Ok(events.len())
    }
}

#[cfg(feature = "merkle-audit")]
fn audit_log() -> Arc<dyn AuditLog> {
    Arc::new(agora_audit::MerkleAuditLog::new())
}

#[cfg(not(feature = "merkle-audit"))]
fn audit_log() -> Arc<dyn AuditLog> {
    Arc::new(agora_audit::InMemoryAuditLog::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{ManualClock, Role};

    #[tokio::test]
    async fn test_wiring_and_flush() {
        let state = AppState::with_clock(&MarketConfig::default(), Arc::new(ManualClock::new(1))).unwrap();
        let who = uuid::Uuid::new_v4();
        state.token.mint(who, 10);
        state.policy.acknowledge(who);
        state.registry.stake_manager().deposit(who, Role::Agent, 10).unwrap();

        assert_eq!(state.flush_events().await.unwrap(), 1);
        assert_eq!(state.flush_events().await.unwrap(), 0);
        assert_eq!(state.audit.len().await.unwrap(), 1);
        assert!(state.audit.verify_integrity().await.unwrap());
    }

    #[test]
    fn test_external_arbitrator_selected() {
        let config = MarketConfig {
            arbitrator: Some(uuid::Uuid::new_v4()),
            ..MarketConfig::default()
        };
        let state = AppState::with_clock(&config, Arc::new(ManualClock::new(1))).unwrap();
        assert!(matches!(state.arbitration, Arbitration::External(_)));
    }
}
