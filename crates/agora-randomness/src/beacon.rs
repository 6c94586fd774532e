use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use agora_stake::{CallGuard, Token};
use agora_types::{
    AgoraError, EventSink, Hash32, HashBuilder, MarketEvent, Result, ZERO_HASH, xor_into,
};

use crate::entropy::EntropySource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Seconds after the first commitment on a tag during which commitments are accepted.
    #[serde(default = "default_window")]
    pub commit_window: u64,
    #[serde(default = "default_window")]
    pub reveal_window: u64,
    /// Token deposit taken on commit and returned on reveal.
    #[serde(default)]
    pub deposit: u64,
    /// Receives forfeited deposits; burned when unset.
    #[serde(default)]
    pub treasury: Option<Uuid>,
}

fn default_window() -> u64 {
    600
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            commit_window: default_window(),
            reveal_window: default_window(),
            deposit: 0,
            treasury: None,
        }
    }
}

impl BeaconConfig {
    pub fn validate(&self) -> Result<()> {
        if self.commit_window == 0 || self.reveal_window == 0 {
            return Err(AgoraError::Unsupported("beacon windows must be non-zero".into()));
        }
        Ok(())
    }
}

/// Supplies per-tag randomness to validator selection.
pub trait RandomnessSource: Send + Sync {
    /// Output for `tag`; `RandomnessPending` until the tag's reveal window has closed.
    fn random(&self, tag: &Hash32, now: u64) -> Result<Hash32>;
}

/// Commitment a participant publishes for `secret` under `tag`.
pub fn beacon_commitment(participant: &Uuid, tag: &Hash32, secret: &Hash32) -> Hash32 {
    HashBuilder::new("agora.beacon.commit")
        .uuid(participant)
        .hash(tag)
        .hash(secret)
        .finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagStatus {
    Unknown,
    Committing,
    Revealing,
    Closed,
}

#[derive(Debug)]
struct TagRound {
    commit_deadline: u64,
    commitments: HashMap<Uuid, Hash32>,
    deposits: HashMap<Uuid, u64>,
    revealed: HashSet<Uuid>,
    aggregate: Hash32,
}

impl TagRound {
    fn new(commit_deadline: u64) -> Self {
        Self {
            commit_deadline,
            commitments: HashMap::new(),
            deposits: HashMap::new(),
            revealed: HashSet::new(),
            aggregate: ZERO_HASH,
        }
    }
}

/// Aggregates revealed secrets per tag by XOR and folds in block entropy on read.
pub struct RandomnessBeacon {
    account: Uuid,
    config: BeaconConfig,
    token: Arc<dyn Token>,
    entropy: Arc<dyn EntropySource>,
    events: Arc<dyn EventSink>,
    rounds: DashMap<Hash32, TagRound>,
    guard: CallGuard,
}

impl RandomnessBeacon {
    pub fn new(
        config: BeaconConfig,
        token: Arc<dyn Token>,
        entropy: Arc<dyn EntropySource>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            account: Uuid::new_v4(),
            config,
            token,
            entropy,
            events,
            rounds: DashMap::new(),
            guard: CallGuard::new(),
        })
    }

    /// Token account holding deposits.
    pub fn account(&self) -> Uuid {
        self.account
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    fn reveal_deadline(&self, round: &TagRound) -> u64 {
        round.commit_deadline.saturating_add(self.config.reveal_window)
    }

    pub fn status(&self, tag: &Hash32, now: u64) -> TagStatus {
        match self.rounds.get(tag) {
            None => TagStatus::Unknown,
            Some(round) if now < round.commit_deadline => TagStatus::Committing,
            Some(round) if now < self.reveal_deadline(&round) => TagStatus::Revealing,
            Some(_) => TagStatus::Closed,
        }
    }

    pub fn revealed_count(&self, tag: &Hash32) -> usize {
        self.rounds.get(tag).map(|r| r.revealed.len()).unwrap_or(0)
    }

    pub fn commit(&self, participant: Uuid, tag: Hash32, commitment: Hash32, now: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        if let Some(round) = self.rounds.get(&tag) {
            if now >= round.commit_deadline {
                return Err(AgoraError::CommitPhaseClosed);
            }
            if round.commitments.contains_key(&participant) {
                return Err(AgoraError::AlreadyCommitted);
            }
        }

        let deposit = self.config.deposit;
        self.token.transfer(participant, self.account, deposit)?;

        let commit_window = self.config.commit_window;
        let mut round = self
            .rounds
            .entry(tag)
            .or_insert_with(|| TagRound::new(now.saturating_add(commit_window)));
        round.commitments.insert(participant, commitment);
        if deposit > 0 {
            round.deposits.insert(participant, deposit);
        }
        drop(round);

        self.events
            .emit(MarketEvent::RandomnessCommitted { tag, participant });
        debug!(%participant, deposit, "beacon commitment recorded");
        Ok(())
    }

    pub fn reveal(&self, participant: Uuid, tag: Hash32, secret: Hash32, now: u64) -> Result<()> {
        let _entered = self.guard.enter()?;
        let deposit = {
            let round = self.rounds.get(&tag).ok_or(AgoraError::NotCommitted)?;
            if now < round.commit_deadline {
                return Err(AgoraError::CommitPhaseActive);
            }
            if now >= self.reveal_deadline(&round) {
                return Err(AgoraError::RevealPhaseClosed);
            }
            let commitment = round
                .commitments
                .get(&participant)
                .ok_or(AgoraError::NotCommitted)?;
            if round.revealed.contains(&participant) {
                return Err(AgoraError::AlreadyRevealed);
            }
            if beacon_commitment(&participant, &tag, &secret) != *commitment {
                return Err(AgoraError::InvalidReveal);
            }
            round.deposits.get(&participant).copied().unwrap_or(0)
        };

        self.token.transfer(self.account, participant, deposit)?;

        if let Some(mut round) = self.rounds.get_mut(&tag) {
            xor_into(&mut round.aggregate, &secret);
            round.revealed.insert(participant);
            round.deposits.remove(&participant);
        }
        self.events
            .emit(MarketEvent::RandomnessRevealed { tag, participant });
        debug!(%participant, "beacon secret revealed");
        Ok(())
    }

    /// Send a non-revealer's deposit to the treasury (or burn it). Returns the amount forfeited.
    pub fn forfeit(&self, tag: Hash32, participant: Uuid, now: u64) -> Result<u64> {
        let _entered = self.guard.enter()?;
        let amount = {
            let round = self.rounds.get(&tag).ok_or(AgoraError::NotCommitted)?;
            if now < self.reveal_deadline(&round) {
                return Err(AgoraError::DeadlineNotReached);
            }
            if !round.commitments.contains_key(&participant) {
                return Err(AgoraError::NotCommitted);
            }
            if round.revealed.contains(&participant) {
                return Err(AgoraError::AlreadyRevealed);
            }
            round.deposits.get(&participant).copied().unwrap_or(0)
        };
        if amount == 0 {
            return Ok(0);
        }

        match self.config.treasury {
            Some(treasury) => self.token.transfer(self.account, treasury, amount)?,
            None => self.token.burn(self.account, amount)?,
        }
        if let Some(mut round) = self.rounds.get_mut(&tag) {
            round.deposits.remove(&participant);
        }
        self.events.emit(MarketEvent::DepositForfeited {
            tag,
            participant,
            amount,
        });
        info!(%participant, amount, "beacon deposit forfeited");
        Ok(amount)
    }
}

impl RandomnessSource for RandomnessBeacon {
    fn random(&self, tag: &Hash32, now: u64) -> Result<Hash32> {
        let round = self.rounds.get(tag).ok_or(AgoraError::RandomnessPending)?;
        if now < self.reveal_deadline(&round) {
            return Err(AgoraError::RandomnessPending);
        }
        Ok(HashBuilder::new("agora.beacon.random")
            .hash(&round.aggregate)
            .hash(&self.entropy.block_entropy(now))
            .finish())
    }
}
