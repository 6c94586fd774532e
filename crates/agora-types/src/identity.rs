use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash32;

/// Authorization oracle for role claims. Consulted on every call that claims a role;
/// answers are never cached.
pub trait IdentityRegistry: Send + Sync {
    fn is_authorized_agent(&self, who: Uuid, label: &str, proof: &[Hash32]) -> bool;
    fn is_authorized_validator(&self, who: Uuid, label: &str, proof: &[Hash32]) -> bool;
}

/// Label and membership proof presented with a role claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub proof: Vec<Hash32>,
}

impl IdentityClaim {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            proof: Vec::new(),
        }
    }
}

/// Accepts every claim.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenIdentity;

impl IdentityRegistry for OpenIdentity {
    fn is_authorized_agent(&self, _who: Uuid, _label: &str, _proof: &[Hash32]) -> bool {
        true
    }

    fn is_authorized_validator(&self, _who: Uuid, _label: &str, _proof: &[Hash32]) -> bool {
        true
    }
}

/// Explicit allowlists, editable at runtime.
#[derive(Debug, Default)]
pub struct AllowList {
    agents: DashSet<Uuid>,
    validators: DashSet<Uuid>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_agent(&self, who: Uuid) {
        self.agents.insert(who);
    }

    pub fn allow_validator(&self, who: Uuid) {
        self.validators.insert(who);
    }

    pub fn revoke(&self, who: Uuid) {
        self.agents.remove(&who);
        self.validators.remove(&who);
    }
}

impl IdentityRegistry for AllowList {
    fn is_authorized_agent(&self, who: Uuid, _label: &str, _proof: &[Hash32]) -> bool {
        self.agents.contains(&who)
    }

    fn is_authorized_validator(&self, who: Uuid, _label: &str, _proof: &[Hash32]) -> bool {
        self.validators.contains(&who)
    }
}

/// Reputation collaborator: outcome bookkeeping and the blacklist.
pub trait ReputationRegistry: Send + Sync {
    fn is_blacklisted(&self, who: Uuid) -> bool;
    fn set_blacklisted(&self, who: Uuid, blacklisted: bool);
    fn record_success(&self, who: Uuid);
    fn record_failure(&self, who: Uuid);
    fn score(&self, who: Uuid) -> i64;
}

#[derive(Debug, Default)]
pub struct InMemoryReputation {
    scores: DashMap<Uuid, i64>,
    blacklist: DashSet<Uuid>,
}

impl InMemoryReputation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReputationRegistry for InMemoryReputation {
    fn is_blacklisted(&self, who: Uuid) -> bool {
        self.blacklist.contains(&who)
    }

    fn set_blacklisted(&self, who: Uuid, blacklisted: bool) {
        if blacklisted {
            self.blacklist.insert(who);
        } else {
            self.blacklist.remove(&who);
        }
    }

    fn record_success(&self, who: Uuid) {
        *self.scores.entry(who).or_default() += 1;
    }

    fn record_failure(&self, who: Uuid) {
        *self.scores.entry(who).or_default() -= 1;
    }

    fn score(&self, who: Uuid) -> i64 {
        self.scores.get(&who).map(|s| *s).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        let list = AllowList::new();
        let who = Uuid::new_v4();
        assert!(!list.is_authorized_agent(who, "", &[]));
        list.allow_agent(who);
        assert!(list.is_authorized_agent(who, "", &[]));
        assert!(!list.is_authorized_validator(who, "", &[]));
        list.revoke(who);
        assert!(!list.is_authorized_agent(who, "", &[]));
    }

    #[test]
    fn test_reputation_and_blacklist() {
        let rep = InMemoryReputation::new();
        let who = Uuid::new_v4();
        rep.record_success(who);
        rep.record_success(who);
        rep.record_failure(who);
        assert_eq!(rep.score(who), 1);

        rep.set_blacklisted(who, true);
        assert!(rep.is_blacklisted(who));
        rep.set_blacklisted(who, false);
        assert!(!rep.is_blacklisted(who));
    }
}
