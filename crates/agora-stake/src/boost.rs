use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_types::BASE_PCT;

/// Reports credential holdings (e.g. NFT balances). `None` means the holding could not be read.
pub trait CredentialSource: Send + Sync {
    fn holdings(&self, credential: &str, holder: Uuid) -> Option<u64>;
}

/// A registered bonus-granting credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusCredential {
    pub id: String,
    pub pct: u32,
}

/// Registered credentials, in registration order, without duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoostTable {
    credentials: Vec<BonusCredential>,
}

impl BoostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id is already registered.
    pub fn register(&mut self, id: impl Into<String>, pct: u32) -> bool {
        let id = id.into();
        if self.credentials.iter().any(|c| c.id == id) {
            return false;
        }
        self.credentials.push(BonusCredential { id, pct });
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.credentials.len();
        self.credentials.retain(|c| c.id != id);
        before != self.credentials.len()
    }

    pub fn credentials(&self) -> &[BonusCredential] {
        &self.credentials
    }

    /// Multiplier percentage for `holder`: 100 plus the capped sum of held bonuses.
    pub fn multiplier(&self, source: &dyn CredentialSource, holder: Uuid, cap: u32) -> u32 {
        let bonus: u32 = self
            .credentials
            .iter()
            .filter(|c| matches!(source.holdings(&c.id, holder), Some(n) if n > 0))
            .map(|c| c.pct)
            .fold(0u32, |acc, pct| acc.saturating_add(pct));
        BASE_PCT + bonus.min(cap)
    }
}

/// Credential holdings kept in memory.
#[derive(Debug, Default)]
pub struct CredentialBook {
    holdings: DashMap<(String, Uuid), u64>,
    unreadable: DashMap<String, ()>,
}

impl CredentialBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, credential: &str, holder: Uuid) {
        *self
            .holdings
            .entry((credential.to_string(), holder))
            .or_default() += 1;
    }

    pub fn revoke(&self, credential: &str, holder: Uuid) {
        if let Some(mut count) = self.holdings.get_mut(&(credential.to_string(), holder)) {
            *count = count.saturating_sub(1);
        }
    }

    /// Make reads of `credential` fail.
    pub fn mark_unreadable(&self, credential: &str) {
        self.unreadable.insert(credential.to_string(), ());
    }
}

impl CredentialSource for CredentialBook {
    fn holdings(&self, credential: &str, holder: Uuid) -> Option<u64> {
        if self.unreadable.contains_key(credential) {
            return None;
        }
        Some(
            self.holdings
                .get(&(credential.to_string(), holder))
                .map(|c| *c)
                .unwrap_or(0),
        )
    }
}

/// Stake weighted by a multiplier percentage.
pub fn boosted(balance: u64, pct: u32) -> u64 {
    ((balance as u128 * pct as u128) / BASE_PCT as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_ignored() {
        let mut table = BoostTable::new();
        assert!(table.register("gold", 50));
        assert!(!table.register("gold", 80));
        assert_eq!(table.credentials().len(), 1);
        assert_eq!(table.credentials()[0].pct, 50);
    }

    #[test]
    fn test_multiplier_sum_and_cap() {
        let mut table = BoostTable::new();
        table.register("gold", 50);
        table.register("silver", 25);
        let book = CredentialBook::new();
        let holder = Uuid::new_v4();

        assert_eq!(table.multiplier(&book, holder, 60), 100);
        book.grant("gold", holder);
        book.grant("gold", holder);
        assert_eq!(table.multiplier(&book, holder, 100), 150);
        book.grant("silver", holder);
        assert_eq!(table.multiplier(&book, holder, 100), 175);
        assert_eq!(table.multiplier(&book, holder, 60), 160);
    }

    #[test]
    fn test_unreadable_credential_ignored() {
        let mut table = BoostTable::new();
        table.register("gold", 50);
        table.register("broken", 30);
        let book = CredentialBook::new();
        let holder = Uuid::new_v4();
        book.grant("gold", holder);
        book.grant("broken", holder);
        book.mark_unreadable("broken");
        assert_eq!(table.multiplier(&book, holder, 100), 150);
    }

    #[test]
    fn test_revoke_drops_bonus() {
        let mut table = BoostTable::new();
        table.register("gold", 50);
        let book = CredentialBook::new();
        let holder = Uuid::new_v4();
        book.grant("gold", holder);
        book.revoke("gold", holder);
        assert_eq!(table.multiplier(&book, holder, 100), 100);
        assert_eq!(boosted(200, 150), 300);
    }
}
