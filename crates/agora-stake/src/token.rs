use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use agora_types::{AgoraError, Result};

/// External fungible asset the ledger custodies.
///
/// Implementations may run arbitrary hooks on transfer; the ledger guards against those
/// hooks calling back into it.
pub trait Token: Send + Sync {
    fn balance_of(&self, who: Uuid) -> u64;
    fn transfer(&self, from: Uuid, to: Uuid, amount: u64) -> Result<()>;
    /// Destroy `amount` held by `from`, reducing total supply.
    fn burn(&self, from: Uuid, amount: u64) -> Result<()>;
    fn total_supply(&self) -> u64;
}

/// Simple balance table.
#[derive(Debug, Default)]
pub struct InMemoryToken {
    balances: DashMap<Uuid, u64>,
    supply: AtomicU64,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, to: Uuid, amount: u64) {
        *self.balances.entry(to).or_default() += amount;
        self.supply.fetch_add(amount, Ordering::SeqCst);
    }

    fn debit(&self, from: Uuid, amount: u64) -> Result<()> {
        let mut balance = self.balances.entry(from).or_default();
        if *balance < amount {
            return Err(AgoraError::InsufficientBalance {
                account: from,
                available: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }
}

impl Token for InMemoryToken {
    fn balance_of(&self, who: Uuid) -> u64 {
        self.balances.get(&who).map(|b| *b).unwrap_or(0)
    }

    fn transfer(&self, from: Uuid, to: Uuid, amount: u64) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(from, amount)?;
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    fn burn(&self, from: Uuid, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.supply.fetch_sub(amount, Ordering::SeqCst);
        Ok(())
    }

    fn total_supply(&self) -> u64 {
        self.supply.load(Ordering::SeqCst)
    }
}
