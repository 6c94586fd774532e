use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Receives protocol fees. Claim accounting for stakers lives entirely on the pool side.
pub trait FeePool: Send + Sync {
    /// Token account the fees are transferred to.
    fn account(&self) -> Uuid;

    /// Notification sent after `amount` has been transferred to `account()`.
    fn deposit_fee(&self, amount: u64);
}

/// Fee pool that only tracks the cumulative amount received.
#[derive(Debug)]
pub struct FeeVault {
    account: Uuid,
    received: AtomicU64,
}

impl FeeVault {
    pub fn new() -> Self {
        Self {
            account: Uuid::new_v4(),
            received: AtomicU64::new(0),
        }
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

impl Default for FeeVault {
    fn default() -> Self {
        Self::new()
    }
}

impl FeePool for FeeVault {
    fn account(&self) -> Uuid {
        self.account
    }

    fn deposit_fee(&self, amount: u64) {
        self.received.fetch_add(amount, Ordering::SeqCst);
    }
}
