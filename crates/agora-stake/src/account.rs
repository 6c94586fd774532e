use serde::{Deserialize, Serialize};

/// Withdrawal waiting out the unbonding period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUnbond {
    pub amount: u64,
    pub unlock_at: u64,
}

/// Collateral held for one (holder, role).
///
/// Invariants: `balance >= locked` and `balance >= pending.amount`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAccount {
    pub balance: u64,
    pub locked: u64,
    pub locked_until: u64,
    pub pending: Option<PendingUnbond>,
    /// `balance` scaled by the holder's multiplier.
    pub boosted: u64,
}

impl StakeAccount {
    /// Lock still in force at `now`.
    pub fn active_lock(&self, now: u64) -> u64 {
        if now >= self.locked_until {
            0
        } else {
            self.locked
        }
    }

    pub fn pending_amount(&self) -> u64 {
        self.pending.map(|p| p.amount).unwrap_or(0)
    }

    /// Amount that may leave the account at `now`, ignoring the minimum-stake floor.
    pub fn withdrawable(&self, now: u64) -> u64 {
        self.balance
            .saturating_sub(self.active_lock(now))
            .saturating_sub(self.pending_amount())
    }

    /// Drop an expired lock; returns the amount released.
    pub fn expire_lock(&mut self, now: u64) -> u64 {
        if self.locked > 0 && now >= self.locked_until {
            let released = self.locked;
            self.locked = 0;
            self.locked_until = 0;
            released
        } else {
            0
        }
    }

    /// Restore the invariants after the balance shrank. Returns the lock reduction.
    pub fn clamp_to_balance(&mut self) -> u64 {
        let mut released = 0;
        if self.locked > self.balance {
            released = self.locked - self.balance;
            self.locked = self.balance;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.amount = pending.amount.min(self.balance);
            if pending.amount == 0 {
                self.pending = None;
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_expiry() {
        let mut account = StakeAccount {
            balance: 100,
            locked: 60,
            locked_until: 50,
            ..Default::default()
        };
        assert_eq!(account.withdrawable(49), 40);
        assert_eq!(account.withdrawable(50), 100);
        assert_eq!(account.expire_lock(49), 0);
        assert_eq!(account.expire_lock(50), 60);
        assert_eq!(account.locked, 0);
    }

    #[test]
    fn test_clamp_after_slash() {
        let mut account = StakeAccount {
            balance: 30,
            locked: 50,
            locked_until: 100,
            pending: Some(PendingUnbond {
                amount: 40,
                unlock_at: 10,
            }),
            boosted: 0,
        };
        assert_eq!(account.clamp_to_balance(), 20);
        assert_eq!(account.locked, 30);
        assert_eq!(account.pending_amount(), 30);
    }
}
