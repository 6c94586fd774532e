//! Integer splitting rules. Every function here conserves its input exactly: the parts it
//! returns always add back up to the amount it was given, with rounding dust assigned to
//! burn rather than to any payee.

/// `amount * pct / 100`, rounded down.
pub fn pct_of(amount: u64, pct: u32) -> u64 {
    ((amount as u128 * pct as u128) / 100) as u64
}

/// `amount * bps / 10_000`, rounded down.
pub fn bps_of(amount: u64, bps: u32) -> u64 {
    ((amount as u128 * bps as u128) / 10_000) as u64
}

/// Split `amount` pro rata by `weights`. Returns the shares (index-aligned with `weights`)
/// and the undistributed dust. Zero total weight distributes nothing.
pub fn pro_rata(amount: u64, weights: &[u64]) -> (Vec<u64>, u64) {
    let total: u128 = weights.iter().map(|w| *w as u128).sum();
    if total == 0 {
        return (vec![0; weights.len()], amount);
    }
    let shares: Vec<u64> = weights
        .iter()
        .map(|w| ((amount as u128 * *w as u128) / total) as u64)
        .collect();
    let paid: u64 = shares.iter().sum();
    (shares, amount - paid)
}

/// How a released reward is divided.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseSplit {
    pub validator_shares: Vec<u64>,
    pub fee: u64,
    pub burn: u64,
    pub payout: u64,
}

impl ReleaseSplit {
    /// The validator share comes off the top (only when some recipient has weight); fee and
    /// burn are then taken from what remains, and the payee gets the rest. Validator
    /// rounding dust joins the burn.
    pub fn compute(
        amount: u64,
        fee_pct: u32,
        burn_pct: u32,
        validator_pct: u32,
        validator_weights: &[u64],
    ) -> Self {
        let has_weight = validator_weights.iter().any(|w| *w > 0);
        let validator_pool = if has_weight {
            pct_of(amount, validator_pct)
        } else {
            0
        };
        let (validator_shares, dust) = pro_rata(validator_pool, validator_weights);
        let base = amount - validator_pool;
        let fee = pct_of(base, fee_pct);
        let burn = pct_of(base, burn_pct);
        Self {
            validator_shares,
            fee,
            burn: burn + dust,
            payout: base - fee - burn,
        }
    }

    pub fn validators_total(&self) -> u64 {
        self.validator_shares.iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.validators_total() + self.fee + self.burn + self.payout
    }
}

/// How a slashed amount is divided.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlashSplit {
    pub validator_shares: Vec<u64>,
    pub employer: u64,
    pub treasury: u64,
    pub burn: u64,
}

impl SlashSplit {
    pub fn compute(
        amount: u64,
        employer_pct: u32,
        treasury_pct: u32,
        validator_pct: u32,
        validator_weights: &[u64],
    ) -> Self {
        let has_weight = validator_weights.iter().any(|w| *w > 0);
        let validator_pool = if has_weight {
            pct_of(amount, validator_pct)
        } else {
            0
        };
        let (validator_shares, dust) = pro_rata(validator_pool, validator_weights);
        let rest = amount - validator_pool;
        let employer = pct_of(rest, employer_pct);
        let treasury = pct_of(rest, treasury_pct);
        Self {
            validator_shares,
            employer,
            treasury,
            burn: rest - employer - treasury + dust,
        }
    }

    pub fn validators_total(&self) -> u64 {
        self.validator_shares.iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.validators_total() + self.employer + self.treasury + self.burn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_slash_split() {
        let split = SlashSplit::compute(100, 50, 50, 0, &[]);
        assert_eq!((split.employer, split.treasury, split.burn), (50, 50, 0));
    }

    #[test]
    fn test_rounding_goes_to_burn() {
        let split = SlashSplit::compute(101, 60, 40, 0, &[]);
        assert_eq!((split.employer, split.treasury, split.burn), (60, 40, 1));
    }

    #[test]
    fn test_remainder_burned() {
        let split = SlashSplit::compute(100, 40, 50, 0, &[]);
        assert_eq!((split.employer, split.treasury, split.burn), (40, 50, 10));
    }

    #[test]
    fn test_validator_share_pro_rata() {
        let split = SlashSplit::compute(40, 0, 100, 20, &[100, 300]);
        assert_eq!(split.validator_shares, vec![2, 6]);
        assert_eq!(split.treasury, 32);
        assert_eq!(split.burn, 0);
    }

    #[test]
    fn test_validator_share_skipped_without_weight() {
        let split = SlashSplit::compute(40, 0, 100, 20, &[0, 0]);
        assert_eq!(split.validators_total(), 0);
        assert_eq!(split.treasury, 40);

        let split = SlashSplit::compute(40, 0, 100, 20, &[]);
        assert_eq!(split.treasury, 40);
    }

    #[test]
    fn test_release_scenario() {
        let split = ReleaseSplit::compute(100, 0, 10, 0, &[]);
        assert_eq!((split.fee, split.burn, split.payout), (0, 10, 90));

        let split = ReleaseSplit::compute(100, 20, 10, 0, &[]);
        assert_eq!((split.fee, split.burn, split.payout), (20, 10, 70));
    }

    #[test]
    fn test_release_fee_on_post_validator_base() {
        let split = ReleaseSplit::compute(100, 10, 10, 20, &[1, 1]);
        assert_eq!(split.validator_shares, vec![10, 10]);
        assert_eq!((split.fee, split.burn, split.payout), (8, 8, 64));
    }

    #[test]
    fn test_pro_rata_dust() {
        let (shares, dust) = pro_rata(10, &[1, 1, 1]);
        assert_eq!(shares, vec![3, 3, 3]);
        assert_eq!(dust, 1);
    }

    proptest! {
        #[test]
        fn prop_release_conserves(
            amount in 0u64..1_000_000_000_000,
            fee in 0u32..=50,
            burn in 0u32..=50,
            validator in 0u32..=100,
            weights in proptest::collection::vec(0u64..1_000_000, 0..6),
        ) {
            let split = ReleaseSplit::compute(amount, fee, burn, validator, &weights);
            prop_assert_eq!(split.total(), amount);
        }

        #[test]
        fn prop_slash_conserves_and_bounds_dust(
            amount in 0u64..1_000_000_000_000,
            employer in 0u32..=100,
            validator in 0u32..=100,
            weights in proptest::collection::vec(0u64..1_000_000, 0..6),
        ) {
            let treasury = 100 - employer;
            let split = SlashSplit::compute(amount, employer, treasury, validator, &weights);
            prop_assert_eq!(split.total(), amount);
            // Each rounding step loses less than one unit.
            prop_assert!(split.burn <= 2 + weights.len() as u64);
        }

        #[test]
        fn prop_pro_rata_never_overpays(
            amount in 0u64..u64::MAX / 2,
            weights in proptest::collection::vec(0u64..u64::MAX / 1024, 1..8),
        ) {
            let (shares, dust) = pro_rata(amount, &weights);
            let paid: u64 = shares.iter().sum();
            prop_assert_eq!(paid + dust, amount);
        }
    }
}
