use agora_stake::pct_of;
use agora_types::{BurnReceipt, Hash32, Job};

/// Burn the employer is expected to evidence for `job`.
pub fn expected_burn(job: &Job, expected_burn_pct: u32) -> u64 {
    pct_of(job.reward, expected_burn_pct)
}

/// A receipt whose amount differs from the expectation. Reported, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discrepancy {
    pub claimed: u64,
    pub expected: u64,
}

pub fn check_receipt(receipt: &BurnReceipt, expected: u64) -> Option<Discrepancy> {
    (receipt.amount != expected).then_some(Discrepancy {
        claimed: receipt.amount,
        expected,
    })
}

/// Confirmation must name the burn transaction that was submitted.
pub fn matches(receipt: &BurnReceipt, burn_tx: &Hash32) -> bool {
    receipt.burn_tx == *burn_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{ZERO_HASH, content_hash};
    use uuid::Uuid;

    fn receipt(amount: u64) -> BurnReceipt {
        BurnReceipt {
            burn_tx: content_hash(b"tx"),
            amount,
            block: 10,
            submitted_at: 0,
            confirmed: false,
        }
    }

    #[test]
    fn test_discrepancy_reported() {
        let job = Job::new(1, Uuid::new_v4(), 1_000, 50, 0, 100, ZERO_HASH, "", 0);
        let expected = expected_burn(&job, 2);
        assert_eq!(expected, 20);
        assert_eq!(check_receipt(&receipt(20), expected), None);
        assert_eq!(
            check_receipt(&receipt(15), expected),
            Some(Discrepancy {
                claimed: 15,
                expected: 20
            })
        );
    }

    #[test]
    fn test_confirmation_must_match_tx() {
        let r = receipt(1);
        assert!(matches(&r, &content_hash(b"tx")));
        assert!(!matches(&r, &ZERO_HASH));
    }
}
