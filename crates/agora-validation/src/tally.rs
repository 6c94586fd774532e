use serde::{Deserialize, Serialize};

use agora_types::ValidationOutcome;

/// Stake-weighted result of a round's reveals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub approve_weight: u64,
    pub total_weight: u64,
    pub revealed: usize,
    pub selected: usize,
    pub outcome: ValidationOutcome,
}

/// Tally `(approve, weight)` reveals.
///
/// Approved when `approve / total >= threshold`, rejected when strictly below
/// `1 - threshold`, otherwise disputed. Missing quorum or zero revealed weight is always
/// disputed.
pub fn tally_votes(reveals: &[(bool, u64)], selected: usize, threshold_pct: u32, quorum_pct: u32) -> Tally {
    let approve_weight: u64 = reveals.iter().filter(|(a, _)| *a).map(|(_, w)| *w).sum();
    let total_weight: u64 = reveals.iter().map(|(_, w)| *w).sum();
    let revealed = reveals.len();

    let approve = approve_weight as u128 * 100;
    let total = total_weight as u128;
    let quorum_met = revealed as u128 * 100 >= quorum_pct as u128 * selected as u128;

    let outcome = if !quorum_met || total == 0 {
        ValidationOutcome::Disputed
    } else if approve >= threshold_pct as u128 * total {
        ValidationOutcome::Approved
    } else if approve < (100 - threshold_pct.min(100)) as u128 * total {
        ValidationOutcome::Rejected
    } else {
        ValidationOutcome::Disputed
    };

    Tally {
        approve_weight,
        total_weight,
        revealed,
        selected,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        let tally = tally_votes(&[(true, 100), (true, 300), (false, 100)], 3, 80, 50);
        assert_eq!((tally.approve_weight, tally.total_weight), (400, 500));
        assert_eq!(tally.outcome, ValidationOutcome::Approved);
    }

    #[test]
    fn test_rejection_below_complement() {
        let tally = tally_votes(&[(true, 10), (false, 90)], 2, 80, 50);
        assert_eq!(tally.outcome, ValidationOutcome::Rejected);
        // Exactly at the complement is ambiguous.
        let tally = tally_votes(&[(true, 20), (false, 80)], 2, 80, 50);
        assert_eq!(tally.outcome, ValidationOutcome::Disputed);
    }

    #[test]
    fn test_ambiguous_band_disputes() {
        let tally = tally_votes(&[(true, 50), (false, 50)], 2, 66, 50);
        assert_eq!(tally.outcome, ValidationOutcome::Disputed);
    }

    #[test]
    fn test_quorum_required() {
        let tally = tally_votes(&[(true, 100)], 3, 66, 50);
        assert_eq!(tally.outcome, ValidationOutcome::Disputed);
        let tally = tally_votes(&[(true, 100), (true, 1)], 3, 66, 50);
        assert_eq!(tally.outcome, ValidationOutcome::Approved);
        let tally = tally_votes(&[(true, 0), (false, 0)], 2, 66, 50);
        assert_eq!(tally.outcome, ValidationOutcome::Disputed);
    }
}
