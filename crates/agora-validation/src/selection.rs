use uuid::Uuid;

use agora_types::{AgoraError, Hash32, HashBuilder, Job, JobId, Result, hash_to_u128};

/// Beacon tag validators commit to for a job's selection entropy.
pub fn selection_tag(job_id: JobId) -> Hash32 {
    HashBuilder::new("agora.validation.tag").u64(job_id).finish()
}

/// Entropy used when the beacon has no output for the job yet. Nothing the agent
/// submits enters the preimage; `block` carries the unpredictable part.
pub fn fallback_entropy(job: &Job, block: &Hash32) -> Hash32 {
    HashBuilder::new("agora.validation.fallback")
        .u64(job.id)
        .u64(job.validation_nonce)
        .hash(&job.spec_hash)
        .hash(block)
        .finish()
}

pub fn selection_seed(entropy: &Hash32, job_id: JobId, nonce: u64) -> Hash32 {
    HashBuilder::new("agora.validation.seed")
        .hash(entropy)
        .u64(job_id)
        .u64(nonce)
        .finish()
}

/// Draw `count` distinct candidates, each draw weighted by `weight + floor` among those not
/// yet drawn. The result depends on candidate order, so callers pass a stable one.
pub fn select_weighted(candidates: &[(Uuid, u64)], count: usize, floor: u64, seed: &Hash32) -> Result<Vec<Uuid>> {
    if candidates.len() < count {
        return Err(AgoraError::InsufficientValidators {
            required: count,
            available: candidates.len(),
        });
    }

    let mut remaining: Vec<(Uuid, u128)> = candidates
        .iter()
        .map(|(who, weight)| (*who, *weight as u128 + floor as u128))
        .collect();
    let mut selected = Vec::with_capacity(count);

    for draw in 0..count as u64 {
        let total: u128 = remaining.iter().map(|(_, w)| *w).sum();
        if total == 0 {
            return Err(AgoraError::InsufficientValidators {
                required: count,
                available: selected.len(),
            });
        }
        let digest = HashBuilder::new("agora.validation.draw").hash(seed).u64(draw).finish();
        let mut target = hash_to_u128(&digest) % total;
        let mut index = remaining.len() - 1;
        for (i, (_, weight)) in remaining.iter().enumerate() {
            if target < *weight {
                index = i;
                break;
            }
            target -= *weight;
        }
        selected.push(remaining.swap_remove(index).0);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use agora_types::{ZERO_HASH, content_hash};
    use proptest::prelude::*;

    fn pool(weights: &[u64]) -> Vec<(Uuid, u64)> {
        weights.iter().map(|w| (Uuid::new_v4(), *w)).collect()
    }

    #[test]
    fn test_deterministic_for_seed() {
        let candidates = pool(&[100, 300, 100, 50]);
        let seed = content_hash(b"seed");
        let a = select_weighted(&candidates, 3, 1, &seed).unwrap();
        let b = select_weighted(&candidates, 3, 1, &seed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_validators() {
        let candidates = pool(&[10, 10]);
        let err = select_weighted(&candidates, 3, 1, &ZERO_HASH).unwrap_err();
        assert!(matches!(
            err,
            AgoraError::InsufficientValidators {
                required: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_stake_weighting_with_floor() {
        let candidates = pool(&[0, 1_000]);
        let mut counts: HashMap<Uuid, u32> = HashMap::new();
        for i in 0..2_000u64 {
            let seed = HashBuilder::new("t").u64(i).finish();
            let pick = select_weighted(&candidates, 1, 10, &seed).unwrap()[0];
            *counts.entry(pick).or_default() += 1;
        }
        let low = counts.get(&candidates[0].0).copied().unwrap_or(0);
        let high = counts.get(&candidates[1].0).copied().unwrap_or(0);
        // Expected share of the zero-stake candidate is 10/1020.
        assert!(low > 0, "zero-stake candidate never drawn");
        assert!(high > low * 20);
    }

    #[test]
    fn test_fallback_ignores_result_hash() {
        let mut job = Job::new(3, Uuid::new_v4(), 100, 0, 0, 1_000, content_hash(b"spec"), "", 0);
        let block = content_hash(b"block");
        job.result_hash = Some(content_hash(b"first"));
        let first = fallback_entropy(&job, &block);
        job.result_hash = Some(content_hash(b"second"));
        assert_eq!(fallback_entropy(&job, &block), first);
        assert_ne!(fallback_entropy(&job, &content_hash(b"other block")), first);
    }

    #[test]
    fn test_seed_depends_on_nonce() {
        let entropy = content_hash(b"beacon");
        assert_ne!(selection_seed(&entropy, 1, 0), selection_seed(&entropy, 1, 1));
        assert_ne!(selection_tag(1), selection_tag(2));
    }

    proptest! {
        #[test]
        fn prop_selection_is_distinct_and_exact(
            weights in proptest::collection::vec(0u64..1_000_000, 1..12),
            count in 1usize..12,
            seed in proptest::array::uniform32(any::<u8>()),
        ) {
            let candidates = pool(&weights);
            let result = select_weighted(&candidates, count, 1, &seed);
            if count > candidates.len() {
                prop_assert!(result.is_err());
            } else {
                let picked = result.unwrap();
                prop_assert_eq!(picked.len(), count);
                let unique: HashSet<_> = picked.iter().collect();
                prop_assert_eq!(unique.len(), count);
                let members: HashSet<_> = candidates.iter().map(|(who, _)| who).collect();
                prop_assert!(picked.iter().all(|p| members.contains(p)));
            }
        }
    }
}
