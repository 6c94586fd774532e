use agora_types::{Hash32, HashBuilder};

/// Block-level entropy folded into every beacon output.
pub trait EntropySource: Send + Sync {
    fn block_entropy(&self, now: u64) -> Hash32;
}

/// Entropy from a per-process random seed, stable within one second.
#[derive(Debug, Clone)]
pub struct SystemEntropy {
    seed: Hash32,
}

impl SystemEntropy {
    pub fn new() -> Self {
        Self {
            seed: rand::random(),
        }
    }
}

impl Default for SystemEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for SystemEntropy {
    fn block_entropy(&self, now: u64) -> Hash32 {
        HashBuilder::new("agora.entropy")
            .hash(&self.seed)
            .u64(now)
            .finish()
    }
}

/// Constant entropy, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedEntropy(pub Hash32);

impl EntropySource for FixedEntropy {
    fn block_entropy(&self, _now: u64) -> Hash32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_entropy_changes_with_time() {
        let source = SystemEntropy::new();
        assert_eq!(source.block_entropy(5), source.block_entropy(5));
        assert_ne!(source.block_entropy(5), source.block_entropy(6));
        assert_ne!(
            SystemEntropy::new().block_entropy(5),
            source.block_entropy(5)
        );
    }
}
