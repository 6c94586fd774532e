//! Commit-reveal randomness beacon used to seed validator selection.

pub mod beacon;
pub mod entropy;

pub use beacon::{BeaconConfig, RandomnessBeacon, RandomnessSource, TagStatus, beacon_commitment};
pub use entropy::{EntropySource, FixedEntropy, SystemEntropy};
