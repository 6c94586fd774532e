//! Validator selection and commit-reveal voting.

pub mod commitment;
pub mod config;
pub mod module;
pub mod round;
pub mod selection;
pub mod tally;

pub use commitment::{Ballot, CommitScheme, vote_commitment};
pub use config::ValidationConfig;
pub use module::{ValidationContext, ValidationEngine, ValidationModule, Verdict};
pub use round::{RoundPhase, RoundSummary, ValidationRound};
pub use selection::{fallback_entropy, select_weighted, selection_seed, selection_tag};
pub use tally::{Tally, tally_votes};
