//! Dispute escalation: a juror committee with its own commit-reveal vote, or an external
//! arbitration oracle.

pub mod committee;
pub mod engine;
pub mod external;

pub use committee::{ArbitratorCommittee, CommitteeConfig, juror_commitment};
pub use engine::{CaseSummary, DisputeContext, DisputeEngine};
pub use external::ExternalArbitrator;
