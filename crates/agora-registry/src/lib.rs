//! Job registry: the canonical job records and the orchestration of escrow, validation
//! and disputes around them.

pub mod burn;
pub mod config;
pub mod modules;
pub mod registry;
pub mod settlement;

pub use burn::{Discrepancy, check_receipt, expected_burn};
pub use config::RegistryConfig;
pub use modules::{
    CertificateLog, CertificateSink, DISPUTE_INTERFACE_VERSION, Modules, VALIDATION_INTERFACE_VERSION,
};
pub use registry::JobRegistry;
pub use settlement::{Recipient, Settlement, bonus_uplift};
