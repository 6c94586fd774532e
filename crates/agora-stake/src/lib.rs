//! Collateral custody for the marketplace: per-role stake, job escrow, slashing and
//! reward distribution.

pub mod account;
pub mod boost;
pub mod config;
pub mod fee_pool;
pub mod guard;
pub mod manager;
pub mod split;
pub mod token;

pub use account::{PendingUnbond, StakeAccount};
pub use boost::{BonusCredential, BoostTable, CredentialBook, CredentialSource, boosted};
pub use config::StakeConfig;
pub use fee_pool::{FeePool, FeeVault};
pub use guard::CallGuard;
pub use manager::{ReleaseReceipt, SlashReceipt, StakeManager};
pub use split::{ReleaseSplit, SlashSplit, bps_of, pct_of, pro_rata};
pub use token::{InMemoryToken, Token};
