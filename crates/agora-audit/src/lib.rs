pub mod entry;
pub mod traits;

#[cfg(feature = "memory-audit")]
pub mod memory;

#[cfg(feature = "merkle-audit")]
pub mod merkle;

pub use entry::*;
pub use traits::*;

#[cfg(feature = "memory-audit")]
pub use memory::*;

#[cfg(feature = "merkle-audit")]
pub use merkle::*;
