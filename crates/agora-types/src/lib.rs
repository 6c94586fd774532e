pub mod clock;
pub mod error;
pub mod event;
pub mod hash;
pub mod identity;
pub mod job;
pub mod policy;
pub mod role;

pub use clock::*;
pub use error::*;
pub use event::*;
pub use hash::*;
pub use identity::*;
pub use job::*;
pub use policy::*;
pub use role::*;
