//! HTTP surface and process wiring for an agora node.

pub mod config;
pub mod handlers;
pub mod state;
pub mod telemetry;

pub use config::{MarketConfig, TelemetryConfig};
pub use handlers::{ApiError, ErrorResponse, router, status_for};
pub use state::{AppState, Arbitration};
