//! Domain types and the pure parts of the pipeline

pub mod config;
pub mod error;
pub mod holdings;
pub mod log;
pub mod market;
pub mod reconcile;
pub mod snapshot;
pub mod text;

// Re-export main types for cleaner imports
pub use error::FeedError;
pub use market::{Market, market_prefix};
pub use snapshot::{FundSnapshot, Holding, MAX_HOLDINGS, PercentChange, Settlement};
