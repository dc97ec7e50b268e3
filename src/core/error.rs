//! Error taxonomy shared by all feeds.
//!
//! Only [`FeedError::DataUnavailable`] is meant to reach callers of the
//! per-code fetch. Every other variant is recovered inside the component that
//! produced it and turned into "no data for this step".

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The remote script could not be loaded at all.
    #[error("Transport error: {feed} - {message}")]
    Transport { feed: &'static str, message: String },

    /// No response arrived before the request deadline.
    #[error("Timeout: {feed}")]
    Timeout { feed: &'static str },

    /// A payload arrived but was not in the expected shape.
    #[error("Parse error: {feed} - {message}")]
    Parse { feed: &'static str, message: String },

    /// Every source was exhausted without a usable value for this code.
    #[error("No data available for fund {0}")]
    DataUnavailable(String),
}

impl FeedError {
    pub fn transport(feed: &'static str, err: impl std::fmt::Display) -> Self {
        FeedError::Transport {
            feed,
            message: err.to_string(),
        }
    }

    pub fn parse(feed: &'static str, err: impl std::fmt::Display) -> Self {
        FeedError::Parse {
            feed,
            message: err.to_string(),
        }
    }

    /// Errors that the owning component swallows instead of propagating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FeedError::Timeout { .. } | FeedError::Parse { .. })
    }
}
