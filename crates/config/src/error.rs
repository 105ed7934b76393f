//! Error types for node configuration.

use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Peer count limits are not ordered correctly.
    #[error(
        "peer limits must satisfy target <= soft <= hard (got target={target}, soft={soft}, hard={hard})"
    )]
    PeerLimitsOutOfOrder {
        /// Desired active-set size.
        target: usize,
        /// Advisory upper bound.
        soft: usize,
        /// Mandatory upper bound.
        hard: usize,
    },
    /// A duration option was set to zero.
    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
}
