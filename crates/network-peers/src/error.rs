//! Error types for peer set maintenance.

use cn_config::ConfigError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The result for peer manager operations.
pub type PeersResult<T> = Result<T, PeerManagerError>;

/// Peer manager error type.
///
/// Network-level failures (dial errors, stream errors) never surface
/// here; the manager resolves them internally by updating its peer
/// state. Callers only observe configuration problems and channel
/// breakage during shutdown.
#[derive(Debug, Error)]
pub enum PeerManagerError {
    /// The peering section of the node config is inconsistent.
    #[error("invalid peering configuration: {0}")]
    Config(#[from] ConfigError),
    /// Production nodes cannot join the network without bootstrap peers.
    #[error("no bootstrap nodes configured; provide them via the chain spec or `--bootnodes`")]
    NoBootstrapNodes,
    /// mpsc receiver dropped.
    #[error("peer manager stopped: {0}")]
    ManagerClosed(String),
    /// oneshot sender dropped.
    #[error("peer manager reply dropped: {0}")]
    ReplyDropped(String),
}

impl<T> From<mpsc::error::SendError<T>> for PeerManagerError {
    fn from(e: mpsc::error::SendError<T>) -> Self {
        Self::ManagerClosed(e.to_string())
    }
}

impl From<oneshot::error::RecvError> for PeerManagerError {
    fn from(e: oneshot::error::RecvError) -> Self {
        Self::ReplyDropped(e.to_string())
    }
}

/// Failure reported by the transport host while dialing a peer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The transport could not reach the peer.
    #[error("transport error: {0}")]
    Transport(String),
    /// The dial did not complete in time.
    #[error("dial timed out")]
    Timeout,
    /// The remote refused the connection.
    #[error("connection refused")]
    Refused,
}

/// Failure opening an outbound protocol stream on an established
/// connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The remote does not speak the requested protocol.
    #[error("protocol not supported by peer")]
    UnsupportedProtocol,
    /// The substream could not be negotiated.
    #[error("failed to open substream: {0}")]
    Open(String),
    /// The underlying connection went away mid-negotiation.
    #[error("connection closed")]
    ConnectionClosed,
}
