//! Error types for the continuation session layer.

use continuation_transport::TransportError;
use thiserror::Error;

/// Task queue error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Task queue is closed")]
    QueueClosed,
    #[error("Task was dropped before completing")]
    TaskDropped,
}

impl From<DispatchError> for TransportError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e.to_string())
    }
}

/// Error from an external service client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Request rejected with code {0}")]
    Rejected(i32),
    #[error("Service unavailable")]
    Unavailable,
}

/// Broad failure class, in the terms the host ability cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The local ability declined or failed to save/restore.
    LocalRefusal,
    /// A peer or service call failed at the transport level.
    Transport,
    /// The peer reported a failure result.
    RemoteRefusal,
    /// The operation needs a peer the session does not have.
    NoPeer,
    /// The ability is torn down or not configured for continuation.
    Unavailable,
}

/// Why a continuation operation failed.
#[derive(Debug, Error)]
pub enum ContinuationError {
    #[error("No {0} peer in the current session")]
    NoPeer(&'static str),
    #[error("Operation not valid while acting as {0}")]
    WrongRole(&'static str),
    #[error("Ability is not available for continuation")]
    AbilityUnavailable,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Ability refused continuation (code {0})")]
    Refused(i32),
    #[error("Peer refused (code {0})")]
    RemoteRefused(i32),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl ContinuationError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NoPeer(_) | Self::WrongRole(_) => FailureKind::NoPeer,
            Self::AbilityUnavailable | Self::InvalidArgument(_) => FailureKind::Unavailable,
            Self::Refused(_) => FailureKind::LocalRefusal,
            Self::RemoteRefused(_) | Self::Client(ClientError::Rejected(_)) => {
                FailureKind::RemoteRefusal
            }
            Self::Transport(_) | Self::Client(_) | Self::Dispatch(_) => FailureKind::Transport,
        }
    }
}
