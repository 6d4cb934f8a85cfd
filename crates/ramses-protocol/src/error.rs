//! Error taxonomy for the protocol engine.

use std::time::Duration;

/// Shared result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Transport-level failures: connection loss or a failed write.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TransportError {
    /// The transport reported (or was told) that the connection dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// A write to the transport failed.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// An event was delivered to the FSM that is illegal for its current state.
#[derive(Debug, thiserror::Error, Clone)]
#[error("illegal event {event} for state {state}")]
pub struct ProtocolFsmError {
    /// The state the FSM was in when the event arrived.
    pub state: &'static str,
    /// A short name for the offending event.
    pub event: &'static str,
}

/// Umbrella error for faults originating outside the protocol core proper
/// (decoder/command-construction faults surfaced through this crate's API).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The transport is down or a write to it failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An event reached the FSM that its current state cannot handle.
    #[error(transparent)]
    Fsm(#[from] ProtocolFsmError),
    /// A command or header could not be constructed or parsed.
    #[error("malformed protocol data: {0}")]
    Malformed(String),
    /// A caller-supplied SQL statement was rejected by the message index.
    #[error("rejected query: {0}")]
    RejectedQuery(String),
}

/// Terminal send failure surfaced to the caller of [`crate::fsm::ProtocolHandle::send`].
///
/// Always wraps a root cause: a full queue, an exhausted retry budget, an
/// expired outer timeout, or a propagated transport/FSM error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolSendFailed {
    /// The FSM has no transport attached.
    #[error("no transport")]
    NoTransport,
    /// The priority send queue was at capacity.
    #[error("buffer overflow")]
    BufferOverflow,
    /// All transmit attempts (including retries) were exhausted without a matching echo/reply.
    #[error("Exceeded maximum retries")]
    MaxRetriesExceeded,
    /// The caller-visible outer timeout elapsed before the send completed.
    #[error("Expired global timer of {0:?}")]
    GlobalTimerExpired(Duration),
    /// The transport or FSM failed outright while driving this send.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The outbound channel to the FSM's event loop was closed, typically
    /// because the engine has shut down.
    #[error("protocol engine is no longer running")]
    EngineShutDown,
}

impl From<TransportError> for ProtocolSendFailed {
    fn from(err: TransportError) -> Self {
        ProtocolSendFailed::Protocol(ProtocolError::Transport(err))
    }
}
