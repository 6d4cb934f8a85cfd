//! Quality-of-service parameters and the protocol-wide tuning constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timeout waiting for the gateway's own echo of a sent command.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(500);
/// Default timeout waiting for a downstream device's reply.
pub const DEFAULT_RPLY_TIMEOUT: Duration = Duration::from_millis(200);
/// Hard ceiling on retries regardless of what a caller's [`QosParams`] asks for.
pub const MAX_RETRY_LIMIT: u8 = 3;
/// Hard ceiling on the outer timeout of [`crate::fsm::ProtocolHandle::send`].
pub const SEND_TIMEOUT_LIMIT: Duration = Duration::from_secs(15);
/// Default capacity of the priority send queue.
pub const DEFAULT_BUFFER_SIZE: usize = 32;

/// Dispatch priority of a queued command.
///
/// Ordered so that `Asap` sorts before `High`, which sorts before
/// `Default`, which sorts before `Low` — i.e. the derived [`Ord`]
/// impl already gives "lower value dispatches first" (spec: "lower
/// numeric value = earlier dispatch"). `Asap` is reserved for
/// out-of-band urgent sends (e.g. an explicit user retry) and so
/// outranks even `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Out-of-band urgent send; dispatches ahead of everything else.
    Asap,
    /// Time-sensitive commands (e.g. user-facing control actions).
    High,
    /// Ordinary commands; the common case.
    Default,
    /// Background/discovery-style polling; dispatched last.
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

/// Per-command quality-of-service contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosParams {
    /// Overall time budget for the send, independent of the echo/reply
    /// timers. Capped at [`SEND_TIMEOUT_LIMIT`] by the FSM.
    pub timeout: Duration,
    /// Maximum number of retransmissions after the first attempt. Capped
    /// at [`MAX_RETRY_LIMIT`] by the FSM.
    pub max_retries: u8,
    /// Whether the caller needs the downstream reply (`true`) or is
    /// satisfied once the echo is observed (`false`).
    pub wait_for_reply: bool,
}

impl QosParams {
    /// Construct QoS parameters with explicit values.
    pub fn new(timeout: Duration, max_retries: u8, wait_for_reply: bool) -> Self {
        Self {
            timeout,
            max_retries,
            wait_for_reply,
        }
    }

    /// The effective transmit-count ceiling: one initial send plus
    /// `min(max_retries, MAX_RETRY_LIMIT)` retransmissions.
    pub fn tx_limit(&self) -> u8 {
        self.max_retries.min(MAX_RETRY_LIMIT) + 1
    }

    /// The outer timeout actually enforced by the FSM, capped at
    /// [`SEND_TIMEOUT_LIMIT`].
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.min(SEND_TIMEOUT_LIMIT)
    }
}

impl Default for QosParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ECHO_TIMEOUT + DEFAULT_RPLY_TIMEOUT,
            max_retries: MAX_RETRY_LIMIT as u8,
            wait_for_reply: true,
        }
    }
}
