//! Tunable timeouts and limits for a [`crate::fsm::ProtocolHandle`].
//!
//! Loading a configuration *file* from disk and any CLI plumbing around it
//! remain out of scope for this crate (see spec §1); `ProtocolConfig` is a
//! plain `serde`-(de)serializable struct the embedding application builds
//! directly, the same way every long-running service in this workspace
//! carries a typed config struct independent of its file format.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::qos::{
    QosParams, DEFAULT_BUFFER_SIZE, DEFAULT_ECHO_TIMEOUT, DEFAULT_RPLY_TIMEOUT, MAX_RETRY_LIMIT,
    SEND_TIMEOUT_LIMIT,
};

fn default_echo_timeout() -> Duration {
    DEFAULT_ECHO_TIMEOUT
}

fn default_reply_timeout() -> Duration {
    DEFAULT_RPLY_TIMEOUT
}

fn default_max_retry_limit() -> u8 {
    MAX_RETRY_LIMIT
}

fn default_send_timeout_limit() -> Duration {
    SEND_TIMEOUT_LIMIT
}

fn default_queue_capacity() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Typed configuration for a [`crate::fsm::ProtocolHandle`] instance.
///
/// `max_retry_limit` and `send_timeout_limit` tune the *defaults* handed
/// to [`QosParams`] built via [`ProtocolConfig::default_qos`]; the hard
/// ceilings named in spec §6 (`MAX_RETRY_LIMIT`, `SEND_TIMEOUT_LIMIT`)
/// are enforced by the engine regardless of configuration, the same way
/// a caller's own `QosParams` cannot exceed them either.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// How long to wait for the gateway's own echo of a sent command.
    #[serde(default = "default_echo_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub echo_timeout: Duration,
    /// How long to wait for a downstream reply once the echo arrived.
    #[serde(default = "default_reply_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reply_timeout: Duration,
    /// Default retry budget handed to [`QosParams`] built from this config.
    #[serde(default = "default_max_retry_limit")]
    pub max_retry_limit: u8,
    /// Default outer send timeout handed to [`QosParams`] built from this config.
    #[serde(default = "default_send_timeout_limit")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub send_timeout_limit: Duration,
    /// Capacity of the priority send queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl ProtocolConfig {
    /// Build a [`QosParams`] using this configuration's defaults and the
    /// given `wait_for_reply` flag, which genuinely varies per command
    /// and so is never a config-wide default.
    pub fn default_qos(&self, wait_for_reply: bool) -> QosParams {
        QosParams::new(self.send_timeout_limit, self.max_retry_limit, wait_for_reply)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            echo_timeout: default_echo_timeout(),
            reply_timeout: default_reply_timeout(),
            max_retry_limit: default_max_retry_limit(),
            send_timeout_limit: default_send_timeout_limit(),
            queue_capacity: default_queue_capacity(),
        }
    }
}
