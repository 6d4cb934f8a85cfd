//! Outbound instructions queued for dispatch by the protocol FSM.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::header::{Code, Header, PartyId, Verb};
use crate::packet::compute_header;
use crate::qos::Priority;

/// An outbound instruction, immutable once constructed.
///
/// `tx_header` is the header the gateway's own echo of this command is
/// expected to carry; `rx_header` is the header a downstream reply is
/// expected to carry, or `None` when no reply is solicited (an `I` or a
/// fire-and-forget `W`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Header the gateway's echo of this command will carry.
    pub tx_header: Header,
    /// Header a downstream reply will carry, if one is expected.
    pub rx_header: Option<Header>,
    /// Originating device id (the local gateway, almost always).
    pub src: PartyId,
    /// Destination device id.
    pub dst: PartyId,
    /// Message type code.
    pub code: Code,
    /// Message verb.
    pub verb: Verb,
    /// Hex-encoded payload bytes to place on the wire.
    pub payload: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Construction timestamp.
    pub created_at: DateTime<Utc>,
}

impl Command {
    /// Construct a command. `rx_header` is derived automatically: `RQ` and
    /// `W` verbs solicit a reply (`RP` for `RQ`, the corresponding `I` for
    /// a confirmed `W`); `I` verbs solicit none.
    pub fn new(
        code: Code,
        verb: Verb,
        src: PartyId,
        dst: PartyId,
        ctx: Option<String>,
        payload: impl Into<String>,
        priority: Priority,
    ) -> Self {
        let tx_header = compute_header(code, verb, &src, &dst, ctx.clone());
        let rx_header = match verb {
            Verb::RQ => Some(compute_header(code, Verb::RP, &dst, &src, ctx.clone())),
            Verb::W => Some(compute_header(code, Verb::I, &dst, &src, ctx.clone())),
            Verb::I | Verb::RP => None,
        };
        Self {
            tx_header,
            rx_header,
            src,
            dst,
            code,
            verb,
            payload: payload.into(),
            priority,
            created_at: Utc::now(),
        }
    }

    /// Construct a command with an explicit `rx_header`, overriding the
    /// automatic derivation in [`Command::new`]. Used for echo-only
    /// commands that should not wait on any reply even though their verb
    /// would normally solicit one.
    pub fn with_rx_header(mut self, rx_header: Option<Header>) -> Self {
        self.rx_header = rx_header;
        self
    }

    /// Whether this command expects a downstream reply at all.
    pub fn expects_reply(&self) -> bool {
        self.rx_header.is_some()
    }
}
