//! Events fed into the protocol FSM's pure transition function.

use crate::command::Command;
use crate::error::TransportError;
use crate::packet::Packet;
use crate::qos::QosParams;

/// An event driving the FSM's `step` function.
#[derive(Debug, Clone)]
pub enum Event {
    /// The transport came up.
    Connect,
    /// The transport went down (or reported a write failure serious
    /// enough to treat the connection as lost).
    Disconnect(TransportError),
    /// A command was handed to the transport for writing.
    ///
    /// `qos` is present for the initial dispatch out of [`IsInIdle`] and
    /// absent on a retry, which reuses the in-flight command's existing
    /// QoS contract and only increments the transmit counter.
    ///
    /// [`IsInIdle`]: crate::fsm::state::FsmState::IsInIdle
    CmdSent {
        /// The command written to the transport.
        cmd: Command,
        /// QoS contract, set on the first send.
        qos: Option<QosParams>,
        /// Whether this is a retry of an already in-flight command.
        retry: bool,
    },
    /// A packet arrived from the transport.
    PktRcvd(Packet),
    /// The echo timer expired.
    EchoTimerFired,
    /// The reply timer expired.
    ReplyTimerFired,
}
