//! The FSM re-expressed as a tagged variant with a total, pure
//! transition function, per the "state as a tagged variant" design note:
//! rather than one subclass per state with its own event methods, a
//! single `step` maps `(state, event) -> (state, effects)` and is
//! directly unit-testable without a runtime.

use std::time::Duration;

use crate::command::Command;
use crate::error::{ProtocolFsmError, ProtocolSendFailed, TransportError};
use crate::header::PartyId;
use crate::packet::Packet;
use crate::qos::QosParams;

use super::event::Event;

/// Echo/reply timer durations in effect for a transition. Carried as a
/// parameter rather than baked into `step` so [`crate::config::ProtocolConfig`]
/// can override the spec's defaults without touching the pure transition
/// logic itself.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// How long to wait for the gateway's own echo.
    pub echo: Duration,
    /// How long to wait for a downstream reply once the echo arrived.
    pub reply: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            echo: crate::qos::DEFAULT_ECHO_TIMEOUT,
            reply: crate::qos::DEFAULT_RPLY_TIMEOUT,
        }
    }
}

/// The command currently on the wire, plus its retry bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    /// The command being driven through echo/reply correlation.
    pub cmd: Command,
    /// Its QoS contract.
    pub qos: QosParams,
    /// Number of times this command has been written to the transport so far.
    pub tx_count: u8,
    /// Ceiling on `tx_count`, `min(qos.max_retries, MAX_RETRY_LIMIT) + 1`.
    pub tx_limit: u8,
}

impl InFlight {
    fn first_attempt(cmd: Command, qos: QosParams) -> Self {
        Self {
            cmd,
            tx_limit: qos.tx_limit(),
            qos,
            tx_count: 1,
        }
    }

    fn budget_remaining(&self) -> bool {
        self.tx_count < self.tx_limit
    }
}

/// The FSM's state, carrying whatever in-flight data is live in that state.
#[derive(Debug, Clone, PartialEq)]
pub enum FsmState {
    /// No transport attached; no command can be in flight.
    Inactive,
    /// Transport attached, nothing in flight; ready to dispatch.
    IsInIdle,
    /// A command has been written; waiting for the gateway's own echo.
    WantEcho(InFlight),
    /// The echo arrived and a reply is still expected.
    WantRply(InFlight, Packet),
}

impl FsmState {
    /// Short name used in logging and [`ProtocolFsmError`].
    pub fn name(&self) -> &'static str {
        match self {
            FsmState::Inactive => "Inactive",
            FsmState::IsInIdle => "IsInIdle",
            FsmState::WantEcho(_) => "WantEcho",
            FsmState::WantRply(_, _) => "WantRply",
        }
    }
}

/// Which timer a [`Effect::StartTimer`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The echo-wait timer.
    Echo,
    /// The reply-wait timer.
    Reply,
}

/// A side effect the context (the actor loop) must carry out in response
/// to a transition. `step` never performs I/O itself, only describes it.
#[derive(Debug)]
pub enum Effect {
    /// Cancel whatever expiry timer is currently scheduled.
    CancelTimer,
    /// Start a fresh one-shot timer of the given kind and duration.
    StartTimer(TimerKind, Duration),
    /// Write a command to the transport.
    Write(Command),
    /// Complete the in-flight send's future with the given outcome.
    Complete(Result<Packet, ProtocolSendFailed>),
    /// Pull and dispatch the next eligible entry from the send queue.
    DispatchNext,
    /// An echo/reply timeout fired and a retransmission was issued.
    Retry,
    /// Log at debug level: an expected, non-error condition (an ignored
    /// packet, a false reply, an echo-shaped packet seen while awaiting
    /// a reply). Never treated as an error or counted against retries.
    LogIgnored(&'static str),
    /// An event arrived that is illegal for the current state. Surfaced
    /// to tracing; never causes a state change.
    IllegalEvent(ProtocolFsmError),
}

fn retry_or_give_up(in_flight: InFlight, timeouts: &Timeouts) -> (FsmState, Vec<Effect>) {
    if in_flight.budget_remaining() {
        let mut in_flight = in_flight;
        in_flight.tx_count += 1;
        let cmd = in_flight.cmd.clone();
        let effects = vec![
            Effect::Write(cmd),
            Effect::StartTimer(TimerKind::Echo, timeouts.echo),
            Effect::Retry,
        ];
        (FsmState::WantEcho(in_flight), effects)
    } else {
        (
            FsmState::IsInIdle,
            vec![
                Effect::Complete(Err(ProtocolSendFailed::MaxRetriesExceeded)),
                Effect::DispatchNext,
            ],
        )
    }
}

/// Normalize a header's `HGI_DEVICE_ID` sentinel to `local_id` before
/// correlating it against another header.
fn normalize(header: &crate::header::Header, local_id: &PartyId) -> crate::header::Header {
    header.with_local_id(local_id)
}

/// The pure transition function: given the current state and an event,
/// return the next state and the effects the context must perform.
///
/// `local_id` is the gateway's own learned device id, used to normalize
/// the `HGI_DEVICE_ID` sentinel before header comparison. `timeouts`
/// governs how long a freshly (re)armed echo/reply timer should run for.
pub fn step(
    state: FsmState,
    local_id: &PartyId,
    timeouts: &Timeouts,
    event: Event,
) -> (FsmState, Vec<Effect>) {
    match (state, event) {
        // -- Inactive --
        (FsmState::Inactive, Event::Connect) => (FsmState::IsInIdle, vec![Effect::DispatchNext]),
        (FsmState::Inactive, Event::Disconnect(_)) => (FsmState::Inactive, vec![]),
        (FsmState::Inactive, Event::PktRcvd(_)) => {
            (FsmState::Inactive, vec![Effect::LogIgnored("packet received while inactive")])
        }
        (state @ FsmState::Inactive, event) => illegal(state, &event),

        // -- IsInIdle --
        (FsmState::IsInIdle, Event::Connect) => (FsmState::IsInIdle, vec![]),
        (FsmState::IsInIdle, Event::Disconnect(_)) => (FsmState::Inactive, vec![]),
        (FsmState::IsInIdle, Event::PktRcvd(_)) => {
            (FsmState::IsInIdle, vec![Effect::LogIgnored("packet received while idle")])
        }
        (FsmState::IsInIdle, Event::CmdSent { cmd, qos: Some(qos), retry: false }) => {
            let in_flight = InFlight::first_attempt(cmd.clone(), qos);
            (
                FsmState::WantEcho(in_flight),
                vec![Effect::Write(cmd), Effect::StartTimer(TimerKind::Echo, timeouts.echo)],
            )
        }
        (state @ FsmState::IsInIdle, event) => illegal(state, &event),

        // -- WantEcho --
        (FsmState::WantEcho(in_flight), Event::Connect) => (FsmState::WantEcho(in_flight), vec![]),
        (FsmState::WantEcho(_), Event::Disconnect(err)) => (
            FsmState::Inactive,
            vec![Effect::CancelTimer, Effect::Complete(Err(ProtocolSendFailed::from(err)))],
        ),
        (FsmState::WantEcho(mut in_flight), Event::CmdSent { retry: true, .. }) => {
            in_flight.tx_count += 1;
            let cmd = in_flight.cmd.clone();
            (
                FsmState::WantEcho(in_flight),
                vec![Effect::Write(cmd), Effect::StartTimer(TimerKind::Echo, timeouts.echo)],
            )
        }
        (FsmState::WantEcho(in_flight), Event::PktRcvd(pkt)) => {
            want_echo_pkt_rcvd(in_flight, local_id, timeouts, pkt)
        }
        (FsmState::WantEcho(in_flight), Event::EchoTimerFired) => retry_or_give_up(in_flight, timeouts),
        (state @ FsmState::WantEcho(_), event) => illegal(state, &event),

        // -- WantRply --
        (FsmState::WantRply(in_flight, echo), Event::Connect) => {
            (FsmState::WantRply(in_flight, echo), vec![])
        }
        (FsmState::WantRply(_, _), Event::Disconnect(err)) => (
            FsmState::Inactive,
            vec![Effect::CancelTimer, Effect::Complete(Err(ProtocolSendFailed::from(err)))],
        ),
        (FsmState::WantRply(in_flight, echo), Event::PktRcvd(pkt)) => {
            want_rply_pkt_rcvd(in_flight, echo, local_id, pkt)
        }
        (FsmState::WantRply(in_flight, _echo), Event::ReplyTimerFired) => {
            retry_or_give_up(in_flight, timeouts)
        }
        (state @ FsmState::WantRply(_, _), event) => illegal(state, &event),
    }
}

fn illegal(state: FsmState, event: &Event) -> (FsmState, Vec<Effect>) {
    let event_name = match event {
        Event::Connect => "connect",
        Event::Disconnect(_) => "disconnect",
        Event::CmdSent { .. } => "cmd_sent",
        Event::PktRcvd(_) => "pkt_rcvd",
        Event::EchoTimerFired => "echo_timer_fires",
        Event::ReplyTimerFired => "reply_timer_fires",
    };
    let err = ProtocolFsmError {
        state: state.name(),
        event: event_name,
    };
    (state, vec![Effect::IllegalEvent(err)])
}

fn want_echo_pkt_rcvd(
    in_flight: InFlight,
    local_id: &PartyId,
    timeouts: &Timeouts,
    pkt: Packet,
) -> (FsmState, Vec<Effect>) {
    let tx_header = normalize(&in_flight.cmd.tx_header, local_id);
    let pkt_header = normalize(&pkt.hdr, local_id);

    // A reply can arrive before the echo does. Catch that here (it's a
    // no-op, not a match) rather than let it fall through to the
    // tx_header comparison below, which it would fail anyway.
    if let Some(rx_header) = &in_flight.cmd.rx_header {
        let rx_header = normalize(rx_header, local_id);
        if pkt_header == rx_header && pkt.dst == in_flight.cmd.src {
            return (
                FsmState::WantEcho(in_flight),
                vec![Effect::LogIgnored("false reply seen while awaiting echo")],
            );
        }
    }

    if pkt_header != tx_header {
        return (FsmState::WantEcho(in_flight), vec![Effect::LogIgnored("packet did not match in-flight command")]);
    }

    match &in_flight.cmd.rx_header {
        None => (
            FsmState::IsInIdle,
            vec![Effect::CancelTimer, Effect::Complete(Ok(pkt)), Effect::DispatchNext],
        ),
        Some(_) if !in_flight.qos.wait_for_reply => (
            FsmState::IsInIdle,
            vec![Effect::CancelTimer, Effect::Complete(Ok(pkt)), Effect::DispatchNext],
        ),
        Some(_) => (
            FsmState::WantRply(in_flight, pkt),
            vec![Effect::CancelTimer, Effect::StartTimer(TimerKind::Reply, timeouts.reply)],
        ),
    }
}

fn want_rply_pkt_rcvd(
    in_flight: InFlight,
    echo: Packet,
    local_id: &PartyId,
    pkt: Packet,
) -> (FsmState, Vec<Effect>) {
    let tx_header = normalize(&in_flight.cmd.tx_header, local_id);
    let pkt_header = normalize(&pkt.hdr, local_id);

    if pkt_header == tx_header {
        return (
            FsmState::WantRply(in_flight, echo),
            vec![Effect::LogIgnored("echo-shaped packet seen while awaiting reply")],
        );
    }

    if let Some(rx_header) = &in_flight.cmd.rx_header {
        let rx_header = normalize(rx_header, local_id);
        if pkt_header == rx_header {
            return (
                FsmState::IsInIdle,
                vec![Effect::CancelTimer, Effect::Complete(Ok(pkt)), Effect::DispatchNext],
            );
        }
    }

    (FsmState::WantRply(in_flight, echo), vec![Effect::LogIgnored("packet did not match expected reply")])
}
