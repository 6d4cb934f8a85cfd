//! The actor loop: the single task that owns the FSM state, the send
//! queue, and every timer. Realizes the "single-writer context" design
//! note — there is exactly one task mutating these fields, so no mutex
//! is needed around them (unlike the source's defensive lock, which
//! guards against reentrancy that an actor loop structurally rules out).

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use ramses_rt::OneShotTimer;

use crate::command::Command;
use crate::config::ProtocolConfig;
use crate::error::{ProtocolSendFailed, TransportError};
use crate::header::{Header, PartyId};
use crate::index::MessageIndex;
use crate::message::Message;
use crate::metrics::ProtocolMetrics;
use crate::packet::Packet;
use crate::qos::{Priority, QosParams};
use crate::queue::SendQueue;
use crate::transport::Transport;

use super::event::Event;
use super::state::{step, Effect, FsmState, TimerKind, Timeouts};

/// Requests and notifications delivered to the context's event loop.
pub(crate) enum ContextMessage {
    Connect(Arc<dyn Transport>),
    Disconnect(TransportError),
    PktReceived(Packet, JsonValue),
    Send {
        cmd: Command,
        priority: Priority,
        qos: QosParams,
        responder: oneshot::Sender<Result<Packet, ProtocolSendFailed>>,
    },
    EchoTimerFired,
    ReplyTimerFired,
    /// A send's outer timeout elapsed. If `tx_header` still names the
    /// command currently in flight, force the FSM back to `IsInIdle` so
    /// the next queued entry is not stuck behind an abandoned send.
    Expire { tx_header: Header },
}

/// The actor itself. Constructed once and driven to completion by
/// [`super::handle::ProtocolHandle::spawn`]; all mutable protocol state
/// lives here.
pub(crate) struct ProtocolContext {
    state: FsmState,
    queue: SendQueue,
    current_responder: Option<oneshot::Sender<Result<Packet, ProtocolSendFailed>>>,
    local_id: PartyId,
    transport: Option<Arc<dyn Transport>>,
    timer: OneShotTimer,
    timeouts: Timeouts,
    index: Arc<MessageIndex>,
    metrics: Option<Arc<ProtocolMetrics>>,
    self_tx: mpsc::Sender<ContextMessage>,
    /// When the in-flight command was first written, for
    /// [`ProtocolMetrics::observe_round_trip`]. Set on the initial
    /// dispatch out of `IsInIdle`, cleared on completion.
    send_started_at: Option<Instant>,
}

impl ProtocolContext {
    pub(crate) fn new(
        config: &ProtocolConfig,
        local_id: PartyId,
        index: Arc<MessageIndex>,
        metrics: Option<Arc<ProtocolMetrics>>,
        self_tx: mpsc::Sender<ContextMessage>,
    ) -> Self {
        Self {
            state: FsmState::Inactive,
            queue: SendQueue::new(config.queue_capacity),
            current_responder: None,
            local_id,
            transport: None,
            timer: OneShotTimer::inert(),
            timeouts: Timeouts {
                echo: config.echo_timeout,
                reply: config.reply_timeout,
            },
            index,
            metrics,
            self_tx,
            send_started_at: None,
        }
    }

    /// Drive the event loop until `inbox` is closed.
    pub(crate) async fn run(mut self, mut inbox: mpsc::Receiver<ContextMessage>) {
        while let Some(message) = inbox.recv().await {
            self.handle_message(message).await;
        }
        debug!("protocol context event loop exiting");
    }

    async fn handle_message(&mut self, message: ContextMessage) {
        match message {
            ContextMessage::Connect(transport) => {
                self.transport = Some(transport);
                self.apply(Event::Connect).await;
            }
            ContextMessage::Disconnect(err) => {
                self.transport = None;
                self.apply(Event::Disconnect(err)).await;
            }
            ContextMessage::PktReceived(pkt, payload) => {
                let msg = Message::from_packet(&pkt, payload);
                self.index.add(msg);
                self.apply(Event::PktRcvd(pkt)).await;
            }
            ContextMessage::Send { cmd, priority, qos, responder } => {
                self.enqueue(cmd, priority, qos, responder).await;
            }
            ContextMessage::EchoTimerFired => self.apply(Event::EchoTimerFired).await,
            ContextMessage::ReplyTimerFired => self.apply(Event::ReplyTimerFired).await,
            ContextMessage::Expire { tx_header } => self.expire_if_current(&tx_header).await,
        }
    }

    async fn expire_if_current(&mut self, tx_header: &Header) {
        let in_flight_matches = match &self.state {
            FsmState::WantEcho(in_flight) => in_flight.cmd.tx_header == *tx_header,
            FsmState::WantRply(in_flight, _) => in_flight.cmd.tx_header == *tx_header,
            _ => false,
        };
        if in_flight_matches {
            // The responder was already consumed by the timed-out
            // `receiver` in `ProtocolHandle::send`; this only needs to
            // unstick the FSM, not deliver a result.
            self.current_responder = None;
            self.send_started_at = None;
            self.timer = OneShotTimer::inert();
            self.state = FsmState::IsInIdle;
            self.dispatch_next().await;
        }
    }

    async fn enqueue(
        &mut self,
        cmd: Command,
        priority: Priority,
        qos: QosParams,
        responder: oneshot::Sender<Result<Packet, ProtocolSendFailed>>,
    ) {
        if matches!(self.state, FsmState::Inactive) {
            let _ = responder.send(Err(ProtocolSendFailed::NoTransport));
            return;
        }
        if let Err(responder) = self.queue.try_push(cmd, qos, priority, responder) {
            let _ = responder.send(Err(ProtocolSendFailed::BufferOverflow));
            return;
        }
        if matches!(self.state, FsmState::IsInIdle) {
            self.dispatch_next().await;
        }
    }

    async fn apply(&mut self, event: Event) {
        let state = std::mem::replace(&mut self.state, FsmState::Inactive);
        let (next_state, effects) = step(state, &self.local_id, &self.timeouts, event);
        self.state = next_state;
        self.apply_effects(effects).await;
    }

    async fn apply_effects(&mut self, effects: Vec<Effect>) {
        let mut dispatch_next = false;
        for effect in effects {
            match effect {
                Effect::CancelTimer => self.timer = OneShotTimer::inert(),
                Effect::StartTimer(kind, duration) => self.arm_timer(kind, duration),
                Effect::Write(cmd) => {
                    if self.write(cmd).await {
                        // The write already drove the context back to
                        // IsInIdle (via fail_in_flight) and may have
                        // dispatched the next queued entry, so any
                        // remaining effects from *this* transition (e.g.
                        // the echo timer meant for the command that just
                        // failed to go out) no longer apply.
                        return;
                    }
                }
                Effect::Complete(result) => self.complete(result),
                Effect::DispatchNext => dispatch_next = true,
                Effect::Retry => {
                    if let Some(metrics) = &self.metrics {
                        metrics.observe_retry();
                    }
                }
                Effect::LogIgnored(reason) => {
                    debug!(state = self.state.name(), reason, "fsm ignored event");
                }
                Effect::IllegalEvent(err) => warn!(%err, "illegal fsm event"),
            }
        }
        if dispatch_next {
            // Boxed to break the `apply -> apply_effects -> dispatch_next
            // -> apply` async call cycle; without it rustc cannot size the
            // mutually recursive state machine (E0733).
            Box::pin(self.dispatch_next()).await;
        }
    }

    fn arm_timer(&mut self, kind: TimerKind, duration: std::time::Duration) {
        let tx = self.self_tx.clone();
        let message = match kind {
            TimerKind::Echo => ContextMessage::EchoTimerFired,
            TimerKind::Reply => ContextMessage::ReplyTimerFired,
        };
        self.timer = OneShotTimer::schedule(duration, move || {
            let _ = tx.try_send(message);
        });
    }

    /// Write `cmd` to the transport. Returns `true` if the write failed
    /// and the in-flight send was already failed out (via
    /// [`Self::fail_in_flight`]), so the caller must not apply any
    /// further effects from the transition that produced this write.
    async fn write(&mut self, cmd: Command) -> bool {
        let Some(transport) = self.transport.clone() else {
            // Boxed to break the `write -> fail_in_flight -> dispatch_next
            // -> apply -> apply_effects -> write` async call cycle (E0733).
            Box::pin(self.fail_in_flight(ProtocolSendFailed::NoTransport)).await;
            return true;
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe_sent();
        }
        if let Err(err) = transport.write(&cmd).await {
            if let Some(metrics) = &self.metrics {
                metrics.observe_write_failed();
            }
            Box::pin(self.fail_in_flight(ProtocolSendFailed::from(err))).await;
            return true;
        }
        false
    }

    async fn fail_in_flight(&mut self, err: ProtocolSendFailed) {
        self.timer = OneShotTimer::inert();
        self.state = FsmState::IsInIdle;
        self.complete(Err(err));
        self.dispatch_next().await;
    }

    fn complete(&mut self, result: Result<Packet, ProtocolSendFailed>) {
        let started_at = self.send_started_at.take();
        if let Some(metrics) = &self.metrics {
            match (&result, started_at) {
                (Ok(_), Some(started_at)) => metrics.observe_round_trip(started_at.elapsed()),
                (Err(err), _) => metrics.observe_send_failed(send_failed_reason(err)),
                _ => {}
            }
        }
        if let Some(responder) = self.current_responder.take() {
            let _ = responder.send(result);
        }
    }

    async fn dispatch_next(&mut self) {
        if !matches!(self.state, FsmState::IsInIdle) {
            return;
        }
        let Some(entry) = self.queue.pop_next_live() else {
            return;
        };
        self.current_responder = Some(entry.responder);
        self.send_started_at = Some(Instant::now());
        let event = Event::CmdSent {
            cmd: entry.command,
            qos: Some(entry.qos),
            retry: false,
        };
        self.apply(event).await;
    }
}

/// Short label for [`ProtocolMetrics::observe_send_failed`]'s `reason` tag.
fn send_failed_reason(err: &ProtocolSendFailed) -> &'static str {
    match err {
        ProtocolSendFailed::NoTransport => "no_transport",
        ProtocolSendFailed::BufferOverflow => "buffer_overflow",
        ProtocolSendFailed::MaxRetriesExceeded => "max_retries_exceeded",
        ProtocolSendFailed::GlobalTimerExpired(_) => "global_timer_expired",
        ProtocolSendFailed::Protocol(_) => "protocol_error",
        ProtocolSendFailed::EngineShutDown => "engine_shut_down",
    }
}
