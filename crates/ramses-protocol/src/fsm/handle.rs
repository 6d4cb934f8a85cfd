//! The public face of the protocol engine: [`ProtocolHandle`] is the
//! `send()`/`connection_made()`/`connection_lost()`/`pkt_received()`
//! contract from spec section 6, cloneable and safe to share across
//! however many tasks need to submit sends or feed inbound packets.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::command::Command;
use crate::config::ProtocolConfig;
use crate::error::{ProtocolSendFailed, TransportError};
use crate::header::{Header, PartyId};
use crate::index::MessageIndex;
use crate::metrics::ProtocolMetrics;
use crate::packet::Packet;
use crate::qos::{Priority, QosParams};
use crate::transport::Transport;

use super::context::{ContextMessage, ProtocolContext};

/// A cloneable handle onto a running protocol engine.
///
/// Cloning only duplicates the channel sender; every clone talks to the
/// same single actor task and therefore the same FSM state.
#[derive(Clone)]
pub struct ProtocolHandle {
    tx: mpsc::Sender<ContextMessage>,
}

impl ProtocolHandle {
    /// Spawn the actor task and return a handle to it.
    pub fn spawn(
        config: ProtocolConfig,
        local_id: PartyId,
        index: Arc<MessageIndex>,
        metrics: Option<Arc<ProtocolMetrics>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1) * 2);
        let context = ProtocolContext::new(&config, local_id, index, metrics, tx.clone());
        tokio::spawn(context.run(rx));
        Self { tx }
    }

    /// Notify the FSM that a transport came up: `Inactive -> IsInIdle`.
    pub async fn connection_made(&self, transport: Arc<dyn Transport>) {
        if self.tx.send(ContextMessage::Connect(transport)).await.is_err() {
            warn!("connection_made dropped: protocol engine is not running");
        }
    }

    /// Notify the FSM that the transport went down. Any in-flight send
    /// fails with [`TransportError`]; the FSM returns to `Inactive`.
    pub async fn connection_lost(&self, err: TransportError) {
        if self.tx.send(ContextMessage::Disconnect(err)).await.is_err() {
            warn!("connection_lost dropped: protocol engine is not running");
        }
    }

    /// Feed an inbound packet (with its already-decoded payload) to the
    /// FSM for echo/reply correlation, and into the message index.
    pub async fn pkt_received(&self, packet: Packet, payload: JsonValue) {
        if self
            .tx
            .send(ContextMessage::PktReceived(packet, payload))
            .await
            .is_err()
        {
            warn!("pkt_received dropped: protocol engine is not running");
        }
    }

    /// Queue `cmd` for dispatch and await its correlating reply (or the
    /// echo, when `qos.wait_for_reply` is false or `cmd` solicits no
    /// reply at all).
    ///
    /// The outer timeout (`min(qos.timeout, SEND_TIMEOUT_LIMIT)`) is
    /// independent of the FSM's own echo/reply timers: if it elapses
    /// first, the in-flight command (if this is still it) is forced back
    /// to `IsInIdle` so the next queued entry can proceed.
    pub async fn send(
        &self,
        cmd: Command,
        priority: Priority,
        qos: QosParams,
    ) -> Result<Packet, ProtocolSendFailed> {
        let tx_header = cmd.tx_header.clone();
        let (responder, receiver) = oneshot::channel();
        self.tx
            .send(ContextMessage::Send {
                cmd,
                priority,
                qos,
                responder,
            })
            .await
            .map_err(|_| ProtocolSendFailed::EngineShutDown)?;

        match tokio::time::timeout(qos.effective_timeout(), receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolSendFailed::EngineShutDown),
            Err(_elapsed) => {
                self.expire(tx_header).await;
                Err(ProtocolSendFailed::GlobalTimerExpired(qos.effective_timeout()))
            }
        }
    }

    async fn expire(&self, tx_header: Header) {
        let _ = self.tx.send(ContextMessage::Expire { tx_header }).await;
    }

    /// Accepted for every FSM state but currently a no-op; the actor has
    /// no notion of backpressure on its transport writes yet.
    pub fn pause_writing(&self) {}

    /// Counterpart to [`Self::pause_writing`]; also a no-op today.
    pub fn resume_writing(&self) {}
}
