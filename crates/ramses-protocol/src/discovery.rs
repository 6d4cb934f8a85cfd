//! Periodic discovery scheduler (spec §4.3): keeps a set of commands
//! issued at configured intervals, coalescing around received messages
//! so a command is only re-sent when nothing satisfying its interval
//! has been observed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::Command;
use crate::fsm::ProtocolHandle;
use crate::header::{Header, Verb};
use crate::index::MessageIndex;
use crate::message::Message;
use crate::qos::{Priority, QosParams};

/// Lower bound on the scheduler's between-iteration sleep.
pub const MIN_CYCLE_SECS: u64 = 3;
/// Upper bound on the scheduler's between-iteration sleep, and the sleep
/// used whenever no task is registered.
pub const MAX_CYCLE_SECS: u64 = 10;

/// A command attempting to be registered twice (by `rx_header`), or one
/// that cannot be scheduled for discovery at all.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A task with this command's `rx_header` is already registered.
    #[error("a discovery task for this command's reply header is already registered")]
    DuplicateTask,
    /// Discovery requires a command that solicits a reply, so it has
    /// something to correlate inbound messages against.
    #[error("discovery commands must have an rx_header")]
    MissingReplyHeader,
    /// The scheduler's actor task is no longer running.
    #[error("discovery scheduler is no longer running")]
    EngineShutDown,
}

/// Per-task bookkeeping (spec §4.3's per-task state tuple).
#[derive(Debug, Clone)]
pub struct DiscoveryTask {
    command: Command,
    interval: Duration,
    qos: QosParams,
    last_msg: Option<Message>,
    last_ran: Option<DateTime<Utc>>,
    next_due: DateTime<Utc>,
    timeout: Duration,
}

impl DiscoveryTask {
    fn new(command: Command, interval: Duration, delay: Duration, timeout: Duration, qos: QosParams) -> Self {
        Self {
            command,
            interval,
            qos,
            last_msg: None,
            last_ran: None,
            next_due: Utc::now() + chrono_duration(delay),
            timeout,
        }
    }

    /// The inbound `I` header a reply to this task's command would be
    /// stored under in the message index: same code/party/ctx as the
    /// command's `rx_header`, with the verb rewritten to `I`.
    fn inbound_header(&self) -> Header {
        let rx = self
            .command
            .rx_header
            .as_ref()
            .expect("discovery tasks are only constructed with a reply-soliciting command");
        Header::new(rx.code, Verb::I, rx.party_id.clone(), rx.ctx.clone())
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

/// The decision [`decide`] reaches for a single task in a single tick,
/// kept separate from any I/O so it is unit-testable without an
/// executor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TaskAction {
    /// Nothing to do this round.
    NoAction,
    /// A message already in the index satisfies this interval; adopt it
    /// as `last_msg` without sending anything.
    AdoptSeenMessage(Message),
    /// `next_due` has passed and nothing satisfying was seen; send.
    Send,
}

/// Pure decision function for one task in one tick (spec §4.3, steps 1-3).
pub(crate) fn decide(task: &DiscoveryTask, seen: Option<&Message>, now: DateTime<Utc>) -> TaskAction {
    if let Some(msg) = seen {
        if msg.dtm + chrono_duration(task.interval) > task.next_due {
            return TaskAction::AdoptSeenMessage(msg.clone());
        }
    }
    if task.next_due <= now {
        return TaskAction::Send;
    }
    TaskAction::NoAction
}

/// Clamp the between-iteration sleep to `[MIN_CYCLE_SECS, MAX_CYCLE_SECS]`,
/// based on the earliest `next_due` across all tasks (spec §4.3's "sleep
/// for `clamp(min(next_due) - now, ...)`, or `MAX_CYCLE_SECS` if no tasks").
pub(crate) fn next_sleep(tasks: &[DiscoveryTask], now: DateTime<Utc>) -> Duration {
    let min = Duration::from_secs(MIN_CYCLE_SECS);
    let max = Duration::from_secs(MAX_CYCLE_SECS);
    let Some(earliest) = tasks.iter().map(|t| t.next_due).min() else {
        return max;
    };
    let remaining = (earliest - now).to_std().unwrap_or(Duration::ZERO);
    remaining.clamp(min, max)
}

enum SchedulerMessage {
    AddTask {
        command: Command,
        interval: Duration,
        delay: Duration,
        timeout: Option<Duration>,
        qos: QosParams,
        ack: oneshot::Sender<Result<(), DiscoveryError>>,
    },
}

struct SchedulerActor {
    tasks: Vec<DiscoveryTask>,
    index: Arc<MessageIndex>,
    protocol: ProtocolHandle,
}

impl SchedulerActor {
    async fn run(mut self, mut inbox: mpsc::Receiver<SchedulerMessage>) {
        let mut sleep_for = Duration::from_secs(MAX_CYCLE_SECS);
        loop {
            tokio::select! {
                message = inbox.recv() => {
                    match message {
                        Some(SchedulerMessage::AddTask { command, interval, delay, timeout, qos, ack }) => {
                            let result = self.add_task(command, interval, delay, timeout, qos);
                            let _ = ack.send(result);
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
            sleep_for = self.tick().await;
        }
        debug!("discovery scheduler event loop exiting");
    }

    fn add_task(
        &mut self,
        command: Command,
        interval: Duration,
        delay: Duration,
        timeout: Option<Duration>,
        qos: QosParams,
    ) -> Result<(), DiscoveryError> {
        let Some(rx_header) = command.rx_header.clone() else {
            return Err(DiscoveryError::MissingReplyHeader);
        };
        if self
            .tasks
            .iter()
            .any(|t| t.command.rx_header.as_ref() == Some(&rx_header))
        {
            return Err(DiscoveryError::DuplicateTask);
        }
        let timeout = timeout.unwrap_or_else(|| qos.timeout.saturating_mul(u32::from(qos.max_retries) + 1));
        self.tasks.push(DiscoveryTask::new(command, interval, delay, timeout, qos));
        Ok(())
    }

    async fn tick(&mut self) -> Duration {
        let now = Utc::now();
        for idx in 0..self.tasks.len() {
            self.process_task(idx, now).await;
        }
        next_sleep(&self.tasks, now)
    }

    async fn process_task(&mut self, idx: usize, now: DateTime<Utc>) {
        let hdr = self.tasks[idx].inbound_header();
        let seen = self.index.get(&hdr);
        let action = decide(&self.tasks[idx], seen.as_ref(), now);

        let new_last_msg = match action {
            TaskAction::NoAction => None,
            TaskAction::AdoptSeenMessage(msg) => Some(msg),
            TaskAction::Send => self.send_and_await(idx).await,
        };

        if let Some(msg) = new_last_msg {
            let task = &mut self.tasks[idx];
            task.last_ran = Some(msg.dtm);
            task.next_due = msg.dtm + chrono_duration(task.interval);
            task.last_msg = Some(msg);
        }
    }

    /// Send the task's command and await its reply with a `timeout * 5`
    /// safety cap. Returns the freshly indexed message on success; `None`
    /// on a protocol-level send failure or the safety timeout, in which
    /// case this task is simply skipped for the round (spec §4.3 step 3).
    async fn send_and_await(&mut self, idx: usize) -> Option<Message> {
        let task = self.tasks[idx].clone();
        let safety_cap = task.timeout.saturating_mul(5);
        let hdr = task.inbound_header();

        match tokio::time::timeout(
            safety_cap,
            self.protocol.send(task.command.clone(), Priority::Low, task.qos),
        )
        .await
        {
            Ok(Ok(_pkt)) => self.index.get(&hdr),
            Ok(Err(err)) => {
                warn!(%err, "discovery send failed; will retry next cycle");
                None
            }
            Err(_elapsed) => {
                debug!("discovery send exceeded its safety timeout; skipping this round");
                None
            }
        }
    }
}

/// Handle onto a running [`SchedulerActor`].
pub struct DiscoveryScheduler {
    tx: mpsc::Sender<SchedulerMessage>,
    join: AsyncMutex<Option<JoinHandle<()>>>,
}

impl DiscoveryScheduler {
    /// Spawn the scheduler's actor task.
    pub fn spawn(protocol: ProtocolHandle, index: Arc<MessageIndex>) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let actor = SchedulerActor {
            tasks: Vec::new(),
            index,
            protocol,
        };
        let join = tokio::spawn(actor.run(rx));
        Self {
            tx,
            join: AsyncMutex::new(Some(join)),
        }
    }

    /// Register a command for periodic discovery. `timeout` defaults to
    /// `(qos.max_retries + 1) * qos.timeout` when not given explicitly.
    pub async fn add_task(
        &self,
        command: Command,
        interval: Duration,
        delay: Duration,
        timeout: Option<Duration>,
        qos: QosParams,
    ) -> Result<(), DiscoveryError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(SchedulerMessage::AddTask {
                command,
                interval,
                delay,
                timeout,
                qos,
                ack,
            })
            .await
            .map_err(|_| DiscoveryError::EngineShutDown)?;
        rx.await.map_err(|_| DiscoveryError::EngineShutDown)?
    }

    /// Cancel the scheduler's loop.
    pub async fn stop(&self) {
        if let Some(join) = self.join.lock().await.take() {
            join.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Code, PartyId};
    use serde_json::json;

    fn command() -> Command {
        Command::new(
            Code(0x1298),
            Verb::RQ,
            PartyId::parse("18:000730").unwrap(),
            PartyId::parse("03:123456").unwrap(),
            None,
            "00",
            Priority::Low,
        )
    }

    fn message_at(hdr: &Header, dtm: DateTime<Utc>) -> Message {
        Message {
            hdr: hdr.clone(),
            code: hdr.code,
            verb: hdr.verb,
            src: PartyId::parse("03:123456").unwrap(),
            dst: PartyId::parse("18:111111").unwrap(),
            ctx: hdr.ctx.clone(),
            dtm,
            plk: "|co2_level|".to_owned(),
            payload: json!({ "co2_level": 500 }),
        }
    }

    #[test]
    fn adopts_seen_message_when_it_already_covers_the_interval() {
        let now = Utc::now();
        let cmd = command();
        let task = DiscoveryTask::new(
            cmd.clone(),
            Duration::from_secs(60),
            Duration::ZERO,
            Duration::from_secs(1),
            QosParams::default(),
        );
        let hdr = task.inbound_header();
        let seen = message_at(&hdr, now);

        let action = decide(&task, Some(&seen), now + chrono::Duration::seconds(120));
        assert_eq!(action, TaskAction::AdoptSeenMessage(seen));
    }

    #[test]
    fn sends_when_next_due_has_passed_and_nothing_satisfies() {
        let now = Utc::now();
        let mut task = DiscoveryTask::new(
            command(),
            Duration::from_secs(60),
            Duration::ZERO,
            Duration::from_secs(1),
            QosParams::default(),
        );
        task.next_due = now - chrono::Duration::seconds(1);
        assert_eq!(decide(&task, None, now), TaskAction::Send);
    }

    #[test]
    fn takes_no_action_before_next_due_with_nothing_seen() {
        let now = Utc::now();
        let task = DiscoveryTask::new(
            command(),
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_secs(1),
            QosParams::default(),
        );
        assert_eq!(decide(&task, None, now), TaskAction::NoAction);
    }

    #[test]
    fn next_sleep_is_clamped_between_bounds() {
        let now = Utc::now();
        let mut far_task = DiscoveryTask::new(
            command(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(1),
            QosParams::default(),
        );
        far_task.next_due = now + chrono::Duration::hours(1);
        assert_eq!(
            next_sleep(std::slice::from_ref(&far_task), now),
            Duration::from_secs(MAX_CYCLE_SECS)
        );

        let mut near_task = far_task.clone();
        near_task.next_due = now + chrono::Duration::milliseconds(1);
        assert_eq!(
            next_sleep(std::slice::from_ref(&near_task), now),
            Duration::from_secs(MIN_CYCLE_SECS)
        );

        assert_eq!(next_sleep(&[], now), Duration::from_secs(MAX_CYCLE_SECS));
    }
}
