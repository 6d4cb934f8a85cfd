//! Bounded, priority-ordered FIFO of pending sends.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::sync::oneshot;

use crate::command::Command;
use crate::error::ProtocolSendFailed;
use crate::packet::Packet;
use crate::qos::{Priority, QosParams};

/// A queued send: the command, its QoS contract, and the one-shot
/// responder that [`crate::fsm::ProtocolHandle::send`] is awaiting on.
pub struct QueueEntry {
    priority: Priority,
    sequence: u64,
    pub command: Command,
    pub qos: QosParams,
    pub responder: oneshot::Sender<Result<Packet, ProtocolSendFailed>>,
}

impl QueueEntry {
    /// The dispatch priority this entry was enqueued with.
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

// `enqueue_dtm` tie-breaking is realized with a strictly increasing
// sequence number rather than a wall-clock timestamp: it gives the same
// total order the spec asks for without the awkwardness of two sends
// landing on an identical clock reading. `Ord` is implemented inverted
// relative to `(priority, sequence)` so that `BinaryHeap`, a max-heap,
// pops the numerically smallest (highest-priority, earliest) entry first.
impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.sequence)
            .cmp(&(other.priority, other.sequence))
            .reverse()
    }
}

/// Bounded priority queue of pending sends.
pub struct SendQueue {
    capacity: usize,
    heap: BinaryHeap<QueueEntry>,
    next_sequence: u64,
}

impl SendQueue {
    /// Create an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Current number of queued entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Enqueue a send. The caller constructs the one-shot responder pair
    /// itself (and awaits the receiver half directly) so that pushing
    /// never needs to hand anything other than a plain result back.
    /// Fails with [`ProtocolSendFailed::BufferOverflow`] if the queue is
    /// already at capacity, in which case `responder` is returned
    /// unused so the caller can complete it itself.
    pub fn try_push(
        &mut self,
        command: Command,
        qos: QosParams,
        priority: Priority,
        responder: oneshot::Sender<Result<Packet, ProtocolSendFailed>>,
    ) -> Result<(), oneshot::Sender<Result<Packet, ProtocolSendFailed>>> {
        if self.heap.len() >= self.capacity {
            return Err(responder);
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry {
            priority,
            sequence,
            command,
            qos,
            responder,
        });
        Ok(())
    }

    /// Pop entries in `(priority, enqueue_dtm)` order until one is found
    /// whose responder has not already been dropped (the caller gave up
    /// or the send was otherwise already resolved), discarding the dead
    /// ones along the way. Returns `None` if the queue empties out
    /// without finding a live entry.
    pub fn pop_next_live(&mut self) -> Option<QueueEntry> {
        while let Some(entry) = self.heap.pop() {
            if !entry.responder.is_closed() {
                return Some(entry);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Code, PartyId, Verb};
    use std::time::Duration;

    fn dummy_command() -> Command {
        Command::new(
            Code(0x2309),
            Verb::I,
            PartyId::parse("01:078710").unwrap(),
            PartyId::parse("18:000730").unwrap(),
            None,
            "00",
            Priority::Default,
        )
    }

    fn qos() -> QosParams {
        QosParams::new(Duration::from_secs(1), 0, true)
    }

    fn responder() -> (
        oneshot::Sender<Result<Packet, ProtocolSendFailed>>,
        oneshot::Receiver<Result<Packet, ProtocolSendFailed>>,
    ) {
        oneshot::channel()
    }

    #[test]
    fn pops_in_priority_then_enqueue_order() {
        let mut queue = SendQueue::new(8);
        let (tx_a, _rx_a) = responder();
        let (tx_b, _rx_b) = responder();
        let (tx_c, _rx_c) = responder();
        queue.try_push(dummy_command(), qos(), Priority::Default, tx_a).unwrap();
        queue.try_push(dummy_command(), qos(), Priority::High, tx_b).unwrap();
        queue.try_push(dummy_command(), qos(), Priority::Default, tx_c).unwrap();

        let first = queue.pop_next_live().unwrap();
        assert_eq!(first.priority(), Priority::High);
        let second = queue.pop_next_live().unwrap();
        assert_eq!(second.priority(), Priority::Default);
        assert_eq!(second.sequence, 0);
        let third = queue.pop_next_live().unwrap();
        assert_eq!(third.sequence, 2);
    }

    #[test]
    fn rejects_push_past_capacity() {
        let mut queue = SendQueue::new(1);
        let (tx_a, _rx_a) = responder();
        queue.try_push(dummy_command(), qos(), Priority::Default, tx_a).unwrap();
        let (tx_b, _rx_b) = responder();
        let err = queue.try_push(dummy_command(), qos(), Priority::Default, tx_b);
        assert!(err.is_err());
    }

    #[test]
    fn skips_entries_whose_receiver_was_dropped() {
        let mut queue = SendQueue::new(8);
        let (tx_dead, rx_dead) = responder();
        queue.try_push(dummy_command(), qos(), Priority::Default, tx_dead).unwrap();
        drop(rx_dead);
        let (tx_live, _rx_live) = responder();
        queue.try_push(dummy_command(), qos(), Priority::High, tx_live).unwrap();

        let live = queue.pop_next_live().unwrap();
        assert_eq!(live.priority(), Priority::High);
        assert!(queue.pop_next_live().is_none());
    }
}
