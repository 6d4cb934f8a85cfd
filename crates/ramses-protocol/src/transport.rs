//! The transport port: an external collaborator that carries [`Command`]s
//! out and [`Packet`]s in. The serial/USB layer itself is out of scope;
//! this module only defines the interface the FSM drives.

use async_trait::async_trait;

use crate::command::Command;
use crate::error::TransportError;

/// Bidirectional channel accepting outbound [`Command`] writes.
///
/// Implementations are expected to be cheap to clone (e.g. an `Arc`
/// wrapper around a real serial port or an in-memory queue for tests);
/// the FSM holds one instance for the lifetime of a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write a command to the wire.
    async fn write(&self, command: &Command) -> Result<(), TransportError>;

    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str {
        "transport"
    }
}

/// Test doubles for [`Transport`]. Gated behind the `test-support`
/// feature (in addition to the crate's own unit tests) so integration
/// tests under `tests/` can use [`RecordingTransport`] without pulling
/// `parking_lot` into non-test builds.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Test double recording every command handed to it, optionally
    /// programmed to fail the next `n` writes.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        inner: Arc<Mutex<Recorded>>,
    }

    #[derive(Default)]
    struct Recorded {
        sent: Vec<Command>,
        fail_next: usize,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Program the next `n` writes to fail with a write error.
        pub fn fail_next_writes(&self, n: usize) {
            self.inner.lock().fail_next = n;
        }

        pub fn sent(&self) -> Vec<Command> {
            self.inner.lock().sent.clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn write(&self, command: &Command) -> Result<(), TransportError> {
            let mut guard = self.inner.lock();
            if guard.fail_next > 0 {
                guard.fail_next -= 1;
                return Err(TransportError::WriteFailed("simulated failure".into()));
            }
            guard.sent.push(command.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}
