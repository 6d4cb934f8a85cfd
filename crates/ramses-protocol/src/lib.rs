//! RAMSES-II send/receive protocol engine: the FSM that drives outbound
//! commands through echo/reply correlation and retry, the message index
//! they and inbound traffic are recorded into, and the periodic
//! discovery scheduler built on top of both.
//!
//! Byte-level frame parsing/encoding, the serial/USB transport, and
//! entity/schema/schedule/CLI/config-loading concerns are out of scope
//! and referenced here only through the [`transport::Transport`] trait
//! and the [`Packet`]/[`Command`]/[`Message`] data types this crate
//! consumes already decoded.

pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fsm;
pub mod header;
pub mod index;
pub mod message;
pub mod metrics;
pub mod packet;
pub mod qos;
pub mod queue;
pub mod transport;

pub use command::Command;
pub use config::ProtocolConfig;
pub use discovery::{DiscoveryError, DiscoveryScheduler};
pub use error::{ProtocolError, ProtocolFsmError, ProtocolSendFailed, TransportError};
pub use fsm::ProtocolHandle;
pub use header::{Code, Header, PartyId, Verb, HGI_DEVICE_ID};
pub use index::MessageIndex;
pub use message::Message;
pub use metrics::ProtocolMetrics;
pub use packet::Packet;
pub use qos::{Priority, QosParams, DEFAULT_BUFFER_SIZE, DEFAULT_ECHO_TIMEOUT, DEFAULT_RPLY_TIMEOUT, MAX_RETRY_LIMIT, SEND_TIMEOUT_LIMIT};
pub use transport::Transport;
