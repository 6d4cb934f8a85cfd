//! The protocol FSM: a pure transition function ([`state::step`]) driven
//! by a single actor task ([`context::ProtocolContext`]), fronted by the
//! public, cloneable [`handle::ProtocolHandle`].

mod context;
pub mod event;
pub mod state;
mod handle;

pub use event::Event;
pub use handle::ProtocolHandle;
pub use state::{Effect, FsmState, InFlight, TimerKind, Timeouts};
