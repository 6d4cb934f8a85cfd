//! Clock and timer primitives shared by the RAMSES protocol engine.
//!
//! The protocol FSM needs a cancellable one-shot timer (for echo/reply
//! expiry) and a way to read monotonic time without depending on a
//! particular executor API at every call site. Both are kept deliberately
//! small: this crate has no notion of commands, packets, or state machines.

mod timer;

pub use timer::OneShotTimer;

use std::time::Instant;

/// Capture an instant suitable for scheduler/expiry comparisons.
pub fn monotonic_now() -> Instant {
    Instant::now()
}
