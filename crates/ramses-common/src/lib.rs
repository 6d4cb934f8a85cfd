//! Cross-cutting utilities shared by every crate in the RAMSES protocol
//! workspace: tracing initialization today, with room for the usual
//! ambient concerns (metrics registries, shutdown signalling) as the
//! workspace grows beyond the protocol core.

pub mod logging;

pub use logging::init_tracing;
