use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "RAMSES_LOG";

/// Initialize a process-wide `tracing` subscriber.
///
/// Honours `RAMSES_LOG` first, falls back to the standard `RUST_LOG`, and
/// defaults to `info` when neither is set. Safe to call more than once —
/// subsequent calls are no-ops, matching `tracing_subscriber`'s
/// `try_init` semantics.
pub fn init_tracing() {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
