//! Prometheus metric handles for the protocol engine, mirroring
//! `r-ems-msg::logging::MessagingMetricsExporter`'s shape: one struct
//! owning pre-registered counters/histograms with narrow `observe_*`
//! methods, registered against a caller-supplied [`Registry`].

use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Registered Prometheus instruments for a single [`crate::fsm::ProtocolHandle`].
pub struct ProtocolMetrics {
    sent: IntCounter,
    write_failed: IntCounter,
    retries: IntCounter,
    send_failed: IntCounterVec,
    round_trip: Histogram,
}

impl ProtocolMetrics {
    /// Register protocol metrics with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sent = IntCounter::with_opts(Opts::new(
            "ramses_protocol_commands_sent_total",
            "Commands written to the transport, including retries",
        ))?;
        let write_failed = IntCounter::with_opts(Opts::new(
            "ramses_protocol_write_failed_total",
            "Transport write attempts that returned an error",
        ))?;
        let retries = IntCounter::with_opts(Opts::new(
            "ramses_protocol_retries_total",
            "Retransmissions issued after an echo/reply timeout",
        ))?;
        let send_failed = IntCounterVec::new(
            Opts::new(
                "ramses_protocol_send_failed_total",
                "Terminal send failures by cause",
            ),
            &["reason"],
        )?;
        let round_trip = Histogram::with_opts(HistogramOpts::new(
            "ramses_protocol_round_trip_seconds",
            "Elapsed time between a command's first transmission and its correlating echo/reply",
        ))?;

        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(write_failed.clone()))?;
        registry.register(Box::new(retries.clone()))?;
        registry.register(Box::new(send_failed.clone()))?;
        registry.register(Box::new(round_trip.clone()))?;

        Ok(Self {
            sent,
            write_failed,
            retries,
            send_failed,
            round_trip,
        })
    }

    /// Record a transport write (first attempt or retry).
    pub fn observe_sent(&self) {
        self.sent.inc();
    }

    /// Record a failed transport write.
    pub fn observe_write_failed(&self) {
        self.write_failed.inc();
    }

    /// Record a retransmission triggered by an echo/reply timeout.
    pub fn observe_retry(&self) {
        self.retries.inc();
    }

    /// Record a terminal send failure, labelled by its cause.
    pub fn observe_send_failed(&self, reason: &str) {
        self.send_failed.with_label_values(&[reason]).inc();
    }

    /// Record the elapsed time from first transmission to completion.
    pub fn observe_round_trip(&self, elapsed: Duration) {
        self.round_trip.observe(elapsed.as_secs_f64());
    }
}
