//! Failure reporting.
//!
//! Per-candidate failures never reach the user; they go to a diagnostics
//! collaborator with enough context to debug a misbehaving stream.
//! Reporting is fire-and-forget: it must never block or fail the state
//! machine.

use radio_core::station::TransportKind;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct FailureContext {
    pub station: String,
    pub candidate_url: String,
    pub kind: Option<TransportKind>,
    pub detail: String,
}

pub trait DiagnosticsReporter: Send + Sync {
    fn report(&self, ctx: FailureContext);
}

/// Default reporter: structured WARN log lines.
pub struct LogReporter;

impl DiagnosticsReporter for LogReporter {
    fn report(&self, ctx: FailureContext) {
        warn!(
            station = %ctx.station,
            url = %ctx.candidate_url,
            kind = ?ctx.kind,
            "stream failure: {}",
            ctx.detail
        );
    }
}