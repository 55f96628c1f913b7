//! Logging setup and flow metrics
//!
//! Metrics go through the `metrics` facade; installing an exporter is left
//! to the host.

use crate::config::LoggingConfig;
use crate::handler::ErrorCause;
use tracing_subscriber::EnvFilter;

/// Flows that went pending on first entry
pub const FLOWS_STARTED: &str = "signin_flows_started_total";
/// Flows that produced a token
pub const FLOWS_COMPLETED: &str = "signin_flows_completed_total";
/// Flows that ended without a token, labelled by cause
pub const FLOWS_FAILED: &str = "signin_flows_failed_total";
/// Activities handed to continuation delivery
pub const CONTINUATIONS_SUBMITTED: &str = "signin_continuations_submitted_total";
/// Explicit sign-ins answered from the token cache
pub const CACHE_HITS: &str = "signin_cache_hits_total";

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Returns `false`
/// when a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}

/// Initialize test logging
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("synapsed_signin=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub(crate) fn record_started(handler: &str) {
    metrics::counter!(FLOWS_STARTED, "handler" => handler.to_string()).increment(1);
}

pub(crate) fn record_completed(handler: &str) {
    metrics::counter!(FLOWS_COMPLETED, "handler" => handler.to_string()).increment(1);
}

pub(crate) fn record_failed(handler: &str, cause: ErrorCause) {
    metrics::counter!(
        FLOWS_FAILED,
        "handler" => handler.to_string(),
        "cause" => cause.to_string()
    )
    .increment(1);
}

pub(crate) fn record_continuation(handler: &str) {
    metrics::counter!(CONTINUATIONS_SUBMITTED, "handler" => handler.to_string()).increment(1);
}

pub(crate) fn record_cache_hit(handler: &str) {
    metrics::counter!(CACHE_HITS, "handler" => handler.to_string()).increment(1);
}
