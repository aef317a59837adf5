//! Tracing/logging setup shared by every process hosting the forecasting engine.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, init_with};

/// Initialize process-wide observability (tracing/logging).
///
/// Output format comes from `MIA_LOG_FORMAT` (`json` or `pretty`, default
/// `json`); filtering from `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = std::env::var("MIA_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    tracing::init_with(format, "info");
}
