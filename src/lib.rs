// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod history;
pub mod intel;
pub mod metrics;
pub mod sentiment;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use crate::api::{create_router, AppState};
pub use crate::intel::{Aggregator, CollectRequest, IntelReport, SourceId};

pub const DEFAULT_LOG_FILTER: &str = "intel=info,warn";

/// Install the global tracing subscriber: `RUST_LOG` filter (default
/// `intel=info,warn`), compact output, or JSON lines with `INTEL_LOG_JSON=1`.
/// A second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("INTEL_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
