//! Observability for SiteKit sites.
//!
//! This crate provides:
//! - `init_logging` / `LogFormat` - `tracing` subscriber set-up per runtime mode
//! - `AnalyticsClient` - Explicit init / track / teardown analytics lifecycle
//! - `AnalyticsSink` - Where analytics commands go (`DataLayerSink`, `TracingSink`)

mod analytics;
mod logging;

pub use analytics::*;
pub use logging::*;
