//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (tower-http) is recorded on every request span
//! - Metrics are cheap (atomic increments)
//! - Identities are logged as `anon:<ip>` / `user:<id>`, never as tokens

pub mod logging;
pub mod metrics;
