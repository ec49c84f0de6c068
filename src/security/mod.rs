//! Request throttling and upload policy.
//!
//! # Data Flow
//! ```text
//! Resolved identity:
//!     → rate_limit.rs (fixed-window quota per identity)
//!     → usage.rs (atomic increment on the shared window table)
//! Declared upload:
//!     → upload.rs (size + extension, all violations collected)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a request that fails any check never reaches a handler
//! - No background sweeper; expired windows are replaced or swept lazily
//! - Time is injected through `clock.rs` so windows are testable

pub mod clock;
pub mod rate_limit;
pub mod upload;
pub mod usage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{Decision, Quota, QuotaStatus, RateLimitPolicy, RateLimiter};
pub use upload::{UploadPolicy, UploadViolation};
pub use usage::{InMemoryUsageStore, UsageStore, UsageWindow};
