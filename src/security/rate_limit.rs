//! Fixed-window request quotas per identity.
//!
//! Each identity gets one window per policy class. A window starts on the
//! first request after the previous one ran out, so no timer task is needed.
//! Because windows are fixed rather than sliding, a client can spend up to
//! twice its quota across a window boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::auth::identity::{Identity, PolicyClass};
use crate::config::RateLimitConfig;
use crate::error::StoreError;
use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::usage::{UsageStore, UsageWindow};

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub limit: u64,
    pub window: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub anonymous: Quota,
    pub authenticated: Quota,
    /// Table size above which expired windows are swept on the request path.
    pub max_tracked_windows: usize,
    /// Minimum time between two request-path sweeps.
    pub sweep_interval: Duration,
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_secs);
        Self {
            enabled: config.enabled,
            anonymous: Quota {
                limit: config.anonymous_limit,
                window,
            },
            authenticated: Quota {
                limit: config.authenticated_limit,
                window,
            },
            max_tracked_windows: config.max_tracked_windows,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    pub fn quota(&self, class: PolicyClass) -> Quota {
        match class {
            PolicyClass::Anonymous => self.anonymous,
            PolicyClass::Authenticated => self.authenticated,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

/// Quota state reported with admitted requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

/// Outcome of [`RateLimiter::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Admitted. `None` when limiting is switched off.
    Admit(Option<QuotaStatus>),
    /// Over quota until the current window resets.
    Reject { retry_after: Duration },
}

pub struct RateLimiter {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    policy: ArcSwap<RateLimitPolicy>,
    /// Clock reading (ms) of the last request-path sweep.
    last_sweep_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            clock,
            policy: ArcSwap::from_pointee(policy),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    /// Count one request for `identity` and decide whether it may proceed.
    ///
    /// The request that pushes a window past its quota stays counted.
    pub fn check_and_record(&self, identity: &Identity) -> Result<Decision, StoreError> {
        let policy = self.policy.load();
        if !policy.enabled {
            return Ok(Decision::Admit(None));
        }

        let class = identity.policy_class();
        let quota = policy.quota(class);
        let now = self.clock.now();

        let window = self.store.increment(identity, now, quota.window)?;
        if window.count == 1 {
            // New or restarted window; the table may have grown.
            metrics::record_usage_windows(self.store.len());
            self.sweep_if_crowded(&policy, now);
        }

        if window.count > quota.limit {
            let retry_after = window.remaining(now, quota.window);
            tracing::warn!(
                client = %identity,
                class = class.as_str(),
                count = window.count,
                limit = quota.limit,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(class.as_str());
            return Ok(Decision::Reject { retry_after });
        }

        Ok(Decision::Admit(Some(QuotaStatus {
            limit: quota.limit,
            remaining: quota.limit - window.count,
            reset_after: window.remaining(now, quota.window),
        })))
    }

    /// Current window of `identity`, without counting a request.
    pub fn usage(&self, identity: &Identity) -> Result<Option<UsageWindow>, StoreError> {
        self.store.peek(identity)
    }

    /// Remove every expired window.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let policy = self.policy.load();
        let removed = self
            .store
            .purge_expired(self.clock.now(), &|class| policy.quota(class).window)?;
        metrics::record_usage_windows(self.store.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired usage windows");
        }
        Ok(removed)
    }

    pub fn tracked_windows(&self) -> usize {
        self.store.len()
    }

    pub fn policy(&self) -> Arc<RateLimitPolicy> {
        self.policy.load_full()
    }

    /// Swap in new quotas. Existing windows keep their start and count.
    pub fn update_policy(&self, policy: RateLimitPolicy) {
        tracing::info!(
            enabled = policy.enabled,
            anonymous = policy.anonymous.limit,
            authenticated = policy.authenticated.limit,
            window_secs = policy.anonymous.window.as_secs(),
            "Rate limit policy updated"
        );
        self.policy.store(Arc::new(policy));
    }

    /// Sweep expired windows when the table is over its soft limit, at most
    /// once per `sweep_interval`.
    fn sweep_if_crowded(&self, policy: &RateLimitPolicy, now: Duration) {
        if self.store.len() <= policy.max_tracked_windows {
            return;
        }

        let now_ms = now.as_millis() as u64;
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if last != 0 && now_ms.saturating_sub(last) < policy.sweep_interval.as_millis() as u64 {
            return;
        }
        // One caller wins the slot; the others keep serving.
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        match self
            .store
            .purge_expired(now, &|class| policy.quota(class).window)
        {
            Ok(removed) => {
                tracing::debug!(removed, "Swept usage table");
                metrics::record_usage_windows(self.store.len());
            }
            Err(e) => tracing::warn!(error = %e, "Usage table sweep failed"),
        }
    }
}
