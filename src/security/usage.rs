//! Usage window table.
//!
//! The only way to change a window is [`UsageStore::increment`], which resets
//! an expired window, counts one request and returns the resulting snapshot
//! as a single atomic step per key. Callers never read-then-write.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::auth::identity::{Identity, PolicyClass};
use crate::error::StoreError;

/// Requests observed for one identity since `started_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageWindow {
    /// Window start as an offset from the Unix epoch.
    pub started_at: Duration,
    pub count: u64,
}

impl UsageWindow {
    pub fn is_expired(&self, now: Duration, length: Duration) -> bool {
        now >= self.started_at + length
    }

    /// Time left until the window resets (zero once it has).
    pub fn remaining(&self, now: Duration, length: Duration) -> Duration {
        (self.started_at + length).saturating_sub(now)
    }
}

/// Shared keyed store of usage windows.
pub trait UsageStore: Send + Sync {
    /// Atomically: start a fresh window if none exists or the current one
    /// has run for `length`, then add one request. Returns the window after
    /// the increment.
    fn increment(
        &self,
        identity: &Identity,
        now: Duration,
        length: Duration,
    ) -> Result<UsageWindow, StoreError>;

    /// Read a window without counting.
    fn peek(&self, identity: &Identity) -> Result<Option<UsageWindow>, StoreError>;

    /// Drop every window that has expired. Returns how many were removed.
    fn purge_expired(
        &self,
        now: Duration,
        length_of: &dyn Fn(PolicyClass) -> Duration,
    ) -> Result<usize, StoreError>;

    /// Number of tracked windows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process usage table sharded by `DashMap`.
///
/// `increment` holds the shard write lock of its key for the whole
/// reset/add/snapshot sequence, so concurrent requests for one identity are
/// serialised while unrelated identities proceed in parallel.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    windows: DashMap<Identity, UsageWindow>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn increment(
        &self,
        identity: &Identity,
        now: Duration,
        length: Duration,
    ) -> Result<UsageWindow, StoreError> {
        let mut window = self.windows.entry(*identity).or_insert(UsageWindow {
            started_at: now,
            count: 0,
        });

        if window.is_expired(now, length) {
            *window = UsageWindow {
                started_at: now,
                count: 0,
            };
        }
        window.count += 1;

        Ok(*window)
    }

    fn peek(&self, identity: &Identity) -> Result<Option<UsageWindow>, StoreError> {
        Ok(self.windows.get(identity).map(|w| *w.value()))
    }

    fn purge_expired(
        &self,
        now: Duration,
        length_of: &dyn Fn(PolicyClass) -> Duration,
    ) -> Result<usize, StoreError> {
        let before = self.windows.len();
        self.windows
            .retain(|identity, window| !window.is_expired(now, length_of(identity.policy_class())));
        Ok(before.saturating_sub(self.windows.len()))
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}
