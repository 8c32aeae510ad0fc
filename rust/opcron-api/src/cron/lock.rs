//! The run lock.
//!
//! A single value in the key-value store acts as an advisory, time-boxed
//! mutex between web-server processes racing to run due events. The value
//! is a fixed-precision decimal timestamp minted at acquisition; it
//! doubles as the owning run's identity. Absence, or an age past the
//! configured timeout, means the lock is available: a crashed runner's
//! lock self-expires rather than wedging the system.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::{KeyValueStore, StoreError};

/// Key the lock is stored under.
pub const CRON_LOCK_KEY: &str = "doing_cron";

/// Default lock timeout in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;

/// A lock value dated further than this into the future is corrupt and
/// treated as absent.
const MAX_FUTURE_SKEW_SECS: f64 = 600.0;

/// Handle to the shared run lock.
#[derive(Clone)]
pub struct CronLock {
    store: Arc<dyn KeyValueStore>,
    timeout_secs: u64,
}

impl CronLock {
    /// Create a lock handle with the given staleness timeout.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, timeout_secs: u64) -> Self {
        Self { store, timeout_secs }
    }

    /// Mint a lock value for a run starting at `now`: unix seconds with a
    /// fixed six-digit microsecond fraction, unique enough to identify
    /// one spawning request among concurrent ones.
    #[must_use]
    pub fn mint_key(now: DateTime<Utc>) -> String {
        format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
    }

    /// Read the current lock value, if any.
    pub async fn current(&self) -> Result<Option<String>, StoreError> {
        self.store.get(CRON_LOCK_KEY).await
    }

    /// Store `key` as the lock value, bounded by the lock timeout.
    pub async fn set(&self, key: &str) -> Result<(), StoreError> {
        self.store.set_ex(CRON_LOCK_KEY, key, self.timeout_secs).await
    }

    /// Delete the lock.
    pub async fn release(&self) -> Result<(), StoreError> {
        self.store.delete(CRON_LOCK_KEY).await
    }

    /// Whether a lock value still guards a run at `now_secs` (fractional
    /// unix seconds). Unparsable or future-dated values count as stale.
    #[must_use]
    pub fn is_fresh(&self, value: &str, now_secs: f64) -> bool {
        let mut minted = value.parse::<f64>().unwrap_or(0.0);
        if minted > now_secs + MAX_FUTURE_SKEW_SECS {
            minted = 0.0;
        }
        #[allow(clippy::cast_precision_loss, reason = "timeout is small")]
        let timeout = self.timeout_secs as f64;
        minted + timeout > now_secs
    }
}

impl std::fmt::Debug for CronLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronLock")
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}
