//! Persistence of the schedule document.
//!
//! The whole schedule is read and written as one document under a single
//! key; every mutation is a read-modify-write. Concurrent writers not
//! coordinated by the run lock can lose updates (last writer wins), which
//! the store accepts in exchange for not needing transactions from the
//! backend.

use std::sync::Arc;

use serde_json::{json, Value};

use super::event::fingerprint;
use super::schedule::CronSchedule;
use crate::store::{KeyValueStore, StoreError};

/// Key the schedule document is stored under.
pub const CRON_KEY: &str = "cron";

/// Current schedule document version.
pub const SCHEDULE_VERSION: u64 = 2;

/// Loads and saves the schedule document, transparently upgrading the
/// legacy unversioned layout.
#[derive(Clone)]
pub struct ScheduleStore {
    store: Arc<dyn KeyValueStore>,
}

impl ScheduleStore {
    /// Create a store over the given key-value backend.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the schedule, or `None` when nothing has been stored yet.
    ///
    /// A legacy document (no version tag, entries keyed `timestamp ->
    /// hook -> detail` with no fingerprint level) is upgraded in place:
    /// fingerprints are computed for every entry and the versioned form
    /// is written back. If that write fails the upgraded schedule is
    /// still returned; the legacy document stays put for the next caller
    /// to retry the upgrade.
    pub async fn load(&self) -> Result<Option<CronSchedule>, StoreError> {
        let Some(raw) = self.store.get(CRON_KEY).await? else {
            return Ok(None);
        };
        let document: Value = serde_json::from_str(&raw)?;

        if document.get("version").and_then(Value::as_u64) == Some(SCHEDULE_VERSION) {
            let events = document.get("events").cloned().unwrap_or_else(|| json!({}));
            return Ok(Some(serde_json::from_value(events)?));
        }

        let upgraded = upgrade_legacy(&document)?;
        if let Err(error) = self.save(&upgraded).await {
            tracing::warn!(
                error = %error,
                "failed to persist upgraded schedule document; upgrade will be retried on next load"
            );
        }
        Ok(Some(upgraded))
    }

    /// Persist the schedule under the current document version.
    pub async fn save(&self, schedule: &CronSchedule) -> Result<(), StoreError> {
        let document = json!({
            "version": SCHEDULE_VERSION,
            "events": schedule,
        });
        self.store.set(CRON_KEY, &document.to_string()).await
    }
}

impl std::fmt::Debug for ScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleStore").finish_non_exhaustive()
    }
}

/// Re-key a legacy document by computing the fingerprint of each entry's
/// argument list.
fn upgrade_legacy(document: &Value) -> Result<CronSchedule, StoreError> {
    let mut upgraded = CronSchedule::new();
    let Some(entries) = document.as_object() else {
        return Ok(upgraded);
    };

    for (raw_timestamp, hooks) in entries {
        if raw_timestamp == "version" {
            continue;
        }
        let Ok(timestamp) = raw_timestamp.parse::<i64>() else {
            tracing::warn!(key = %raw_timestamp, "skipping non-numeric timestamp in legacy schedule");
            continue;
        };
        let Some(hooks) = hooks.as_object() else {
            continue;
        };
        for (hook, detail) in hooks {
            let args = detail
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let key = fingerprint(&args);
            upgraded.insert(timestamp, hook.clone(), key, serde_json::from_value(detail.clone())?);
        }
    }
    Ok(upgraded)
}
