//! Event identity and the argument fingerprint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// Detail stored for one scheduled occurrence of a hook.
///
/// Keyed in the schedule by `(timestamp, hook, fingerprint(args))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetail {
    /// Recurrence name, `None` for one-shot events.
    pub schedule: Option<String>,
    /// Arguments passed to the hook's callbacks when the event fires.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Interval in seconds, captured from the catalog when the event was
    /// scheduled so that a recurrence removed from the catalog does not
    /// break already-scheduled events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
}

impl EventDetail {
    /// A one-shot occurrence.
    #[must_use]
    pub fn single(args: Vec<Value>) -> Self {
        Self {
            schedule: None,
            args,
            interval: None,
        }
    }

    /// A recurring occurrence with its captured interval.
    #[must_use]
    pub fn recurring(schedule: impl Into<String>, args: Vec<Value>, interval: i64) -> Self {
        Self {
            schedule: Some(schedule.into()),
            args,
            interval: Some(interval),
        }
    }
}

/// A pending event as seen by the scheduling filter chain.
///
/// Filters may rewrite any field before the event is persisted, or veto
/// it entirely by returning `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronEvent {
    /// Hook fired when the event runs.
    pub hook: String,
    /// Unix timestamp (UTC seconds) the event is due at.
    pub timestamp: i64,
    /// Recurrence name, `None` for one-shot events.
    pub schedule: Option<String>,
    /// Arguments passed to the hook's callbacks.
    pub args: Vec<Value>,
    /// Interval in seconds for recurring events.
    pub interval: Option<i64>,
}

/// Compute the deterministic fingerprint of an argument list.
///
/// The args are serialized to canonical JSON (object keys are emitted in
/// sorted order) and hashed with SHA-256, so the same arguments produce
/// the same fingerprint in every process. The fingerprint is the identity
/// used for dedup and lookups across scheduling, unscheduling, and
/// next-scheduled queries.
#[must_use]
pub fn fingerprint(args: &[Value]) -> String {
    let canonical = serde_json::to_vec(args).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}
