//! The durable schedule structure.
//!
//! Timestamps key the outer map as `i64`, which keeps iteration in
//! numeric ascending order even though the persisted JSON document can
//! only carry string keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::event::EventDetail;

/// fingerprint -> event detail.
pub type HookEntries = BTreeMap<String, EventDetail>;

/// hook name -> entries.
pub type TimestampBucket = BTreeMap<String, HookEntries>;

/// All pending events: timestamp -> hook -> fingerprint -> detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CronSchedule {
    events: BTreeMap<i64, TimestampBucket>,
}

impl CronSchedule {
    /// An empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The earliest pending timestamp.
    #[must_use]
    pub fn earliest(&self) -> Option<i64> {
        self.events.keys().next().copied()
    }

    /// True when at least one event is due at or before `now`.
    #[must_use]
    pub fn has_due(&self, now: i64) -> bool {
        self.earliest().is_some_and(|ts| ts <= now)
    }

    /// Insert an occurrence under `(timestamp, hook, fingerprint)`.
    pub fn insert(
        &mut self,
        timestamp: i64,
        hook: impl Into<String>,
        fingerprint: impl Into<String>,
        detail: EventDetail,
    ) {
        self.events
            .entry(timestamp)
            .or_default()
            .entry(hook.into())
            .or_default()
            .insert(fingerprint.into(), detail);
    }

    /// Remove one occurrence, pruning hook and timestamp containers that
    /// become empty. Returns whether an entry was removed.
    pub fn remove(&mut self, timestamp: i64, hook: &str, fingerprint: &str) -> bool {
        let Some(bucket) = self.events.get_mut(&timestamp) else {
            return false;
        };
        let Some(entries) = bucket.get_mut(hook) else {
            return false;
        };
        let removed = entries.remove(fingerprint).is_some();
        if entries.is_empty() {
            bucket.remove(hook);
        }
        if bucket.is_empty() {
            self.events.remove(&timestamp);
        }
        removed
    }

    /// Look up the detail stored for one occurrence.
    #[must_use]
    pub fn detail(&self, timestamp: i64, hook: &str, fingerprint: &str) -> Option<&EventDetail> {
        self.events
            .get(&timestamp)?
            .get(hook)?
            .get(fingerprint)
    }

    /// The first (earliest) timestamp holding a matching occurrence.
    #[must_use]
    pub fn next_scheduled(&self, hook: &str, fingerprint: &str) -> Option<i64> {
        self.events
            .iter()
            .find(|(_, bucket)| {
                bucket
                    .get(hook)
                    .is_some_and(|entries| entries.contains_key(fingerprint))
            })
            .map(|(ts, _)| *ts)
    }

    /// Every timestamp holding a matching occurrence, ascending.
    #[must_use]
    pub fn timestamps_for(&self, hook: &str, fingerprint: &str) -> Vec<i64> {
        self.events
            .iter()
            .filter(|(_, bucket)| {
                bucket
                    .get(hook)
                    .is_some_and(|entries| entries.contains_key(fingerprint))
            })
            .map(|(ts, _)| *ts)
            .collect()
    }

    /// Pending timestamps in ascending numeric order.
    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.events.keys().copied()
    }

    /// Snapshot of every occurrence due at or before `now`, in timestamp
    /// order. The snapshot decouples the runner's walk from the mutations
    /// it performs along the way.
    #[must_use]
    pub fn due(&self, now: i64) -> Vec<(i64, String, String, EventDetail)> {
        let mut due = Vec::new();
        for (&timestamp, bucket) in &self.events {
            if timestamp > now {
                break;
            }
            for (hook, entries) in bucket {
                for (fingerprint, detail) in entries {
                    due.push((timestamp, hook.clone(), fingerprint.clone(), detail.clone()));
                }
            }
        }
        due
    }

    /// Total number of pending occurrences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail() -> EventDetail {
        EventDetail::single(vec![json!("x")])
    }

    #[test]
    fn timestamps_iterate_in_numeric_order() {
        let mut schedule = CronSchedule::new();
        for ts in [50, 7, 1000, 3] {
            schedule.insert(ts, "send_digest", "k", detail());
        }

        let order: Vec<i64> = schedule.timestamps().collect();
        assert_eq!(order, vec![3, 7, 50, 1000]);
    }

    #[test]
    fn numeric_order_survives_serialization() {
        let mut schedule = CronSchedule::new();
        for ts in [50, 7, 1000, 3] {
            schedule.insert(ts, "send_digest", "k", detail());
        }

        // JSON object keys are strings; "1000" sorts before "3"
        // lexically, so the round trip must restore numeric order.
        let raw = serde_json::to_string(&schedule).unwrap();
        let restored: CronSchedule = serde_json::from_str(&raw).unwrap();
        let order: Vec<i64> = restored.timestamps().collect();
        assert_eq!(order, vec![3, 7, 50, 1000]);
    }

    #[test]
    fn remove_prunes_empty_containers() {
        let mut schedule = CronSchedule::new();
        schedule.insert(100, "send_digest", "k", detail());

        assert!(schedule.remove(100, "send_digest", "k"));
        assert!(schedule.is_empty());
    }

    #[test]
    fn remove_keeps_siblings() {
        let mut schedule = CronSchedule::new();
        schedule.insert(100, "send_digest", "k1", detail());
        schedule.insert(100, "send_digest", "k2", detail());
        schedule.insert(100, "prune_cache", "k1", detail());

        assert!(schedule.remove(100, "send_digest", "k1"));
        assert!(schedule.detail(100, "send_digest", "k2").is_some());
        assert!(schedule.detail(100, "prune_cache", "k1").is_some());
    }

    #[test]
    fn remove_of_absent_entry_is_false() {
        let mut schedule = CronSchedule::new();
        assert!(!schedule.remove(100, "send_digest", "k"));
    }

    #[test]
    fn next_scheduled_returns_earliest_match() {
        let mut schedule = CronSchedule::new();
        schedule.insert(300, "send_digest", "k", detail());
        schedule.insert(100, "send_digest", "k", detail());
        schedule.insert(200, "send_digest", "other", detail());

        assert_eq!(schedule.next_scheduled("send_digest", "k"), Some(100));
        assert_eq!(schedule.next_scheduled("send_digest", "missing"), None);
    }

    #[test]
    fn due_stops_at_future_timestamps() {
        let mut schedule = CronSchedule::new();
        schedule.insert(10, "a", "k", detail());
        schedule.insert(20, "b", "k", detail());
        schedule.insert(30, "c", "k", detail());

        let due = schedule.due(20);
        let hooks: Vec<&str> = due.iter().map(|(_, hook, _, _)| hook.as_str()).collect();
        assert_eq!(hooks, vec!["a", "b"]);
    }
}
