//! Scheduling operations.
//!
//! Every operation here is a pure transformation of an explicit
//! [`CronSchedule`] value; persistence is the caller's concern (see
//! [`CronService`](super::CronService)). Failure is reported through
//! [`ScheduleError`] values, never panics, and a failed operation leaves
//! the schedule untouched.

use serde_json::Value;

use super::event::{fingerprint, CronEvent, EventDetail};
use super::hooks::HookRegistry;
use super::schedule::CronSchedule;
use super::schedules::schedules;

/// Window within which two one-shot events for the same hook+args are
/// considered duplicates, in seconds.
pub const DUPLICATE_WINDOW_SECS: i64 = 600;

/// Why a scheduling operation did not change the schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// Timestamps must be positive unix seconds.
    #[error("timestamp must be a positive unix time, got {0}")]
    InvalidTimestamp(i64),
    /// An equivalent one-shot event is already scheduled nearby.
    #[error("an event for hook '{0}' with the same arguments is already scheduled within {DUPLICATE_WINDOW_SECS}s")]
    Duplicate(String),
    /// The named recurrence is not in the catalog.
    #[error("unknown recurrence '{0}'")]
    UnknownRecurrence(String),
    /// An event filter rejected the event.
    #[error("event for hook '{0}' was rejected by a filter")]
    Vetoed(String),
    /// Neither the catalog nor the stored entry yields a usable interval.
    #[error("no usable interval for recurrence '{0}'")]
    NoInterval(String),
}

fn check_timestamp(timestamp: i64) -> Result<(), ScheduleError> {
    if timestamp <= 0 {
        return Err(ScheduleError::InvalidTimestamp(timestamp));
    }
    Ok(())
}

/// Schedule an event to run only once.
///
/// Rejected as a duplicate when the next occurrence of the same
/// hook+args falls within [`DUPLICATE_WINDOW_SECS`] of the requested
/// timestamp; repeated near-simultaneous requests therefore store
/// exactly one event.
pub fn schedule_single_event(
    schedule: &mut CronSchedule,
    hooks: &HookRegistry,
    timestamp: i64,
    hook: &str,
    args: Vec<Value>,
) -> Result<(), ScheduleError> {
    check_timestamp(timestamp)?;

    let key = fingerprint(&args);
    if let Some(next) = schedule.next_scheduled(hook, &key)
        && (next - timestamp).abs() <= DUPLICATE_WINDOW_SECS
    {
        return Err(ScheduleError::Duplicate(hook.to_string()));
    }

    let event = CronEvent {
        hook: hook.to_string(),
        timestamp,
        schedule: None,
        args,
        interval: None,
    };
    let event = hooks
        .apply_event_filters(event)
        .ok_or_else(|| ScheduleError::Vetoed(hook.to_string()))?;

    insert_event(schedule, event);
    Ok(())
}

fn insert_event(schedule: &mut CronSchedule, event: CronEvent) {
    let key = fingerprint(&event.args);
    let detail = EventDetail {
        schedule: event.schedule,
        args: event.args,
        interval: event.interval,
    };
    schedule.insert(event.timestamp, event.hook, key, detail);
}

/// Schedule a recurring event.
///
/// The interval is captured from the catalog at scheduling time and
/// stored on the entry, so removing the named recurrence from the
/// catalog later does not break events already scheduled against it.
pub fn schedule_event(
    schedule: &mut CronSchedule,
    hooks: &HookRegistry,
    timestamp: i64,
    recurrence: &str,
    hook: &str,
    args: Vec<Value>,
) -> Result<(), ScheduleError> {
    check_timestamp(timestamp)?;

    let catalog = schedules(hooks);
    let Some(entry) = catalog.get(recurrence) else {
        return Err(ScheduleError::UnknownRecurrence(recurrence.to_string()));
    };
    let interval = entry.interval;

    let event = CronEvent {
        hook: hook.to_string(),
        timestamp,
        schedule: Some(recurrence.to_string()),
        args,
        interval: Some(interval),
    };
    let event = hooks
        .apply_event_filters(event)
        .ok_or_else(|| ScheduleError::Vetoed(hook.to_string()))?;

    insert_event(schedule, event);
    Ok(())
}

/// Move a recurring event to its next occurrence relative to `now`.
///
/// The interval comes from the live catalog when the recurrence still
/// exists, otherwise from the interval stored on the scheduled entry.
/// The new timestamp keeps the event anchored to its original phase: a
/// late run advances to the next multiple of the interval past the
/// original timestamp instead of drifting forward by a full interval.
pub fn reschedule_event(
    schedule: &mut CronSchedule,
    hooks: &HookRegistry,
    timestamp: i64,
    recurrence: &str,
    hook: &str,
    args: Vec<Value>,
    now: i64,
) -> Result<(), ScheduleError> {
    check_timestamp(timestamp)?;

    let key = fingerprint(&args);
    let catalog = schedules(hooks);
    let mut interval = catalog.get(recurrence).map_or(0, |entry| entry.interval);
    if interval == 0 {
        interval = schedule
            .detail(timestamp, hook, &key)
            .and_then(|detail| detail.interval)
            .unwrap_or(0);
    }
    if interval <= 0 {
        return Err(ScheduleError::NoInterval(recurrence.to_string()));
    }

    let next = if timestamp >= now {
        now + interval
    } else {
        now + (interval - ((now - timestamp) % interval))
    };

    let event = CronEvent {
        hook: hook.to_string(),
        timestamp: next,
        schedule: Some(recurrence.to_string()),
        args,
        interval: Some(interval),
    };
    let event = hooks
        .apply_event_filters(event)
        .ok_or_else(|| ScheduleError::Vetoed(hook.to_string()))?;

    insert_event(schedule, event);
    Ok(())
}

/// Remove one scheduled occurrence.
pub fn unschedule_event(
    schedule: &mut CronSchedule,
    timestamp: i64,
    hook: &str,
    args: &[Value],
) -> Result<bool, ScheduleError> {
    check_timestamp(timestamp)?;
    let key = fingerprint(args);
    Ok(schedule.remove(timestamp, hook, &key))
}

/// Remove every occurrence of hook+args across all timestamps.
///
/// A single sweep rather than repeated unschedule/lookup rounds, so a
/// persistence layer that silently drops writes cannot trap the caller
/// in a retry loop. Returns the number of occurrences removed.
pub fn clear_scheduled_hook(schedule: &mut CronSchedule, hook: &str, args: &[Value]) -> usize {
    let key = fingerprint(args);
    let timestamps = schedule.timestamps_for(hook, &key);
    let mut removed = 0;
    for timestamp in timestamps {
        if schedule.remove(timestamp, hook, &key) {
            removed += 1;
        }
    }
    removed
}

/// The next timestamp at which hook+args will run.
#[must_use]
pub fn next_scheduled(schedule: &CronSchedule, hook: &str, args: &[Value]) -> Option<i64> {
    schedule.next_scheduled(hook, &fingerprint(args))
}

/// The recurrence name of the first scheduled occurrence of hook+args.
#[must_use]
pub fn get_schedule(schedule: &CronSchedule, hook: &str, args: &[Value]) -> Option<String> {
    let key = fingerprint(args);
    let timestamp = schedule.next_scheduled(hook, &key)?;
    schedule
        .detail(timestamp, hook, &key)
        .and_then(|detail| detail.schedule.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Vec<Value> {
        vec![json!("weekly")]
    }

    #[test]
    fn rejects_non_positive_timestamps() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        assert_eq!(
            schedule_single_event(&mut schedule, &hooks, 0, "send_digest", args()),
            Err(ScheduleError::InvalidTimestamp(0))
        );
        assert_eq!(
            schedule_event(&mut schedule, &hooks, -5, "daily", "send_digest", args()),
            Err(ScheduleError::InvalidTimestamp(-5))
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn duplicate_within_window_is_rejected() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", args()).unwrap();
        let result =
            schedule_single_event(&mut schedule, &hooks, 10_000 + 600, "send_digest", args());

        assert_eq!(result, Err(ScheduleError::Duplicate("send_digest".to_string())));
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn duplicate_outside_window_is_allowed() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", args()).unwrap();
        schedule_single_event(&mut schedule, &hooks, 10_000 + 601, "send_digest", args()).unwrap();

        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn different_args_are_not_duplicates() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", vec![json!("a")])
            .unwrap();
        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", vec![json!("b")])
            .unwrap();

        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn unknown_recurrence_is_rejected() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        assert_eq!(
            schedule_event(&mut schedule, &hooks, 10_000, "fortnightly", "send_digest", args()),
            Err(ScheduleError::UnknownRecurrence("fortnightly".to_string()))
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn recurring_event_captures_the_interval() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        schedule_event(&mut schedule, &hooks, 10_000, "daily", "send_digest", args()).unwrap();

        let key = fingerprint(&args());
        let detail = schedule.detail(10_000, "send_digest", &key).unwrap();
        assert_eq!(detail.schedule.as_deref(), Some("daily"));
        assert_eq!(detail.interval, Some(86_400));
    }

    #[test]
    fn veto_filter_aborts_scheduling() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();
        hooks.add_event_filter(|_event| None);

        assert_eq!(
            schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", args()),
            Err(ScheduleError::Vetoed("send_digest".to_string()))
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn rewrite_filter_changes_the_stored_event() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();
        hooks.add_event_filter(|mut event| {
            event.timestamp = 20_000;
            Some(event)
        });

        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", args()).unwrap();

        assert_eq!(next_scheduled(&schedule, "send_digest", &args()), Some(20_000));
    }

    #[test]
    fn reschedule_anchors_to_the_original_phase() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        let t = 100_000;
        let interval = 3600;
        schedule_event(&mut schedule, &hooks, t, "hourly", "send_digest", args()).unwrap();

        // Invoked 1.5 intervals late: next run is T + 2I, not now + I.
        let now = t + interval * 3 / 2;
        reschedule_event(&mut schedule, &hooks, t, "hourly", "send_digest", args(), now).unwrap();

        let key = fingerprint(&args());
        assert!(schedule.detail(t + 2 * interval, "send_digest", &key).is_some());
    }

    #[test]
    fn reschedule_of_future_event_runs_one_interval_from_now() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        let now = 50_000;
        let t = now + 10;
        schedule_event(&mut schedule, &hooks, t, "hourly", "send_digest", args()).unwrap();
        reschedule_event(&mut schedule, &hooks, t, "hourly", "send_digest", args(), now).unwrap();

        assert!(schedule
            .detail(now + 3600, "send_digest", &fingerprint(&args()))
            .is_some());
    }

    #[test]
    fn reschedule_falls_back_to_the_stored_interval() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        // Entry scheduled under a recurrence that no longer exists; the
        // captured interval keeps it alive.
        let key = fingerprint(&args());
        schedule.insert(
            10_000,
            "send_digest",
            key.clone(),
            EventDetail::recurring("fortnightly", args(), 1_209_600),
        );

        reschedule_event(
            &mut schedule,
            &hooks,
            10_000,
            "fortnightly",
            "send_digest",
            args(),
            20_000,
        )
        .unwrap();

        // 20_000 + (1_209_600 - ((20_000 - 10_000) % 1_209_600))
        assert!(schedule.detail(1_219_600, "send_digest", &key).is_some());
    }

    #[test]
    fn reschedule_without_any_interval_fails() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        assert_eq!(
            reschedule_event(
                &mut schedule,
                &hooks,
                10_000,
                "fortnightly",
                "send_digest",
                args(),
                20_000,
            ),
            Err(ScheduleError::NoInterval("fortnightly".to_string()))
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn unschedule_removes_only_the_identified_entry() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", args()).unwrap();
        schedule_single_event(&mut schedule, &hooks, 50_000, "send_digest", args()).unwrap();

        assert!(unschedule_event(&mut schedule, 10_000, "send_digest", &args()).unwrap());
        assert_eq!(next_scheduled(&schedule, "send_digest", &args()), Some(50_000));
    }

    #[test]
    fn clear_removes_all_occurrences_and_spares_others() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        for ts in [10_000, 50_000, 90_000] {
            schedule_single_event(&mut schedule, &hooks, ts, "send_digest", args()).unwrap();
        }
        schedule_single_event(&mut schedule, &hooks, 10_000, "prune_cache", args()).unwrap();
        schedule_single_event(&mut schedule, &hooks, 10_000, "send_digest", vec![json!("other")])
            .unwrap();

        assert_eq!(clear_scheduled_hook(&mut schedule, "send_digest", &args()), 3);
        assert_eq!(next_scheduled(&schedule, "send_digest", &args()), None);
        assert_eq!(next_scheduled(&schedule, "prune_cache", &args()), Some(10_000));
        assert_eq!(
            next_scheduled(&schedule, "send_digest", &[json!("other")]),
            Some(10_000)
        );
    }

    #[test]
    fn get_schedule_reports_the_recurrence_name() {
        let mut schedule = CronSchedule::new();
        let hooks = HookRegistry::new();

        schedule_event(&mut schedule, &hooks, 10_000, "twicedaily", "send_digest", args())
            .unwrap();

        assert_eq!(
            get_schedule(&schedule, "send_digest", &args()),
            Some("twicedaily".to_string())
        );
        assert_eq!(get_schedule(&schedule, "send_digest", &[json!("other")]), None);
    }
}
