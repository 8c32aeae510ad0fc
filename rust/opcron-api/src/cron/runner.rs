//! The lock-coordinated runner.
//!
//! One pass walks every due event in ascending timestamp order, firing
//! hooks and rescheduling recurring events, under the advisory run lock.
//! The lock value doubles as the run's identity: after each event fires
//! the lock is re-read, and a changed value means this run's lock expired
//! and another process took over, so the pass aborts and leaves the rest
//! of the due events for the next trigger.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::hooks::HookRegistry;
use super::lock::CronLock;
use super::scheduler;
use super::store::ScheduleStore;
use crate::store::StoreError;

/// Outcome of one runner pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Events fired during the pass.
    pub fired: usize,
    /// Recurring events moved to their next occurrence.
    pub rescheduled: usize,
    /// The pass aborted because another process took the lock.
    pub lock_lost: bool,
}

/// Executes runner passes over the shared schedule.
#[derive(Clone)]
pub struct CronRunner {
    store: ScheduleStore,
    lock: CronLock,
    hooks: Arc<HookRegistry>,
}

impl CronRunner {
    /// Create a runner over the given store, lock, and hook registry.
    #[must_use]
    pub fn new(store: ScheduleStore, lock: CronLock, hooks: Arc<HookRegistry>) -> Self {
        Self { store, lock, hooks }
    }

    /// Run one pass at the current time.
    ///
    /// `external_key` is the lock value handed over by a previously
    /// dispatched trigger request; when present this run adopts it as its
    /// identity instead of minting a new lock.
    pub async fn run_pass(&self, external_key: Option<&str>) -> Result<RunReport, StoreError> {
        self.run_pass_at(external_key, Utc::now()).await
    }

    /// Run one pass with an explicit clock.
    pub async fn run_pass_at(
        &self,
        external_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RunReport, StoreError> {
        let mut report = RunReport::default();
        let now_secs = now.timestamp();
        #[allow(clippy::cast_precision_loss, reason = "sub-second precision is enough here")]
        let now_frac = now_secs as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;

        let Some(mut schedule) = self.store.load().await? else {
            return Ok(report);
        };
        if !schedule.has_due(now_secs) {
            return Ok(report);
        }

        // Resolve this run's lock identity. A self-initiated run defers
        // to any fresh lock and otherwise mints its own; a dispatched run
        // adopts the key it was handed.
        let identity = match external_key {
            Some(key) => key.to_string(),
            None => {
                if let Some(existing) = self.lock.current().await?
                    && self.lock.is_fresh(&existing, now_frac)
                {
                    tracing::debug!("another runner holds the lock; skipping pass");
                    return Ok(report);
                }
                let key = CronLock::mint_key(now);
                self.lock.set(&key).await?;
                key
            }
        };

        // The stored lock must match this run's identity before any work.
        if self.lock.current().await?.as_deref() != Some(identity.as_str()) {
            tracing::debug!("lock does not match this run's key; skipping pass");
            return Ok(report);
        }

        for (timestamp, hook, key, detail) in schedule.due(now_secs) {
            // Persist the next occurrence of a recurring event before
            // removing the current one, so a crash between the two steps
            // never leaves the event absent from the schedule.
            if let Some(recurrence) = detail.schedule.as_deref() {
                match scheduler::reschedule_event(
                    &mut schedule,
                    &self.hooks,
                    timestamp,
                    recurrence,
                    &hook,
                    detail.args.clone(),
                    now_secs,
                ) {
                    Ok(()) => {
                        report.rescheduled += 1;
                        if let Err(error) = self.store.save(&schedule).await {
                            tracing::warn!(hook = %hook, error = %error, "failed to persist reschedule");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(hook = %hook, error = %error, "could not reschedule recurring event");
                    }
                }
            }

            schedule.remove(timestamp, &hook, &key);
            if let Err(error) = self.store.save(&schedule).await {
                // Non-fatal: the event may fire again on the next pass,
                // which at-least-once semantics already allow.
                tracing::warn!(hook = %hook, error = %error, "failed to persist unschedule");
            }

            let callbacks = self.hooks.do_action(&hook, &detail.args).await;
            report.fired += 1;
            tracing::debug!(hook = %hook, timestamp, callbacks, "fired scheduled event");

            if self.lock.current().await?.as_deref() != Some(identity.as_str()) {
                tracing::info!(hook = %hook, "run lock was taken over; aborting pass");
                report.lock_lost = true;
                return Ok(report);
            }
        }

        // Only the owner clears the lock; if it was taken over the new
        // owner is responsible for it.
        if self.lock.current().await?.as_deref() == Some(identity.as_str()) {
            self.lock.release().await?;
        }

        Ok(report)
    }
}

impl std::fmt::Debug for CronRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronRunner").finish_non_exhaustive()
    }
}
