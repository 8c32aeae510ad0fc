//! Request-triggered cron scheduling.
//!
//! This module provides:
//!
//! - **Schedule**: the durable timestamp -> hook -> fingerprint structure
//! - **Scheduler**: schedule / reschedule / unschedule / query operations
//! - **Runner**: the lock-coordinated pass over due events
//! - **Spawner**: per-request out-of-band trigger dispatch
//!
//! There is no resident scheduler process. The schedule lives in the
//! key-value store as a single document; each inbound request checks for
//! due work and, when appropriate, triggers one runner pass, with a
//! timeout-bounded lock in the same store keeping concurrent web-server
//! processes from running the same events. Execution is at-least-once:
//! the lock is advisory and a rare timing race can fire an event twice,
//! which is the accepted price of having no daemon.

pub mod event;
pub mod hooks;
pub mod lock;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod schedules;
pub mod spawn;
pub mod store;

pub use event::{fingerprint, CronEvent, EventDetail};
pub use hooks::HookRegistry;
pub use lock::CronLock;
pub use runner::{CronRunner, RunReport};
pub use schedule::CronSchedule;
pub use scheduler::ScheduleError;
pub use schedules::Recurrence;
pub use spawn::{CronSpawner, RequestContext, SpawnDecision};
pub use store::ScheduleStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::CronConfig;
use crate::store::{KeyValueStore, StoreError};

/// Error from a service-level scheduling call.
#[derive(Debug, thiserror::Error)]
pub enum CronError {
    /// The operation was rejected without changing the schedule.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// The key-value store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The assembled cron subsystem: schedule store, lock, hook registry,
/// runner, and spawner over one key-value backend.
///
/// Scheduling calls are whole-document read-modify-write: the schedule
/// is loaded, transformed by a pure operation, and stored back. Writers
/// not coordinated by the run lock race with last-writer-wins semantics.
#[derive(Debug, Clone)]
pub struct CronService {
    hooks: Arc<HookRegistry>,
    store: ScheduleStore,
    runner: CronRunner,
    spawner: CronSpawner,
}

impl CronService {
    /// Assemble the subsystem over a key-value backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>, config: CronConfig) -> Self {
        let hooks = Arc::new(HookRegistry::new());
        let store = ScheduleStore::new(Arc::clone(&backend));
        let lock = CronLock::new(backend, config.lock_timeout_secs);
        let runner = CronRunner::new(store.clone(), lock.clone(), Arc::clone(&hooks));
        let spawner = CronSpawner::new(store.clone(), lock, config);
        Self {
            hooks,
            store,
            runner,
            spawner,
        }
    }

    /// The hook and filter registry.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// The schedule store.
    #[must_use]
    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    /// The runner.
    #[must_use]
    pub fn runner(&self) -> &CronRunner {
        &self.runner
    }

    /// The spawner.
    #[must_use]
    pub fn spawner(&self) -> &CronSpawner {
        &self.spawner
    }

    /// Schedule an event to run only once. See
    /// [`scheduler::schedule_single_event`].
    pub async fn schedule_single_event(
        &self,
        timestamp: i64,
        hook: &str,
        args: Vec<Value>,
    ) -> Result<(), CronError> {
        let mut schedule = self.store.load().await?.unwrap_or_default();
        scheduler::schedule_single_event(&mut schedule, &self.hooks, timestamp, hook, args)?;
        self.store.save(&schedule).await?;
        Ok(())
    }

    /// Schedule a recurring event. See [`scheduler::schedule_event`].
    pub async fn schedule_event(
        &self,
        timestamp: i64,
        recurrence: &str,
        hook: &str,
        args: Vec<Value>,
    ) -> Result<(), CronError> {
        let mut schedule = self.store.load().await?.unwrap_or_default();
        scheduler::schedule_event(&mut schedule, &self.hooks, timestamp, recurrence, hook, args)?;
        self.store.save(&schedule).await?;
        Ok(())
    }

    /// Move a recurring event to its next occurrence. See
    /// [`scheduler::reschedule_event`].
    pub async fn reschedule_event(
        &self,
        timestamp: i64,
        recurrence: &str,
        hook: &str,
        args: Vec<Value>,
    ) -> Result<(), CronError> {
        let mut schedule = self.store.load().await?.unwrap_or_default();
        scheduler::reschedule_event(
            &mut schedule,
            &self.hooks,
            timestamp,
            recurrence,
            hook,
            args,
            Utc::now().timestamp(),
        )?;
        self.store.save(&schedule).await?;
        Ok(())
    }

    /// Remove one scheduled occurrence. Returns whether one was removed.
    pub async fn unschedule_event(
        &self,
        timestamp: i64,
        hook: &str,
        args: &[Value],
    ) -> Result<bool, CronError> {
        let mut schedule = self.store.load().await?.unwrap_or_default();
        let removed = scheduler::unschedule_event(&mut schedule, timestamp, hook, args)?;
        self.store.save(&schedule).await?;
        Ok(removed)
    }

    /// Remove every occurrence of hook+args. Returns the number removed.
    pub async fn clear_scheduled_hook(
        &self,
        hook: &str,
        args: &[Value],
    ) -> Result<usize, CronError> {
        let mut schedule = self.store.load().await?.unwrap_or_default();
        let removed = scheduler::clear_scheduled_hook(&mut schedule, hook, args);
        self.store.save(&schedule).await?;
        Ok(removed)
    }

    /// The next timestamp at which hook+args will run.
    pub async fn next_scheduled(
        &self,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<i64>, CronError> {
        let schedule = self.store.load().await?.unwrap_or_default();
        Ok(scheduler::next_scheduled(&schedule, hook, args))
    }

    /// The recurrence name of the first scheduled occurrence of
    /// hook+args.
    pub async fn get_schedule(
        &self,
        hook: &str,
        args: &[Value],
    ) -> Result<Option<String>, CronError> {
        let schedule = self.store.load().await?.unwrap_or_default();
        Ok(scheduler::get_schedule(&schedule, hook, args))
    }

    /// The effective recurrence catalog.
    #[must_use]
    pub fn schedules(&self) -> BTreeMap<String, Recurrence> {
        schedules::schedules(&self.hooks)
    }
}
