//! The trigger spawner.
//!
//! Decides, per inbound request, whether a runner pass should be kicked
//! off, and how: the default mode fires a non-blocking loopback request
//! at the trigger endpoint so the current request is never slowed down;
//! alternate mode (for hosts that block outbound loopback requests)
//! instead redirects the current response back to itself with the lock
//! key attached, and the redirected request runs the pass in-process.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::lock::CronLock;
use super::store::ScheduleStore;
use crate::config::CronConfig;

/// Query parameter carrying the lock key to the trigger endpoint.
pub const DOING_CRON_PARAM: &str = "doing_cron";

/// What the spawner has requested for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnDecision {
    /// Nothing to do; serve the request normally.
    Skip,
    /// A fire-and-forget trigger request was dispatched with this key.
    Dispatched { key: String },
    /// Alternate mode: redirect the response to `location`; the redirect
    /// target performs the run in-process using `key`.
    Redirect { location: String, key: String },
}

/// The request facts the spawner needs, threaded explicitly instead of
/// read from ambient globals.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// True for GET requests (alternate mode only redirects those).
    pub is_get: bool,
    /// True when this request is itself a cron trigger invocation.
    pub doing_cron: bool,
    /// Path and query of the current request, for the redirect target.
    pub uri: String,
}

/// Decides whether and how to trigger a runner pass for a request.
#[derive(Clone)]
pub struct CronSpawner {
    store: ScheduleStore,
    lock: CronLock,
    config: CronConfig,
    client: reqwest::Client,
}

impl CronSpawner {
    /// Create a spawner over the given store and lock.
    #[must_use]
    pub fn new(store: ScheduleStore, lock: CronLock, config: CronConfig) -> Self {
        Self {
            store,
            lock,
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Evaluate the spawn decision for one request at the current time.
    pub async fn maybe_spawn(&self, ctx: &RequestContext) -> SpawnDecision {
        self.maybe_spawn_at(ctx, Utc::now()).await
    }

    /// Evaluate the spawn decision with an explicit clock.
    pub async fn maybe_spawn_at(&self, ctx: &RequestContext, now: DateTime<Utc>) -> SpawnDecision {
        if ctx.doing_cron || self.config.disabled {
            return SpawnDecision::Skip;
        }

        let now_secs = now.timestamp();
        #[allow(clippy::cast_precision_loss, reason = "sub-second precision is enough here")]
        let now_frac = now_secs as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;

        // Another process already spawned a run that has not finished.
        match self.lock.current().await {
            Ok(Some(value)) if self.lock.is_fresh(&value, now_frac) => return SpawnDecision::Skip,
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(error = %error, "could not read cron lock; skipping spawn");
                return SpawnDecision::Skip;
            }
        }

        let schedule = match self.store.load().await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => return SpawnDecision::Skip,
            Err(error) => {
                tracing::warn!(error = %error, "could not load schedule; skipping spawn");
                return SpawnDecision::Skip;
            }
        };
        if !schedule.has_due(now_secs) {
            return SpawnDecision::Skip;
        }

        let key = CronLock::mint_key(now);

        if self.config.alternate {
            // Redirect-based triggering only makes sense for plain GETs.
            if !ctx.is_get {
                return SpawnDecision::Skip;
            }
            if let Err(error) = self.lock.set(&key).await {
                tracing::warn!(error = %error, "could not set cron lock; skipping spawn");
                return SpawnDecision::Skip;
            }
            let separator = if ctx.uri.contains('?') { '&' } else { '?' };
            let location = format!("{}{}{}={}", ctx.uri, separator, DOING_CRON_PARAM, key);
            return SpawnDecision::Redirect { location, key };
        }

        if let Err(error) = self.lock.set(&key).await {
            tracing::warn!(error = %error, "could not set cron lock; skipping spawn");
            return SpawnDecision::Skip;
        }

        let url = format!(
            "{}/cron?{}={}",
            self.config.site_url.trim_end_matches('/'),
            DOING_CRON_PARAM,
            key
        );
        let client = self.client.clone();
        let timeout = Duration::from_millis(self.config.spawn_timeout_ms);
        tokio::spawn(async move {
            // Deliberately tiny timeout: the point is to hand off the
            // key, not to wait for the pass to finish. A timeout here is
            // expected and harmless.
            if let Err(error) = client.post(&url).timeout(timeout).send().await {
                tracing::debug!(error = %error, "cron trigger request returned early");
            }
        });

        tracing::debug!(key = %key, "dispatched cron trigger request");
        SpawnDecision::Dispatched { key }
    }
}

impl std::fmt::Debug for CronSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronSpawner")
            .field("disabled", &self.config.disabled)
            .field("alternate", &self.config.alternate)
            .finish_non_exhaustive()
    }
}
