//! Hook and filter registry.
//!
//! Callbacks are registered against hook names and invoked in
//! registration order when an event fires. Two filter points exist:
//! event filters, which may rewrite or veto an event before it is
//! persisted, and catalog filters, which extend the recurrence catalog.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use super::event::CronEvent;
use super::schedules::Recurrence;

/// Callback invoked with the event's arguments when its hook fires.
pub type HookCallback = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Transform applied to an event before persistence; `None` vetoes it.
pub type EventFilter = Arc<dyn Fn(CronEvent) -> Option<CronEvent> + Send + Sync>;

/// Transform applied when assembling the recurrence catalog.
pub type CatalogFilter =
    Arc<dyn Fn(BTreeMap<String, Recurrence>) -> BTreeMap<String, Recurrence> + Send + Sync>;

/// Registry of hook callbacks and filter chains.
#[derive(Default)]
pub struct HookRegistry {
    actions: RwLock<HashMap<String, Vec<HookCallback>>>,
    event_filters: RwLock<Vec<EventFilter>>,
    catalog_filters: RwLock<Vec<CatalogFilter>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `hook`. Callbacks run in registration order.
    pub fn add_action<F, Fut>(&self, hook: impl Into<String>, callback: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: HookCallback = Arc::new(move |args| Box::pin(callback(args)));
        self.actions
            .write()
            .entry(hook.into())
            .or_default()
            .push(callback);
    }

    /// Fire `hook`, invoking every registered callback with `args`.
    ///
    /// Each callback is isolated: a failure is logged and the remaining
    /// callbacks still run. Returns the number of callbacks invoked.
    pub async fn do_action(&self, hook: &str, args: &[Value]) -> usize {
        let callbacks: Vec<HookCallback> = self
            .actions
            .read()
            .get(hook)
            .map(|list| list.iter().map(Arc::clone).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            if let Err(error) = callback(args.to_vec()).await {
                tracing::error!(hook = %hook, error = %error, "hook callback failed");
            }
        }
        callbacks.len()
    }

    /// Register an event filter. Filters run in registration order.
    pub fn add_event_filter<F>(&self, filter: F)
    where
        F: Fn(CronEvent) -> Option<CronEvent> + Send + Sync + 'static,
    {
        self.event_filters.write().push(Arc::new(filter));
    }

    /// Run the event filter chain. A `None` from any filter
    /// short-circuits and vetoes the event.
    #[must_use]
    pub fn apply_event_filters(&self, event: CronEvent) -> Option<CronEvent> {
        let filters: Vec<EventFilter> = self
            .event_filters
            .read()
            .iter()
            .map(Arc::clone)
            .collect();

        let mut current = event;
        for filter in &filters {
            current = filter(current)?;
        }
        Some(current)
    }

    /// Register a recurrence catalog filter.
    pub fn add_catalog_filter<F>(&self, filter: F)
    where
        F: Fn(BTreeMap<String, Recurrence>) -> BTreeMap<String, Recurrence> + Send + Sync + 'static,
    {
        self.catalog_filters.write().push(Arc::new(filter));
    }

    /// Run the catalog filter chain over `catalog`.
    #[must_use]
    pub fn apply_catalog_filters(
        &self,
        catalog: BTreeMap<String, Recurrence>,
    ) -> BTreeMap<String, Recurrence> {
        let filters: Vec<CatalogFilter> = self
            .catalog_filters
            .read()
            .iter()
            .map(Arc::clone)
            .collect();

        let mut current = catalog;
        for filter in &filters {
            current = filter(current);
        }
        current
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.actions.read().len())
            .field("event_filters", &self.event_filters.read().len())
            .field("catalog_filters", &self.catalog_filters.read().len())
            .finish()
    }
}
