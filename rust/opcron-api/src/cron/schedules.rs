//! Named recurrence intervals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::hooks::HookRegistry;

/// Seconds in one hour.
pub const HOUR_IN_SECONDS: i64 = 3600;
/// Seconds in one day.
pub const DAY_IN_SECONDS: i64 = 86_400;

/// A named repeating interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Interval between occurrences, in seconds.
    pub interval: i64,
    /// Human-readable label.
    pub display: String,
}

impl Recurrence {
    fn new(interval: i64, display: &str) -> Self {
        Self {
            interval,
            display: display.to_string(),
        }
    }
}

/// The built-in recurrence definitions.
#[must_use]
pub fn builtin_schedules() -> BTreeMap<String, Recurrence> {
    BTreeMap::from([
        (
            "hourly".to_string(),
            Recurrence::new(HOUR_IN_SECONDS, "Once Hourly"),
        ),
        (
            "twicedaily".to_string(),
            Recurrence::new(12 * HOUR_IN_SECONDS, "Twice Daily"),
        ),
        (
            "daily".to_string(),
            Recurrence::new(DAY_IN_SECONDS, "Once Daily"),
        ),
    ])
}

/// The effective recurrence catalog: registered catalog filters run over
/// an empty map, then the built-ins are merged on top so an extension can
/// never shadow `hourly`, `twicedaily`, or `daily`.
#[must_use]
pub fn schedules(hooks: &HookRegistry) -> BTreeMap<String, Recurrence> {
    let mut catalog = hooks.apply_catalog_filters(BTreeMap::new());
    catalog.extend(builtin_schedules());
    catalog
}
