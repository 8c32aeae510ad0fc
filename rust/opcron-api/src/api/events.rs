//! Schedule management endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cron::{CronError, ScheduleError};
use crate::AppState;

/// Event management routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/events", post(schedule_event))
        .route("/api/v1/events", delete(unschedule_event))
        .route("/api/v1/events/next", get(next_scheduled))
        .route("/api/v1/schedules", get(list_schedules))
}

fn error_response(error: &CronError) -> (StatusCode, Json<Value>) {
    let status = match error {
        CronError::Schedule(ScheduleError::Duplicate(_)) => StatusCode::CONFLICT,
        CronError::Schedule(ScheduleError::Vetoed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        CronError::Schedule(_) => StatusCode::BAD_REQUEST,
        CronError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let kind = match error {
        CronError::Schedule(ScheduleError::Duplicate(_)) => "duplicate_event",
        CronError::Schedule(ScheduleError::InvalidTimestamp(_)) => "invalid_timestamp",
        CronError::Schedule(ScheduleError::UnknownRecurrence(_)) => "unknown_recurrence",
        CronError::Schedule(ScheduleError::Vetoed(_)) => "event_vetoed",
        CronError::Schedule(ScheduleError::NoInterval(_)) => "no_interval",
        CronError::Store(_) => "store_error",
    };
    (
        status,
        Json(serde_json::json!({
            "error": kind,
            "message": error.to_string(),
        })),
    )
}

/// Schedule request body.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Hook to fire.
    pub hook: String,
    /// Unix timestamp (UTC seconds) the event is due at.
    pub timestamp: i64,
    /// Arguments passed to the hook's callbacks.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Recurrence name; omitted for one-shot events.
    #[serde(default)]
    pub recurrence: Option<String>,
}

/// Scheduled event response.
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub hook: String,
    pub timestamp: i64,
    pub recurrence: Option<String>,
}

/// Schedule a one-shot or recurring event.
pub async fn schedule_event(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> impl IntoResponse {
    let result = match &req.recurrence {
        Some(recurrence) => {
            state
                .cron
                .schedule_event(req.timestamp, recurrence, &req.hook, req.args.clone())
                .await
        }
        None => {
            state
                .cron
                .schedule_single_event(req.timestamp, &req.hook, req.args.clone())
                .await
        }
    };

    match result {
        Ok(()) => {
            let response = ScheduleResponse {
                hook: req.hook,
                timestamp: req.timestamp,
                recurrence: req.recurrence,
            };
            (StatusCode::CREATED, Json(serde_json::to_value(response).unwrap_or_default()))
        }
        Err(error) => error_response(&error),
    }
}

/// Unschedule request body.
#[derive(Debug, Deserialize)]
pub struct UnscheduleRequest {
    /// Hook the event fires.
    pub hook: String,
    /// Timestamp of the occurrence to remove; when omitted, every
    /// occurrence of hook+args is removed.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Arguments identifying the event.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Remove one occurrence, or all occurrences of hook+args.
pub async fn unschedule_event(
    State(state): State<AppState>,
    Json(req): Json<UnscheduleRequest>,
) -> impl IntoResponse {
    let result = match req.timestamp {
        Some(timestamp) => state
            .cron
            .unschedule_event(timestamp, &req.hook, &req.args)
            .await
            .map(usize::from),
        None => state.cron.clear_scheduled_hook(&req.hook, &req.args).await,
    };

    match result {
        Ok(removed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "removed": removed })),
        ),
        Err(error) => error_response(&error),
    }
}

/// Query parameters for the next-scheduled lookup.
#[derive(Debug, Deserialize)]
pub struct NextScheduledParams {
    /// Hook to look up.
    pub hook: String,
    /// Arguments as a JSON array string; defaults to no arguments.
    #[serde(default)]
    pub args: Option<String>,
}

/// The next timestamp at which hook+args will run.
pub async fn next_scheduled(
    State(state): State<AppState>,
    Query(params): Query<NextScheduledParams>,
) -> impl IntoResponse {
    let args: Vec<Value> = match params.args.as_deref() {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(args) => args,
            Err(error) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "invalid_args",
                        "message": format!("args must be a JSON array: {error}"),
                    })),
                );
            }
        },
        None => Vec::new(),
    };

    match state.cron.next_scheduled(&params.hook, &args).await {
        Ok(Some(timestamp)) => {
            let recurrence = state
                .cron
                .get_schedule(&params.hook, &args)
                .await
                .unwrap_or_default();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "hook": params.hook,
                    "timestamp": timestamp,
                    "recurrence": recurrence,
                })),
            )
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_found",
                "message": format!("no scheduled event for hook {}", params.hook),
            })),
        ),
        Err(error) => error_response(&error),
    }
}

/// The recurrence catalog.
pub async fn list_schedules(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cron.schedules())
}
