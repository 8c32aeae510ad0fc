//! The out-of-band cron trigger endpoint.
//!
//! The spawner dispatches a fire-and-forget request here with the
//! freshly minted lock key in the `doing_cron` query parameter. The
//! handler performs one runner pass and always ends the response
//! immediately with no body, whatever the pass did.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};

use crate::cron::spawn::DOING_CRON_PARAM;
use crate::AppState;

/// Create the trigger router.
pub fn router() -> Router<AppState> {
    Router::new().route("/cron", get(run_cron).post(run_cron))
}

/// Perform one runner pass.
async fn run_cron(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    let key = params.get(DOING_CRON_PARAM).map(String::as_str);

    if state.config.cron.disabled {
        return StatusCode::NO_CONTENT;
    }

    match state.cron.runner().run_pass(key).await {
        Ok(report) => {
            if report.fired > 0 {
                tracing::info!(
                    fired = report.fired,
                    rescheduled = report.rescheduled,
                    lock_lost = report.lock_lost,
                    "cron pass completed"
                );
            }
        }
        Err(error) => {
            tracing::error!(error = %error, "cron pass failed");
        }
    }

    StatusCode::NO_CONTENT
}
