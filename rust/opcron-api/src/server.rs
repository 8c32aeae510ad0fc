//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api;
use crate::config::AppConfig;
use crate::cron::spawn::DOING_CRON_PARAM;
use crate::cron::{CronService, RequestContext, SpawnDecision};
use crate::logging::OpTimer;
use crate::store::{KeyValueStore, MemoryStore, RedisStore};
use crate::{log_init_step, log_init_warning, AppState};

/// Create the application with all routes and middleware.
pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let overall_timer = OpTimer::new("server", "create_app");

    // [1/3] Key-value store
    let step_timer = OpTimer::new("server", "store");
    let backend: Arc<dyn KeyValueStore> = if let Some(ref redis_url) = config.redis.url {
        match RedisStore::connect(redis_url).await {
            Ok(store) => {
                log_init_step!(1, 3, "Key-Value Store", format!("Redis at {redis_url}"));
                Arc::new(store)
            }
            Err(error) => {
                log_init_warning!("Failed to connect to Redis: {}. Using in-memory store.", error);
                log_init_step!(1, 3, "Key-Value Store", "In-memory fallback");
                Arc::new(MemoryStore::new())
            }
        }
    } else {
        log_init_step!(1, 3, "Key-Value Store", "In-memory (Redis not configured)");
        Arc::new(MemoryStore::new())
    };
    step_timer.finish();

    // [2/3] Cron service
    let step_timer = OpTimer::new("server", "cron");
    let cron = Arc::new(CronService::new(backend, config.cron.clone()));
    let catalog = cron.schedules();
    log_init_step!(
        2,
        3,
        "Cron Service",
        format!(
            "{} recurrences, lock timeout {}s{}",
            catalog.len(),
            config.cron.lock_timeout_secs,
            if config.cron.disabled { ", DISABLED" } else { "" }
        )
    );
    step_timer.finish();

    // [3/3] Router and middleware
    let step_timer = OpTimer::new("server", "router");
    let state = AppState {
        config: Arc::new(config),
        cron,
    };
    let app = build_router(state);
    log_init_step!(3, 3, "Router", "trigger endpoint at /cron");
    step_timer.finish();

    overall_timer.finish();
    Ok(app)
}

/// Assemble the router over prepared application state.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.timeout_secs);

    Router::new()
        .merge(api::health::router())
        .merge(api::cron::router())
        .merge(api::events::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cron_spawn_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state)
}

fn resume_key(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == DOING_CRON_PARAM).then(|| value.to_string())
    })
}

/// Per-request cron trigger check.
///
/// Every request that is not itself a cron invocation asks the spawner
/// whether due work should be kicked off. In alternate mode a request
/// carrying a `doing_cron` key is a redirect target: it performs the
/// runner pass in-process before being served normally.
pub async fn cron_spawn_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let key = resume_key(&query);
    let is_trigger_endpoint = path == "/cron";

    if state.config.cron.alternate
        && !is_trigger_endpoint
        && !state.config.cron.disabled
        && let Some(key) = key.as_deref()
    {
        if let Err(error) = state.cron.runner().run_pass(Some(key)).await {
            tracing::error!(error = %error, "cron pass failed");
        }
        return next.run(req).await;
    }

    let ctx = RequestContext {
        is_get: req.method() == Method::GET,
        doing_cron: is_trigger_endpoint || key.is_some(),
        uri: if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        },
    };

    match state.cron.spawner().maybe_spawn(&ctx).await {
        SpawnDecision::Redirect { location, .. } => Redirect::temporary(&location).into_response(),
        SpawnDecision::Dispatched { .. } | SpawnDecision::Skip => next.run(req).await,
    }
}
