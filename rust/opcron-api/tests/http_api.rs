//! HTTP-level tests over the assembled router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;
use serde_json::json;

use opcron_api::config::{AppConfig, CronConfig};
use opcron_api::cron::lock::CRON_LOCK_KEY;
use opcron_api::cron::CronService;
use opcron_api::server::build_router;
use opcron_api::store::{KeyValueStore, MemoryStore};
use opcron_api::AppState;

struct Harness {
    server: TestServer,
    backend: Arc<MemoryStore>,
    cron: Arc<CronService>,
}

fn harness(cron_config: CronConfig) -> Harness {
    let backend = Arc::new(MemoryStore::new());
    let cron = Arc::new(CronService::new(
        Arc::clone(&backend) as Arc<dyn KeyValueStore>,
        cron_config.clone(),
    ));
    let config = AppConfig {
        cron: cron_config,
        ..AppConfig::default()
    };
    let state = AppState {
        config: Arc::new(config),
        cron: Arc::clone(&cron),
    };
    let server = TestServer::new(build_router(state)).expect("router should build");
    Harness {
        server,
        backend,
        cron,
    }
}

fn counting_hook(cron: &CronService, hook: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    cron.hooks().add_action(hook, move |_args| {
        let count = Arc::clone(&count_clone);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    count
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness(CronConfig::default());
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "ok");
}

#[tokio::test]
async fn trigger_endpoint_fires_due_events_and_clears_the_lock() {
    let h = harness(CronConfig::default());
    let count = counting_hook(&h.cron, "send_digest");

    let due = Utc::now().timestamp() - 5;
    h.cron
        .schedule_single_event(due, "send_digest", vec![json!("weekly")])
        .await
        .unwrap();

    let response = h.server.get("/cron").await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.cron.next_scheduled("send_digest", &[json!("weekly")]).await.unwrap(),
        None
    );
    assert_eq!(h.backend.get(CRON_LOCK_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn trigger_endpoint_with_mismatched_key_does_nothing() {
    let h = harness(CronConfig::default());
    let count = counting_hook(&h.cron, "send_digest");

    let due = Utc::now().timestamp() - 5;
    h.cron
        .schedule_single_event(due, "send_digest", vec![])
        .await
        .unwrap();

    let v1 = format!("{}.000000", Utc::now().timestamp());
    h.backend.set(CRON_LOCK_KEY, &v1).await.unwrap();

    let response = h
        .server
        .get("/cron")
        .add_query_param("doing_cron", "1000000000.000000")
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.cron.next_scheduled("send_digest", &[]).await.unwrap(),
        Some(due)
    );
}

#[tokio::test]
async fn disabled_cron_never_runs() {
    let h = harness(CronConfig {
        disabled: true,
        ..CronConfig::default()
    });
    let count = counting_hook(&h.cron, "send_digest");

    let due = Utc::now().timestamp() - 5;
    h.cron
        .schedule_single_event(due, "send_digest", vec![])
        .await
        .unwrap();

    let response = h.server.get("/cron").await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn schedule_api_round_trips() {
    let h = harness(CronConfig::default());
    let future = Utc::now().timestamp() + 5000;

    let response = h
        .server
        .post("/api/v1/events")
        .json(&json!({
            "hook": "send_digest",
            "timestamp": future,
            "args": ["weekly"],
            "recurrence": "daily",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let response = h
        .server
        .get("/api/v1/events/next")
        .add_query_param("hook", "send_digest")
        .add_query_param("args", r#"["weekly"]"#)
        .await;
    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["timestamp"], json!(future));
    assert_eq!(body["recurrence"], json!("daily"));
}

#[tokio::test]
async fn duplicate_one_shot_is_conflict() {
    let h = harness(CronConfig::default());
    let future = Utc::now().timestamp() + 5000;

    let body = json!({ "hook": "send_digest", "timestamp": future, "args": [] });
    h.server
        .post("/api/v1/events")
        .json(&body)
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = h.server.post("/api/v1/events").json(&body).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(
        response.json::<serde_json::Value>()["error"],
        "duplicate_event"
    );
}

#[tokio::test]
async fn unknown_recurrence_is_bad_request() {
    let h = harness(CronConfig::default());

    let response = h
        .server
        .post("/api/v1/events")
        .json(&json!({
            "hook": "send_digest",
            "timestamp": Utc::now().timestamp() + 5000,
            "recurrence": "fortnightly",
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<serde_json::Value>()["error"],
        "unknown_recurrence"
    );
}

#[tokio::test]
async fn delete_without_timestamp_clears_every_occurrence() {
    let h = harness(CronConfig::default());
    let base = Utc::now().timestamp() + 5000;

    for offset in [0, 1000, 2000] {
        h.cron
            .schedule_single_event(base + offset, "send_digest", vec![])
            .await
            .unwrap();
    }

    let response = h
        .server
        .delete("/api/v1/events")
        .json(&json!({ "hook": "send_digest", "args": [] }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["removed"], json!(3));
    assert_eq!(h.cron.next_scheduled("send_digest", &[]).await.unwrap(), None);
}

#[tokio::test]
async fn schedules_catalog_lists_builtins() {
    let h = harness(CronConfig::default());

    let response = h.server.get("/api/v1/schedules").await;
    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["hourly"]["interval"], json!(3600));
    assert_eq!(body["twicedaily"]["interval"], json!(43200));
    assert_eq!(body["daily"]["interval"], json!(86400));
}

#[tokio::test]
async fn alternate_mode_redirects_and_the_target_runs_the_pass() {
    let h = harness(CronConfig {
        alternate: true,
        ..CronConfig::default()
    });
    let count = counting_hook(&h.cron, "send_digest");

    let due = Utc::now().timestamp() - 5;
    h.cron
        .schedule_single_event(due, "send_digest", vec![])
        .await
        .unwrap();

    let response = h.server.get("/health").await;
    response.assert_status(axum::http::StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("redirect must carry a location")
        .to_string();
    assert!(location.starts_with("/health?doing_cron="));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // The redirect target runs the pass in-process, then serves the page.
    let key = location
        .split("doing_cron=")
        .nth(1)
        .expect("location must carry the key")
        .to_string();
    let response = h
        .server
        .get("/health")
        .add_query_param("doing_cron", &key)
        .await;
    response.assert_status_ok();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.get(CRON_LOCK_KEY).await.unwrap(), None);
}
