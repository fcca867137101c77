//! HTTP surface tests for the stage-status endpoint.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{reconciler, FakePagerDuty};
use pagerduty_notify::server::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn stage_status(pipeline: &str, counter: &str, state: &str, result: &str) -> Value {
    json!({
        "pipeline": {
            "name": pipeline,
            "counter": counter,
            "group": "production",
            "build-cause": [],
            "stage": {
                "name": "integration",
                "counter": "1",
                "approval-type": "success",
                "approved-by": "changes",
                "state": state,
                "result": result,
                "create-time": "2016-06-17T19:09:03.402Z",
                "last-transition-time": "2016-06-17T19:12:11.000Z",
                "jobs": [
                    { "name": "smoke", "state": "Completed", "result": result }
                ]
            }
        }
    })
}

async fn post(app: &Router, body: String) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stage-status")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> Value {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_failure_then_pass_over_http() {
    let fake = Arc::new(FakePagerDuty::default());
    let app = build_router(Arc::new(reconciler(&fake)));

    let failure = stage_status("deploy-api", "42", "Failed", "Failed");
    let (status, body) = post(&app, failure.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success" }));
    assert_eq!(fake.open_calls(), 1);

    let incidents = get(&app, "/incidents").await;
    assert_eq!(incidents["count"], 1);
    assert_eq!(incidents["incidents"]["deploy-api-integration"], "id1");

    let pass = stage_status("deploy-api", "43", "Passed", "Passed");
    let (status, _) = post(&app, pass.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fake.resolve_calls(), 1);

    let incidents = get(&app, "/incidents").await;
    assert_eq!(incidents["count"], 0);
}

#[tokio::test]
async fn test_malformed_body_is_a_failure() {
    let fake = Arc::new(FakePagerDuty::default());
    let app = build_router(Arc::new(reconciler(&fake)));

    let (status, body) = post(&app, "{\"pipeline\": 12}".to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(fake.open_calls(), 0);
}

#[tokio::test]
async fn test_unknown_incident_on_resolve_is_a_failure() {
    let fake = Arc::new(FakePagerDuty::default());
    let reconciler = Arc::new(reconciler(&fake));
    reconciler
        .incidents()
        .lock()
        .await
        .insert("deploy-api-integration".to_string(), "stale".to_string());
    let app = build_router(reconciler.clone());

    let pass = stage_status("deploy-api", "43", "Passed", "Passed");
    let (status, body) = post(&app, pass.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "failure");
    assert!(body["messages"][0].as_str().unwrap().contains("stale"));
    // Still tracked: nothing is removed when the channel call fails
    assert_eq!(
        reconciler.incidents().get("deploy-api-integration").await.as_deref(),
        Some("stale")
    );
}

#[tokio::test]
async fn test_delete_incidents_forgets_tracking() {
    let fake = Arc::new(FakePagerDuty::default());
    let app = build_router(Arc::new(reconciler(&fake)));

    let failure = stage_status("deploy-api", "42", "Failed", "Failed");
    post(&app, failure.to_string()).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/incidents")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "cleared": 1 }));
    assert_eq!(get(&app, "/incidents").await["count"], 0);

    // A later pass has nothing to resolve
    let pass = stage_status("deploy-api", "43", "Passed", "Passed");
    let (status, _) = post(&app, pass.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fake.resolve_calls(), 0);
}

#[tokio::test]
async fn test_health() {
    let fake = Arc::new(FakePagerDuty::default());
    let app = build_router(Arc::new(reconciler(&fake)));

    let health = get(&app, "/health").await;

    assert_eq!(health["status"], "healthy");
    assert_eq!(health["channel"], "fake");
}
