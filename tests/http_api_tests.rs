// HTTP control surface tests
//
// Requests go straight through the router with `oneshot`, backed by the
// in-process gateway.

#[macro_use]
mod common;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::Harness;
use std::sync::Arc;
use tower::ServiceExt;
use voice_warden::{create_router, AppState, GroupId, ParticipantId};

fn router(harness: &Harness) -> Router {
    create_router(AppState::new(
        harness.sessions.clone(),
        harness.thresholds.clone() as Arc<dyn voice_warden::ThresholdStore>,
    ))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Result<(StatusCode, serde_json::Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json)?)
        }
        None => Body::empty(),
    };

    let response = router.clone().oneshot(builder.body(body)?).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    Ok((status, json))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let harness = Harness::new();
    let response = router(&harness)
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], b"OK");

    Ok(())
}

#[tokio::test]
async fn test_monitoring_lifecycle() -> Result<()> {
    let harness = Harness::new();
    let app = router(&harness);
    let start = serde_json::json!({ "channel_id": "lounge" });

    let (status, body) = send(&app, Method::POST, "/groups/g1/monitoring", Some(start.clone())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "monitoring");
    assert_eq!(body["stats"]["channel_id"], "lounge");

    let (status, body) = send(&app, Method::POST, "/groups/g1/monitoring", Some(start)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap_or_default().contains("g1"));

    harness
        .gateway
        .speak(&GroupId::from("g1"), &ParticipantId::from("alice"))
        .await;
    assert!(eventually!({
        let (_, body) = send(&app, Method::GET, "/groups/g1/monitoring", None).await?;
        body["live_participants"] == serde_json::json!(["alice"])
    }));

    let (status, body) = send(&app, Method::DELETE, "/groups/g1/monitoring", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["stats"]["live_participants"], serde_json::json!(["alice"]));

    let (status, _) = send(&app, Method::GET, "/groups/g1/monitoring", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_stop_without_session_is_not_found() -> Result<()> {
    let harness = Harness::new();
    let (status, body) = send(&router(&harness), Method::DELETE, "/groups/nobody/monitoring", None).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_refused_join_is_bad_gateway() -> Result<()> {
    let harness = Harness::new();
    harness.gateway.refuse_joins(true);

    let (status, _) = send(
        &router(&harness),
        Method::POST,
        "/groups/g1/monitoring",
        Some(serde_json::json!({ "channel_id": "lounge" })),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(harness.sessions.groups().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_threshold_endpoints() -> Result<()> {
    let harness = Harness::new();
    let app = router(&harness);

    let (status, body) = send(&app, Method::GET, "/groups/g1/threshold", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decibel_threshold"], 70);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/groups/g1/threshold",
        Some(serde_json::json!({ "value": 55 })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decibel_threshold"], 55);

    for value in [-5, 151] {
        let (status, _) = send(
            &app,
            Method::PUT,
            "/groups/g1/threshold",
            Some(serde_json::json!({ "value": value })),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "value {}", value);
    }

    // Non-integers and integers beyond i64 get the same JSON 400
    for value in [
        serde_json::json!(70.5),
        serde_json::json!(1e30),
        serde_json::json!(u64::MAX),
    ] {
        let (status, body) = send(
            &app,
            Method::PUT,
            "/groups/g1/threshold",
            Some(serde_json::json!({ "value": value })),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "value {}", value);
        assert!(body["error"].as_str().unwrap_or_default().contains("outside the allowed range"));
    }

    let (_, body) = send(&app, Method::GET, "/groups/g1/threshold", None).await?;
    assert_eq!(body["decibel_threshold"], 55);

    // Other groups keep the default
    let (_, body) = send(&app, Method::GET, "/groups/g2/threshold", None).await?;
    assert_eq!(body["decibel_threshold"], 70);

    Ok(())
}
