//! HTTP routes: relay ingest and the station command channel

use crate::commands::CommandQueue;
use crate::error::{BackendError, BackendResult};
use crate::store::{StationStore, UNKNOWN};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use evfleet_types::{StationCommand, StationStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StationStore>,
    pub commands: Arc<CommandQueue>,
}

impl AppState {
    pub fn new(store: Arc<dyn StationStore>) -> Self {
        Self {
            store,
            commands: Arc::new(CommandQueue::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bootnotification", post(boot_notification))
        .route("/heartbeat", post(heartbeat))
        .route("/statusnotification", post(status_notification))
        .route("/api/send_command/:cp_id", post(send_command))
        .route("/next_command/:cp_id", get(next_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cp_id(body: &Value) -> BackendResult<&str> {
    body.get("cpId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BackendError::validation("cpId missing"))
}

fn text_field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn boot_notification(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> BackendResult<impl IntoResponse> {
    let cp_id = cp_id(&body)?;
    let vendor = text_field(&body, "chargePointVendor").unwrap_or(UNKNOWN);
    let model = text_field(&body, "chargePointModel").unwrap_or(UNKNOWN);

    state
        .store
        .record_boot(cp_id, vendor, model, Utc::now())
        .await?;
    info!("BootNotification stored for {} ({} {})", cp_id, vendor, model);
    Ok(Json(json!({ "status": "BootNotification stored" })))
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> BackendResult<impl IntoResponse> {
    let cp_id = cp_id(&body)?;
    if !state.store.record_heartbeat(cp_id, Utc::now()).await? {
        info!("Heartbeat from unregistered station {}", cp_id);
    }
    Ok(Json(json!({ "status": "heartbeat received", "cpId": cp_id })))
}

async fn status_notification(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> BackendResult<impl IntoResponse> {
    let cp_id = cp_id(&body)?;
    let status = text_field(&body, "status")
        .map(StationStatus::parse)
        .unwrap_or(StationStatus::Unknown);

    let record = state.store.record_status(cp_id, status, Utc::now()).await?;
    info!("{} -> {} (busy={})", cp_id, record.status, record.busy);
    Ok(Json(json!({ "status": "StatusNotification stored" })))
}

async fn send_command(
    State(state): State<AppState>,
    Path(cp_id): Path<String>,
    Json(body): Json<Value>,
) -> BackendResult<impl IntoResponse> {
    let raw = text_field(&body, "command").unwrap_or_default();
    let command = StationCommand::parse(raw)
        .ok_or_else(|| BackendError::validation(format!("unknown command {:?}", raw)))?;

    let queued = state.commands.push(&cp_id, command);
    let target = command.target_status();
    info!("{} -> {} -> {} (queued={})", cp_id, command, target, queued);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "ok",
            "command": command.as_str(),
            "new_status": target.as_str(),
            "busy": target.is_busy(),
            "queued": queued
        })),
    ))
}

async fn next_command(
    State(state): State<AppState>,
    Path(cp_id): Path<String>,
) -> impl IntoResponse {
    let command = state.commands.pop(&cp_id);
    Json(json!({ "command": command.map(|c| c.as_str()) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        let state = AppState::new(Arc::new(MemoryStore::new()));
        (router(state.clone()), state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_boot_then_status_updates_station() {
        let (app, state) = app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/bootnotification",
                json!({"cpId": "EVC_1", "chargePointVendor": "MyVendor", "chargePointModel": null}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                "/statusnotification",
                json!({"cpId": "EVC_1", "connectorId": 0, "status": "Charging"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = state.store.station("EVC_1").await.unwrap().unwrap();
        assert_eq!(record.vendor, "MyVendor");
        assert_eq!(record.model, UNKNOWN);
        assert_eq!(record.status, StationStatus::Charging);
        assert!(record.busy);
    }

    #[tokio::test]
    async fn test_missing_cp_id_is_rejected() {
        let (app, _) = app();
        let response = app
            .oneshot(post_json("/heartbeat", json!({"currentTime": null})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "cpId missing"}));
    }

    #[tokio::test]
    async fn test_heartbeat_stamps_known_station() {
        let (app, state) = app();
        state
            .store
            .record_boot("EVC_1", "V", "M", Utc::now())
            .await
            .unwrap();

        let response = app
            .oneshot(post_json("/heartbeat", json!({"cpId": "EVC_1", "currentTime": null})))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({"status": "heartbeat received", "cpId": "EVC_1"})
        );
        let record = state.store.station("EVC_1").await.unwrap().unwrap();
        assert!(record.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let (app, _) = app();

        let response = app
            .clone()
            .oneshot(post_json("/api/send_command/EVC_1", json!({"command": "start"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["new_status"], "Charging");
        assert_eq!(body["busy"], true);

        let response = app
            .clone()
            .oneshot(post_json("/api/send_command/EVC_1", json!({"command": "reboot"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let next = || {
            Request::get("/next_command/EVC_1")
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(next()).await.unwrap();
        assert_eq!(body_json(response).await, json!({"command": "start"}));
        let response = app.oneshot(next()).await.unwrap();
        assert_eq!(body_json(response).await, json!({"command": null}));
    }
}
