//! HTTP contract consumed by the web application.

use super::facade::{BridgeMode, FingerprintService};
use crate::bridge::{BridgeCommand, BridgeResult};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const VERIFY_ACTIONS: [&str; 3] = ["clock-in", "clock-out", "login"];

type AppState = Arc<FingerprintService>;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    #[serde(default, alias = "staffId")]
    pub identity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub action: Option<String>,
    /// Present: 1:1 verify against this identity. Absent: 1:N identify.
    #[serde(default, alias = "staffId")]
    pub identity: Option<String>,
}

/// Build the service router. Every fingerprint route is served both at the
/// root and under `/fingerprint`.
pub fn build_router(service: AppState, cors_origins: &[String]) -> Router {
    let fingerprint = Router::new()
        .route("/device-status", get(device_status))
        .route("/enroll", post(enroll))
        .route("/verify", post(verify))
        .route("/templates", get(list_templates))
        .route("/template/{identity}", delete(delete_template));

    let health = Router::new()
        .route("/status", get(health_status))
        .route("/ping", get(ping));

    Router::new()
        .merge(fingerprint.clone())
        .nest("/fingerprint", fingerprint)
        .nest("/health", health)
        .with_state(service)
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn bad_request(body: Value) -> Response {
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn malformed_body(rejection: JsonRejection) -> Response {
    tracing::warn!("Rejected request body: {}", rejection.body_text());
    bad_request(json!({
        "success": false,
        "error": "INVALID_REQUEST",
        "message": rejection.body_text(),
    }))
}

/// GET /device-status
async fn device_status(State(service): State<AppState>) -> Response {
    let result = service.execute(BridgeCommand::Status).await;
    let simulated = service.mode().await == BridgeMode::Simulated || result.simulation == Some(true);

    let mut body = json!({
        "success": result.success,
        "connected": result.connected.unwrap_or(false),
        "deviceReady": result.device_ready.unwrap_or(false),
        "deviceName": result.device_name.unwrap_or_else(|| "Unknown".into()),
        "message": result.message.unwrap_or_else(|| "Unknown status".into()),
        "simulation": simulated,
        "timestamp": timestamp(),
    });
    if let Some(serial) = result.serial_number {
        body["serialNumber"] = serial.into();
    }
    if let Some(error) = result.error {
        body["error"] = error.into();
    }

    Json(body).into_response()
}

/// POST /enroll
async fn enroll(
    State(service): State<AppState>,
    payload: Result<Json<EnrollRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return malformed_body(rejection),
    };

    let identity = match request.identity.as_deref().map(str::trim) {
        Some(identity) if !identity.is_empty() => identity.to_string(),
        _ => {
            return bad_request(json!({
                "success": false,
                "templateId": null,
                "message": "Enrollment failed: Missing identity",
                "error": "IDENTITY_REQUIRED",
            }))
        }
    };

    tracing::info!("Starting fingerprint enrollment for {}", identity);
    let result = service.execute(BridgeCommand::Enroll { identity }).await;

    if result.success {
        Json(json!({
            "success": true,
            "templateId": result.template_id,
            "message": result.message.unwrap_or_else(|| "Enrolled successfully".into()),
        }))
        .into_response()
    } else {
        bad_request(json!({
            "success": false,
            "templateId": null,
            "message": result.message.unwrap_or_else(|| "Enrollment failed".into()),
            "error": result.error,
        }))
    }
}

/// POST /verify
///
/// A no-match is a 200 with `matched: false`, never an HTTP error.
async fn verify(
    State(service): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return malformed_body(rejection),
    };

    let action = match request.action.as_deref() {
        Some(action) if VERIFY_ACTIONS.contains(&action) => action.to_string(),
        _ => {
            return bad_request(json!({
                "success": false,
                "matched": false,
                "identity": null,
                "message": "Invalid action. Must be \"clock-in\", \"clock-out\", or \"login\"",
                "error": "INVALID_ACTION",
            }))
        }
    };

    let command = match request.identity.as_deref().map(str::trim) {
        Some(identity) if !identity.is_empty() => BridgeCommand::Verify { identity: identity.to_string() },
        _ => BridgeCommand::Identify,
    };
    tracing::info!("Starting fingerprint {} for action: {}", command.name(), action);

    let result = service.execute(command).await;
    Json(verify_body(result, &action)).into_response()
}

fn verify_body(result: BridgeResult, action: &str) -> Value {
    if result.success && result.matched == Some(true) {
        return json!({
            "success": true,
            "matched": true,
            "identity": result.identity.clone(),
            "staffId": result.identity,
            "message": format!("Fingerprint verified successfully for {}", action),
        });
    }

    let mut body = json!({
        "success": true,
        "matched": false,
        "identity": null,
        "staffId": null,
        "message": result.message.unwrap_or_else(|| "No matching fingerprint found".into()),
    });
    if let Some(error) = result.error {
        body["error"] = error.into();
    }
    body
}

/// GET /templates
async fn list_templates(State(service): State<AppState>) -> Response {
    let result = service.execute(BridgeCommand::List).await;
    if !result.success {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "count": 0,
                "templates": [],
                "message": result.message,
                "error": result.error,
            })),
        )
            .into_response();
    }

    let templates = result.templates.unwrap_or_default();
    Json(json!({
        "success": true,
        "count": result.count.unwrap_or(templates.len()),
        "templates": templates,
    }))
    .into_response()
}

/// DELETE /template/{identity}
async fn delete_template(State(service): State<AppState>, Path(identity): Path<String>) -> Response {
    let result = service.execute(BridgeCommand::Delete { identity }).await;
    let status = if result.success { StatusCode::OK } else { StatusCode::BAD_REQUEST };

    (
        status,
        Json(json!({
            "success": result.success,
            "message": result.message.unwrap_or_else(|| "Operation completed".into()),
        })),
    )
        .into_response()
}

/// GET /health/status
async fn health_status(State(service): State<AppState>) -> Response {
    Json(json!({
        "success": true,
        "service": "fpbridge",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "mode": service.mode().await,
        "timestamp": timestamp(),
    }))
    .into_response()
}

/// GET /health/ping
async fn ping() -> Response {
    Json(json!({
        "success": true,
        "message": "pong",
        "timestamp": timestamp(),
    }))
    .into_response()
}
