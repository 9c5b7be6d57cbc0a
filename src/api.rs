// src/api.rs
//! Trigger surface: a small router the scheduler (or an operator) POSTs to,
//! plus the Discord interactions endpoint for the PING handshake.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use shuttle_axum::axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::BotConfig;
use crate::pipeline;
use crate::secrets::{field, SecretStore};
use crate::store::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BotConfig>,
    pub secrets: Arc<dyn SecretStore>,
    pub store: Arc<dyn BlobStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/trigger", post(trigger))
        .route("/interactions", post(interactions))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct TriggerReq {
    task: String,
}

#[derive(serde::Serialize)]
struct TriggerResp {
    status: String,
    summary: String,
}

/// Entry point for the scheduled trigger. The only task today is
/// `news_post`; unknown discriminators are rejected.
async fn trigger(
    State(state): State<AppState>,
    Json(body): Json<TriggerReq>,
) -> (StatusCode, Json<TriggerResp>) {
    if body.task != "news_post" {
        return (
            StatusCode::BAD_REQUEST,
            Json(TriggerResp {
                status: "error".into(),
                summary: format!("unknown task: {}", body.task),
            }),
        );
    }

    match pipeline::run_news_post(&state.config, Arc::clone(&state.secrets), &*state.store).await
    {
        Ok(report) => (
            StatusCode::OK,
            Json(TriggerResp {
                status: "ok".into(),
                summary: report.summary(),
            }),
        ),
        Err(e) => {
            tracing::error!(error = ?e, "news post run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriggerResp {
                    status: "error".into(),
                    summary: format!("{e:#}"),
                }),
            )
        }
    }
}

/// Keyed-digest request check. Verification internals are a boundary
/// concern; everything past this function only cares about pass/fail.
pub fn signature_ok(public_key: &str, timestamp: &str, body: &str, signature: &str) -> bool {
    let digest = Sha256::digest(format!("{public_key}{timestamp}{body}").as_bytes());
    let expected: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    expected.eq_ignore_ascii_case(signature.trim())
}

/// Discord interactions endpoint. Only the PING handshake (type 1) is
/// handled; everything else is an unknown interaction.
async fn interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<serde_json::Value>) {
    let public_key = state
        .secrets
        .get_secret(&state.config.discord_secret_id)
        .ok()
        .and_then(|map| field(&map, "publicKey"));
    let Some(public_key) = public_key else {
        tracing::warn!("no public key configured, rejecting interaction");
        return unauthorized();
    };

    let signature = header_str(&headers, "x-signature-ed25519");
    let timestamp = header_str(&headers, "x-signature-timestamp");
    if !signature_ok(&public_key, &timestamp, &body, &signature) {
        tracing::warn!("interaction signature verification failed");
        return unauthorized();
    }

    let interaction: serde_json::Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return bad_request("malformed interaction body"),
    };
    match interaction.get("type").and_then(|t| t.as_u64()) {
        // PING → PONG acknowledgment.
        Some(1) => (StatusCode::OK, Json(serde_json::json!({ "type": 1 }))),
        _ => bad_request("unknown interaction type"),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "invalid request signature" })),
    )
}

fn bad_request(msg: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": msg })),
    )
}
