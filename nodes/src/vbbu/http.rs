//! vBBU HTTP surface: `/control` and the UE data path

use super::VbbuAgent;
use crate::NodeError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::types::ActivationState;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;

pub fn router(agent: Arc<VbbuAgent>) -> Router {
    Router::new()
        .route("/control", get(control))
        .route("/", get(serve))
        .with_state(agent)
}

fn flag_set(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key).is_some_and(|v| v == "1")
}

async fn control(
    State(agent): State<Arc<VbbuAgent>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if flag_set(&params, "deactivate") {
        agent.set_state(ActivationState::Inactive);
        Json(json!({"status": "deactivated"})).into_response()
    } else if flag_set(&params, "activate") {
        agent.set_state(ActivationState::Active);
        Json(json!({"status": "activated"})).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unknown control command"})),
        )
            .into_response()
    }
}

fn numeric<T: FromStr + Default>(params: &HashMap<String, String>, key: &str) -> Result<T, String> {
    match params.get(key) {
        None => Ok(T::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("{} must be numeric, got {:?}", key, raw)),
    }
}

async fn serve(
    State(agent): State<Arc<VbbuAgent>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !agent.state().is_active() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let parsed = numeric::<u32>(&params, "ue_id")
        .and_then(|ue_id| numeric::<u64>(&params, "value").map(|value| (ue_id, value)));
    let (ue_id, value) = match parsed {
        Ok(pair) => pair,
        Err(reason) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": reason}))).into_response()
        }
    };

    match agent.serve(ue_id, value, Instant::now()) {
        Ok(acknowledgement) => Json(json!({
            "vbbu_id": agent.name(),
            "acknowledgement": acknowledgement,
        }))
        .into_response(),
        Err(NodeError::ServiceInactive) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
