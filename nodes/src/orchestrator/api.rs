//! Orchestrator HTTP Mirror
//!
//! JSON API under `/api` mirroring the command channel, plus UE management and
//! named vBBU activation. Every body is a `{status, data?, message?}` envelope.

use super::Orchestrator;
use crate::NodeError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::types::UeId;
use interfaces::http_control::VbbuAction;
use interfaces::message_types::{ApiResponse, HandoverRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

type ApiReply = (StatusCode, Json<ApiResponse<Value>>);

fn data<T: Serialize>(value: T) -> ApiReply {
    match serde_json::to_value(value) {
        Ok(value) => (StatusCode::OK, Json(ApiResponse::data(value))),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn message(text: impl Into<String>) -> ApiReply {
    (StatusCode::OK, Json(ApiResponse::message(text)))
}

fn failure(status: StatusCode, text: impl Into<String>) -> ApiReply {
    (status, Json(ApiResponse::error(text)))
}

fn node_failure(error: NodeError) -> ApiReply {
    let status = match &error {
        NodeError::UnknownVbbu(_) => StatusCode::NOT_FOUND,
        NodeError::InvalidUeId(_) => StatusCode::BAD_REQUEST,
        NodeError::TargetUnavailable(_) | NodeError::AlreadyInState(_) => StatusCode::CONFLICT,
        NodeError::Interface(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, error.to_string())
}

fn bad_body(rejection: JsonRejection) -> ApiReply {
    failure(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// Build the API router
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ue/add", post(ue_add))
        .route("/api/ue/remove", post(ue_remove))
        .route("/api/ue/list", get(ue_list))
        .route("/api/handover", post(handover))
        .route("/api/migrate", post(migrate))
        .route("/api/vbbu/activate", post(activate))
        .route("/api/vbbu/deactivate", post(deactivate))
        .route("/api/assignments", get(assignments))
        .route("/api/loads", get(loads))
        .route("/api/vbbus", get(vbbus))
        .with_state(orchestrator)
}

/// Serve the API until the listener fails
pub async fn serve(addr: SocketAddr, orchestrator: Arc<Orchestrator>) -> Result<(), NodeError> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP mirror listening on {}", listener.local_addr()?);
    axum::serve(listener, router(orchestrator)).await?;
    Ok(())
}

async fn health() -> ApiReply {
    message("healthy")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UeSelection {
    Ids(Vec<u8>),
    Keyword(String),
}

#[derive(Debug, Deserialize)]
struct UeBatchBody {
    uids: UeSelection,
}

#[derive(Debug, Default, Serialize)]
struct UeBatchResult {
    success: Vec<u8>,
    failed: Vec<u8>,
}

impl UeBatchResult {
    fn collect(results: Vec<super::UeCommandResult>) -> Self {
        let mut batch = Self::default();
        for result in results {
            if result.success {
                batch.success.push(result.ue_id.value());
            } else {
                batch.failed.push(result.ue_id.value());
            }
        }
        batch
    }
}

async fn ue_add(
    State(orch): State<Arc<Orchestrator>>,
    body: Result<Json<UeBatchBody>, JsonRejection>,
) -> ApiReply {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let ids = match body.uids {
        UeSelection::Ids(ids) => ids,
        UeSelection::Keyword(_) => return failure(StatusCode::BAD_REQUEST, "uids must be a list"),
    };
    match orch.resolve_ue_ids(&ids) {
        Ok(ues) => data(UeBatchResult::collect(orch.ue_add(&ues).await)),
        Err(e) => node_failure(e),
    }
}

async fn ue_remove(
    State(orch): State<Arc<Orchestrator>>,
    body: Result<Json<UeBatchBody>, JsonRejection>,
) -> ApiReply {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let ues = match body.uids {
        UeSelection::Keyword(keyword) if keyword.eq_ignore_ascii_case("all") => orch.all_ue_ids(),
        UeSelection::Keyword(_) => {
            return failure(StatusCode::BAD_REQUEST, "uids must be a list or 'all'")
        }
        UeSelection::Ids(ids) => match orch.resolve_ue_ids(&ids) {
            Ok(ues) => ues,
            Err(e) => return node_failure(e),
        },
    };
    data(UeBatchResult::collect(orch.ue_remove(&ues).await))
}

async fn ue_list(State(orch): State<Arc<Orchestrator>>) -> ApiReply {
    data(orch.ue_list())
}

#[derive(Debug, Deserialize)]
struct HandoverBody {
    ue_id: String,
    target_vbbu: String,
}

async fn handover(
    State(orch): State<Arc<Orchestrator>>,
    body: Result<Json<HandoverBody>, JsonRejection>,
) -> ApiReply {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let ue: UeId = match body.ue_id.parse() {
        Ok(ue) => ue,
        Err(_) => return node_failure(NodeError::InvalidUeId(body.ue_id)),
    };
    let target = match orch.vbbu(&body.target_vbbu) {
        Some(target) => target,
        None => return node_failure(NodeError::UnknownVbbu(body.target_vbbu)),
    };

    let current = orch.get_assignments().get(&ue).map(|a| a.endpoint());
    if current == Some(target.endpoint()) {
        return message(format!("UE {} is already served by {}", ue, target.name));
    }

    orch.handover(HandoverRequest::new(ue, target.endpoint())).await;
    message(format!("Handover initiated: {} -> {}", ue, target.name))
}

#[derive(Debug, Deserialize)]
struct MigrateBody {
    source_vbbu: String,
    #[serde(default)]
    deactivate: bool,
}

async fn migrate(
    State(orch): State<Arc<Orchestrator>>,
    body: Result<Json<MigrateBody>, JsonRejection>,
) -> ApiReply {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let source = match orch.vbbu(&body.source_vbbu) {
        Some(source) => source,
        None => return node_failure(NodeError::UnknownVbbu(body.source_vbbu)),
    };

    let report = match orch.migrate(source.endpoint()).await {
        Ok(report) => report,
        Err(e) => return node_failure(e),
    };

    if body.deactivate {
        if let Err(e) = orch.set_activation(&source.name, VbbuAction::Deactivate).await {
            warn!("Deactivating {} after migration failed: {}", source.name, e);
        }
    }

    data(report)
}

#[derive(Debug, Deserialize)]
struct VbbuBody {
    vbbu: String,
}

async fn activate(
    State(orch): State<Arc<Orchestrator>>,
    body: Result<Json<VbbuBody>, JsonRejection>,
) -> ApiReply {
    set_activation(orch, body, VbbuAction::Activate).await
}

async fn deactivate(
    State(orch): State<Arc<Orchestrator>>,
    body: Result<Json<VbbuBody>, JsonRejection>,
) -> ApiReply {
    set_activation(orch, body, VbbuAction::Deactivate).await
}

async fn set_activation(
    orch: Arc<Orchestrator>,
    body: Result<Json<VbbuBody>, JsonRejection>,
    action: VbbuAction,
) -> ApiReply {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let state = if action.target_state() { "active" } else { "inactive" };
    match orch.set_activation(&body.vbbu, action).await {
        Ok(true) => message(format!("{} is now {}", body.vbbu, state)),
        Ok(false) => message(format!("{} is already {}", body.vbbu, state)),
        Err(e) => node_failure(e),
    }
}

async fn assignments(State(orch): State<Arc<Orchestrator>>) -> ApiReply {
    data(orch.get_assignments())
}

async fn loads(State(orch): State<Arc<Orchestrator>>) -> ApiReply {
    data(orch.get_loads())
}

async fn vbbus(State(orch): State<Arc<Orchestrator>>) -> ApiReply {
    data(orch.get_vbbus())
}
