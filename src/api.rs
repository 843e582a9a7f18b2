//! REST API Server for the hybrid memory manager
//!
//! Exposes per-session memory operations and chat over HTTP

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::MemoryError;
use crate::memory::SessionSnapshot;
use crate::models::{Role, SessionId};
use crate::sessions::SessionRegistry;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnRequest {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn failure(error: MemoryError) -> ApiResult {
    let status = match &error {
        MemoryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        e if e.is_transport() => StatusCode::BAD_GATEWAY,
        MemoryError::SummarizationFailed(_)
        | MemoryError::AnswerGenerationFailed(_)
        | MemoryError::EmbeddingFailed(_)
        | MemoryError::IndexFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Request failed ({}): {}", status, error);
    (status, Json(ApiResponse::error(error.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn record_turn(
    State(state): State<ApiState>,
    Path(session_key): Path<String>,
    Json(req): Json<TurnRequest>,
) -> ApiResult {
    let session_id = SessionId::from_key(&session_key);

    let role: Role = match req.role.parse() {
        Ok(role) => role,
        Err(e) => return failure(e),
    };

    match state.registry.record_turn(session_id, role, &req.content).await {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(outcome))),
        Err(e) => failure(e),
    }
}

async fn compose_context(
    State(state): State<ApiState>,
    Path(session_key): Path<String>,
    Json(req): Json<ContextRequest>,
) -> ApiResult {
    let session_id = SessionId::from_key(&session_key);
    let context = state.registry.compose_context(session_id, &req.query).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "session_id": session_id,
            "context": context,
        }))),
    )
}

async fn chat(
    State(state): State<ApiState>,
    Path(session_key): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiResult {
    let session_id = SessionId::from_key(&session_key);

    if req.message.trim().is_empty() {
        return failure(MemoryError::InvalidInput("Message must not be empty".into()));
    }

    info!(session = %session_id, "Chat request received");

    match state.registry.respond(session_id, &req.message).await {
        Ok(reply) => (StatusCode::OK, Json(ApiResponse::success(reply))),
        Err(e) => failure(e),
    }
}

async fn get_snapshot(
    State(state): State<ApiState>,
    Path(session_key): Path<String>,
) -> ApiResult {
    let snapshot = state
        .registry
        .snapshot(SessionId::from_key(&session_key))
        .await;
    (StatusCode::OK, Json(ApiResponse::success(snapshot)))
}

async fn put_snapshot(
    State(state): State<ApiState>,
    Path(session_key): Path<String>,
    Json(snapshot): Json<SessionSnapshot>,
) -> ApiResult {
    let session_id = SessionId::from_key(&session_key);
    if snapshot.session_id != session_id {
        return failure(MemoryError::InvalidInput(format!(
            "Snapshot belongs to session {}, not {}",
            snapshot.session_id, session_id
        )));
    }

    match state.registry.restore(snapshot).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "restored": session_id }))),
        ),
        Err(e) => failure(e),
    }
}

async fn close_session(
    State(state): State<ApiState>,
    Path(session_key): Path<String>,
) -> ApiResult {
    let session_id = SessionId::from_key(&session_key);

    if state.registry.close(session_id).await {
        (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "closed": session_id }))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Session {} is not open", session_id))),
        )
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(registry: Arc<SessionRegistry>) -> Router {
    let state = ApiState { registry };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions/:session_id", delete(close_session))
        .route("/api/sessions/:session_id/turns", post(record_turn))
        .route("/api/sessions/:session_id/context", post(compose_context))
        .route("/api/sessions/:session_id/chat", post(chat))
        .route(
            "/api/sessions/:session_id/snapshot",
            get(get_snapshot).put(put_snapshot),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    registry: Arc<SessionRegistry>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(registry);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::memory::InMemoryVectorBackend;
    use crate::sessions::MemoryFactory;
    use crate::testing::{KeywordEmbedder, ScriptedCompletion};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn registry() -> Arc<SessionRegistry> {
        let factory = MemoryFactory::new(
            MemoryConfig::default(),
            Arc::new(ScriptedCompletion::new("Blue, as you said.")),
            Arc::new(KeywordEmbedder::new()),
            Arc::new(InMemoryVectorBackend::new()),
        );
        Arc::new(SessionRegistry::new(factory))
    }

    fn router() -> Router {
        create_router(registry())
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, ApiResponse) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_record_then_compose() {
        let router = router();

        let (status, response) = send(
            &router,
            "POST",
            "/api/sessions/demo/turns",
            serde_json::json!({"role": "user", "content": "My favorite color is blue"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.data.unwrap()["facts_extracted"], 1);

        let (status, response) = send(
            &router,
            "POST",
            "/api/sessions/demo/context",
            serde_json::json!({"query": "favorite color"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let context = response.data.unwrap()["context"].as_str().unwrap().to_string();
        assert!(context.contains("favorite_color: blue"));
    }

    #[tokio::test]
    async fn test_unknown_role_is_bad_request() {
        let router = router();
        let (status, response) = send(
            &router,
            "POST",
            "/api/sessions/demo/turns",
            serde_json::json!({"role": "narrator", "content": "Once upon a time"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_chat_and_snapshot_roundtrip() {
        let router = router();

        let (status, response) = send(
            &router,
            "POST",
            "/api/sessions/demo/chat",
            serde_json::json!({"message": "What is my favorite color?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.data.unwrap()["answer"], "Blue, as you said.");

        let (status, response) =
            send(&router, "GET", "/api/sessions/demo/snapshot", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot = response.data.unwrap();
        assert_eq!(snapshot["buffer"].as_array().unwrap().len(), 2);

        let (status, _) = send(&router, "PUT", "/api/sessions/demo/snapshot", snapshot).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            send(&router, "PUT", "/api/sessions/other/snapshot", serde_json::json!({
                "session_id": SessionId::from_key("demo"),
                "buffer": [],
                "summary": "",
                "facts": []
            }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_closes_session() {
        let registry = registry();
        let router = create_router(registry.clone());

        let (status, _) = send(
            &router,
            "POST",
            "/api/sessions/demo/turns",
            serde_json::json!({"role": "user", "content": "hello"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(registry.session_count().await, 1);

        let (status, response) =
            send(&router, "DELETE", "/api/sessions/demo", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(registry.session_count().await, 0);

        let (status, response) =
            send(&router, "DELETE", "/api/sessions/demo", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_reads_of_unknown_sessions_do_not_open_them() {
        let registry = registry();
        let router = create_router(registry.clone());

        let (status, response) = send(
            &router,
            "POST",
            "/api/sessions/stranger/context",
            serde_json::json!({"query": "anything"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.data.unwrap()["context"], "");

        let (status, response) =
            send(&router, "GET", "/api/sessions/stranger/snapshot", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.data.unwrap()["buffer"].as_array().unwrap().is_empty());

        assert_eq!(registry.session_count().await, 0);
    }
}
