//! HTTP server mode for REST access to query operations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::dispatch::{Dispatcher, QueryHandle, StartQueryRequest};
use crate::error::{Error, Result};
use crate::session::{spawn_reaper, ReaperConfig};
use crate::types::base64_bytes;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Service settings (the reaper is driven from these)
    pub service: ServiceConfig,
}

impl ServerConfig {
    pub fn new(port: u16, service: ServiceConfig) -> Self {
        Self { port, service }
    }
}

/// App state shared across handlers
#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
}

/// Request body for the positional invocation endpoint
#[derive(Debug, Deserialize)]
struct InvokeRequest {
    chain_id: String,
    tx_id: String,
    args: Vec<String>,
}

/// Body of a point lookup response
#[derive(Debug, Serialize)]
struct StateValue {
    namespace: String,
    key: String,
    #[serde(with = "base64_bytes")]
    value: Bytes,
}

/// Response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Status code for an error
fn status_for(error: &Error) -> StatusCode {
    if error.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(error, Error::SessionExists { .. }) {
        StatusCode::CONFLICT
    } else if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(error: &Error) -> Response {
    let status = status_for(error);
    if status.is_server_error() {
        tracing::error!("Request failed: {error}");
    }
    (status, Json(ApiResponse::<()>::error(error.to_string()))).into_response()
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Build the router for `dispatcher`
pub fn router(dispatcher: Dispatcher) -> Router {
    // Allow all origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/invoke", post(invoke))
        .route("/queries", post(start_query))
        .route("/queries/next", post(next_page))
        .route("/queries/close", post(close_query))
        .route("/state/:chain/:namespace/:key", get(point_lookup))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(AppState { dispatcher }))
}

/// Start the HTTP server
pub async fn serve(config: ServerConfig, dispatcher: Dispatcher) -> Result<()> {
    let reaper = config.service.idle_timeout().map(|max_idle| {
        spawn_reaper(
            dispatcher.registry().clone(),
            ReaperConfig::new(max_idle, config.service.reap_interval()),
        )
    });

    let app = router(dispatcher);
    let port = config.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind to port {port}: {e}")))?;

    let served = axum::serve(listener, app)
        .await
        .map_err(|e| Error::config(format!("Server error: {e}")));

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    served
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Live session keys
async fn list_sessions(State(state): State<Arc<AppState>>) -> Response {
    let sessions = state.dispatcher.registry().keys().await;
    respond(Ok(json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

/// Positional invocation
async fn invoke(State(state): State<Arc<AppState>>, Json(req): Json<InvokeRequest>) -> Response {
    respond(
        state
            .dispatcher
            .invoke(&req.chain_id, &req.tx_id, &req.args)
            .await,
    )
}

/// StartQuery
async fn start_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartQueryRequest>,
) -> Response {
    respond(state.dispatcher.start_query(&req).await)
}

/// NextPage
async fn next_page(State(state): State<Arc<AppState>>, Json(req): Json<QueryHandle>) -> Response {
    respond(state.dispatcher.next_page(&req).await)
}

/// CloseQuery; always acknowledged
async fn close_query(State(state): State<Arc<AppState>>, Json(req): Json<QueryHandle>) -> Response {
    state.dispatcher.close_query(&req).await;
    respond(Ok(json!({ "closed": true })))
}

/// PointLookup
async fn point_lookup(
    State(state): State<Arc<AppState>>,
    Path((chain, namespace, key)): Path<(String, String, String)>,
) -> Response {
    let result = state
        .dispatcher
        .point_lookup(&chain, &namespace, &key)
        .await
        .map(|value| StateValue {
            namespace,
            key,
            value,
        });
    respond(result)
}
