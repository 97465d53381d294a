//! HTTP + WebSocket front end: `/ws` (also `/`) for signaling sessions, REST for tokens and pairing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crossdrop_core::pairing::{PairError, PairState};
use crossdrop_core::{DeviceId, HmacTokenIssuer, SignalingCore};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::session::{run_session, WsTransport};
use crate::sweeper::run_sweeper;

pub type SharedCore = Arc<Mutex<SignalingCore<WsTransport>>>;

#[derive(Clone)]
pub struct AppState {
    pub core: SharedCore,
}

impl AppState {
    pub fn new(token_secret: &str, require_pair_token: bool) -> Self {
        let mut core = SignalingCore::new(Arc::new(HmacTokenIssuer::new(token_secret)));
        core.set_require_pair_token(require_pair_token);
        Self {
            core: Arc::new(Mutex::new(core)),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/token", post(issue_token))
        .route("/pair/request", post(pair_request))
        .route("/pair", post(pair))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind, start the sweeper and serve until `shutdown` resolves.
pub async fn run<F>(cfg: &Config, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", cfg.bind_address, cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "signaling server listening");

    let sweeper = tokio::spawn(run_sweeper(
        state.core.clone(),
        Duration::from_millis(cfg.heartbeat_ms.max(1)),
        cfg.client_timeout_ms,
    ));

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    sweeper.abort();
    info!("signaling server stopped");
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state.core))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub id: Option<DeviceId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub info: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairBody {
    #[serde(default)]
    pub from_id: Option<DeviceId>,
    #[serde(default)]
    pub to_id: Option<DeviceId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PairBody {
    fn ids(&self) -> Option<(DeviceId, DeviceId)> {
        let from = self.from_id.clone().filter(|id| !id.is_empty())?;
        let to = self.to_id.clone().filter(|id| !id.is_empty())?;
        Some((from, to))
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `POST /token {id, name, info?}`: registration token + registry upsert.
async fn issue_token(State(state): State<AppState>, Json(body): Json<TokenRequest>) -> Response {
    let Some(id) = body.id.filter(|id| !id.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "missing id");
    };
    let name = body.name.unwrap_or_default();
    let info = body.info.unwrap_or_default();
    match state.core.lock().await.register_with_token(id.clone(), name, info) {
        Ok(token) => {
            info!(device = %id, "issued registration token");
            Json(json!({ "token": token })).into_response()
        }
        Err(e) => {
            warn!(device = %id, error = %e, "token issue failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "token-issue-failed")
        }
    }
}

/// `POST /pair/request {fromId, toId, message?}`: forward a tokened pair request.
async fn pair_request(State(state): State<AppState>, Json(body): Json<PairBody>) -> Response {
    let Some((from, to)) = body.ids() else {
        return error(StatusCode::BAD_REQUEST, "missing");
    };
    let result = state
        .core
        .lock()
        .await
        .request_pair(&from, &to, body.message);
    match result {
        Ok(PairState::Unavailable) => error(
            StatusCode::SERVICE_UNAVAILABLE,
            crossdrop_core::TARGET_UNAVAILABLE,
        ),
        Ok(_) => Json(json!({ "ok": true })).into_response(),
        Err(PairError::DeviceNotFound) => {
            error(StatusCode::NOT_FOUND, crossdrop_core::DEVICE_NOT_FOUND)
        }
        Err(e) => {
            warn!(from = %from, to = %to, error = %e, "pair request failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "pair-request-failed")
        }
    }
}

/// `POST /pair {fromId, toId, message?}`: token-less variant, reports only routing.
async fn pair(State(state): State<AppState>, Json(body): Json<PairBody>) -> Response {
    let Some((from, to)) = body.ids() else {
        return error(StatusCode::BAD_REQUEST, "invalid");
    };
    let routed = state
        .core
        .lock()
        .await
        .request_pair_simple(&from, &to, body.message);
    Json(json!({ "routed": routed })).into_response()
}
