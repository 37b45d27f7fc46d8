//! HTTP / WebSocket surface.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{future, SinkExt, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn, Instrument};

use crate::config::Config;
use crate::error::TransportError;
use crate::pipeline::FramePipeline;
use crate::session::{run_session, SessionOptions};

pub const VERSION: &str = env!("GIT_VERSION");

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<FramePipeline>,
    options: SessionOptions,
    shutdown: CancellationToken,
    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(pipeline: Arc<FramePipeline>, options: SessionOptions, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            options,
            shutdown,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }
}

/// 接続数カウンタ。drop で減る
struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub fn router(ws_path: &str, state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(ws_path, get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Vision scan server is running",
        "version": VERSION,
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": state.active_sessions(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state).instrument(tracing::info_span!("session", peer = %peer))
    })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = SessionGuard::enter(&state.active_sessions);
    info!("client connected ({} active)", state.active_sessions());

    let (sink, stream) = socket.split();

    let reader = stream
        .map_err(TransportError::from)
        .try_filter_map(|message| future::ready(Ok(text_payload(message))))
        .boxed();
    let writer = sink
        .with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))))
        .sink_map_err(TransportError::from);

    let session = run_session(
        reader,
        Box::pin(writer),
        Arc::clone(&state.pipeline),
        state.options,
        state.shutdown.child_token(),
    );

    match session.await {
        Ok(stats) => info!(
            processed = stats.processed,
            dropped = stats.dropped,
            failed = stats.failed,
            "client disconnected"
        ),
        Err(e) => warn!("session ended with transport error: {}", e),
    }
}

/// テキストフレームだけがセッションに届く。バイナリ / ping / pong / close は読み飛ばす
fn text_payload(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_owned()),
        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Ctrl-C を受けるまでサーバーを動かす
pub async fn serve(config: &Config, pipeline: Arc<FramePipeline>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let state = AppState::new(pipeline, SessionOptions::from_config(config), shutdown.clone());
    let app = router(&config.ws_path, state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(
        "Listening on ws://{}{}",
        listener.local_addr().context("Failed to read local address")?,
        config.ws_path
    );

    let signal = shutdown.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    Ok(())
}
