//! HTTP surface - WebSocket endpoint and health check
//!
//! ## Endpoints
//!
//! - `GET /ws` - WebSocket upgrade into a submission session
//! - `GET /health` - 200 when the container engine answers ping with `OK`

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::protocol::{EventFrame, ProtocolError, PROTOCOL_VERSION};
use super::session::{EventSink, Gateway, Session};
use crate::error::{Error, Result};

/// Router state
#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

/// Build the HTTP router.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { gateway })
}

/// Bind and serve until `shutdown` resolves
pub async fn serve(
    gateway: Arc<Gateway>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(gateway);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("sointu server running on {} (protocol {})", addr, PROTOCOL_VERSION);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> StatusCode {
    match state.gateway.runtime().ping().await {
        Ok(response) if response == "OK" => StatusCode::OK,
        Ok(response) => {
            warn!("Engine ping returned {:?}", response);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            warn!("Engine ping failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway))
}

/// Outbound half of a WebSocket
struct WsSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl EventSink for WsSink {
    async fn emit(&self, frame: EventFrame) -> Result<()> {
        let text = frame.encode()?;
        self.tx
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::Protocol(format!("Failed to send {}: {}", frame.event, e)))
    }
}

/// Drive one session until the client goes away
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>) {
    let (tx, mut rx) = socket.split();
    let sink = Arc::new(WsSink { tx: Mutex::new(tx) });
    let session = Session::connect(gateway, sink);
    let session_id = session.id();

    while let Some(message) = rx.next().await {
        let result = match message {
            // runs are tracked by the gateway and may outlive the connection
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await.map(|_| ()),
            Ok(Message::Binary(_)) => session.protocol_error(ProtocolError::unsupported_frame()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(%session_id, "WebSocket receive error: {}", e);
                break;
            }
        };

        if let Err(e) = result {
            debug!(%session_id, "Closing session: {}", e);
            break;
        }
    }

    debug!(%session_id, "Session disconnected");
}
