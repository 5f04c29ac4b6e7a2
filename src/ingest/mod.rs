// Position ingestion: WebSocket streams feeding the merge pipeline

mod channel;
mod handler;
mod registry;

pub use channel::{
    Delivery, DeliveryReceiver, DeliveryRouter, DeliveryStats, OverflowPolicy, PipelineClosed,
};
pub use registry::{ConnectionInfo, ConnectionRegistry};

use crate::auth::{extract_stream_token, AuthGate};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, Request, State,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use handler::ConnectionHandler;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Process-scoped ingestion state: live connections plus the producer side
/// of the merge pipeline.
///
/// Created at service start and passed by handle to every connection task.
/// The pipeline queues close when the last handle is dropped.
pub struct IngestionMultiplexer {
    registry: ConnectionRegistry,
    router: DeliveryRouter,
    shutdown: watch::Sender<bool>,
}

impl IngestionMultiplexer {
    pub fn new(router: DeliveryRouter) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry: ConnectionRegistry::new(),
            router,
            shutdown,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &DeliveryRouter {
        &self.router
    }

    pub fn live_connections(&self) -> usize {
        self.registry.live_count()
    }

    pub fn delivery_stats(&self) -> Arc<DeliveryStats> {
        self.router.stats()
    }

    /// Ask every open stream to close. New streams close immediately.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!(
            live_connections = self.registry.live_count(),
            "Closing ingestion streams"
        );
    }

    fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Shared state for the ingestion router
#[derive(Clone)]
pub struct IngestAppState {
    pub mux: Arc<IngestionMultiplexer>,
    pub auth: AuthGate,
}

/// Query parameters for WebSocket upgrade
#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Auth middleware: runs before upgrade extraction so 401 is returned
/// without needing a valid handshake.
async fn ws_auth(
    State(state): State<IngestAppState>,
    Query(params): Query<WsQuery>,
    req: Request,
    next: Next,
) -> Response {
    let token = extract_stream_token(req.headers(), params.token.as_deref());
    if let Err(e) = state.auth.authorize(token).await {
        warn!(error = %e, "Ingestion stream rejected by auth gate");
        return e.into_response();
    }
    next.run(req).await
}

/// GET /api/v1/cab/ws - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<IngestAppState>,
) -> Response {
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ws.on_upgrade(move |socket| handle_socket(socket, state.mux, peer))
}

async fn handle_socket(socket: WebSocket, mux: Arc<IngestionMultiplexer>, peer: String) {
    ConnectionHandler::new(mux).handle(socket, peer).await;
}

/// Create ingestion router with auth middleware applied
pub fn create_ingest_router(state: IngestAppState) -> Router {
    Router::new()
        .route("/api/v1/cab/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), ws_auth))
        .with_state(state)
}
