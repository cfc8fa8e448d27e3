//! `CourierServer`: Axum HTTP + WebSocket server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use courier_auth::TokenIssuer;
use courier_core::UserId;
use courier_store::{AccountDirectory, MessageLog};
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::handler::{InboundFrame, SessionHandler};
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::router::Router as MessageRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::sink::{FrameSink, WsSink};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Account storage.
    pub accounts: Arc<dyn AccountDirectory>,
    /// Token issuer for `/login`.
    pub issuer: Arc<TokenIssuer>,
    /// Live sessions.
    pub registry: Arc<ConnectionRegistry>,
    /// Session state machine.
    pub sessions: Arc<SessionHandler>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/registration", post(api::register))
        .route("/login", post(api::login))
        .route("/users", get(api::list_users))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// The relay server: owns the registry, the router task, and the listener.
pub struct CourierServer {
    config: Arc<ServerConfig>,
    state: AppState,
    router: MessageRouter,
    shutdown: Arc<ShutdownCoordinator>,
}

impl CourierServer {
    /// Wire the registry, router, and session handler over the given store and issuer.
    pub fn new(
        config: ServerConfig,
        accounts: Arc<dyn AccountDirectory>,
        log: Arc<dyn MessageLog>,
        issuer: Arc<TokenIssuer>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let config = Arc::new(config);
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let (router, router_handle) = MessageRouter::new(Arc::clone(&registry));
        let sessions = Arc::new(SessionHandler::new(
            Arc::clone(&registry),
            log,
            issuer.clone(),
            router_handle,
            config.idle_timeout,
            shutdown.token(),
        ));
        let state = AppState {
            accounts,
            issuer,
            registry,
            sessions,
            config: Arc::clone(&config),
            start_time: Instant::now(),
            metrics,
        };
        Self {
            config,
            state,
            router,
            shutdown,
        }
    }

    /// The Axum router (for in-process tests).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Live session registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Bind, start the router task, and serve until shutdown.
    pub async fn listen(self) -> io::Result<ServerHandle> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let token = self.shutdown.token();
        let router_task = tokio::spawn(self.router.run(token.clone()));

        let app = build_router(self.state);
        let server_task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });

        info!(addr = %local_addr, "courier server listening");
        Ok(ServerHandle {
            addr: local_addr,
            shutdown: self.shutdown,
            tasks: vec![router_task, server_task],
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, end sessions, and wait for background tasks.
    pub async fn shutdown(self) {
        self.shutdown.graceful_shutdown(self.tasks, None).await;
    }
}

/// Query string of `/ws`.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Conversation peer.
    pub username: Option<String>,
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(%rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let peer = params
        .username
        .filter(|u| !u.is_empty())
        .map(UserId::new);
    let sessions = Arc::clone(&state.sessions);
    let write_timeout = state.config.write_timeout;

    upgrade
        .max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| async move {
            let (tx, rx) = socket.split();
            let sink: Arc<dyn FrameSink> = Arc::new(WsSink::new(tx, write_timeout));
            let inbound = rx.map(InboundFrame::from);
            let _ = sessions
                .run(inbound, sink, authorization.as_deref(), peer)
                .await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
