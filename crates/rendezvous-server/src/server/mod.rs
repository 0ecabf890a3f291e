use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use rendezvous_relay::{ConnectionRegistry, PeerId, SignalRouter};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::config::ServerConfig;

mod routes;

/// Server application state
pub struct AppState {
    /// Router over the process-wide connection registry
    pub router: SignalRouter,
    /// Effective configuration
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            router: SignalRouter::new(registry),
            config,
        }
    }

    /// The connection registry shared by every connection.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.router.registry()
    }
}

/// Start the relay server and run until Ctrl-C or SIGTERM.
pub async fn start(config: ServerConfig) -> Result<()> {
    let stop_token = CancellationToken::new();
    tokio::spawn(watch_shutdown_signals(stop_token.clone()));
    serve(config, stop_token).await
}

/// Bind the configured address and serve until `stop_token` is cancelled.
pub async fn serve(config: ServerConfig, stop_token: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let state = Arc::new(AppState::new(config));
    serve_with_listener(listener, state, stop_token).await
}

/// Serve on an already-bound listener.
pub async fn serve_with_listener(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    stop_token: CancellationToken,
) -> Result<()> {
    let app = create_router(state);

    let addr = listener.local_addr()?;
    info!("Starting signaling relay on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop_token.cancelled().await;
            info!("Relay received shutdown signal, draining connections");
        })
        .await?;

    info!("Relay stopped");
    Ok(())
}

/// Cancel `stop_token` on Ctrl-C, or SIGTERM on Unix.
async fn watch_shutdown_signals(stop_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }

    stop_token.cancel();
}

/// Configure CORS layer.
///
/// Explicit origins from the configuration if any, otherwise permissive.
fn configure_cors(config: &ServerConfig) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if allowed.is_empty() {
        warn!("RENDEZVOUS_CORS_ORIGINS set but no valid origins parsed, falling back to permissive CORS");
        CorsLayer::permissive()
    } else {
        info!(origins = ?allowed, "Configured CORS with explicit allowed origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = configure_cors(&state.config);
    let websocket_router = routes::websocket::router(state.clone());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/status", get(status_handler))
        .with_state(state)
        .merge(websocket_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
}

/// Response for the status endpoint
#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    /// Registered identities; connections that never registered are not counted
    peers_registered: usize,
    peers: Vec<PeerId>,
}

/// Simple health check endpoint (for load balancers)
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rendezvous-server",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Registry status endpoint (for monitoring)
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let peers = state.registry().snapshot(None).await;

    Json(StatusResponse {
        status: "ok",
        service: "rendezvous-server",
        version: env!("CARGO_PKG_VERSION"),
        peers_registered: peers.len(),
        peers,
    })
}
