//! REST API and WebSocket server for the attestation hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared state** holding the record store and the relay dispatcher
//! - **WebSocket** gateway for reporting agents and live viewers
//!
//! ## Endpoints
//!
//! - `GET /` - Liveness message
//! - `GET /api/health` - Relay counters and storage health
//! - `GET|POST|DELETE /api/{log,event,alert}/{get,add,remove}` - Record CRUD
//! - `GET /api/relay/sessions[/{machine_id}[/series]]` - Live session inspection
//! - `WS /socket` - Sample ingestion and window streaming

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{ApiResponse, DeleteSummary, HealthResponse, ResponseStatus};

use std::net::SocketAddr;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{delete, get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:3000")
    pub bind_addr: SocketAddr,

    /// Origins allowed by CORS; `"*"` allows any origin without credentials
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if origins.iter().any(|o| o == "*") {
        return Some(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(methods)
                .allow_headers(Any),
        );
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
    )
}

/// Build the router with all routes and middleware
pub fn build_router(config: &ApiConfig, state: ApiState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/log/add", post(routes::records::add_log))
        .route("/log/get", get(routes::records::get_logs))
        .route("/log/remove", delete(routes::records::remove_logs))
        .route("/event/add", post(routes::records::add_event))
        .route("/event/get", get(routes::records::get_events))
        .route("/event/remove", delete(routes::records::remove_events))
        .route("/alert/add", post(routes::records::add_alerts))
        .route("/alert/get", get(routes::records::get_alerts))
        .route("/alert/remove", delete(routes::records::remove_alerts))
        .route("/relay/sessions", get(routes::relay::list_sessions))
        .route(
            "/relay/sessions/:machine_id",
            get(routes::relay::get_session),
        )
        .route(
            "/relay/sessions/:machine_id/series",
            get(routes::relay::get_series),
        );

    let mut app = Router::new()
        .route("/", get(routes::health::root))
        .route("/socket", get(websocket::websocket_handler))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&config.cors_origins) {
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(&config, state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
