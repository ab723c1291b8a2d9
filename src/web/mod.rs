//! Web layer module
//!
//! HTTP interface for the logo service. Handlers stay thin and delegate to
//! the service layer; auth, per-key rate limiting, and CORS are applied as
//! middleware on the route groups that need them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::ratelimit::KeyedRateLimiter;
use crate::service::LogoService;

pub mod api;
pub mod middleware;

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    /// Create a new web server. `shutdown_token` is the process-level
    /// cancellation scope; in-flight acquisitions and background imports
    /// observe it, individual client disconnects do not trip it.
    pub fn new(
        config: Config,
        service: LogoService,
        shutdown_token: CancellationToken,
    ) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;

        let rate_limiter = Arc::new(KeyedRateLimiter::new(
            config.ratelimit.requests_per_second,
            config.ratelimit.burst,
        ));

        let app = Self::create_router(AppState {
            service,
            config,
            rate_limiter,
            shutdown_token,
        });

        Ok(Self { app, addr })
    }

    /// Create the router with all routes and middleware
    fn create_router(state: AppState) -> Router {
        // Auth runs before the per-key limiter so the limiter can read the
        // key it stashed on the request
        let logos = Router::new()
            .route("/logos/:symbol", get(api::get_logo))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::rate_limit_middleware,
            ))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::api_key_auth_middleware,
            ));

        let admin = Router::new()
            .route("/stats", get(api::stats))
            .route("/import", post(api::import))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::admin_key_auth_middleware,
            ));

        let api_v1 = Router::new()
            .merge(logos)
            .nest("/admin", admin)
            .layer(Self::cors_layer(&state.config));

        Router::new()
            // Health check endpoint (no auth required)
            .route("/healthz", get(api::healthz))
            // API v1 routes
            .nest("/api/v1", api_v1)
            .layer(TraceLayer::new_for_http())
            // Shared state
            .with_state(state)
    }

    /// CORS allow-list from configuration. Origins that fail header parsing
    /// are dropped rather than wildcarded.
    fn cors_layer(config: &Config) -> CorsLayer {
        let origins: Vec<HeaderValue> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                HeaderName::from_static("x-api-key"),
                HeaderName::from_static("content-type"),
            ])
            .max_age(Duration::from_secs(86400))
    }

    /// Start the web server, shutting down gracefully on cancellation.
    pub async fn serve(self, shutdown_token: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on {}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
            .await?;

        Ok(())
    }

    /// Get the router, mainly for driving requests in tests
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    /// Get the host address
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: LogoService,
    pub config: Config,
    pub rate_limiter: Arc<KeyedRateLimiter>,
    pub shutdown_token: CancellationToken,
}
