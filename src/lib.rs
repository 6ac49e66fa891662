//! sessiongate - OAuth sign-in with cookie sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - /signin, /auth/:provider, /auth/:provider/callback       │
//! │  - /signout, /, /health, /metrics                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Auth + Service Layer                           │
//! │  - Provider authenticator (OAuth 2.0 code flow)             │
//! │  - Signed cookie sessions, flash messages                   │
//! │  - Sign-in / sign-out                                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx), users keyed by (provider, uid)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: Home page and metrics handlers
//! - `auth`: Sign-in routes, provider handshake, sessions
//! - `service`: Sign-in / sign-out logic
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use data::UserRepository as _;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the user store and authenticator.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// User persistence
    pub users: Arc<dyn data::UserRepository>,

    /// OAuth handshake capability
    pub authenticator: Arc<dyn auth::ProviderAuthenticator>,

    /// Signed cookie session store
    pub sessions: auth::CookieSessionStore,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build the HTTP client for provider calls
    /// 3. Register OAuth providers
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = data::Database::connect(&config.database.path).await?;
        let user_count = db.count_users().await?;
        tracing::info!(users = user_count, "Database connected");

        // 2. Initialize HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("sessiongate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        // 3. Register OAuth providers
        let authenticator = auth::OAuth2Authenticator::from_config(&config, http_client)?;

        tracing::info!("Application state initialized successfully");

        Ok(Self::from_parts(
            config,
            Arc::new(db),
            Arc::new(authenticator),
        ))
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: config::AppConfig,
        users: Arc<dyn data::UserRepository>,
        authenticator: Arc<dyn auth::ProviderAuthenticator>,
    ) -> Self {
        let sessions = auth::CookieSessionStore::from_config(&config);

        Self {
            config: Arc::new(config),
            users,
            authenticator,
            sessions,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    let metrics_routes = api::metrics_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_auth,
    ));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::home_router())
        .merge(auth::auth_router())
        .merge(metrics_routes)
        .layer(middleware::from_fn(api::track_requests))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
