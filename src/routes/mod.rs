//! Route modules for Zebra Server

pub mod extract;
pub mod health;
pub mod projects;
pub mod sessions;
pub mod sync;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_auth, AuthenticatedOwner};
use crate::state::AppState;

/// Device recorded on writes made outside a sync exchange
const API_DEVICE: &str = "api";

pub(crate) fn fallback_device(owner: &AuthenticatedOwner) -> &str {
    owner.device_id.as_deref().unwrap_or(API_DEVICE)
}

/// Build the full application router
pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/sync", sync::router())
        .nest("/projects", projects::router())
        .nest("/sessions", sessions::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(&state.config().server.allowed_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api", protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
