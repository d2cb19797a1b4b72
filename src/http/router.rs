//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression,
//! tracing), and creates the axum router ready for serving.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive for development, should be restricted in production
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the API router with versioned endpoints
    let api_v1 = Router::new()
        // Reference entities
        .route("/network", get(handlers::list_networks))
        .route("/country", get(handlers::list_countries))
        .route("/network_delay/locations", get(handlers::list_network_delay_locations))
        // Time series
        .route("/delay", get(handlers::list_delay))
        .route("/forwarding", get(handlers::list_forwarding))
        .route("/hegemony", get(handlers::list_hegemony))
        .route("/hegemony/cones", get(handlers::list_hegemony_cone))
        .route("/network_delay", get(handlers::list_network_delay))
        // Alarms
        .route("/delay/alarms", get(handlers::list_delay_alarms))
        .route("/forwarding/alarms", get(handlers::list_forwarding_alarms))
        .route("/hegemony/alarms", get(handlers::list_hegemony_alarms))
        .route("/network_delay/alarms", get(handlers::list_network_delay_alarms))
        // Disconnection events
        .route("/disco/events", get(handlers::list_disco_events))
        // Accounts
        .route("/user/register", post(handlers::register))
        .route("/user/login", post(handlers::login))
        .route("/user/change_password", post(handlers::change_password))
        .route("/user/reset_password", post(handlers::reset_password))
        .route("/user/exists", post(handlers::user_exists))
        .route("/user/monitor", post(handlers::monitor));

    // Combine all routes
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use std::sync::Arc;

    #[test]
    fn test_router_creation() {
        let repo =
            Arc::new(LocalRepository::new()) as Arc<dyn crate::db::repository::FullRepository>;
        let state = AppState::new(repo);
        let _router = create_router(state);
        // If we got here, router was created successfully
    }
}
