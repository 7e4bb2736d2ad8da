//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use crate::rate_limit::limit_public;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    // Client-facing routes reached through an acceptance link
    let public_routes = Router::new()
        .route("/quotes/:hash", get(handlers::view_public_quote))
        .route("/quotes/:hash/accept", post(handlers::accept_public_quote))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_public));

    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Leads
        .route(
            "/leads",
            get(handlers::list_leads).post(handlers::create_lead),
        )
        .route("/leads/:id", get(handlers::get_lead))
        .route("/leads/:id/status", post(handlers::move_lead))
        .route(
            "/leads/:id/activities",
            get(handlers::list_activities).post(handlers::add_note),
        )
        .route(
            "/leads/:id/quotes",
            get(handlers::list_lead_quotes).post(handlers::create_quote),
        )
        // Quotes
        .route("/quotes/:id", get(handlers::get_quote))
        // Board and reporting
        .route("/pipeline", get(handlers::pipeline_board))
        .route("/reports/pipeline", get(handlers::pipeline_report))
        .route("/audit", get(handlers::list_audit))
        .nest("/public", public_routes);

    // Build router with middleware
    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TraceLayer::new_for_http());

    let router = if server.enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
