use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use saferide_core::AppContext;
use saferide_engine::AlertService;
use std::env;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use crate::auth;
use crate::handlers;
use crate::websocket;

pub async fn run(ctx: AppContext) -> Result<()> {
    let api_port = ctx.config.server.api_port;
    let service = AlertService::new(ctx.clone());

    // Configure CORS - allow specific origins or all if CORS_ORIGINS not set
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let origin_list: Vec<&str> = origins.split(',').map(|s| s.trim()).collect();
        let mut cors = CorsLayer::new();
        for origin in origin_list {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/v1/auth/register", post(handlers::register))
        .route("/api/v1/profile", get(handlers::get_profile))
        .route("/api/v1/profile", put(handlers::update_profile))
        .route("/api/v1/settings", put(handlers::update_settings))
        .route("/api/v1/contacts", post(handlers::add_contact))
        .route("/api/v1/contacts/:phone", delete(handlers::remove_contact))
        .route("/api/v1/alerts", post(handlers::create_alert))
        .route("/api/v1/alerts", get(handlers::alert_history))
        .route("/api/v1/alerts/:id", get(handlers::get_alert))
        .route("/api/v1/alerts/:id/cancel", post(handlers::cancel_alert))
        .route("/api/v1/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
        .route("/api/v1/alerts/:id/resolve", post(handlers::resolve_alert))
        .route("/api/v1/alerts/:id/location", put(handlers::update_alert_location))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(ctx))
                .layer(Extension(service))
                .layer(middleware::from_fn(auth::auth_middleware))
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], api_port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
