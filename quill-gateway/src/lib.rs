//! Quill Gateway - HTTP backend for AI-assisted blog writing.
//!
//! This crate provides:
//! - Session-cookie JWT authentication and an admin flag check
//! - Chat sessions, messages, profiles, and usage history in SQLite
//! - Workflow session coalescing for usage tracking
//! - Proxies to an LLM for title generation and to a humanizer service
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (auth → handler) → SQLite
//!                         ↓
//!              LLM / humanizer APIs
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod auth;
pub mod coalescer;
pub mod humanizer;
pub mod provider;
pub mod routes;
pub mod store;
pub mod titles;

pub use coalescer::{SessionCoalescer, DEFAULT_MAX_AGE_MINUTES, DEFAULT_WINDOW_MINUTES};
pub use provider::{ChatRequest, ChatResponse, OpenAIProvider, Provider, ProviderError};
pub use routes::AppState;
pub use store::Database;

use axum::Router;
use quill_common::config::Config;
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_all_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind_address().parse()?;

    let db_path = config.database.resolved_path();
    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), "Opened database");

    let state = AppState::from_config(config, db)?;

    let sessions = &config.sessions;
    let pruner = if sessions.prune_interval_secs > 0 {
        Some(state.coalescer.spawn_pruner(
            Duration::from_secs(sessions.prune_interval_secs),
            sessions.max_age_minutes,
        ))
    } else {
        tracing::info!("Background session pruner disabled");
        None
    };

    let router = build_router(state);

    tracing::info!("Starting Quill Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(pruner) = pruner {
        pruner.abort();
    }
    result?;

    tracing::info!("Quill Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
