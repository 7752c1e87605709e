// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training Load Tracker API Server
//!
//! Maintains each user's fitness (CTL), fatigue (ATL) and form (TSB) chain
//! from daily TRIMP values.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use training_load_tracker::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, LoadStore, MemoryStore},
    services::TrainingLoadService,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Training Load Tracker API");

    let store: Arc<dyn LoadStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory load store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Per-user locks are shared by every request handled by this instance
    let user_locks = Arc::new(dashmap::DashMap::new());
    let load_service = TrainingLoadService::new(store, user_locks);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        load_service,
    });

    // Build router
    let app = training_load_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("training_load_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
