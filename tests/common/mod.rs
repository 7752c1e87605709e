// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::NaiveDate;
use std::sync::Arc;
use training_load_tracker::config::Config;
use training_load_tracker::db::{FirestoreDb, MemoryStore};
use training_load_tracker::routes::create_router;
use training_load_tracker::services::TrainingLoadService;
use training_load_tracker::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Parse a `YYYY-MM-DD` date.
#[allow(dead_code)]
pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("valid test date")
}

/// A service over a fresh in-memory store. The store handle shares the
/// service's tables, for fault injection and inspection.
#[allow(dead_code)]
pub fn test_service() -> (TrainingLoadService, MemoryStore) {
    let store = MemoryStore::new();
    let service = TrainingLoadService::new(
        Arc::new(store.clone()),
        Arc::new(dashmap::DashMap::new()),
    );
    (service, store)
}

/// Create a test app backed by an in-memory store.
/// Returns the router, the shared state and the store.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, MemoryStore) {
    let config = Config::test_default();
    let (load_service, store) = test_service();

    let state = Arc::new(AppState {
        config,
        load_service,
    });

    (create_router(state.clone()), state, store)
}

/// Create a session token for `user_id` signed with `signing_key`.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    training_load_tracker::middleware::auth::create_jwt(user_id, signing_key)
        .expect("Failed to create JWT")
}
