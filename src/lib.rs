// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Training Load Tracker: fitness, fatigue and form from daily TRIMP
//!
//! This crate provides the backend API that keeps each user's ATL/CTL/TSB
//! chain consistent as daily training impulse is synced, logged, edited and
//! deleted.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::TrainingLoadService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub load_service: TrainingLoadService,
}
