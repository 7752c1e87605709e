// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod calculator;
pub mod training_load;

pub use calculator::{DayMetrics, FormStatus, LoadMetrics};
pub use training_load::{
    CascadeReport, EntryResult, LoadSummary, SyncDay, TrainingLoadService, UserLocks,
};
