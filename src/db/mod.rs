// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! The load chain only needs simple CRUD plus date-ordered queries, captured
//! by [`LoadStore`]. Production uses Firestore; [`MemoryStore`] backs tests
//! and offline local runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{DailyLoadRecord, ManualEntry};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    /// One document per (user, date), ID `{user_id}_{date}`
    pub const DAILY_LOADS: &str = "daily_loads";
    /// One document per manually logged activity, ID = entry ID
    pub const MANUAL_ENTRIES: &str = "manual_entries";
}

/// Persistence contract used by the recalculation orchestrator.
///
/// Date-ordered queries are scoped to one user and always ascending unless
/// the method name says otherwise.
#[async_trait]
pub trait LoadStore: Send + Sync {
    /// Get the record for a user's date.
    async fn get_record(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyLoadRecord>>;

    /// All records strictly after `date`, ascending.
    async fn get_records_after(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<DailyLoadRecord>>;

    /// The nearest record strictly before `date`.
    async fn get_most_recent_record_before(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyLoadRecord>>;

    /// Records in `[start, end]` (either bound optional), ascending.
    async fn get_records_between(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyLoadRecord>>;

    /// The user's most recent record.
    async fn get_latest_record(&self, user_id: &str) -> Result<Option<DailyLoadRecord>>;

    /// Insert or replace, keyed by `(user_id, date)`.
    async fn upsert_record(&self, record: &DailyLoadRecord) -> Result<()>;

    /// Manual entries for a user's date, ordered by creation time.
    async fn list_manual_entries(&self, user_id: &str, date: NaiveDate)
        -> Result<Vec<ManualEntry>>;

    async fn get_manual_entry(&self, entry_id: &str) -> Result<Option<ManualEntry>>;

    async fn insert_manual_entry(&self, entry: &ManualEntry) -> Result<()>;

    async fn update_manual_entry(&self, entry: &ManualEntry) -> Result<()>;

    async fn delete_manual_entry(&self, entry_id: &str) -> Result<()>;

    /// Delete every record and manual entry owned by the user.
    ///
    /// Returns the number of documents deleted.
    async fn delete_user_data(&self, user_id: &str) -> Result<usize>;
}
