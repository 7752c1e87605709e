// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process implementation of [`LoadStore`].
//!
//! Used by the test suite and for local runs without Firestore
//! (`LOAD_STORE=memory`). Supports fault injection so partial-failure paths
//! can be exercised.

use crate::db::LoadStore;
use crate::error::{AppError, Result};
use crate::models::manual_entry::sort_entries;
use crate::models::{DailyLoadRecord, ManualEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Tables {
    /// Keyed by (user_id, date) so a user's records iterate in date order.
    records: BTreeMap<(String, NaiveDate), DailyLoadRecord>,
    entries: HashMap<String, ManualEntry>,
}

#[derive(Default)]
struct Faults {
    /// (user_id, date) pairs whose record writes fail.
    failing_record_writes: HashSet<(String, NaiveDate)>,
    /// When set, every read fails.
    fail_reads: bool,
    /// When set, every call yields to the scheduler before touching the tables.
    yield_on_calls: bool,
    /// Dates of successful record writes, in order.
    write_log: Vec<NaiveDate>,
}

/// In-memory datastore. Clones share the same underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes of the record for `(user_id, date)` fail until cleared.
    pub fn fail_record_write(&self, user_id: &str, date: NaiveDate) {
        lock(&self.faults)
            .failing_record_writes
            .insert((user_id.to_string(), date));
    }

    /// Make every read fail until cleared.
    pub fn fail_reads(&self, enabled: bool) {
        lock(&self.faults).fail_reads = enabled;
    }

    /// Make every call suspend once, as a networked store would, so
    /// concurrent callers interleave.
    pub fn yield_between_calls(&self, enabled: bool) {
        lock(&self.faults).yield_on_calls = enabled;
    }

    async fn pause(&self) {
        let enabled = lock(&self.faults).yield_on_calls;
        if enabled {
            tokio::task::yield_now().await;
        }
    }

    pub fn clear_faults(&self) {
        let mut faults = lock(&self.faults);
        faults.failing_record_writes.clear();
        faults.fail_reads = false;
    }

    /// Dates of record writes since the last call, in write order.
    pub fn take_write_log(&self) -> Vec<NaiveDate> {
        std::mem::take(&mut lock(&self.faults).write_log)
    }

    fn check_read(&self) -> Result<()> {
        if lock(&self.faults).fail_reads {
            return Err(AppError::Database("injected read failure".to_string()));
        }
        Ok(())
    }

    fn user_records(&self, user_id: &str) -> Vec<DailyLoadRecord> {
        let start = (user_id.to_string(), NaiveDate::MIN);
        let end = (user_id.to_string(), NaiveDate::MAX);
        lock(&self.tables)
            .records
            .range(start..=end)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl LoadStore for MemoryStore {
    async fn get_record(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyLoadRecord>> {
        self.pause().await;
        self.check_read()?;
        Ok(lock(&self.tables)
            .records
            .get(&(user_id.to_string(), date))
            .cloned())
    }

    async fn get_records_after(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<DailyLoadRecord>> {
        self.pause().await;
        self.check_read()?;
        Ok(self
            .user_records(user_id)
            .into_iter()
            .filter(|r| r.date > date)
            .collect())
    }

    async fn get_most_recent_record_before(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyLoadRecord>> {
        self.pause().await;
        self.check_read()?;
        Ok(self
            .user_records(user_id)
            .into_iter()
            .filter(|r| r.date < date)
            .last())
    }

    async fn get_records_between(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyLoadRecord>> {
        self.pause().await;
        self.check_read()?;
        Ok(self
            .user_records(user_id)
            .into_iter()
            .filter(|r| {
                start.map_or(true, |s| r.date >= s) && end.map_or(true, |e| r.date <= e)
            })
            .collect())
    }

    async fn get_latest_record(&self, user_id: &str) -> Result<Option<DailyLoadRecord>> {
        self.pause().await;
        self.check_read()?;
        Ok(self.user_records(user_id).pop())
    }

    async fn upsert_record(&self, record: &DailyLoadRecord) -> Result<()> {
        self.pause().await;
        let key = (record.user_id.clone(), record.date);
        {
            let mut faults = lock(&self.faults);
            if faults.failing_record_writes.contains(&key) {
                return Err(AppError::Database(format!(
                    "injected write failure for {}",
                    record.date
                )));
            }
            faults.write_log.push(record.date);
        }
        lock(&self.tables).records.insert(key, record.clone());
        Ok(())
    }

    async fn list_manual_entries(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ManualEntry>> {
        self.pause().await;
        self.check_read()?;
        let mut entries: Vec<ManualEntry> = lock(&self.tables)
            .entries
            .values()
            .filter(|e| e.user_id == user_id && e.date == date)
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn get_manual_entry(&self, entry_id: &str) -> Result<Option<ManualEntry>> {
        self.pause().await;
        self.check_read()?;
        Ok(lock(&self.tables).entries.get(entry_id).cloned())
    }

    async fn insert_manual_entry(&self, entry: &ManualEntry) -> Result<()> {
        self.pause().await;
        let mut tables = lock(&self.tables);
        if tables.entries.contains_key(&entry.id) {
            return Err(AppError::Database(format!(
                "manual entry {} already exists",
                entry.id
            )));
        }
        tables.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn update_manual_entry(&self, entry: &ManualEntry) -> Result<()> {
        self.pause().await;
        lock(&self.tables)
            .entries
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_manual_entry(&self, entry_id: &str) -> Result<()> {
        self.pause().await;
        lock(&self.tables).entries.remove(entry_id);
        Ok(())
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<usize> {
        self.pause().await;
        let mut tables = lock(&self.tables);
        let entries_before = tables.entries.len();
        tables.entries.retain(|_, e| e.user_id != user_id);
        let records_before = tables.records.len();
        tables.records.retain(|(owner, _), _| owner != user_id);

        let deleted_count =
            (entries_before - tables.entries.len()) + (records_before - tables.records.len());
        tracing::info!(user_id, deleted_count, "User data deletion complete");
        Ok(deleted_count)
    }
}
