// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training load recalculation service.
//!
//! Every mutation follows the same shape:
//! 1. Validate inputs (before any read)
//! 2. Take the user's lock
//! 3. Read everything the mutation needs (existing days, manual entries,
//!    anchor, later records)
//! 4. Write the manual entry change, if any
//! 5. Walk the chain forward from the earliest changed date, persisting each
//!    day in ascending order
//!
//! Reads never follow a write, so a read failure leaves the datastore
//! untouched. A failed write partway through the walk is reported as
//! [`AppError::PartialCascade`].

use crate::db::LoadStore;
use crate::error::{AppError, Result};
use crate::models::load::merge_label;
use crate::models::manual_entry::sort_entries;
use crate::models::{DailyLoadRecord, ManualEntry, REST_DAY_LABEL};
use crate::services::calculator::{self, FormStatus, LoadMetrics};
use chrono::NaiveDate;
use dashmap::DashMap;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Concurrent datastore reads while preparing a sync run.
const MAX_CONCURRENT_READS: usize = 8;

/// Longest accepted activity name.
pub const MAX_ACTIVITY_NAME_LEN: usize = 200;

/// Shared per-user locks type for use in AppState.
pub type UserLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// One day reported by a fitness-platform sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDay {
    pub date: NaiveDate,
    pub trimp: f64,
    pub activity_label: String,
}

/// Records rewritten by one walk of the chain, in date order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeReport {
    pub records: Vec<DailyLoadRecord>,
}

impl CascadeReport {
    pub fn persisted_count(&self) -> usize {
        self.records.len()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }
}

/// A manual entry after a mutation, with the resulting chain rewrite.
#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub entry: ManualEntry,
    pub cascade: CascadeReport,
}

/// Latest state of a user's chain.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub latest: Option<DailyLoadRecord>,
    pub form: Option<FormStatus>,
}

/// Manual entry change applied between the read phase and the chain walk.
enum EntryWrite {
    None,
    Insert(ManualEntry),
    Update {
        previous: ManualEntry,
        updated: ManualEntry,
    },
    Delete(ManualEntry),
}

/// Holds a user's lock. On release the user's table entry is dropped
/// unless another task is already waiting on it.
struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_locks: UserLocks,
    user_id: String,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        // Release first so the table holds the only reference when idle.
        self.guard.take();
        self.user_locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Keeps every user's ATL/CTL/TSB chain consistent with their daily TRIMP.
#[derive(Clone)]
pub struct TrainingLoadService {
    store: Arc<dyn LoadStore>,
    /// Per-user mutex serializing merge, anchor fetch, write and cascade.
    user_locks: UserLocks,
}

impl TrainingLoadService {
    pub fn new(store: Arc<dyn LoadStore>, user_locks: UserLocks) -> Self {
        Self { store, user_locks }
    }

    pub fn store(&self) -> &Arc<dyn LoadStore> {
        &self.store
    }

    async fn lock_user(&self, user_id: &str) -> UserLockGuard {
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        UserLockGuard {
            guard: Some(lock.lock_owned().await),
            user_locks: Arc::clone(&self.user_locks),
            user_id: user_id.to_string(),
        }
    }

    // ─── Mutations ───────────────────────────────────────────────────────────

    /// Add `trimp_delta` and `activity_label` to a day, then cascade.
    pub async fn upsert_day(
        &self,
        user_id: &str,
        date: NaiveDate,
        trimp_delta: f64,
        activity_label: &str,
    ) -> Result<CascadeReport> {
        validate_trimp(trimp_delta)?;
        validate_activity_name(activity_label)?;

        let _guard = self.lock_user(user_id).await;
        self.merge_day_locked(user_id, date, trimp_delta, activity_label, EntryWrite::None)
            .await
    }

    /// Log a manual activity and fold it into its day.
    pub async fn add_manual_entry(
        &self,
        user_id: &str,
        date: NaiveDate,
        trimp: f64,
        activity_name: &str,
    ) -> Result<EntryResult> {
        validate_trimp(trimp)?;
        validate_activity_name(activity_name)?;

        let entry = ManualEntry::new(user_id, date, trimp, activity_name);

        let _guard = self.lock_user(user_id).await;
        let cascade = self
            .merge_day_locked(
                user_id,
                date,
                trimp,
                &entry.activity_name,
                EntryWrite::Insert(entry.clone()),
            )
            .await?;

        tracing::info!(
            user_id,
            entry_id = %entry.id,
            date = %date,
            trimp,
            persisted = cascade.persisted_count(),
            "Manual entry added"
        );

        Ok(EntryResult { entry, cascade })
    }

    /// Change a manual entry's date, TRIMP and name.
    ///
    /// Both the old and the new date are rebuilt, and the walk starts at the
    /// earlier of the two.
    pub async fn edit_manual_entry(
        &self,
        user_id: &str,
        entry_id: &str,
        new_date: NaiveDate,
        new_trimp: f64,
        new_activity_name: &str,
    ) -> Result<EntryResult> {
        validate_trimp(new_trimp)?;
        validate_activity_name(new_activity_name)?;

        let _guard = self.lock_user(user_id).await;

        let previous = self.owned_entry(user_id, entry_id).await?;
        let old_date = previous.date;

        let mut entry = previous.clone();
        entry.date = new_date;
        entry.trimp = new_trimp;
        entry.activity_name = new_activity_name.trim().to_string();

        let mut affected: Vec<NaiveDate> = vec![old_date, new_date];
        affected.dedup();

        let mut changed = BTreeMap::new();
        for date in affected {
            let replacement = (date == new_date).then_some(&entry);
            let record = self
                .rebuild_day(user_id, date, entry_id, replacement)
                .await?;
            changed.insert(date, record);
        }

        let cascade = self
            .apply_and_cascade(
                user_id,
                changed,
                EntryWrite::Update {
                    previous,
                    updated: entry.clone(),
                },
            )
            .await?;

        tracing::info!(
            user_id,
            entry_id,
            old_date = %old_date,
            new_date = %new_date,
            persisted = cascade.persisted_count(),
            "Manual entry edited"
        );

        Ok(EntryResult { entry, cascade })
    }

    /// Remove a manual entry. The day stays in the chain, as a rest day if
    /// nothing else contributes to it.
    pub async fn delete_manual_entry(&self, user_id: &str, entry_id: &str) -> Result<CascadeReport> {
        let _guard = self.lock_user(user_id).await;

        let entry = self.owned_entry(user_id, entry_id).await?;
        let record = self.rebuild_day(user_id, entry.date, entry_id, None).await?;

        let date = entry.date;
        let changed = BTreeMap::from([(date, record)]);
        let cascade = self
            .apply_and_cascade(user_id, changed, EntryWrite::Delete(entry))
            .await?;

        tracing::info!(
            user_id,
            entry_id,
            date = %date,
            persisted = cascade.persisted_count(),
            "Manual entry deleted"
        );

        Ok(cascade)
    }

    /// Ingest one sync run from the fitness platform.
    ///
    /// Each day's synced contribution is replaced rather than added to, so
    /// replaying the same run leaves every record unchanged. A single walk
    /// starts at the earliest synced date.
    pub async fn sync_days(&self, user_id: &str, days: &[SyncDay]) -> Result<CascadeReport> {
        let mut seen = HashSet::with_capacity(days.len());
        for day in days {
            validate_trimp(day.trimp)?;
            if day.trimp > 0.0 && merge_label("", &day.activity_label) == REST_DAY_LABEL {
                return Err(AppError::Validation(format!(
                    "Activity label is required for {} with non-zero TRIMP",
                    day.date
                )));
            }
            if !seen.insert(day.date) {
                return Err(AppError::Validation(format!(
                    "Duplicate date in sync run: {}",
                    day.date
                )));
            }
        }

        if days.is_empty() {
            return Ok(CascadeReport::default());
        }

        let _guard = self.lock_user(user_id).await;

        // Each day's reads are independent; only the walk needs date order.
        let store = Arc::clone(&self.store);
        let owner = user_id.to_string();
        let changed: BTreeMap<NaiveDate, DailyLoadRecord> = stream::iter(days.to_vec())
            .map(move |day| {
                let store = Arc::clone(&store);
                let user_id = owner.clone();
                async move {
                    let mut record = store
                        .get_record(&user_id, day.date)
                        .await?
                        .unwrap_or_else(|| DailyLoadRecord::seed(&user_id, day.date));
                    let entries = store.list_manual_entries(&user_id, day.date).await?;

                    let label = day.activity_label.trim();
                    record.synced_trimp = day.trimp;
                    record.synced_label = (!label.is_empty()).then(|| label.to_string());
                    record.rebuild_totals(&entries);
                    Ok::<_, AppError>((day.date, record))
                }
            })
            .buffer_unordered(MAX_CONCURRENT_READS)
            .try_collect()
            .await?;

        let cascade = self
            .apply_and_cascade(user_id, changed, EntryWrite::None)
            .await?;

        tracing::info!(
            user_id,
            days = days.len(),
            persisted = cascade.persisted_count(),
            "Sync run applied"
        );

        Ok(cascade)
    }

    /// Re-walk the user's whole chain from a zero anchor.
    ///
    /// Repairs records left stale by an interrupted cascade.
    pub async fn recalculate(&self, user_id: &str) -> Result<CascadeReport> {
        let _guard = self.lock_user(user_id).await;

        let records = self.store.get_records_between(user_id, None, None).await?;
        let cascade = self.walk(None, records).await?;

        tracing::info!(
            user_id,
            persisted = cascade.persisted_count(),
            "Full recalculation complete"
        );

        Ok(cascade)
    }

    /// Delete all of a user's records and manual entries.
    pub async fn delete_user_data(&self, user_id: &str) -> Result<usize> {
        let _guard = self.lock_user(user_id).await;
        self.store.delete_user_data(user_id).await
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    /// Records in `[start, end]`, ascending, for charting.
    pub async fn list_records(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyLoadRecord>> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AppError::Validation(
                    "'start' must not be after 'end'".to_string(),
                ));
            }
        }
        self.store.get_records_between(user_id, start, end).await
    }

    pub async fn list_manual_entries(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ManualEntry>> {
        self.store.list_manual_entries(user_id, date).await
    }

    pub async fn summary(&self, user_id: &str) -> Result<LoadSummary> {
        let latest = self.store.get_latest_record(user_id).await?;
        let form = latest.as_ref().map(|r| FormStatus::from_tsb(r.tsb));
        Ok(LoadSummary { latest, form })
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Merge an activity into a day. Caller holds the user's lock.
    async fn merge_day_locked(
        &self,
        user_id: &str,
        date: NaiveDate,
        trimp_delta: f64,
        activity_label: &str,
        write: EntryWrite,
    ) -> Result<CascadeReport> {
        let mut record = self
            .store
            .get_record(user_id, date)
            .await?
            .unwrap_or_else(|| DailyLoadRecord::seed(user_id, date));

        record.merge_activity(trimp_delta, activity_label);
        if matches!(write, EntryWrite::None) {
            // Not backed by a manual entry, so it must survive entry rebuilds.
            record.synced_trimp += trimp_delta;
            record.synced_label = Some(merge_label(
                record.synced_label.as_deref().unwrap_or_default(),
                activity_label,
            ));
        }

        tracing::debug!(
            user_id,
            date = %date,
            trimp = record.trimp,
            label = %record.activity_label,
            "Merged day"
        );

        self.apply_and_cascade(user_id, BTreeMap::from([(date, record)]), write)
            .await
    }

    /// Load a manual entry, hiding entries that belong to someone else.
    async fn owned_entry(&self, user_id: &str, entry_id: &str) -> Result<ManualEntry> {
        self.store
            .get_manual_entry(entry_id)
            .await?
            .filter(|entry| entry.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Manual entry {}", entry_id)))
    }

    /// Totals for `date` as they will be once entry `entry_id` is replaced by
    /// `replacement` (or removed when `None`).
    async fn rebuild_day(
        &self,
        user_id: &str,
        date: NaiveDate,
        entry_id: &str,
        replacement: Option<&ManualEntry>,
    ) -> Result<DailyLoadRecord> {
        let mut record = self
            .store
            .get_record(user_id, date)
            .await?
            .unwrap_or_else(|| DailyLoadRecord::seed(user_id, date));

        let mut entries = self.store.list_manual_entries(user_id, date).await?;
        entries.retain(|e| e.id != entry_id);
        if let Some(entry) = replacement {
            entries.push(entry.clone());
        }
        sort_entries(&mut entries);

        record.rebuild_totals(&entries);
        Ok(record)
    }

    /// Read the anchor and later records, write the entry change, then walk.
    ///
    /// `changed` holds the new totals for every day touched by the mutation;
    /// the walk starts at its earliest date.
    async fn apply_and_cascade(
        &self,
        user_id: &str,
        changed: BTreeMap<NaiveDate, DailyLoadRecord>,
        write: EntryWrite,
    ) -> Result<CascadeReport> {
        let Some(start) = changed.keys().next().copied() else {
            return Ok(CascadeReport::default());
        };

        let anchor = self
            .store
            .get_most_recent_record_before(user_id, start)
            .await?;
        let tail = self.store.get_records_after(user_id, start).await?;

        let mut chain: BTreeMap<NaiveDate, DailyLoadRecord> =
            tail.into_iter().map(|r| (r.date, r)).collect();
        chain.extend(changed);

        match &write {
            EntryWrite::None => {}
            EntryWrite::Insert(entry) => self.store.insert_manual_entry(entry).await?,
            EntryWrite::Update { updated, .. } => self.store.update_manual_entry(updated).await?,
            EntryWrite::Delete(entry) => self.store.delete_manual_entry(&entry.id).await?,
        }

        tracing::debug!(
            user_id,
            start = %start,
            anchor = ?anchor.as_ref().map(|a| a.date),
            days = chain.len(),
            "Walking load chain"
        );

        let result = self.walk(anchor, chain.into_values().collect()).await;
        if let Err(ref e) = result {
            if !e.leaves_stale_records() {
                // No day was rewritten, so put the entry back the way it was.
                self.undo_entry_write(user_id, write).await;
            }
        }
        result
    }

    /// Best-effort reversal of an entry write whose chain walk wrote nothing.
    async fn undo_entry_write(&self, user_id: &str, write: EntryWrite) {
        let undo = match &write {
            EntryWrite::None => return,
            EntryWrite::Insert(entry) => self.store.delete_manual_entry(&entry.id).await,
            EntryWrite::Update { previous, .. } => self.store.update_manual_entry(previous).await,
            EntryWrite::Delete(entry) => self.store.insert_manual_entry(entry).await,
        };
        if let Err(e) = undo {
            tracing::error!(
                user_id,
                error = %e,
                "Failed to undo manual entry change after aborted recalculation"
            );
        }
    }

    /// Run the calculator over `chain` (ascending) from `anchor`, persisting
    /// each record before moving to the next.
    async fn walk(
        &self,
        anchor: Option<DailyLoadRecord>,
        chain: Vec<DailyLoadRecord>,
    ) -> Result<CascadeReport> {
        let mut state = anchor
            .as_ref()
            .map(DailyLoadRecord::metrics)
            .unwrap_or_else(LoadMetrics::default);
        let mut report = CascadeReport {
            records: Vec::with_capacity(chain.len()),
        };

        for mut record in chain {
            let metrics = calculator::step(state, record.trimp);
            record.apply_metrics(metrics);

            if let Err(e) = self.store.upsert_record(&record).await {
                let Some(last) = report.records.last() else {
                    // Nothing in the chain was written yet.
                    return Err(e);
                };
                tracing::warn!(
                    user_id = %record.user_id,
                    last_updated = %last.date,
                    failed_at = %record.date,
                    error = %e,
                    "Cascade interrupted"
                );
                return Err(AppError::PartialCascade {
                    last_updated: last.date,
                    failed_at: record.date,
                    source_message: e.to_string(),
                });
            }

            state = metrics.carry();
            report.records.push(record);
        }

        Ok(report)
    }
}

/// TRIMP must be a finite, non-negative number.
pub fn validate_trimp(trimp: f64) -> Result<()> {
    if !trimp.is_finite() {
        return Err(AppError::Validation("TRIMP must be a number".to_string()));
    }
    if trimp < 0.0 {
        return Err(AppError::Validation(
            "TRIMP must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Activity names must be non-blank and reasonably short.
pub fn validate_activity_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(
            "Activity name is required".to_string(),
        ));
    }
    if name.chars().count() > MAX_ACTIVITY_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Activity name must be at most {} characters",
            MAX_ACTIVITY_NAME_LEN
        )));
    }
    Ok(())
}
