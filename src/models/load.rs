// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Per-day training load record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::ManualEntry;
use crate::services::calculator::{DayMetrics, LoadMetrics};

/// Label stored for a day with no remaining contributions.
pub const REST_DAY_LABEL: &str = "Rest Day";

/// Separator between activity names in `activity_label`.
const LABEL_SEPARATOR: &str = ", ";

/// One day of a user's load chain.
///
/// Stored in the `daily_loads` collection, document ID `{user_id}_{date}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DailyLoadRecord {
    /// Owner of the record
    pub user_id: String,
    /// Calendar date (`YYYY-MM-DD`), unique per user
    pub date: NaiveDate,
    /// Total training impulse for the date
    pub trimp: f64,
    /// Comma-separated names of the contributing activities
    pub activity_label: String,
    /// Acute Training Load after this day
    pub atl: f64,
    /// Chronic Training Load after this day
    pub ctl: f64,
    /// Training Stress Balance entering this day
    pub tsb: f64,
    /// Portion of `trimp` contributed by the fitness-platform sync
    #[serde(default)]
    pub synced_trimp: f64,
    /// Activity names contributed by the sync
    #[serde(default)]
    pub synced_label: Option<String>,
}

impl DailyLoadRecord {
    /// A record with no metrics yet; the orchestrator fills them in before persisting.
    pub fn seed(user_id: &str, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            trimp: 0.0,
            activity_label: REST_DAY_LABEL.to_string(),
            atl: 0.0,
            ctl: 0.0,
            tsb: 0.0,
            synced_trimp: 0.0,
            synced_label: None,
        }
    }

    /// Firestore document ID for a user's date.
    pub fn document_id(user_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", urlencoding::encode(user_id), date)
    }

    /// Recurrence state carried into the next day.
    pub fn metrics(&self) -> LoadMetrics {
        LoadMetrics {
            atl: self.atl,
            ctl: self.ctl,
        }
    }

    pub fn apply_metrics(&mut self, metrics: DayMetrics) {
        self.atl = metrics.atl;
        self.ctl = metrics.ctl;
        self.tsb = metrics.tsb;
    }

    fn has_synced_contribution(&self) -> bool {
        self.synced_trimp > 0.0 || self.synced_label.is_some()
    }

    /// Add one activity to the day's totals.
    ///
    /// Prior activity names are kept; the rest-day sentinel is dropped.
    pub fn merge_activity(&mut self, trimp: f64, activity_name: &str) {
        self.trimp += trimp;
        self.activity_label = merge_label(&self.activity_label, activity_name);
    }

    /// Recompute the day's totals from its synced part and the manual entries
    /// that remain for the date.
    pub fn rebuild_totals(&mut self, entries: &[ManualEntry]) {
        let manual_trimp: f64 = entries.iter().map(|e| e.trimp).sum();
        self.trimp = self.synced_trimp + manual_trimp;

        let mut names: Vec<&str> = Vec::with_capacity(entries.len() + 1);
        if let Some(synced) = self.synced_label.as_deref() {
            names.extend(split_label(synced));
        }
        names.extend(entries.iter().map(|e| e.activity_name.trim()));

        if names.is_empty() && !self.has_synced_contribution() {
            self.trimp = 0.0;
            self.activity_label = REST_DAY_LABEL.to_string();
        } else {
            self.activity_label = join_label(names);
        }
    }
}

fn split_label(label: &str) -> impl Iterator<Item = &str> {
    label
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != REST_DAY_LABEL)
}

fn join_label<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let joined = names.into_iter().collect::<Vec<_>>().join(LABEL_SEPARATOR);
    if joined.is_empty() {
        REST_DAY_LABEL.to_string()
    } else {
        joined
    }
}

/// Append an activity name to an existing label, dropping the rest-day sentinel.
pub fn merge_label(existing: &str, activity_name: &str) -> String {
    join_label(split_label(existing).chain(split_label(activity_name)))
}
