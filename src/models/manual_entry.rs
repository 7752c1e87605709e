// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Manually logged activity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One manually logged activity. Several may exist for the same date.
///
/// Stored in the `manual_entries` collection, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ManualEntry {
    /// UUID v4 (also used as document ID)
    pub id: String,
    /// Owner
    pub user_id: String,
    /// Date the activity counts toward
    pub date: NaiveDate,
    /// Training impulse of this activity
    pub trimp: f64,
    /// Activity name shown in the day's label
    pub activity_name: String,
    /// Creation timestamp (RFC3339); orders entries within a day
    pub created_at: String,
}

impl ManualEntry {
    pub fn new(user_id: &str, date: NaiveDate, trimp: f64, activity_name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            date,
            trimp,
            activity_name: activity_name.trim().to_string(),
            created_at: crate::time_utils::now_rfc3339(),
        }
    }
}

/// Order entries the way their names appear in a day's label.
pub fn sort_entries(entries: &mut [ManualEntry]) {
    entries.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
