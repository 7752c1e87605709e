// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Load metric calculator.
//!
//! One step of the ATL/CTL recurrence:
//! - ATL: exponentially weighted average of TRIMP, 7-day time constant
//! - CTL: same with a 42-day time constant
//! - TSB: `ctl - atl` of the anchor, i.e. form going *into* the day
//!
//! Every output is rounded to two decimals, and the rounded values are what
//! the next step starts from.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// ATL time constant (days).
pub const ATL_TIME_CONSTANT: f64 = 7.0;

/// CTL time constant (days).
pub const CTL_TIME_CONSTANT: f64 = 42.0;

/// Recurrence state carried from one day to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub atl: f64,
    pub ctl: f64,
}

/// Metrics stored for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DayMetrics {
    pub atl: f64,
    pub ctl: f64,
    pub tsb: f64,
}

impl DayMetrics {
    pub fn carry(self) -> LoadMetrics {
        LoadMetrics {
            atl: self.atl,
            ctl: self.ctl,
        }
    }
}

/// Compute one day's metrics from the anchor's metrics and the day's TRIMP.
pub fn step(previous: LoadMetrics, today_trimp: f64) -> DayMetrics {
    DayMetrics {
        atl: round2(previous.atl + (today_trimp - previous.atl) / ATL_TIME_CONSTANT),
        ctl: round2(previous.ctl + (today_trimp - previous.ctl) / CTL_TIME_CONSTANT),
        tsb: round2(previous.ctl - previous.atl),
    }
}

/// Fold `step` over a sequence of daily TRIMP values.
pub fn replay(anchor: LoadMetrics, trimps: impl IntoIterator<Item = f64>) -> Vec<DayMetrics> {
    let mut state = anchor;
    trimps
        .into_iter()
        .map(|trimp| {
            let day = step(state, trimp);
            state = day.carry();
            day
        })
        .collect()
}

/// Round to two decimal places (storage precision).
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid storing -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Interpretation of a TSB value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    /// TSB below -10: accumulated fatigue well above fitness
    Overreaching,
    /// TSB in [-10, 0): building fitness
    Productive,
    /// TSB in [0, 10]: rested
    Fresh,
    /// TSB above 10: load too low to hold fitness
    Detraining,
}

impl FormStatus {
    pub fn from_tsb(tsb: f64) -> Self {
        if tsb < -10.0 {
            FormStatus::Overreaching
        } else if tsb < 0.0 {
            FormStatus::Productive
        } else if tsb <= 10.0 {
            FormStatus::Fresh
        } else {
            FormStatus::Detraining
        }
    }
}
