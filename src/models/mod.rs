// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod load;
pub mod manual_entry;

pub use load::{DailyLoadRecord, REST_DAY_LABEL};
pub use manual_entry::ManualEntry;
