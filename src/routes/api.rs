// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{DailyLoadRecord, ManualEntry};
use crate::services::calculator::FormStatus;
use crate::services::training_load::{CascadeReport, SyncDay};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Most days accepted in one sync request (a year, leap day included).
const MAX_SYNC_DAYS: usize = 366;

/// JSON body whose decode errors are reported as validation errors.
type JsonBody<T> = WithRejection<Json<T>, AppError>;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/loads", get(get_loads))
        .route("/api/loads/summary", get(get_summary))
        .route("/api/loads/recalculate", post(recalculate))
        .route("/api/sync", post(sync_days))
        .route("/api/entries", get(get_entries).post(create_entry))
        .route("/api/entries/{id}", put(update_entry).delete(delete_entry))
        .route("/api/data", delete(delete_data))
}

/// Parse a `YYYY-MM-DD` date supplied by the client.
fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!("'{}' must be a YYYY-MM-DD date", field))
    })
}

fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    value.map(|v| parse_date(field, v)).transpose()
}

/// Records rewritten by a mutation.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CascadeResponse {
    /// Dates rewritten, ascending
    pub updated_dates: Vec<NaiveDate>,
    /// The rewritten records, so charts can update without refetching
    pub records: Vec<DailyLoadRecord>,
}

impl From<CascadeReport> for CascadeResponse {
    fn from(report: CascadeReport) -> Self {
        Self {
            updated_dates: report.dates(),
            records: report.records,
        }
    }
}

// ─── Load Chain ──────────────────────────────────────────────

#[derive(Deserialize)]
struct LoadsQuery {
    /// Inclusive lower bound (YYYY-MM-DD)
    start: Option<String>,
    /// Inclusive upper bound (YYYY-MM-DD)
    end: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoadsResponse {
    pub records: Vec<DailyLoadRecord>,
}

/// Daily load records in date order, for charting.
async fn get_loads(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<LoadsQuery>,
) -> Result<Json<LoadsResponse>> {
    let start = parse_optional_date("start", params.start.as_deref())?;
    let end = parse_optional_date("end", params.end.as_deref())?;

    let records = state
        .load_service
        .list_records(&user.user_id, start, end)
        .await?;

    tracing::debug!(
        user_id = %user.user_id,
        count = records.len(),
        "Fetched load records"
    );

    Ok(Json(LoadsResponse { records }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SummaryResponse {
    /// Most recent record, if the user has any
    pub latest: Option<DailyLoadRecord>,
    /// Form classification of the latest TSB
    pub form: Option<FormStatus>,
}

async fn get_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SummaryResponse>> {
    let summary = state.load_service.summary(&user.user_id).await?;
    Ok(Json(SummaryResponse {
        latest: summary.latest,
        form: summary.form,
    }))
}

/// Rebuild the whole chain. Heals records left stale by a partial cascade.
async fn recalculate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CascadeResponse>> {
    tracing::info!(user_id = %user.user_id, "User-initiated recalculation");
    let report = state.load_service.recalculate(&user.user_id).await?;
    Ok(Json(report.into()))
}

// ─── Sync Ingestion ──────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct SyncDayRequest {
    date: String,
    #[validate(range(min = 0.0))]
    trimp: f64,
    #[serde(default)]
    #[validate(length(max = 1000))]
    activity_label: String,
}

#[derive(Deserialize, Validate)]
struct SyncRequest {
    #[validate(nested)]
    days: Vec<SyncDayRequest>,
}

/// Apply a sync run. Replaying the same run changes nothing.
async fn sync_days(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): JsonBody<SyncRequest>,
) -> Result<Json<CascadeResponse>> {
    if body.days.len() > MAX_SYNC_DAYS {
        return Err(AppError::Validation(format!(
            "At most {} days per sync request",
            MAX_SYNC_DAYS
        )));
    }
    body.validate()?;

    let days = body
        .days
        .into_iter()
        .map(|day| {
            Ok(SyncDay {
                date: parse_date("date", &day.date)?,
                trimp: day.trimp,
                activity_label: day.activity_label,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let report = state.load_service.sync_days(&user.user_id, &days).await?;
    Ok(Json(report.into()))
}

// ─── Manual Entries ──────────────────────────────────────────

#[derive(Deserialize)]
struct EntriesQuery {
    date: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EntriesResponse {
    pub entries: Vec<ManualEntry>,
}

async fn get_entries(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<EntriesQuery>,
) -> Result<Json<EntriesResponse>> {
    let date = parse_date("date", &params.date)?;
    let entries = state
        .load_service
        .list_manual_entries(&user.user_id, date)
        .await?;
    Ok(Json(EntriesResponse { entries }))
}

/// Body for creating or replacing a manual entry.
#[derive(Deserialize, Validate)]
struct EntryRequest {
    date: String,
    #[validate(range(min = 0.0))]
    trimp: f64,
    #[validate(length(min = 1, max = 200))]
    activity_name: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EntryResponse {
    pub entry: ManualEntry,
    pub cascade: CascadeResponse,
}

async fn create_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): JsonBody<EntryRequest>,
) -> Result<Json<EntryResponse>> {
    body.validate()?;
    let date = parse_date("date", &body.date)?;

    let result = state
        .load_service
        .add_manual_entry(&user.user_id, date, body.trimp, &body.activity_name)
        .await?;

    Ok(Json(EntryResponse {
        entry: result.entry,
        cascade: result.cascade.into(),
    }))
}

async fn update_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(entry_id): Path<String>,
    WithRejection(Json(body), _): JsonBody<EntryRequest>,
) -> Result<Json<EntryResponse>> {
    body.validate()?;
    let date = parse_date("date", &body.date)?;

    let result = state
        .load_service
        .edit_manual_entry(
            &user.user_id,
            &entry_id,
            date,
            body.trimp,
            &body.activity_name,
        )
        .await?;

    Ok(Json(EntryResponse {
        entry: result.entry,
        cascade: result.cascade.into(),
    }))
}

async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(entry_id): Path<String>,
) -> Result<Json<CascadeResponse>> {
    let report = state
        .load_service
        .delete_manual_entry(&user.user_id, &entry_id)
        .await?;
    Ok(Json(report.into()))
}

// ─── Data Deletion ───────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteDataResponse {
    pub success: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub deleted_count: usize,
}

/// Delete every record and manual entry the user owns.
async fn delete_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteDataResponse>> {
    tracing::info!(user_id = %user.user_id, "User-initiated data deletion");

    let deleted_count = state.load_service.delete_user_data(&user.user_id).await?;

    Ok(Json(DeleteDataResponse {
        success: true,
        deleted_count,
    }))
}
