// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Daily load records (one document per user and date)
//! - Manual entries (one document per logged activity)

use crate::db::{collections, LoadStore};
use crate::error::{AppError, Result};
use crate::models::manual_entry::sort_entries;
use crate::models::{DailyLoadRecord, ManualEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use firestore::FirestoreQueryDirection;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // The emulator rejects real credentials, so skip the credential lookup entirely.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Query daily load records for a user with an optional extra date filter.
    async fn query_records(
        &self,
        user_id: &str,
        date_filter: DateFilter,
        direction: FirestoreQueryDirection,
        limit: Option<u32>,
    ) -> Result<Vec<DailyLoadRecord>> {
        let user_id = user_id.to_string();
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::DAILY_LOADS)
            .filter(move |q| {
                let (lower, upper) = match &date_filter {
                    DateFilter::After(d) => (Some(q.field("date").greater_than(d.to_string())), None),
                    DateFilter::Before(d) => (None, Some(q.field("date").less_than(d.to_string()))),
                    DateFilter::Between(start, end) => (
                        start.map(|d| q.field("date").greater_than_or_equal(d.to_string())),
                        end.map(|d| q.field("date").less_than_or_equal(d.to_string())),
                    ),
                };
                q.for_all([q.field("user_id").eq(user_id.clone()), lower.flatten(), upper.flatten()])
            })
            .order_by([("date", direction)]);

        let query = match limit {
            Some(limit) => query.limit(limit),
            None => query,
        };

        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(&self, items: &[T], collection: &str, id_extractor: F) -> Result<()>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Date constraint applied on top of the per-user filter.
#[derive(Clone, Copy)]
enum DateFilter {
    After(NaiveDate),
    Before(NaiveDate),
    Between(Option<NaiveDate>, Option<NaiveDate>),
}

#[async_trait]
impl LoadStore for FirestoreDb {
    // ─── Daily Load Operations ──────────────────────────────────

    async fn get_record(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyLoadRecord>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::DAILY_LOADS)
            .obj()
            .one(&DailyLoadRecord::document_id(user_id, date))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_records_after(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<DailyLoadRecord>> {
        self.query_records(
            user_id,
            DateFilter::After(date),
            FirestoreQueryDirection::Ascending,
            None,
        )
        .await
    }

    async fn get_most_recent_record_before(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyLoadRecord>> {
        let mut records = self
            .query_records(
                user_id,
                DateFilter::Before(date),
                FirestoreQueryDirection::Descending,
                Some(1),
            )
            .await?;
        Ok(records.pop())
    }

    async fn get_records_between(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyLoadRecord>> {
        self.query_records(
            user_id,
            DateFilter::Between(start, end),
            FirestoreQueryDirection::Ascending,
            None,
        )
        .await
    }

    async fn get_latest_record(&self, user_id: &str) -> Result<Option<DailyLoadRecord>> {
        let mut records = self
            .query_records(
                user_id,
                DateFilter::Between(None, None),
                FirestoreQueryDirection::Descending,
                Some(1),
            )
            .await?;
        Ok(records.pop())
    }

    async fn upsert_record(&self, record: &DailyLoadRecord) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::DAILY_LOADS)
            .document_id(DailyLoadRecord::document_id(&record.user_id, record.date))
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Manual Entry Operations ─────────────────────────────────

    async fn list_manual_entries(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ManualEntry>> {
        let user_id = user_id.to_string();
        let date = date.to_string();
        let mut entries: Vec<ManualEntry> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::MANUAL_ENTRIES)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("date").eq(date.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Sorted client-side to avoid another composite index; a day holds few entries.
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn get_manual_entry(&self, entry_id: &str) -> Result<Option<ManualEntry>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::MANUAL_ENTRIES)
            .obj()
            .one(entry_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn insert_manual_entry(&self, entry: &ManualEntry) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::MANUAL_ENTRIES)
            .document_id(&entry.id)
            .object(entry)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_manual_entry(&self, entry: &ManualEntry) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MANUAL_ENTRIES)
            .document_id(&entry.id)
            .object(entry)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_manual_entry(&self, entry_id: &str) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::MANUAL_ENTRIES)
            .document_id(entry_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Bulk Data Wipe ──────────────────────────────────────────

    async fn delete_user_data(&self, user_id: &str) -> Result<usize> {
        let mut deleted_count = 0;

        // 1. Manual entries
        let owner = user_id.to_string();
        let entries: Vec<ManualEntry> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::MANUAL_ENTRIES)
            .filter(move |q| q.for_all([q.field("user_id").eq(owner.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = entries.len();
        self.batch_delete(&entries, collections::MANUAL_ENTRIES, |entry: &ManualEntry| {
            entry.id.clone()
        })
        .await?;

        deleted_count += count;
        tracing::debug!(user_id, count, "Deleted manual entries");

        // 2. Daily load records
        let records = self.get_records_between(user_id, None, None).await?;

        let count = records.len();
        self.batch_delete(
            &records,
            collections::DAILY_LOADS,
            |record: &DailyLoadRecord| DailyLoadRecord::document_id(&record.user_id, record.date),
        )
        .await?;

        deleted_count += count;
        tracing::debug!(user_id, count, "Deleted daily load records");

        tracing::info!(user_id, deleted_count, "User data deletion complete");

        Ok(deleted_count)
    }
}
