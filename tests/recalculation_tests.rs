// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recalculation tests.
//!
//! These tests run the full merge, anchor, write and cascade sequence against
//! the in-memory store and check that:
//! 1. Stored metrics match the recurrence, day by day
//! 2. Every later record is rewritten exactly once per mutation
//! 3. Failures either leave nothing behind or report where the chain went stale

use training_load_tracker::db::LoadStore;
use training_load_tracker::error::AppError;
use training_load_tracker::models::{DailyLoadRecord, REST_DAY_LABEL};
use training_load_tracker::services::calculator::{self, LoadMetrics};
use training_load_tracker::services::{SyncDay, TrainingLoadService};

mod common;
use common::{date, test_service};

const USER: &str = "user-1";

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

fn assert_metrics(record: &DailyLoadRecord, atl: f64, ctl: f64, tsb: f64) {
    assert_close(record.atl, atl, &format!("atl on {}", record.date));
    assert_close(record.ctl, ctl, &format!("ctl on {}", record.date));
    assert_close(record.tsb, tsb, &format!("tsb on {}", record.date));
}

async fn chain(service: &TrainingLoadService, user_id: &str) -> Vec<DailyLoadRecord> {
    service.list_records(user_id, None, None).await.unwrap()
}

/// The stored chain must equal a fresh replay of its own TRIMP values.
fn assert_chain_consistent(records: &[DailyLoadRecord]) {
    let expected = calculator::replay(LoadMetrics::default(), records.iter().map(|r| r.trimp));
    for (record, metrics) in records.iter().zip(expected) {
        assert_metrics(record, metrics.atl, metrics.ctl, metrics.tsb);
    }
}

#[tokio::test]
async fn test_insert_then_edit_earlier_day() {
    let (service, _store) = test_service();

    let first = service
        .add_manual_entry(USER, date("2024-03-01"), 50.0, "Run")
        .await
        .unwrap();
    let day1 = &first.cascade.records[0];
    assert_metrics(day1, 7.14, 1.19, 0.0);

    let second = service
        .add_manual_entry(USER, date("2024-03-02"), 80.0, "Ride")
        .await
        .unwrap();
    assert_metrics(&second.cascade.records[0], 17.55, 3.07, -5.95);

    let edited = service
        .edit_manual_entry(USER, &first.entry.id, date("2024-03-01"), 30.0, "Run")
        .await
        .unwrap();
    assert_eq!(
        edited.cascade.dates(),
        vec![date("2024-03-01"), date("2024-03-02")]
    );

    let records = chain(&service, USER).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].trimp, 30.0);
    assert_metrics(&records[0], 4.29, 0.71, 0.0);
    // 4.29 + (80 - 4.29) / 7 = 15.105714..., which rounds up
    assert_metrics(&records[1], 15.11, 2.6, -3.58);
}

#[tokio::test]
async fn test_cascade_rewrites_every_later_record_once() {
    let (service, store) = test_service();
    for (day, trimp) in [
        ("2024-01-01", 40.0),
        ("2024-01-02", 60.0),
        ("2024-01-03", 20.0),
        ("2024-01-04", 90.0),
        ("2024-01-05", 10.0),
    ] {
        service
            .add_manual_entry(USER, date(day), trimp, "Session")
            .await
            .unwrap();
    }
    store.take_write_log();

    let result = service
        .add_manual_entry(USER, date("2024-01-02"), 25.0, "Strides")
        .await
        .unwrap();

    // Three records after the changed day, so four writes
    let expected = vec![
        date("2024-01-02"),
        date("2024-01-03"),
        date("2024-01-04"),
        date("2024-01-05"),
    ];
    assert_eq!(store.take_write_log(), expected);
    assert_eq!(result.cascade.dates(), expected);

    let records = chain(&service, USER).await;
    assert_eq!(records[1].trimp, 85.0);
    assert_eq!(records[1].activity_label, "Session, Strides");
    assert_chain_consistent(&records);
}

#[tokio::test]
async fn test_deleting_last_entry_leaves_rest_day() {
    let (service, _store) = test_service();
    let run = service
        .add_manual_entry(USER, date("2024-05-01"), 50.0, "Run")
        .await
        .unwrap();
    service
        .add_manual_entry(USER, date("2024-05-02"), 80.0, "Ride")
        .await
        .unwrap();

    let cascade = service
        .delete_manual_entry(USER, &run.entry.id)
        .await
        .unwrap();
    assert_eq!(cascade.persisted_count(), 2);

    let records = chain(&service, USER).await;
    assert_eq!(records.len(), 2, "rest day must stay in the chain");
    assert_eq!(records[0].trimp, 0.0);
    assert_eq!(records[0].activity_label, REST_DAY_LABEL);
    assert_metrics(&records[0], 0.0, 0.0, 0.0);
    assert_metrics(&records[1], 11.43, 1.9, 0.0);

    assert!(service
        .list_manual_entries(USER, date("2024-05-01"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_earliest_record_uses_zero_anchor() {
    let (service, _store) = test_service();
    service
        .add_manual_entry(USER, date("2024-01-10"), 42.0, "Run")
        .await
        .unwrap();
    assert_metrics(&chain(&service, USER).await[0], 6.0, 1.0, 0.0);

    // A new first day starts from zero and pushes the old one down the chain
    service
        .add_manual_entry(USER, date("2024-01-05"), 21.0, "Swim")
        .await
        .unwrap();

    let records = chain(&service, USER).await;
    assert_metrics(&records[0], 3.0, 0.5, 0.0);
    assert_metrics(&records[1], 8.57, 1.49, -2.5);
}

#[tokio::test]
async fn test_gap_days_are_not_decayed() {
    let (service, _store) = test_service();
    service
        .add_manual_entry(USER, date("2024-01-01"), 50.0, "Run")
        .await
        .unwrap();
    service
        .add_manual_entry(USER, date("2024-01-08"), 70.0, "Run")
        .await
        .unwrap();

    let records = chain(&service, USER).await;
    let expected = calculator::step(records[0].metrics(), 70.0);
    assert_metrics(&records[1], expected.atl, expected.ctl, expected.tsb);
    assert_close(records[1].tsb, -5.95, "tsb from the anchor a week earlier");
}

#[tokio::test]
async fn test_moving_entry_later_rebuilds_both_dates() {
    let (service, store) = test_service();
    let moved = service
        .add_manual_entry(USER, date("2024-02-01"), 50.0, "Long Run")
        .await
        .unwrap();
    service
        .add_manual_entry(USER, date("2024-02-02"), 80.0, "Ride")
        .await
        .unwrap();
    service
        .add_manual_entry(USER, date("2024-02-03"), 60.0, "Swim")
        .await
        .unwrap();
    store.take_write_log();

    service
        .edit_manual_entry(USER, &moved.entry.id, date("2024-02-04"), 40.0, "Long Run")
        .await
        .unwrap();

    assert_eq!(
        store.take_write_log(),
        vec![
            date("2024-02-01"),
            date("2024-02-02"),
            date("2024-02-03"),
            date("2024-02-04"),
        ]
    );

    let records = chain(&service, USER).await;
    let trimps: Vec<f64> = records.iter().map(|r| r.trimp).collect();
    assert_eq!(trimps, vec![0.0, 80.0, 60.0, 40.0]);
    assert_eq!(records[0].activity_label, REST_DAY_LABEL);
    assert_eq!(records[3].activity_label, "Long Run");
    assert_chain_consistent(&records);
}

#[tokio::test]
async fn test_moving_entry_earlier_starts_walk_at_new_date() {
    let (service, store) = test_service();
    service
        .add_manual_entry(USER, date("2024-02-01"), 50.0, "Run")
        .await
        .unwrap();
    let moved = service
        .add_manual_entry(USER, date("2024-02-03"), 60.0, "Swim")
        .await
        .unwrap();
    store.take_write_log();

    let result = service
        .edit_manual_entry(USER, &moved.entry.id, date("2024-01-31"), 60.0, "Swim")
        .await
        .unwrap();

    assert_eq!(
        result.cascade.dates(),
        vec![date("2024-01-31"), date("2024-02-01"), date("2024-02-03")]
    );
    assert_eq!(result.entry.date, date("2024-01-31"));

    let records = chain(&service, USER).await;
    assert_eq!(records[2].trimp, 0.0);
    assert_eq!(records[2].activity_label, REST_DAY_LABEL);
    assert_chain_consistent(&records);
}

#[tokio::test]
async fn test_unknown_or_foreign_entry_is_not_found() {
    let (service, store) = test_service();
    let entry = service
        .add_manual_entry("alice", date("2024-01-01"), 30.0, "Run")
        .await
        .unwrap()
        .entry;
    store.take_write_log();

    let err = service
        .delete_manual_entry("alice", "no-such-entry")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = service.delete_manual_entry("bob", &entry.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = service
        .edit_manual_entry("bob", &entry.id, date("2024-01-01"), 1.0, "Walk")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert!(store.take_write_log().is_empty());
    assert_eq!(chain(&service, "alice").await[0].trimp, 30.0);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_any_write() {
    let (service, store) = test_service();

    let err = service
        .add_manual_entry(USER, date("2024-01-01"), -5.0, "Run")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service
        .add_manual_entry(USER, date("2024-01-01"), 5.0, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service
        .upsert_day(USER, date("2024-01-01"), f64::NAN, "Run")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(store.take_write_log().is_empty());
}

#[tokio::test]
async fn test_failure_mid_cascade_reports_stale_range() {
    let (service, store) = test_service();
    let first = service
        .add_manual_entry(USER, date("2024-04-01"), 50.0, "Run")
        .await
        .unwrap();
    for (day, trimp) in [("2024-04-02", 80.0), ("2024-04-03", 60.0), ("2024-04-04", 30.0)] {
        service
            .add_manual_entry(USER, date(day), trimp, "Ride")
            .await
            .unwrap();
    }
    let before = chain(&service, USER).await;

    store.fail_record_write(USER, date("2024-04-03"));
    let err = service
        .edit_manual_entry(USER, &first.entry.id, date("2024-04-01"), 10.0, "Run")
        .await
        .unwrap_err();

    match err {
        AppError::PartialCascade {
            last_updated,
            failed_at,
            ..
        } => {
            assert_eq!(last_updated, date("2024-04-02"));
            assert_eq!(failed_at, date("2024-04-03"));
        }
        other => panic!("expected PartialCascade, got {:?}", other),
    }

    let after = chain(&service, USER).await;
    assert_eq!(after[0].trimp, 10.0);
    assert_chain_consistent(&after[..2]);
    assert_eq!(after[2], before[2], "failed record keeps its old values");
    assert_eq!(after[3], before[3], "records after the failure are untouched");

    // A full recalculation heals the chain
    store.clear_faults();
    let report = service.recalculate(USER).await.unwrap();
    assert_eq!(report.persisted_count(), 4);
    assert_chain_consistent(&chain(&service, USER).await);
}

#[tokio::test]
async fn test_failure_on_first_write_leaves_nothing_behind() {
    let (service, store) = test_service();
    service
        .add_manual_entry(USER, date("2024-04-01"), 50.0, "Run")
        .await
        .unwrap();
    let before = chain(&service, USER).await;

    store.fail_record_write(USER, date("2024-04-02"));
    let err = service
        .add_manual_entry(USER, date("2024-04-02"), 80.0, "Ride")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    // The entry insert is rolled back along with the aborted walk
    assert!(service
        .list_manual_entries(USER, date("2024-04-02"))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(chain(&service, USER).await, before);
}

#[tokio::test]
async fn test_failed_delete_restores_entry() {
    let (service, store) = test_service();
    let entry = service
        .add_manual_entry(USER, date("2024-04-01"), 50.0, "Run")
        .await
        .unwrap()
        .entry;

    store.fail_record_write(USER, date("2024-04-01"));
    let err = service
        .delete_manual_entry(USER, &entry.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    store.clear_faults();
    assert_eq!(
        store.get_manual_entry(&entry.id).await.unwrap(),
        Some(entry)
    );
}

#[tokio::test]
async fn test_read_failure_aborts_without_writes() {
    let (service, store) = test_service();
    service
        .add_manual_entry(USER, date("2024-04-01"), 50.0, "Run")
        .await
        .unwrap();
    store.take_write_log();

    store.fail_reads(true);
    let err = service
        .add_manual_entry(USER, date("2024-04-02"), 80.0, "Ride")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert!(store.take_write_log().is_empty());

    store.fail_reads(false);
    assert_eq!(chain(&service, USER).await.len(), 1);
}

#[tokio::test]
async fn test_replaying_sync_run_changes_nothing() {
    let (service, store) = test_service();
    service
        .add_manual_entry(USER, date("2024-06-02"), 15.0, "Yoga")
        .await
        .unwrap();

    let run = vec![
        SyncDay {
            date: date("2024-06-01"),
            trimp: 55.0,
            activity_label: "Morning Ride".to_string(),
        },
        SyncDay {
            date: date("2024-06-02"),
            trimp: 70.0,
            activity_label: "Tempo Run".to_string(),
        },
        SyncDay {
            date: date("2024-06-03"),
            trimp: 0.0,
            activity_label: String::new(),
        },
    ];

    service.sync_days(USER, &run).await.unwrap();
    let first = chain(&service, USER).await;
    assert_eq!(first[1].trimp, 85.0);
    assert_eq!(first[1].activity_label, "Tempo Run, Yoga");
    assert_eq!(first[2].activity_label, REST_DAY_LABEL);
    assert_chain_consistent(&first);

    service.sync_days(USER, &run).await.unwrap();
    assert_eq!(chain(&service, USER).await, first);

    service.recalculate(USER).await.unwrap();
    assert_eq!(chain(&service, USER).await, first);

    // Only the walk from the earliest synced date was written
    let writes = store.take_write_log();
    assert!(writes.iter().all(|d| *d >= date("2024-06-01")));
}

#[tokio::test]
async fn test_sync_run_with_duplicate_dates_is_rejected() {
    let (service, store) = test_service();
    let day = SyncDay {
        date: date("2024-06-01"),
        trimp: 10.0,
        activity_label: "Ride".to_string(),
    };

    let err = service
        .sync_days(USER, &[day.clone(), day])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.take_write_log().is_empty());
}

#[tokio::test]
async fn test_sync_day_with_load_needs_a_label() {
    let (service, store) = test_service();

    for label in ["", "  ", REST_DAY_LABEL] {
        let day = SyncDay {
            date: date("2024-06-01"),
            trimp: 55.0,
            activity_label: label.to_string(),
        };
        let err = service.sync_days(USER, &[day]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "label {:?}", label);
    }

    assert!(store.take_write_log().is_empty());
    assert!(chain(&service, USER).await.is_empty());
}

#[tokio::test]
async fn test_upserted_contribution_survives_entry_delete() {
    let (service, _store) = test_service();
    service
        .upsert_day(USER, date("2024-07-01"), 30.0, "Ride")
        .await
        .unwrap();
    let yoga = service
        .add_manual_entry(USER, date("2024-07-01"), 20.0, "Yoga")
        .await
        .unwrap();

    let records = chain(&service, USER).await;
    assert_eq!(records[0].trimp, 50.0);
    assert_eq!(records[0].activity_label, "Ride, Yoga");

    service
        .delete_manual_entry(USER, &yoga.entry.id)
        .await
        .unwrap();

    let records = chain(&service, USER).await;
    assert_eq!(records[0].trimp, 30.0);
    assert_eq!(records[0].activity_label, "Ride");
    assert_chain_consistent(&records);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_for_one_user_are_serialized() {
    let (service, store) = test_service();
    // Suspend between every read and write so unserialized walks interleave
    store.yield_between_calls(true);

    let mut handles = vec![];
    for i in 0..20u32 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            // Out-of-order dates so most inserts cascade over earlier ones
            let day = 1 + (i * 7) % 10;
            let date = date(&format!("2024-08-{:02}", day));
            service
                .add_manual_entry(USER, date, 10.0 + i as f64, &format!("Session {}", i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = chain(&service, USER).await;
    assert_eq!(records.len(), 10);
    let total: f64 = records.iter().map(|r| r.trimp).sum();
    assert_close(total, (0..20).map(|i| 10.0 + i as f64).sum(), "total trimp");
    assert_chain_consistent(&records);
}

#[tokio::test]
async fn test_users_have_independent_chains() {
    let (service, _store) = test_service();
    service
        .add_manual_entry("alice", date("2024-01-01"), 50.0, "Run")
        .await
        .unwrap();
    service
        .add_manual_entry("bob", date("2024-01-02"), 80.0, "Ride")
        .await
        .unwrap();

    let bob = chain(&service, "bob").await;
    assert_eq!(bob.len(), 1);
    // Alice's earlier day is not Bob's anchor
    assert_metrics(&bob[0], 11.43, 1.9, 0.0);

    assert_eq!(service.delete_user_data("alice").await.unwrap(), 2);
    assert!(chain(&service, "alice").await.is_empty());
    assert_eq!(chain(&service, "bob").await, bob);
}
