// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use training_load_tracker::error::AppError;

async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_partial_cascade_response_names_stale_date() {
    let err = AppError::PartialCascade {
        last_updated: "2024-04-02".parse().unwrap(),
        failed_at: "2024-04-03".parse().unwrap(),
        source_message: "write timed out".to_string(),
    };
    assert!(err.leaves_stale_records());

    let (status, body) = body_json(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "partial_cascade_failure");
    assert!(body["details"].as_str().unwrap().contains("2024-04-03"));
}

#[tokio::test]
async fn test_database_error_hides_details() {
    let err = AppError::Database("connection reset by peer".to_string());
    assert!(!err.leaves_stale_records());

    let (status, body) = body_json(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "database_error");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_client_errors() {
    let (status, body) = body_json(AppError::Validation("bad".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "bad");

    let (status, _) = body_json(AppError::NotFound("Manual entry x".to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = body_json(AppError::InvalidToken).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
