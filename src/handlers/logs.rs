// src/handlers/logs.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::activity_log::{LogResponse, retention_cutoff},
    ranking::RecencyFormatter,
    store::{LogStore, SharedStore, Store},
    utils::jwt::Claims,
};

/// Writes an activity log addressed to `student_id`.
///
/// The triggering action has already succeeded, so a failed write is only
/// reported.
pub async fn record_activity(
    store: &dyn Store,
    student_id: i64,
    message: String,
    now: DateTime<Utc>,
) {
    if let Err(e) = store.insert_log(student_id, message, now).await {
        tracing::warn!("Failed to record activity for student {}: {}", student_id, e);
    }
}

/// Own activity logs from the last month, newest first.
pub async fn list_logs(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let now = Utc::now();

    let logs = store.list_logs(student_id, retention_cutoff(now)).await?;

    let response: Vec<LogResponse> = logs
        .into_iter()
        .map(|log| LogResponse::from_log(log, &recency, now))
        .collect();

    Ok(Json(response))
}

pub async fn delete_log(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;

    if !store.delete_log(student_id, id).await? {
        return Err(AppError::NotFound("Log not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
