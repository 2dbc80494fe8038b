use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::ranking::RecencyFormatter;

/// Represents the 'activity_logs' table: events addressed to a student.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ActivityLog {
    pub id: i64,
    pub student_id: i64,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub id: i64,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    pub time_ago: String,
}

impl LogResponse {
    pub fn from_log(log: ActivityLog, recency: &RecencyFormatter, now: DateTime<Utc>) -> Self {
        Self {
            time_ago: recency.format(Some(log.sent_at), now),
            id: log.id,
            message: log.message,
            sent_at: log.sent_at,
        }
    }
}

/// Logs older than one calendar month are hidden and purged.
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(1))
        .unwrap_or(now - TimeDelta::days(30))
}
