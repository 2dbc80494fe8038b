use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::ranking::RecencyFormatter;

/// Represents the 'friend_requests' table: a pending follow of a private student.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FriendRequest {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sent_at: DateTime<Utc>,
}

/// A pending request joined with the student on the other side of it.
#[derive(Debug, Clone, FromRow)]
pub struct FriendRequestView {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub profile_photo: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestResponse {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub profile_photo: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub time_ago: String,
}

impl FriendRequestResponse {
    pub fn from_view(
        view: FriendRequestView,
        recency: &RecencyFormatter,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            time_ago: recency.format(Some(view.sent_at), now),
            id: view.id,
            student_id: view.student_id,
            username: view.username,
            profile_photo: view.profile_photo,
            sent_at: view.sent_at,
        }
    }
}
