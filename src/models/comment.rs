use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{models::content::ContentRef, ranking::RecencyFormatter};

/// A comment attached to a post or a story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub student_id: i64,
    pub target: ContentRef,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub student_id: i64,
    pub target: ContentRef,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,
}

/// Comment joined with its author.
#[derive(Debug, Clone, FromRow)]
pub struct CommentView {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// DTO for displaying a comment with author info.
#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub time_ago: String,
}

impl CommentResponse {
    pub fn from_view(view: CommentView, recency: &RecencyFormatter, now: DateTime<Utc>) -> Self {
        Self {
            time_ago: recency.format(view.created_at, now),
            id: view.id,
            student_id: view.student_id,
            username: view.username,
            content: view.content,
            created_at: view.created_at,
        }
    }
}
