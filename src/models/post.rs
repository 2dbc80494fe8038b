use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    ranking::{EngagementCounts, RecencyFormatter},
    utils::html::validate_media_urls,
};

/// A post as read back from storage, joined with its author and counts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub student_id: i64,
    pub author_username: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub photos: Vec<String>,
    pub tagged_usernames: Vec<String>,

    pub like_count: i64,
    pub comment_count: i64,

    /// Denormalized; rewritten by the store on every post write.
    pub popularity_score: i64,

    pub is_active: bool,
    pub is_deleted: bool,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn engagement(&self) -> EngagementCounts {
        EngagementCounts::new(
            self.like_count.max(0) as u64,
            self.comment_count.max(0) as u64,
            self.tagged_usernames.len() as u64,
        )
    }

    /// Active and not soft-deleted.
    pub fn is_visible(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

/// Insert payload. Tagged students are already resolved to ids.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub student_id: i64,
    pub description: Option<String>,
    pub location: Option<String>,
    pub photos: Vec<String>,
    pub tagged_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// Partial update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub description: Option<String>,
    pub location: Option<String>,
    pub photos: Option<Vec<String>>,
    pub tagged_ids: Option<Vec<i64>>,
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(max = 2200, message = "Description must be at most 2200 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,

    #[validate(
        length(min = 1, max = 10, message = "A post needs between 1 and 10 photos"),
        custom(function = validate_media_urls)
    )]
    pub photos: Vec<String>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 students can be tagged"))]
    pub tagged_usernames: Vec<String>,
}

/// DTO for editing a post.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(max = 2200, message = "Description must be at most 2200 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,

    #[validate(
        length(min = 1, max = 10, message = "A post needs between 1 and 10 photos"),
        custom(function = validate_media_urls)
    )]
    pub photos: Option<Vec<String>>,

    #[validate(length(max = 20, message = "At most 20 students can be tagged"))]
    pub tagged_usernames: Option<Vec<String>>,
}

/// Query parameters for the home feed.
#[derive(Debug, Deserialize)]
pub struct FeedParams {
    /// Zero-based page index.
    pub page: Option<i64>,
    /// Page size (default: 10, max: 50).
    pub size: Option<i64>,
}

impl FeedParams {
    pub fn limit_offset(&self) -> (i64, i64) {
        let size = self.size.unwrap_or(10).clamp(1, 50);
        let page = self.page.unwrap_or(0).max(0);
        (size, page.saturating_mul(size))
    }
}

/// Query parameters for popularity rankings.
#[derive(Debug, Deserialize)]
pub struct PopularParams {
    pub limit: Option<i64>,
}

/// Outward-facing post representation.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub photos: Vec<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub tagged_usernames: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub popularity_score: i64,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub time_ago: String,
}

impl PostResponse {
    pub fn from_post(post: Post, recency: &RecencyFormatter, now: DateTime<Utc>) -> Self {
        Self {
            time_ago: recency.format(post.created_at, now),
            id: post.id,
            student_id: post.student_id,
            username: post.author_username,
            photos: post.photos,
            description: post.description,
            location: post.location,
            tagged_usernames: post.tagged_usernames,
            like_count: post.like_count,
            comment_count: post.comment_count,
            popularity_score: post.popularity_score,
            is_active: post.is_active,
            created_at: post.created_at,
        }
    }
}
