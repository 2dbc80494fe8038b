use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    ranking::{EngagementCounts, RecencyFormatter},
    utils::html::validate_media_url,
};

/// Stories disappear from feeds this long after creation.
pub const STORY_LIFETIME_HOURS: i64 = 24;

/// Represents a story joined with its author and engagement counts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub student_id: i64,
    pub author_username: String,
    pub photo: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_featured: bool,
    pub is_active: bool,
    /// Same weighting as posts, without tags.
    pub score: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
}

impl Story {
    /// Active and not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    pub fn engagement(&self) -> EngagementCounts {
        EngagementCounts::new(
            self.like_count.max(0) as u64,
            self.comment_count.max(0) as u64,
            0,
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewStory {
    pub student_id: i64,
    pub photo: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewStory {
    pub fn new(student_id: i64, photo: String, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            photo,
            created_at: now,
            expires_at: now + TimeDelta::hours(STORY_LIFETIME_HOURS),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStoryRequest {
    #[validate(custom(function = validate_media_url))]
    pub photo: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtendStoryRequest {
    #[validate(range(min = 1, max = 24, message = "Stories can be extended by 1 to 24 hours"))]
    pub hours: i64,
}

#[derive(Debug, Serialize)]
pub struct StoryResponse {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub photo: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_featured: bool,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub score: i64,
    pub time_ago: String,
}

impl StoryResponse {
    pub fn from_story(story: Story, recency: &RecencyFormatter, now: DateTime<Utc>) -> Self {
        Self {
            time_ago: recency.format(Some(story.created_at), now),
            id: story.id,
            student_id: story.student_id,
            username: story.author_username,
            photo: story.photo,
            created_at: story.created_at,
            expires_at: story.expires_at,
            is_featured: story.is_featured,
            like_count: story.like_count,
            comment_count: story.comment_count,
            view_count: story.view_count,
            score: story.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn story(now: DateTime<Utc>) -> Story {
        let new = NewStory::new(1, "https://cdn.campus.test/s.jpg".to_string(), now);
        Story {
            id: 1,
            student_id: 1,
            author_username: "ada".to_string(),
            photo: new.photo,
            created_at: new.created_at,
            expires_at: new.expires_at,
            is_featured: false,
            is_active: true,
            score: 0,
            like_count: 0,
            comment_count: 0,
            view_count: 0,
        }
    }

    #[test]
    fn live_for_a_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let s = story(now);
        assert!(s.is_live(now + TimeDelta::hours(23)));
        assert!(!s.is_live(now + TimeDelta::hours(24)));
    }

    #[test]
    fn inactive_story_is_not_live() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut s = story(now);
        s.is_active = false;
        assert!(!s.is_live(now));
    }
}
