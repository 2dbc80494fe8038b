// src/ranking/popularity.rs

use serde::Serialize;

const LIKE_WEIGHT: u64 = 3;
const COMMENT_WEIGHT: u64 = 2;
const TAG_WEIGHT: u64 = 1;

/// Engagement collected by a post or a story at write time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementCounts {
    pub likes: u64,
    pub comments: u64,
    pub tagged: u64,
}

impl EngagementCounts {
    pub fn new(likes: u64, comments: u64, tagged: u64) -> Self {
        Self {
            likes,
            comments,
            tagged,
        }
    }
}

/// Popularity score stored on posts and stories.
///
/// `likes * 3 + comments * 2 + tagged`. Storage write paths call this right
/// before persisting a post or story; nothing recomputes it on read.
pub fn popularity_score(counts: EngagementCounts) -> i64 {
    let score = counts
        .likes
        .saturating_mul(LIKE_WEIGHT)
        .saturating_add(counts.comments.saturating_mul(COMMENT_WEIGHT))
        .saturating_add(counts.tagged.saturating_mul(TAG_WEIGHT));

    i64::try_from(score).unwrap_or(i64::MAX)
}

/// Activity totals for a single student, used by the leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StudentActivity {
    pub followers: u64,
    pub following: u64,
    /// Likes given by the student.
    pub likes: u64,
    /// Comments written by the student.
    pub comments: u64,
    pub posts: u64,
    pub stories: u64,
    pub featured_stories: u64,
}

/// Student popularity, derived on read.
pub fn student_popularity(activity: &StudentActivity) -> i64 {
    let weighted = [
        (activity.followers, 5),
        (activity.likes, 2),
        (activity.comments, 1),
        (activity.posts, 3),
        (activity.stories, 2),
        (activity.featured_stories, 4),
    ];

    let score = weighted
        .iter()
        .fold(0u64, |acc, (count, weight)| {
            acc.saturating_add(count.saturating_mul(*weight))
        });

    i64::try_from(score).unwrap_or(i64::MAX)
}
