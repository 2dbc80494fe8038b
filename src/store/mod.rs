//! Persistence boundary.
//!
//! Handlers only see these traits. Every implementation must recompute the
//! stored popularity score of a post (and the score of a story) inside the
//! same write that changes it: creating, editing, deleting or archiving it,
//! toggling a like, adding or removing a comment, and the engagement cleanup
//! done by a block.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        activity_log::ActivityLog,
        comment::{Comment, CommentView, NewComment},
        content::ContentRef,
        friend_request::{FriendRequest, FriendRequestView},
        post::{NewPost, Post, PostChanges},
        story::{NewStory, Story},
        student::{NewStudent, RelatedStudent, Student, UpdateProfileRequest},
    },
    ranking::StudentActivity,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle stored in the application state.
pub type SharedStore = Arc<dyn Store>;

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn create_student(&self, new: NewStudent) -> Result<Student, AppError>;

    async fn find_student(&self, id: i64) -> Result<Option<Student>, AppError>;

    async fn find_student_by_username(&self, username: &str) -> Result<Option<Student>, AppError>;

    async fn update_profile(
        &self,
        id: i64,
        changes: &UpdateProfileRequest,
    ) -> Result<Student, AppError>;

    /// Active, non-deleted students.
    async fn list_active_students(&self) -> Result<Vec<Student>, AppError>;

    /// Totals feeding the student popularity formula.
    async fn student_activity(&self, id: i64) -> Result<StudentActivity, AppError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Scores the post from its tag count before inserting it.
    async fn insert_post(&self, new: NewPost) -> Result<Post, AppError>;

    /// Applies the changes and rescores in the same write.
    async fn update_post(&self, id: i64, changes: PostChanges) -> Result<Post, AppError>;

    /// Returns soft-deleted posts too; callers decide visibility.
    async fn find_post(&self, id: i64) -> Result<Option<Post>, AppError>;

    async fn soft_delete_post(&self, id: i64) -> Result<(), AppError>;

    /// Archive (`false`) or restore (`true`).
    async fn set_post_active(&self, id: i64, active: bool) -> Result<(), AppError>;

    /// Visible posts of the given authors, newest first.
    async fn list_feed_posts(
        &self,
        author_ids: &[i64],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError>;

    /// Visible posts of one student, newest first.
    async fn list_student_posts(&self, student_id: i64) -> Result<Vec<Post>, AppError>;

    /// Visible posts of public, active students not blocked with the viewer,
    /// highest popularity score first.
    async fn list_popular_posts(&self, viewer_id: i64, limit: i64) -> Result<Vec<Post>, AppError>;

    /// Re-applies the scorer to every post; returns how many were written.
    async fn rescore_all_posts(&self) -> Result<u64, AppError>;
}

#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn insert_story(&self, new: NewStory) -> Result<Story, AppError>;

    async fn find_story(&self, id: i64) -> Result<Option<Story>, AppError>;

    async fn delete_story(&self, id: i64) -> Result<(), AppError>;

    async fn extend_story(&self, id: i64, hours: i64) -> Result<Story, AppError>;

    async fn feature_story(&self, id: i64) -> Result<Story, AppError>;

    /// Idempotent per viewer.
    async fn record_story_view(&self, story_id: i64, viewer_id: i64) -> Result<(), AppError>;

    /// Live stories of the given authors, newest first.
    async fn list_live_stories(
        &self,
        author_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<Story>, AppError>;

    async fn list_featured_stories(&self, student_id: i64) -> Result<Vec<Story>, AppError>;

    /// Live stories of public students not blocked with the viewer, by score.
    async fn list_popular_stories(
        &self,
        viewer_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Story>, AppError>;

    /// Deactivates expired, non-featured stories; returns how many changed.
    async fn archive_expired_stories(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Likes or unlikes; returns the new state (`true` = liked).
    async fn toggle_like(
        &self,
        student_id: i64,
        target: ContentRef,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn insert_comment(&self, new: NewComment) -> Result<Comment, AppError>;

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError>;

    async fn delete_comment(&self, id: i64) -> Result<(), AppError>;

    /// Oldest first.
    async fn list_comments(&self, target: ContentRef) -> Result<Vec<CommentView>, AppError>;
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Fails with `Conflict` when already following.
    async fn follow(
        &self,
        follower_id: i64,
        followed_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Returns whether a relation was removed.
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool, AppError>;

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool, AppError>;

    async fn followers(&self, student_id: i64) -> Result<Vec<RelatedStudent>, AppError>;

    async fn following(&self, student_id: i64) -> Result<Vec<RelatedStudent>, AppError>;

    /// Records the block, drops follows and pending friend requests in both
    /// directions and removes each side's likes and comments on the other's
    /// posts and stories, rescoring everything touched. Fails with `Conflict`
    /// when already blocked.
    async fn block(&self, blocker_id: i64, blocked_id: i64, now: DateTime<Utc>)
    -> Result<(), AppError>;

    async fn unblock(&self, blocker_id: i64, blocked_id: i64) -> Result<bool, AppError>;

    async fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> Result<bool, AppError>;

    async fn blocked_students(&self, blocker_id: i64) -> Result<Vec<RelatedStudent>, AppError>;

    /// Either direction.
    async fn has_block_between(&self, a: i64, b: i64) -> Result<bool, AppError> {
        Ok(self.is_blocked(a, b).await? || self.is_blocked(b, a).await?)
    }
}

/// Follows of private students wait here until the receiver answers.
#[async_trait]
pub trait FriendRequestStore: Send + Sync {
    /// Fails with `Conflict` when a request to the same student is pending.
    async fn create_friend_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FriendRequest, AppError>;

    async fn find_friend_request(&self, id: i64) -> Result<Option<FriendRequest>, AppError>;

    /// Removes the request and creates the follow in the same write.
    async fn accept_friend_request(&self, id: i64, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Reject or cancel. Returns whether a request was removed.
    async fn delete_friend_request(&self, id: i64) -> Result<bool, AppError>;

    /// Pending requests addressed to the student from active senders, newest first.
    async fn received_friend_requests(
        &self,
        receiver_id: i64,
    ) -> Result<Vec<FriendRequestView>, AppError>;

    /// Pending requests the student sent to active receivers, newest first.
    async fn sent_friend_requests(&self, sender_id: i64)
    -> Result<Vec<FriendRequestView>, AppError>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert_log(
        &self,
        student_id: i64,
        message: String,
        sent_at: DateTime<Utc>,
    ) -> Result<ActivityLog, AppError>;

    /// Active logs sent after `since`, newest first.
    async fn list_logs(
        &self,
        student_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityLog>, AppError>;

    /// Returns whether the log belonged to the student and was removed.
    async fn delete_log(&self, student_id: i64, log_id: i64) -> Result<bool, AppError>;

    /// Deletes logs sent before `before`.
    async fn purge_logs(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Everything the application needs from persistence.
pub trait Store:
    StudentStore
    + PostStore
    + StoryStore
    + InteractionStore
    + RelationStore
    + FriendRequestStore
    + LogStore
{
}

impl<T> Store for T where
    T: StudentStore
        + PostStore
        + StoryStore
        + InteractionStore
        + RelationStore
        + FriendRequestStore
        + LogStore
{
}
