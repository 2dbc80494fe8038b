//! In-process store used when no database is configured, and by tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

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
    ranking::{EngagementCounts, StudentActivity, popularity_score},
};

use super::{
    FriendRequestStore, InteractionStore, LogStore, PostStore, RelationStore, StoryStore,
    StudentStore,
};

#[derive(Debug, Clone)]
struct PostRow {
    id: i64,
    student_id: i64,
    description: Option<String>,
    location: Option<String>,
    photos: Vec<String>,
    tagged: Vec<i64>,
    popularity_score: i64,
    is_active: bool,
    is_deleted: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoryRow {
    id: i64,
    student_id: i64,
    photo: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_featured: bool,
    is_active: bool,
    score: i64,
}

#[derive(Debug, Clone)]
struct LikeRow {
    student_id: i64,
    target: ContentRef,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    students: BTreeMap<i64, Student>,
    posts: BTreeMap<i64, PostRow>,
    stories: BTreeMap<i64, StoryRow>,
    story_views: HashSet<(i64, i64)>,
    likes: Vec<LikeRow>,
    comments: BTreeMap<i64, Comment>,
    follows: BTreeMap<(i64, i64), DateTime<Utc>>,
    blocks: BTreeMap<(i64, i64), DateTime<Utc>>,
    friend_requests: BTreeMap<i64, FriendRequest>,
    logs: BTreeMap<i64, ActivityLog>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn username(&self, student_id: i64) -> String {
        self.students
            .get(&student_id)
            .map(|s| s.username.clone())
            .unwrap_or_default()
    }

    fn like_count(&self, target: ContentRef) -> u64 {
        self.likes.iter().filter(|l| l.target == target).count() as u64
    }

    fn comment_count(&self, target: ContentRef) -> u64 {
        self.comments.values().filter(|c| c.target == target).count() as u64
    }

    fn target_owner(&self, target: ContentRef) -> Option<i64> {
        match target {
            ContentRef::Post(id) => self.posts.get(&id).map(|p| p.student_id),
            ContentRef::Story(id) => self.stories.get(&id).map(|s| s.student_id),
        }
    }

    fn engagement(&self, target: ContentRef) -> EngagementCounts {
        let tagged = match target {
            ContentRef::Post(id) => self.posts.get(&id).map_or(0, |p| p.tagged.len() as u64),
            ContentRef::Story(_) => 0,
        };
        EngagementCounts::new(self.like_count(target), self.comment_count(target), tagged)
    }

    /// Pre-write hook: stores the fresh score on the post or story.
    fn rescore(&mut self, target: ContentRef) {
        let score = popularity_score(self.engagement(target));
        match target {
            ContentRef::Post(id) => {
                if let Some(row) = self.posts.get_mut(&id) {
                    row.popularity_score = score;
                }
            }
            ContentRef::Story(id) => {
                if let Some(row) = self.stories.get_mut(&id) {
                    row.score = score;
                }
            }
        }
    }

    fn post_view(&self, row: &PostRow) -> Post {
        let target = ContentRef::Post(row.id);
        let mut tagged_usernames: Vec<String> =
            row.tagged.iter().map(|id| self.username(*id)).collect();
        tagged_usernames.sort();

        Post {
            id: row.id,
            student_id: row.student_id,
            author_username: self.username(row.student_id),
            description: row.description.clone(),
            location: row.location.clone(),
            photos: row.photos.clone(),
            tagged_usernames,
            like_count: self.like_count(target) as i64,
            comment_count: self.comment_count(target) as i64,
            popularity_score: row.popularity_score,
            is_active: row.is_active,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn story_view(&self, row: &StoryRow) -> Story {
        let target = ContentRef::Story(row.id);
        Story {
            id: row.id,
            student_id: row.student_id,
            author_username: self.username(row.student_id),
            photo: row.photo.clone(),
            created_at: row.created_at,
            expires_at: row.expires_at,
            is_featured: row.is_featured,
            is_active: row.is_active,
            score: row.score,
            like_count: self.like_count(target) as i64,
            comment_count: self.comment_count(target) as i64,
            view_count: self
                .story_views
                .iter()
                .filter(|(story_id, _)| *story_id == row.id)
                .count() as i64,
        }
    }

    fn blocked_between(&self, a: i64, b: i64) -> bool {
        self.blocks.contains_key(&(a, b)) || self.blocks.contains_key(&(b, a))
    }

    /// Listed in public rankings: active, not deleted, not private.
    fn is_public(&self, student_id: i64) -> bool {
        self.students
            .get(&student_id)
            .is_some_and(|s| s.is_active && !s.is_deleted && !s.is_private)
    }

    fn related(&self, student_id: i64, since: DateTime<Utc>) -> Option<RelatedStudent> {
        self.students.get(&student_id).map(|s| RelatedStudent {
            id: s.id,
            username: s.username.clone(),
            profile_photo: s.profile_photo.clone(),
            since,
        })
    }

    fn resolve_tags(&self, tagged_ids: &[i64]) -> Vec<i64> {
        let unique: BTreeSet<i64> = tagged_ids.iter().copied().collect();
        unique.into_iter().collect()
    }

    /// Request joined with `other`, if that student is still active.
    fn request_view(&self, request: &FriendRequest, other: i64) -> Option<FriendRequestView> {
        let student = self
            .students
            .get(&other)
            .filter(|s| s.is_active && !s.is_deleted)?;
        Some(FriendRequestView {
            id: request.id,
            student_id: student.id,
            username: student.username.clone(),
            profile_photo: student.profile_photo.clone(),
            sent_at: request.sent_at,
        })
    }

    fn request_views(
        &self,
        side: impl Fn(&FriendRequest) -> Option<i64>,
    ) -> Vec<FriendRequestView> {
        let mut views: Vec<FriendRequestView> = self
            .friend_requests
            .values()
            .filter_map(|r| side(r).and_then(|other| self.request_view(r, other)))
            .collect();
        views.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        views
    }
}

fn newest_first(a: &Post, b: &Post) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

fn missing(what: &str) -> AppError {
    AppError::NotFound(format!("{} not found", what))
}

fn missing_target(target: ContentRef) -> AppError {
    match target {
        ContentRef::Post(_) => missing("Post"),
        ContentRef::Story(_) => missing("Story"),
    }
}

/// Keeps every table in memory behind one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    async fn create_student(&self, new: NewStudent) -> Result<Student, AppError> {
        let mut inner = self.inner.write().await;

        if inner.students.values().any(|s| s.username == new.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                new.username
            )));
        }

        let student = Student {
            id: inner.next_id(),
            username: new.username,
            password: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            bio: None,
            profile_photo: None,
            is_private: false,
            is_active: true,
            is_deleted: false,
            created_at: new.created_at,
        };
        inner.students.insert(student.id, student.clone());

        Ok(student)
    }

    async fn find_student(&self, id: i64) -> Result<Option<Student>, AppError> {
        Ok(self.inner.read().await.students.get(&id).cloned())
    }

    async fn find_student_by_username(&self, username: &str) -> Result<Option<Student>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .students
            .values()
            .find(|s| s.username == username)
            .cloned())
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: &UpdateProfileRequest,
    ) -> Result<Student, AppError> {
        let mut inner = self.inner.write().await;
        let student = inner.students.get_mut(&id).ok_or_else(|| missing("Student"))?;

        if let Some(first_name) = &changes.first_name {
            student.first_name = first_name.clone();
        }
        if let Some(last_name) = &changes.last_name {
            student.last_name = last_name.clone();
        }
        if let Some(bio) = &changes.bio {
            student.bio = Some(bio.clone());
        }
        if let Some(photo) = &changes.profile_photo {
            student.profile_photo = Some(photo.clone());
        }
        if let Some(is_private) = changes.is_private {
            student.is_private = is_private;
        }

        Ok(student.clone())
    }

    async fn list_active_students(&self) -> Result<Vec<Student>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .students
            .values()
            .filter(|s| s.is_active && !s.is_deleted)
            .cloned()
            .collect())
    }

    async fn student_activity(&self, id: i64) -> Result<StudentActivity, AppError> {
        let inner = self.inner.read().await;

        Ok(StudentActivity {
            followers: inner.follows.keys().filter(|(_, followed)| *followed == id).count() as u64,
            following: inner.follows.keys().filter(|(follower, _)| *follower == id).count() as u64,
            likes: inner.likes.iter().filter(|l| l.student_id == id).count() as u64,
            comments: inner.comments.values().filter(|c| c.student_id == id).count() as u64,
            posts: inner
                .posts
                .values()
                .filter(|p| p.student_id == id && !p.is_deleted)
                .count() as u64,
            stories: inner.stories.values().filter(|s| s.student_id == id).count() as u64,
            featured_stories: inner
                .stories
                .values()
                .filter(|s| s.student_id == id && s.is_featured)
                .count() as u64,
        })
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, new: NewPost) -> Result<Post, AppError> {
        let mut inner = self.inner.write().await;
        let tagged = inner.resolve_tags(&new.tagged_ids);
        let score = popularity_score(EngagementCounts::new(0, 0, tagged.len() as u64));

        let row = PostRow {
            id: inner.next_id(),
            student_id: new.student_id,
            description: new.description,
            location: new.location,
            photos: new.photos,
            tagged,
            popularity_score: score,
            is_active: true,
            is_deleted: false,
            created_at: Some(new.created_at),
            updated_at: None,
        };
        let post = inner.post_view(&row);
        inner.posts.insert(row.id, row);

        Ok(post)
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> Result<Post, AppError> {
        let mut inner = self.inner.write().await;
        let tagged = changes.tagged_ids.as_deref().map(|ids| inner.resolve_tags(ids));

        let row = inner.posts.get_mut(&id).ok_or_else(|| missing("Post"))?;
        if let Some(description) = changes.description {
            row.description = Some(description);
        }
        if let Some(location) = changes.location {
            row.location = Some(location);
        }
        if let Some(photos) = changes.photos {
            row.photos = photos;
        }
        if let Some(tagged) = tagged {
            row.tagged = tagged;
        }
        row.updated_at = Some(Utc::now());

        inner.rescore(ContentRef::Post(id));
        let row = inner.posts.get(&id).ok_or_else(|| missing("Post"))?;
        Ok(inner.post_view(row))
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.posts.get(&id).map(|row| inner.post_view(row)))
    }

    async fn soft_delete_post(&self, id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let row = inner.posts.get_mut(&id).ok_or_else(|| missing("Post"))?;
        row.is_deleted = true;
        row.updated_at = Some(Utc::now());
        inner.rescore(ContentRef::Post(id));
        Ok(())
    }

    async fn set_post_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let row = inner.posts.get_mut(&id).ok_or_else(|| missing("Post"))?;
        row.is_active = active;
        row.updated_at = Some(Utc::now());
        inner.rescore(ContentRef::Post(id));
        Ok(())
    }

    async fn list_feed_posts(
        &self,
        author_ids: &[i64],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let inner = self.inner.read().await;
        let mut posts: Vec<Post> = inner
            .posts
            .values()
            .filter(|row| row.is_active && !row.is_deleted && author_ids.contains(&row.student_id))
            .map(|row| inner.post_view(row))
            .collect();
        posts.sort_by(newest_first);

        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_student_posts(&self, student_id: i64) -> Result<Vec<Post>, AppError> {
        let inner = self.inner.read().await;
        let mut posts: Vec<Post> = inner
            .posts
            .values()
            .filter(|row| row.student_id == student_id && row.is_active && !row.is_deleted)
            .map(|row| inner.post_view(row))
            .collect();
        posts.sort_by(newest_first);
        Ok(posts)
    }

    async fn list_popular_posts(&self, viewer_id: i64, limit: i64) -> Result<Vec<Post>, AppError> {
        let inner = self.inner.read().await;
        let mut posts: Vec<Post> = inner
            .posts
            .values()
            .filter(|row| {
                row.is_active
                    && !row.is_deleted
                    && inner.is_public(row.student_id)
                    && !inner.blocked_between(viewer_id, row.student_id)
            })
            .map(|row| inner.post_view(row))
            .collect();
        posts.sort_by(|a, b| {
            b.popularity_score
                .cmp(&a.popularity_score)
                .then_with(|| newest_first(a, b))
        });
        posts.truncate(limit.max(0) as usize);
        Ok(posts)
    }

    async fn rescore_all_posts(&self) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;
        let ids: Vec<i64> = inner.posts.keys().copied().collect();
        for id in &ids {
            inner.rescore(ContentRef::Post(*id));
        }
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn insert_story(&self, new: NewStory) -> Result<Story, AppError> {
        let mut inner = self.inner.write().await;
        let row = StoryRow {
            id: inner.next_id(),
            student_id: new.student_id,
            photo: new.photo,
            created_at: new.created_at,
            expires_at: new.expires_at,
            is_featured: false,
            is_active: true,
            score: popularity_score(EngagementCounts::default()),
        };
        let story = inner.story_view(&row);
        inner.stories.insert(row.id, row);
        Ok(story)
    }

    async fn find_story(&self, id: i64) -> Result<Option<Story>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.stories.get(&id).map(|row| inner.story_view(row)))
    }

    async fn delete_story(&self, id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner.stories.remove(&id).ok_or_else(|| missing("Story"))?;

        let target = ContentRef::Story(id);
        inner.likes.retain(|l| l.target != target);
        inner.comments.retain(|_, c| c.target != target);
        inner.story_views.retain(|(story_id, _)| *story_id != id);
        Ok(())
    }

    async fn extend_story(&self, id: i64, hours: i64) -> Result<Story, AppError> {
        let mut inner = self.inner.write().await;
        let row = inner.stories.get_mut(&id).ok_or_else(|| missing("Story"))?;
        row.expires_at += TimeDelta::hours(hours);
        let row = row.clone();
        Ok(inner.story_view(&row))
    }

    async fn feature_story(&self, id: i64) -> Result<Story, AppError> {
        let mut inner = self.inner.write().await;
        let row = inner.stories.get_mut(&id).ok_or_else(|| missing("Story"))?;
        row.is_featured = true;
        let row = row.clone();
        Ok(inner.story_view(&row))
    }

    async fn record_story_view(&self, story_id: i64, viewer_id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if !inner.stories.contains_key(&story_id) {
            return Err(missing("Story"));
        }
        inner.story_views.insert((story_id, viewer_id));
        Ok(())
    }

    async fn list_live_stories(
        &self,
        author_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<Story>, AppError> {
        let inner = self.inner.read().await;
        let mut stories: Vec<Story> = inner
            .stories
            .values()
            .filter(|row| author_ids.contains(&row.student_id))
            .map(|row| inner.story_view(row))
            .filter(|story| story.is_live(now))
            .collect();
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(stories)
    }

    async fn list_featured_stories(&self, student_id: i64) -> Result<Vec<Story>, AppError> {
        let inner = self.inner.read().await;
        let mut stories: Vec<Story> = inner
            .stories
            .values()
            .filter(|row| row.student_id == student_id && row.is_featured)
            .map(|row| inner.story_view(row))
            .collect();
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(stories)
    }

    async fn list_popular_stories(
        &self,
        viewer_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Story>, AppError> {
        let inner = self.inner.read().await;
        let mut stories: Vec<Story> = inner
            .stories
            .values()
            .filter(|row| {
                inner.is_public(row.student_id) && !inner.blocked_between(viewer_id, row.student_id)
            })
            .map(|row| inner.story_view(row))
            .filter(|story| story.is_live(now))
            .collect();
        stories.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        stories.truncate(limit.max(0) as usize);
        Ok(stories)
    }

    async fn archive_expired_stories(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;
        let mut archived = 0;
        for row in inner.stories.values_mut() {
            if row.is_active && !row.is_featured && row.expires_at <= now {
                row.is_active = false;
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn toggle_like(
        &self,
        student_id: i64,
        target: ContentRef,
        _now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        if inner.target_owner(target).is_none() {
            return Err(missing_target(target));
        }

        let before = inner.likes.len();
        inner
            .likes
            .retain(|l| !(l.student_id == student_id && l.target == target));
        let liked = inner.likes.len() == before;
        if liked {
            inner.likes.push(LikeRow { student_id, target });
        }

        inner.rescore(target);
        Ok(liked)
    }

    async fn insert_comment(&self, new: NewComment) -> Result<Comment, AppError> {
        let mut inner = self.inner.write().await;
        if inner.target_owner(new.target).is_none() {
            return Err(missing_target(new.target));
        }

        let comment = Comment {
            id: inner.next_id(),
            student_id: new.student_id,
            target: new.target,
            content: new.content,
            created_at: Some(new.created_at),
        };
        inner.comments.insert(comment.id, comment.clone());
        inner.rescore(comment.target);

        Ok(comment)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        Ok(self.inner.read().await.comments.get(&id).cloned())
    }

    async fn delete_comment(&self, id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let comment = inner.comments.remove(&id).ok_or_else(|| missing("Comment"))?;
        inner.rescore(comment.target);
        Ok(())
    }

    async fn list_comments(&self, target: ContentRef) -> Result<Vec<CommentView>, AppError> {
        let inner = self.inner.read().await;
        let mut comments: Vec<CommentView> = inner
            .comments
            .values()
            .filter(|c| c.target == target)
            .map(|c| CommentView {
                id: c.id,
                student_id: c.student_id,
                username: inner.username(c.student_id),
                content: c.content.clone(),
                created_at: c.created_at,
            })
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn follow(
        &self,
        follower_id: i64,
        followed_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.follows.contains_key(&(follower_id, followed_id)) {
            return Err(AppError::Conflict("Already following this student".to_string()));
        }
        inner.follows.insert((follower_id, followed_id), now);
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.follows.remove(&(follower_id, followed_id)).is_some())
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.follows.contains_key(&(follower_id, followed_id)))
    }

    async fn followers(&self, student_id: i64) -> Result<Vec<RelatedStudent>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .follows
            .iter()
            .filter(|((_, followed), _)| *followed == student_id)
            .filter_map(|((follower, _), since)| inner.related(*follower, *since))
            .collect())
    }

    async fn following(&self, student_id: i64) -> Result<Vec<RelatedStudent>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .follows
            .iter()
            .filter(|((follower, _), _)| *follower == student_id)
            .filter_map(|((_, followed), since)| inner.related(*followed, *since))
            .collect())
    }

    async fn block(
        &self,
        blocker_id: i64,
        blocked_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        if inner.blocks.contains_key(&(blocker_id, blocked_id)) {
            return Err(AppError::Conflict("Student is already blocked".to_string()));
        }
        inner.blocks.insert((blocker_id, blocked_id), now);
        inner.follows.remove(&(blocker_id, blocked_id));
        inner.follows.remove(&(blocked_id, blocker_id));
        inner.friend_requests.retain(|_, r| {
            !((r.sender_id == blocker_id && r.receiver_id == blocked_id)
                || (r.sender_id == blocked_id && r.receiver_id == blocker_id))
        });

        let pair = [(blocker_id, blocked_id), (blocked_id, blocker_id)];
        let crosses = |inner: &Inner, actor: i64, target: ContentRef| {
            inner
                .target_owner(target)
                .is_some_and(|owner| pair.contains(&(owner, actor)))
        };

        let mut touched: BTreeSet<(u8, i64)> = BTreeSet::new();
        let mut remember = |target: ContentRef| match target {
            ContentRef::Post(id) => touched.insert((0, id)),
            ContentRef::Story(id) => touched.insert((1, id)),
        };

        let likes = std::mem::take(&mut inner.likes);
        let mut kept = Vec::with_capacity(likes.len());
        for like in likes {
            if crosses(inner, like.student_id, like.target) {
                remember(like.target);
            } else {
                kept.push(like);
            }
        }
        inner.likes = kept;

        let doomed: Vec<(i64, ContentRef)> = inner
            .comments
            .values()
            .filter(|c| crosses(inner, c.student_id, c.target))
            .map(|c| (c.id, c.target))
            .collect();
        for (id, target) in doomed {
            inner.comments.remove(&id);
            remember(target);
        }

        for (kind, id) in touched {
            let target = if kind == 0 {
                ContentRef::Post(id)
            } else {
                ContentRef::Story(id)
            };
            inner.rescore(target);
        }

        Ok(())
    }

    async fn unblock(&self, blocker_id: i64, blocked_id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.blocks.remove(&(blocker_id, blocked_id)).is_some())
    }

    async fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.blocks.contains_key(&(blocker_id, blocked_id)))
    }

    async fn blocked_students(&self, blocker_id: i64) -> Result<Vec<RelatedStudent>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .blocks
            .iter()
            .filter(|((blocker, _), _)| *blocker == blocker_id)
            .filter_map(|((_, blocked), since)| inner.related(*blocked, *since))
            .collect())
    }
}

#[async_trait]
impl FriendRequestStore for MemoryStore {
    async fn create_friend_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FriendRequest, AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .friend_requests
            .values()
            .any(|r| r.sender_id == sender_id && r.receiver_id == receiver_id)
        {
            return Err(AppError::Conflict("Friend request already sent".to_string()));
        }

        let request = FriendRequest {
            id: inner.next_id(),
            sender_id,
            receiver_id,
            sent_at: now,
        };
        inner.friend_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_friend_request(&self, id: i64) -> Result<Option<FriendRequest>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.friend_requests.get(&id).cloned())
    }

    async fn accept_friend_request(&self, id: i64, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let request = inner
            .friend_requests
            .remove(&id)
            .ok_or_else(|| missing("Friend request"))?;
        inner
            .follows
            .entry((request.sender_id, request.receiver_id))
            .or_insert(now);
        Ok(())
    }

    async fn delete_friend_request(&self, id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner.friend_requests.remove(&id).is_some())
    }

    async fn received_friend_requests(
        &self,
        receiver_id: i64,
    ) -> Result<Vec<FriendRequestView>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.request_views(|r| (r.receiver_id == receiver_id).then_some(r.sender_id)))
    }

    async fn sent_friend_requests(
        &self,
        sender_id: i64,
    ) -> Result<Vec<FriendRequestView>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.request_views(|r| (r.sender_id == sender_id).then_some(r.receiver_id)))
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert_log(
        &self,
        student_id: i64,
        message: String,
        sent_at: DateTime<Utc>,
    ) -> Result<ActivityLog, AppError> {
        let mut inner = self.inner.write().await;
        let log = ActivityLog {
            id: inner.next_id(),
            student_id,
            message,
            sent_at,
            is_active: true,
        };
        inner.logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn list_logs(
        &self,
        student_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityLog>, AppError> {
        let inner = self.inner.read().await;
        let mut logs: Vec<ActivityLog> = inner
            .logs
            .values()
            .filter(|l| l.student_id == student_id && l.is_active && l.sent_at > since)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        Ok(logs)
    }

    async fn delete_log(&self, student_id: i64, log_id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .logs
            .get(&log_id)
            .is_some_and(|log| log.student_id == student_id);
        if owned {
            inner.logs.remove(&log_id);
        }
        Ok(owned)
    }

    async fn purge_logs(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;
        let before_len = inner.logs.len();
        inner.logs.retain(|_, l| l.sent_at >= before);
        Ok((before_len - inner.logs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap()
    }

    async fn student(store: &MemoryStore, username: &str) -> i64 {
        store
            .create_student(NewStudent {
                username: username.to_string(),
                password_hash: "hash".to_string(),
                first_name: "Test".to_string(),
                last_name: "Student".to_string(),
                created_at: now(),
            })
            .await
            .unwrap()
            .id
    }

    async fn post(store: &MemoryStore, owner: i64, tagged: Vec<i64>) -> i64 {
        store
            .insert_post(NewPost {
                student_id: owner,
                description: Some("Library at night".to_string()),
                location: None,
                photos: vec!["https://cdn.campus.test/p.jpg".to_string()],
                tagged_ids: tagged,
                created_at: now(),
            })
            .await
            .unwrap()
            .id
    }

    async fn score_of(store: &MemoryStore, post_id: i64) -> i64 {
        store.find_post(post_id).await.unwrap().unwrap().popularity_score
    }

    #[tokio::test]
    async fn insert_scores_tags_before_write() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let cem = student(&store, "cem").await;

        let id = post(&store, ada, vec![bora, cem, bora]).await;

        let stored = store.find_post(id).await.unwrap().unwrap();
        assert_eq!(stored.tagged_usernames, vec!["bora", "cem"]);
        assert_eq!(stored.popularity_score, 2);
    }

    #[tokio::test]
    async fn likes_and_comments_rescore_the_post() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let id = post(&store, ada, vec![]).await;

        assert!(store.toggle_like(bora, ContentRef::Post(id), now()).await.unwrap());
        assert_eq!(score_of(&store, id).await, 3);

        let comment = store
            .insert_comment(NewComment {
                student_id: bora,
                target: ContentRef::Post(id),
                content: "nice".to_string(),
                created_at: now(),
            })
            .await
            .unwrap();
        assert_eq!(score_of(&store, id).await, 5);

        assert!(!store.toggle_like(bora, ContentRef::Post(id), now()).await.unwrap());
        store.delete_comment(comment.id).await.unwrap();
        assert_eq!(score_of(&store, id).await, 0);
    }

    #[tokio::test]
    async fn update_rescores_with_new_tags() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let id = post(&store, ada, vec![]).await;
        store.toggle_like(bora, ContentRef::Post(id), now()).await.unwrap();

        let updated = store
            .update_post(
                id,
                PostChanges {
                    tagged_ids: Some(vec![bora]),
                    ..PostChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.popularity_score, 4);
    }

    #[tokio::test]
    async fn block_removes_cross_engagement_and_rescores() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let cem = student(&store, "cem").await;
        let id = post(&store, ada, vec![]).await;

        store.toggle_like(bora, ContentRef::Post(id), now()).await.unwrap();
        store.toggle_like(cem, ContentRef::Post(id), now()).await.unwrap();
        store.follow(bora, ada, now()).await.unwrap();
        assert_eq!(score_of(&store, id).await, 6);

        store.block(ada, bora, now()).await.unwrap();

        assert_eq!(score_of(&store, id).await, 3);
        assert!(!store.is_following(bora, ada).await.unwrap());
        assert!(store.has_block_between(bora, ada).await.unwrap());
        assert!(matches!(
            store.block(ada, bora, now()).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn archive_and_delete_rewrite_a_stale_score() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let id = post(&store, ada, vec![]).await;
        store.toggle_like(bora, ContentRef::Post(id), now()).await.unwrap();

        store.inner.write().await.posts.get_mut(&id).unwrap().popularity_score = 99;
        store.set_post_active(id, false).await.unwrap();
        assert_eq!(score_of(&store, id).await, 3);

        store.inner.write().await.posts.get_mut(&id).unwrap().popularity_score = 99;
        store.soft_delete_post(id).await.unwrap();
        assert_eq!(score_of(&store, id).await, 3);
    }

    #[tokio::test]
    async fn accepted_request_becomes_a_follow() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;

        let request = store.create_friend_request(bora, ada, now()).await.unwrap();
        assert!(matches!(
            store.create_friend_request(bora, ada, now()).await,
            Err(AppError::Conflict(_))
        ));

        let received = store.received_friend_requests(ada).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].username, "bora");
        let sent = store.sent_friend_requests(bora).await.unwrap();
        assert_eq!(sent[0].username, "ada");

        store.accept_friend_request(request.id, now()).await.unwrap();
        assert!(store.is_following(bora, ada).await.unwrap());
        assert!(store.find_friend_request(request.id).await.unwrap().is_none());
        assert!(matches!(
            store.accept_friend_request(request.id, now()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn block_drops_pending_requests_both_ways() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let cem = student(&store, "cem").await;

        store.create_friend_request(bora, ada, now()).await.unwrap();
        store.create_friend_request(cem, ada, now()).await.unwrap();
        store.block(ada, bora, now()).await.unwrap();

        let received = store.received_friend_requests(ada).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].username, "cem");
        assert!(store.sent_friend_requests(bora).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn popular_posts_skip_private_and_blocked_authors() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let cem = student(&store, "cem").await;
        let viewer = student(&store, "viewer").await;

        let quiet = post(&store, ada, vec![]).await;
        let loud = post(&store, ada, vec![bora, cem]).await;
        let hidden = post(&store, bora, vec![ada, cem, viewer]).await;
        let blocked = post(&store, cem, vec![ada, bora, viewer]).await;

        store
            .update_profile(
                bora,
                &UpdateProfileRequest {
                    is_private: Some(true),
                    ..UpdateProfileRequest::default()
                },
            )
            .await
            .unwrap();
        store.block(cem, viewer, now()).await.unwrap();

        let ids: Vec<i64> = store
            .list_popular_posts(viewer, 10)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(ids, vec![loud, quiet]);
        assert!(!ids.contains(&hidden));
        assert!(!ids.contains(&blocked));
    }

    #[tokio::test]
    async fn expired_stories_are_archived_unless_featured() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        let photo = "https://cdn.campus.test/s.jpg".to_string();

        let plain = store.insert_story(NewStory::new(ada, photo.clone(), now())).await.unwrap();
        let kept = store.insert_story(NewStory::new(ada, photo, now())).await.unwrap();
        store.feature_story(kept.id).await.unwrap();

        let later = now() + TimeDelta::hours(25);
        assert_eq!(store.archive_expired_stories(later).await.unwrap(), 1);
        assert!(!store.find_story(plain.id).await.unwrap().unwrap().is_active);
        assert!(store.find_story(kept.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn purge_drops_old_logs_only() {
        let store = MemoryStore::new();
        let ada = student(&store, "ada").await;
        store
            .insert_log(ada, "old".to_string(), now() - TimeDelta::days(40))
            .await
            .unwrap();
        store.insert_log(ada, "new".to_string(), now()).await.unwrap();

        let removed = store.purge_logs(now() - TimeDelta::days(31)).await.unwrap();
        assert_eq!(removed, 1);

        let logs = store.list_logs(ada, now() - TimeDelta::days(31)).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "new");
    }
}
