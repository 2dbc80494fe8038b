// src/store/postgres.rs

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};

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

/// Posts rescored per transaction by the daily job.
const RESCORE_BATCH: i64 = 500;

const STUDENT_COLUMNS: &str = "id, username, password, first_name, last_name, bio, \
     profile_photo, is_private, is_active, is_deleted, created_at";

const POST_SELECT: &str = r#"
    SELECT
        p.id,
        p.student_id,
        s.username AS author_username,
        p.description,
        p.location,
        p.photos,
        ARRAY(
            SELECT ts.username::TEXT
            FROM post_tags pt
            JOIN students ts ON ts.id = pt.student_id
            WHERE pt.post_id = p.id
            ORDER BY ts.username
        ) AS tagged_usernames,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
        p.popularity_score,
        p.is_active,
        p.is_deleted,
        p.created_at,
        p.updated_at
    FROM posts p
    JOIN students s ON s.id = p.student_id
"#;

const STORY_SELECT: &str = r#"
    SELECT
        st.id,
        st.student_id,
        s.username AS author_username,
        st.photo,
        st.created_at,
        st.expires_at,
        st.is_featured,
        st.is_active,
        st.score,
        (SELECT COUNT(*) FROM likes l WHERE l.story_id = st.id) AS like_count,
        (SELECT COUNT(*) FROM comments c WHERE c.story_id = st.id) AS comment_count,
        (SELECT COUNT(*) FROM story_views v WHERE v.story_id = st.id) AS view_count
    FROM stories st
    JOIN students s ON s.id = st.student_id
"#;

/// Excludes authors blocked with the viewer bound at `$1`, in either direction.
const NOT_BLOCKED_WITH_VIEWER: &str = r#"
    NOT EXISTS (
        SELECT 1 FROM block_relations b
        WHERE (b.blocker_id = $1 AND b.blocked_id = s.id)
           OR (b.blocker_id = s.id AND b.blocked_id = $1)
    )
"#;

const RELATED_SELECT: &str = "SELECT s.id, s.username, s.profile_photo, r.created_at AS since";

const FRIEND_REQUEST_SELECT: &str =
    "SELECT r.id, s.id AS student_id, s.username, s.profile_photo, r.sent_at";

#[derive(FromRow)]
struct CommentRow {
    id: i64,
    student_id: i64,
    post_id: Option<i64>,
    story_id: Option<i64>,
    content: String,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = AppError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let target = ContentRef::from_columns(row.post_id, row.story_id).ok_or_else(|| {
            AppError::InternalServerError(format!("Comment {} has no single target", row.id))
        })?;

        Ok(Comment {
            id: row.id,
            student_id: row.student_id,
            target,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

/// Column holding the foreign key for this kind of target.
fn target_column(target: ContentRef) -> (&'static str, i64) {
    match target {
        ContentRef::Post(id) => ("post_id", id),
        ContentRef::Story(id) => ("story_id", id),
    }
}

fn count(value: i64) -> u64 {
    value.max(0) as u64
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

async fn rescore_post(conn: &mut PgConnection, post_id: i64) -> Result<i64, AppError> {
    let (likes, comments, tagged): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM likes WHERE post_id = $1),
            (SELECT COUNT(*) FROM comments WHERE post_id = $1),
            (SELECT COUNT(*) FROM post_tags WHERE post_id = $1)
        "#,
    )
    .bind(post_id)
    .fetch_one(&mut *conn)
    .await?;

    let score = popularity_score(EngagementCounts::new(
        count(likes),
        count(comments),
        count(tagged),
    ));

    sqlx::query("UPDATE posts SET popularity_score = $1 WHERE id = $2")
        .bind(score)
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    Ok(score)
}

async fn rescore_story(conn: &mut PgConnection, story_id: i64) -> Result<i64, AppError> {
    let (likes, comments): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM likes WHERE story_id = $1),
            (SELECT COUNT(*) FROM comments WHERE story_id = $1)
        "#,
    )
    .bind(story_id)
    .fetch_one(&mut *conn)
    .await?;

    let score = popularity_score(EngagementCounts::new(count(likes), count(comments), 0));

    sqlx::query("UPDATE stories SET score = $1 WHERE id = $2")
        .bind(score)
        .bind(story_id)
        .execute(&mut *conn)
        .await?;

    Ok(score)
}

async fn rescore(conn: &mut PgConnection, target: ContentRef) -> Result<i64, AppError> {
    match target {
        ContentRef::Post(id) => rescore_post(conn, id).await,
        ContentRef::Story(id) => rescore_story(conn, id).await,
    }
}

async fn ensure_target_exists(conn: &mut PgConnection, target: ContentRef) -> Result<(), AppError> {
    let (sql, id, what) = match target {
        ContentRef::Post(id) => ("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)", id, "Post"),
        ContentRef::Story(id) => (
            "SELECT EXISTS(SELECT 1 FROM stories WHERE id = $1)",
            id,
            "Story",
        ),
    };

    let exists: bool = sqlx::query_scalar(sql).bind(id).fetch_one(&mut *conn).await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{} not found", what)))
    }
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_post(&self, id: i64) -> Result<Post, AppError> {
        self.find_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    async fn fetch_story(&self, id: i64) -> Result<Story, AppError> {
        self.find_story(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Story not found".to_string()))
    }

    /// Writes one post flag and rescores the row before commit.
    async fn update_post_flag(&self, id: i64, sql: &str, value: bool) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(sql)
            .bind(id)
            .bind(value)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        rescore_post(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rescores every post, committing after each `batch` rows so the job
    /// never holds locks on the whole table.
    async fn rescore_posts_in_batches(&self, batch: i64) -> Result<u64, AppError> {
        let mut last_id = 0_i64;
        let mut written = 0_u64;

        loop {
            let mut tx = self.pool.begin().await?;

            let ids: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM posts WHERE id > $1 ORDER BY id LIMIT $2")
                    .bind(last_id)
                    .bind(batch)
                    .fetch_all(&mut *tx)
                    .await?;

            let Some(&max_id) = ids.last() else {
                break;
            };

            for id in &ids {
                rescore_post(&mut tx, *id).await?;
            }

            tx.commit().await?;
            written += ids.len() as u64;
            last_id = max_id;
        }

        Ok(written)
    }

    async fn list_friend_requests(
        &self,
        own_column: &str,
        other_column: &str,
        student_id: i64,
    ) -> Result<Vec<FriendRequestView>, AppError> {
        let sql = format!(
            "{} FROM friend_requests r JOIN students s ON s.id = r.{} \
             WHERE r.{} = $1 AND s.is_active AND NOT s.is_deleted \
             ORDER BY r.sent_at DESC, r.id DESC",
            FRIEND_REQUEST_SELECT, other_column, own_column
        );

        Ok(sqlx::query_as::<_, FriendRequestView>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn create_student(&self, new: NewStudent) -> Result<Student, AppError> {
        let sql = format!(
            "INSERT INTO students (username, password, first_name, last_name, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (username) DO NOTHING \
             RETURNING {}",
            STUDENT_COLUMNS
        );

        sqlx::query_as::<_, Student>(&sql)
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(new.created_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("Username '{}' already exists", new.username))
            })
    }

    async fn find_student(&self, id: i64) -> Result<Option<Student>, AppError> {
        let sql = format!("SELECT {} FROM students WHERE id = $1", STUDENT_COLUMNS);
        Ok(sqlx::query_as::<_, Student>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_student_by_username(&self, username: &str) -> Result<Option<Student>, AppError> {
        let sql = format!("SELECT {} FROM students WHERE username = $1", STUDENT_COLUMNS);
        Ok(sqlx::query_as::<_, Student>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: &UpdateProfileRequest,
    ) -> Result<Student, AppError> {
        let sql = format!(
            r#"
            UPDATE students SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                bio = COALESCE($4, bio),
                profile_photo = COALESCE($5, profile_photo),
                is_private = COALESCE($6, is_private)
            WHERE id = $1
            RETURNING {}
            "#,
            STUDENT_COLUMNS
        );

        sqlx::query_as::<_, Student>(&sql)
            .bind(id)
            .bind(&changes.first_name)
            .bind(&changes.last_name)
            .bind(&changes.bio)
            .bind(&changes.profile_photo)
            .bind(changes.is_private)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))
    }

    async fn list_active_students(&self) -> Result<Vec<Student>, AppError> {
        let sql = format!(
            "SELECT {} FROM students WHERE is_active AND NOT is_deleted ORDER BY id",
            STUDENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Student>(&sql).fetch_all(&self.pool).await?)
    }

    async fn student_activity(&self, id: i64) -> Result<StudentActivity, AppError> {
        let row: (i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follow_relations WHERE followed_id = $1),
                (SELECT COUNT(*) FROM follow_relations WHERE follower_id = $1),
                (SELECT COUNT(*) FROM likes WHERE student_id = $1),
                (SELECT COUNT(*) FROM comments WHERE student_id = $1),
                (SELECT COUNT(*) FROM posts WHERE student_id = $1 AND NOT is_deleted),
                (SELECT COUNT(*) FROM stories WHERE student_id = $1),
                (SELECT COUNT(*) FROM stories WHERE student_id = $1 AND is_featured)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StudentActivity {
            followers: count(row.0),
            following: count(row.1),
            likes: count(row.2),
            comments: count(row.3),
            posts: count(row.4),
            stories: count(row.5),
            featured_stories: count(row.6),
        })
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn insert_post(&self, new: NewPost) -> Result<Post, AppError> {
        let tagged = dedup(&new.tagged_ids);
        let score = popularity_score(EngagementCounts::new(0, 0, tagged.len() as u64));

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO posts (student_id, description, location, photos, popularity_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new.student_id)
        .bind(&new.description)
        .bind(&new.location)
        .bind(&new.photos)
        .bind(score)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO post_tags (post_id, student_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(&tagged)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.fetch_post(id).await
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> Result<Post, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE posts SET
                description = COALESCE($2, description),
                location = COALESCE($3, location),
                photos = COALESCE($4, photos),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&changes.description)
        .bind(&changes.location)
        .bind(&changes.photos)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        if let Some(tagged_ids) = &changes.tagged_ids {
            sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO post_tags (post_id, student_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(dedup(tagged_ids))
            .execute(&mut *tx)
            .await?;
        }

        rescore_post(&mut tx, id).await?;
        tx.commit().await?;

        self.fetch_post(id).await
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let sql = format!("{} WHERE p.id = $1", POST_SELECT);
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete_post(&self, id: i64) -> Result<(), AppError> {
        self.update_post_flag(
            id,
            "UPDATE posts SET is_deleted = $2, updated_at = NOW() WHERE id = $1",
            true,
        )
        .await
    }

    async fn set_post_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        self.update_post_flag(
            id,
            "UPDATE posts SET is_active = $2, updated_at = NOW() WHERE id = $1",
            active,
        )
        .await
    }

    async fn list_feed_posts(
        &self,
        author_ids: &[i64],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let sql = format!(
            "{} WHERE p.is_active AND NOT p.is_deleted AND p.student_id = ANY($1) \
             ORDER BY p.created_at DESC NULLS LAST, p.id DESC LIMIT $2 OFFSET $3",
            POST_SELECT
        );

        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(author_ids)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_student_posts(&self, student_id: i64) -> Result<Vec<Post>, AppError> {
        let sql = format!(
            "{} WHERE p.student_id = $1 AND p.is_active AND NOT p.is_deleted \
             ORDER BY p.created_at DESC NULLS LAST, p.id DESC",
            POST_SELECT
        );

        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_popular_posts(&self, viewer_id: i64, limit: i64) -> Result<Vec<Post>, AppError> {
        let sql = format!(
            "{} WHERE p.is_active AND NOT p.is_deleted \
             AND s.is_active AND NOT s.is_deleted AND NOT s.is_private \
             AND {} \
             ORDER BY p.popularity_score DESC, p.created_at DESC NULLS LAST, p.id DESC \
             LIMIT $2",
            POST_SELECT, NOT_BLOCKED_WITH_VIEWER
        );

        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(viewer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn rescore_all_posts(&self) -> Result<u64, AppError> {
        self.rescore_posts_in_batches(RESCORE_BATCH).await
    }
}

#[async_trait]
impl StoryStore for PgStore {
    async fn insert_story(&self, new: NewStory) -> Result<Story, AppError> {
        let score = popularity_score(EngagementCounts::default());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stories (student_id, photo, created_at, expires_at, score)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(new.student_id)
        .bind(&new.photo)
        .bind(new.created_at)
        .bind(new.expires_at)
        .bind(score)
        .fetch_one(&self.pool)
        .await?;

        self.fetch_story(id).await
    }

    async fn find_story(&self, id: i64) -> Result<Option<Story>, AppError> {
        let sql = format!("{} WHERE st.id = $1", STORY_SELECT);
        Ok(sqlx::query_as::<_, Story>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_story(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM stories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Story not found".to_string()));
        }
        Ok(())
    }

    async fn extend_story(&self, id: i64, hours: i64) -> Result<Story, AppError> {
        let result = sqlx::query(
            "UPDATE stories SET expires_at = expires_at + make_interval(hours => $2::INT) WHERE id = $1",
        )
        .bind(id)
        .bind(hours)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Story not found".to_string()));
        }
        self.fetch_story(id).await
    }

    async fn feature_story(&self, id: i64) -> Result<Story, AppError> {
        let result = sqlx::query("UPDATE stories SET is_featured = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Story not found".to_string()));
        }
        self.fetch_story(id).await
    }

    async fn record_story_view(&self, story_id: i64, viewer_id: i64) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        ensure_target_exists(&mut conn, ContentRef::Story(story_id)).await?;

        sqlx::query(
            "INSERT INTO story_views (story_id, student_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(story_id)
        .bind(viewer_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn list_live_stories(
        &self,
        author_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<Story>, AppError> {
        let sql = format!(
            "{} WHERE st.student_id = ANY($1) AND st.is_active AND st.expires_at > $2 \
             ORDER BY st.created_at DESC, st.id DESC",
            STORY_SELECT
        );

        Ok(sqlx::query_as::<_, Story>(&sql)
            .bind(author_ids)
            .bind(now)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_featured_stories(&self, student_id: i64) -> Result<Vec<Story>, AppError> {
        let sql = format!(
            "{} WHERE st.student_id = $1 AND st.is_featured ORDER BY st.created_at DESC, st.id DESC",
            STORY_SELECT
        );

        Ok(sqlx::query_as::<_, Story>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_popular_stories(
        &self,
        viewer_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Story>, AppError> {
        let sql = format!(
            "{} WHERE st.is_active AND st.expires_at > $2 \
             AND s.is_active AND NOT s.is_deleted AND NOT s.is_private \
             AND {} \
             ORDER BY st.score DESC, st.created_at DESC, st.id DESC \
             LIMIT $3",
            STORY_SELECT, NOT_BLOCKED_WITH_VIEWER
        );

        Ok(sqlx::query_as::<_, Story>(&sql)
            .bind(viewer_id)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn archive_expired_stories(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE stories SET is_active = FALSE WHERE is_active AND NOT is_featured AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl InteractionStore for PgStore {
    async fn toggle_like(
        &self,
        student_id: i64,
        target: ContentRef,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let (column, id) = target_column(target);
        let mut tx = self.pool.begin().await?;

        ensure_target_exists(&mut tx, target).await?;

        let removed = sqlx::query(&format!(
            "DELETE FROM likes WHERE student_id = $1 AND {} = $2",
            column
        ))
        .bind(student_id)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let liked = removed == 0;
        if liked {
            sqlx::query(&format!(
                "INSERT INTO likes (student_id, {}, created_at) VALUES ($1, $2, $3)",
                column
            ))
            .bind(student_id)
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        rescore(&mut tx, target).await?;
        tx.commit().await?;

        Ok(liked)
    }

    async fn insert_comment(&self, new: NewComment) -> Result<Comment, AppError> {
        let mut tx = self.pool.begin().await?;

        ensure_target_exists(&mut tx, new.target).await?;

        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            INSERT INTO comments (student_id, post_id, story_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, student_id, post_id, story_id, content, created_at
            "#,
        )
        .bind(new.student_id)
        .bind(new.target.post_id())
        .bind(new.target.story_id())
        .bind(&new.content)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;

        rescore(&mut tx, new.target).await?;
        tx.commit().await?;

        Comment::try_from(row)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        sqlx::query_as::<_, CommentRow>(
            "SELECT id, student_id, post_id, story_id, content, created_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Comment::try_from)
        .transpose()
    }

    async fn delete_comment(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let columns: Option<(Option<i64>, Option<i64>)> =
            sqlx::query_as("DELETE FROM comments WHERE id = $1 RETURNING post_id, story_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let (post_id, story_id) =
            columns.ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

        if let Some(target) = ContentRef::from_columns(post_id, story_id) {
            rescore(&mut tx, target).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_comments(&self, target: ContentRef) -> Result<Vec<CommentView>, AppError> {
        let (column, id) = target_column(target);
        let sql = format!(
            r#"
            SELECT c.id, c.student_id, s.username, c.content, c.created_at
            FROM comments c
            JOIN students s ON s.id = c.student_id
            WHERE c.{} = $1
            ORDER BY c.created_at ASC NULLS FIRST, c.id ASC
            "#,
            column
        );

        Ok(sqlx::query_as::<_, CommentView>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl RelationStore for PgStore {
    async fn follow(
        &self,
        follower_id: i64,
        followed_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follow_relations (follower_id, followed_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Already following this student".to_string()));
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM follow_relations WHERE follower_id = $1 AND followed_id = $2")
                .bind(follower_id)
                .bind(followed_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follow_relations WHERE follower_id = $1 AND followed_id = $2)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn followers(&self, student_id: i64) -> Result<Vec<RelatedStudent>, AppError> {
        let sql = format!(
            "{} FROM follow_relations r JOIN students s ON s.id = r.follower_id \
             WHERE r.followed_id = $1 ORDER BY s.id",
            RELATED_SELECT
        );
        Ok(sqlx::query_as::<_, RelatedStudent>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn following(&self, student_id: i64) -> Result<Vec<RelatedStudent>, AppError> {
        let sql = format!(
            "{} FROM follow_relations r JOIN students s ON s.id = r.followed_id \
             WHERE r.follower_id = $1 ORDER BY s.id",
            RELATED_SELECT
        );
        Ok(sqlx::query_as::<_, RelatedStudent>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn block(
        &self,
        blocker_id: i64,
        blocked_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO block_relations (blocker_id, blocked_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(AppError::Conflict("Student is already blocked".to_string()));
        }

        sqlx::query(
            r#"
            DELETE FROM follow_relations
            WHERE (follower_id = $1 AND followed_id = $2)
               OR (follower_id = $2 AND followed_id = $1)
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM friend_requests
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&mut *tx)
        .await?;

        let mut touched: Vec<(Option<i64>, Option<i64>)> = Vec::new();
        for table in ["likes", "comments"] {
            let sql = format!(
                r#"
                DELETE FROM {table} x
                WHERE (x.student_id = $1 AND (
                        x.post_id IN (SELECT id FROM posts WHERE student_id = $2)
                     OR x.story_id IN (SELECT id FROM stories WHERE student_id = $2)))
                   OR (x.student_id = $2 AND (
                        x.post_id IN (SELECT id FROM posts WHERE student_id = $1)
                     OR x.story_id IN (SELECT id FROM stories WHERE student_id = $1)))
                RETURNING x.post_id, x.story_id
                "#
            );

            let removed: Vec<(Option<i64>, Option<i64>)> = sqlx::query_as(&sql)
                .bind(blocker_id)
                .bind(blocked_id)
                .fetch_all(&mut *tx)
                .await?;
            touched.extend(removed);
        }

        let targets: BTreeSet<(Option<i64>, Option<i64>)> = touched.into_iter().collect();
        for (post_id, story_id) in targets {
            if let Some(target) = ContentRef::from_columns(post_id, story_id) {
                rescore(&mut tx, target).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn unblock(&self, blocker_id: i64, blocked_id: i64) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM block_relations WHERE blocker_id = $1 AND blocked_id = $2")
                .bind(blocker_id)
                .bind(blocked_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_blocked(&self, blocker_id: i64, blocked_id: i64) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM block_relations WHERE blocker_id = $1 AND blocked_id = $2)",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn blocked_students(&self, blocker_id: i64) -> Result<Vec<RelatedStudent>, AppError> {
        let sql = format!(
            "{} FROM block_relations r JOIN students s ON s.id = r.blocked_id \
             WHERE r.blocker_id = $1 ORDER BY s.id",
            RELATED_SELECT
        );
        Ok(sqlx::query_as::<_, RelatedStudent>(&sql)
            .bind(blocker_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl FriendRequestStore for PgStore {
    async fn create_friend_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FriendRequest, AppError> {
        sqlx::query_as::<_, FriendRequest>(
            r#"
            INSERT INTO friend_requests (sender_id, receiver_id, sent_at)
            VALUES ($1, $2, $3)
            RETURNING id, sender_id, receiver_id, sent_at
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("Friend request already sent".to_string()),
            other => other,
        })
    }

    async fn find_friend_request(&self, id: i64) -> Result<Option<FriendRequest>, AppError> {
        Ok(sqlx::query_as::<_, FriendRequest>(
            "SELECT id, sender_id, receiver_id, sent_at FROM friend_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn accept_friend_request(&self, id: i64, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let (sender_id, receiver_id): (i64, i64) = sqlx::query_as(
            "DELETE FROM friend_requests WHERE id = $1 RETURNING sender_id, receiver_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO follow_relations (follower_id, followed_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_friend_request(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM friend_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn received_friend_requests(
        &self,
        receiver_id: i64,
    ) -> Result<Vec<FriendRequestView>, AppError> {
        self.list_friend_requests("receiver_id", "sender_id", receiver_id)
            .await
    }

    async fn sent_friend_requests(
        &self,
        sender_id: i64,
    ) -> Result<Vec<FriendRequestView>, AppError> {
        self.list_friend_requests("sender_id", "receiver_id", sender_id)
            .await
    }
}

#[async_trait]
impl LogStore for PgStore {
    async fn insert_log(
        &self,
        student_id: i64,
        message: String,
        sent_at: DateTime<Utc>,
    ) -> Result<ActivityLog, AppError> {
        Ok(sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (student_id, message, sent_at)
            VALUES ($1, $2, $3)
            RETURNING id, student_id, message, sent_at, is_active
            "#,
        )
        .bind(student_id)
        .bind(message)
        .bind(sent_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_logs(
        &self,
        student_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityLog>, AppError> {
        Ok(sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT id, student_id, message, sent_at, is_active
            FROM activity_logs
            WHERE student_id = $1 AND is_active AND sent_at > $2
            ORDER BY sent_at DESC, id DESC
            "#,
        )
        .bind(student_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_log(&self, student_id: i64, log_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM activity_logs WHERE id = $1 AND student_id = $2")
            .bind(log_id)
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_logs(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM activity_logs WHERE sent_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    use super::*;

    /// A store on a fresh schema, or `None` when no database is configured.
    async fn test_store() -> Option<PgStore> {
        let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty())?;
        let schema = format!("campus_test_{}", uuid::Uuid::new_v4().simple());

        let admin = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
        sqlx::query(&format!("CREATE SCHEMA {}", schema))
            .execute(&admin)
            .await
            .unwrap();

        let options = PgConnectOptions::from_str(&url)
            .unwrap()
            .options([("search_path", schema.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        Some(PgStore::new(pool))
    }

    async fn student(store: &PgStore, username: &str) -> i64 {
        store
            .create_student(NewStudent {
                username: username.to_string(),
                password_hash: "hash".to_string(),
                first_name: "Test".to_string(),
                last_name: "Student".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id
    }

    async fn post(store: &PgStore, owner: i64, tagged: Vec<i64>) -> i64 {
        store
            .insert_post(NewPost {
                student_id: owner,
                description: None,
                location: None,
                photos: vec!["https://cdn.campus.test/p.jpg".to_string()],
                tagged_ids: tagged,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id
    }

    async fn score_of(store: &PgStore, post_id: i64) -> i64 {
        store.fetch_post(post_id).await.unwrap().popularity_score
    }

    async fn corrupt_scores(store: &PgStore) {
        sqlx::query("UPDATE posts SET popularity_score = 99")
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn insert_writes_tags_and_score_together() {
        let Some(store) = test_store().await else { return };
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let cem = student(&store, "cem").await;

        let id = post(&store, ada, vec![cem, bora, cem]).await;

        let stored = store.fetch_post(id).await.unwrap();
        assert_eq!(stored.tagged_usernames, vec!["bora", "cem"]);
        assert_eq!(stored.popularity_score, 2);
    }

    #[tokio::test]
    async fn batched_rescore_repairs_every_post() {
        let Some(store) = test_store().await else { return };
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;

        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(post(&store, ada, vec![]).await);
        }
        let tagged = post(&store, ada, vec![bora]).await;
        corrupt_scores(&store).await;

        assert_eq!(store.rescore_posts_in_batches(2).await.unwrap(), 5);
        for id in ids {
            assert_eq!(score_of(&store, id).await, 0);
        }
        assert_eq!(score_of(&store, tagged).await, 1);
    }

    #[tokio::test]
    async fn archive_and_delete_rescore_in_the_same_write() {
        let Some(store) = test_store().await else { return };
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let id = post(&store, ada, vec![]).await;
        store.toggle_like(bora, ContentRef::Post(id), Utc::now()).await.unwrap();

        corrupt_scores(&store).await;
        store.set_post_active(id, false).await.unwrap();
        assert_eq!(score_of(&store, id).await, 3);

        corrupt_scores(&store).await;
        store.soft_delete_post(id).await.unwrap();
        assert_eq!(score_of(&store, id).await, 3);

        assert!(matches!(
            store.set_post_active(9_999, true).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn block_cleanup_rescores_posts_and_stories() {
        let Some(store) = test_store().await else { return };
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;
        let cem = student(&store, "cem").await;
        let now = Utc::now();

        let post_id = post(&store, ada, vec![]).await;
        let story = store
            .insert_story(NewStory::new(ada, "https://cdn.campus.test/s.jpg".to_string(), now))
            .await
            .unwrap();

        store.toggle_like(bora, ContentRef::Post(post_id), now).await.unwrap();
        store.toggle_like(cem, ContentRef::Post(post_id), now).await.unwrap();
        store
            .insert_comment(NewComment {
                student_id: bora,
                target: ContentRef::Story(story.id),
                content: "hi".to_string(),
                created_at: now,
            })
            .await
            .unwrap();
        store.follow(bora, ada, now).await.unwrap();
        store.create_friend_request(ada, bora, now).await.unwrap();
        assert_eq!(score_of(&store, post_id).await, 6);
        assert_eq!(store.fetch_story(story.id).await.unwrap().score, 2);

        store.block(ada, bora, now).await.unwrap();

        assert_eq!(score_of(&store, post_id).await, 3);
        assert_eq!(store.fetch_story(story.id).await.unwrap().score, 0);
        assert!(!store.is_following(bora, ada).await.unwrap());
        assert!(store.sent_friend_requests(ada).await.unwrap().is_empty());
        assert!(matches!(
            store.block(ada, bora, now).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_friend_request_is_a_conflict() {
        let Some(store) = test_store().await else { return };
        let ada = student(&store, "ada").await;
        let bora = student(&store, "bora").await;

        let request = store.create_friend_request(bora, ada, Utc::now()).await.unwrap();
        assert!(matches!(
            store.create_friend_request(bora, ada, Utc::now()).await,
            Err(AppError::Conflict(_))
        ));

        store.accept_friend_request(request.id, Utc::now()).await.unwrap();
        assert!(store.is_following(bora, ada).await.unwrap());
        assert!(store.received_friend_requests(ada).await.unwrap().is_empty());
    }
}
