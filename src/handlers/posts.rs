// src/handlers/posts.rs

use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::post::{
        CreatePostRequest, FeedParams, NewPost, PopularParams, Post, PostChanges, PostResponse,
        UpdatePostRequest,
    },
    ranking::RecencyFormatter,
    store::{PostStore, RelationStore, SharedStore, Store, StudentStore},
    utils::{access::ensure_can_view_owner, html::clean_optional, jwt::Claims},
};

/// Resolves tagged usernames to student ids.
///
/// A tagged student must exist, must not be blocked with the author and must
/// follow or be followed by the author.
async fn resolve_tags(
    store: &dyn Store,
    author_id: i64,
    usernames: &[String],
) -> Result<Vec<i64>, AppError> {
    let unique: BTreeSet<&str> = usernames.iter().map(|u| u.trim()).collect();
    let mut ids = Vec::with_capacity(unique.len());

    for username in unique {
        let tagged = store
            .find_student_by_username(username)
            .await?
            .filter(|s| !s.is_deleted && s.is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!("Tagged student '{}' not found", username))
            })?;

        if store.has_block_between(author_id, tagged.id).await? {
            return Err(AppError::Forbidden(format!(
                "You cannot tag '{}'",
                username
            )));
        }

        let connected = store.is_following(author_id, tagged.id).await?
            || store.is_following(tagged.id, author_id).await?;
        if !connected {
            return Err(AppError::Forbidden(format!(
                "You can only tag followers or students you follow ('{}')",
                username
            )));
        }

        ids.push(tagged.id);
    }

    Ok(ids)
}

/// Loads a non-deleted post owned by the caller.
async fn owned_post(store: &dyn Store, post_id: i64, student_id: i64) -> Result<Post, AppError> {
    let post = store
        .find_post(post_id)
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.student_id != student_id {
        return Err(AppError::Forbidden(
            "You can only modify your own posts".to_string(),
        ));
    }

    Ok(post)
}

/// Creates a post. Returns 201 Created with the scored post.
pub async fn create_post(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let student_id = claims.student_id()?;
    let tagged_ids = resolve_tags(store.as_ref(), student_id, &payload.tagged_usernames).await?;
    let now = Utc::now();

    let post = store
        .insert_post(NewPost {
            student_id,
            description: clean_optional(payload.description),
            location: clean_optional(payload.location),
            photos: payload.photos.into_iter().map(|p| p.trim().to_string()).collect(),
            tagged_ids,
            created_at: now,
        })
        .await?;

    tracing::info!("Student {} created post {}", student_id, post.id);

    Ok((
        StatusCode::CREATED,
        Json(PostResponse::from_post(post, &recency, now)),
    ))
}

/// Single post, subject to the owner's visibility rules. Archived posts are
/// only visible to their owner.
pub async fn get_post(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = claims.student_id()?;

    let post = store
        .find_post(id)
        .await?
        .filter(|p| !p.is_deleted && (p.is_active || p.student_id == viewer_id))
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    ensure_can_view_owner(store.as_ref(), viewer_id, post.student_id).await?;

    Ok(Json(PostResponse::from_post(post, &recency, Utc::now())))
}

/// Owner-only partial update; the store rescores the post in the same write.
pub async fn update_post(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let student_id = claims.student_id()?;
    owned_post(store.as_ref(), id, student_id).await?;

    let tagged_ids = match &payload.tagged_usernames {
        Some(usernames) => Some(resolve_tags(store.as_ref(), student_id, usernames).await?),
        None => None,
    };

    let changes = PostChanges {
        description: clean_optional(payload.description),
        location: clean_optional(payload.location),
        photos: payload
            .photos
            .map(|photos| photos.into_iter().map(|p| p.trim().to_string()).collect()),
        tagged_ids,
    };

    let post = store.update_post(id, changes).await?;

    Ok(Json(PostResponse::from_post(post, &recency, Utc::now())))
}

/// Soft delete.
pub async fn delete_post(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    owned_post(store.as_ref(), id, student_id).await?;

    store.soft_delete_post(id).await?;
    tracing::info!("Student {} deleted post {}", student_id, id);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn archive_post(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_active(store.as_ref(), &claims, id, false).await
}

pub async fn unarchive_post(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_active(store.as_ref(), &claims, id, true).await
}

async fn set_active(
    store: &dyn Store,
    claims: &Claims,
    id: i64,
    active: bool,
) -> Result<Json<serde_json::Value>, AppError> {
    owned_post(store, id, claims.student_id()?).await?;
    store.set_post_active(id, active).await?;

    Ok(Json(json!({ "id": id, "is_active": active })))
}

/// Posts of followed students, newest first.
pub async fn feed(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<FeedParams>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let (limit, offset) = params.limit_offset();

    let author_ids: Vec<i64> = store
        .following(student_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let now = Utc::now();
    let posts: Vec<PostResponse> = store
        .list_feed_posts(&author_ids, limit, offset)
        .await?
        .into_iter()
        .map(|post| PostResponse::from_post(post, &recency, now))
        .collect();

    Ok(Json(posts))
}

/// Most popular posts of public students, by stored score.
pub async fn popular(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PopularParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 50);

    let now = Utc::now();
    let posts: Vec<PostResponse> = store
        .list_popular_posts(claims.student_id()?, limit)
        .await?
        .into_iter()
        .map(|post| PostResponse::from_post(post, &recency, now))
        .collect();

    Ok(Json(posts))
}
