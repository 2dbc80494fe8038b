// src/handlers/interaction.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::logs::record_activity,
    models::{
        comment::{CommentResponse, CommentView, CreateCommentRequest, NewComment},
        content::ContentRef,
    },
    ranking::RecencyFormatter,
    store::{InteractionStore, PostStore, SharedStore, Store, StoryStore},
    utils::{access::ensure_can_view_owner, html::clean_html, jwt::Claims},
};

/// Owner of a post or story the caller may engage with.
///
/// Posts must be active and not deleted; stories must still be live. The
/// owner's visibility rules apply on top.
async fn engageable_owner(
    store: &dyn Store,
    viewer_id: i64,
    target: ContentRef,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let owner_id = match target {
        ContentRef::Post(id) => store
            .find_post(id)
            .await?
            .filter(|p| p.is_visible())
            .map(|p| p.student_id)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?,
        ContentRef::Story(id) => store
            .find_story(id)
            .await?
            .filter(|s| s.is_live(now))
            .map(|s| s.student_id)
            .ok_or_else(|| AppError::NotFound("Story not found".to_string()))?,
    };

    ensure_can_view_owner(store, viewer_id, owner_id).await?;
    Ok(owner_id)
}

async fn toggle_like(
    store: &dyn Store,
    claims: &Claims,
    target: ContentRef,
) -> Result<Json<serde_json::Value>, AppError> {
    let student_id = claims.student_id()?;
    let now = Utc::now();
    let owner_id = engageable_owner(store, student_id, target, now).await?;

    let liked = store.toggle_like(student_id, target, now).await?;

    if liked && owner_id != student_id {
        let message = format!("{} liked your {}", claims.username, target.kind());
        record_activity(store, owner_id, message, now).await;
    }

    Ok(Json(json!({ "liked": liked })))
}

async fn add_comment(
    store: &dyn Store,
    recency: &RecencyFormatter,
    claims: &Claims,
    target: ContentRef,
    payload: CreateCommentRequest,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    payload.validate()?;

    let student_id = claims.student_id()?;
    let now = Utc::now();
    let owner_id = engageable_owner(store, student_id, target, now).await?;

    let content = clean_html(payload.content.trim());
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment must not be empty".to_string()));
    }

    let comment = store
        .insert_comment(NewComment {
            student_id,
            target,
            content,
            created_at: now,
        })
        .await?;

    if owner_id != student_id {
        let message = format!("{} commented on your {}", claims.username, target.kind());
        record_activity(store, owner_id, message, now).await;
    }

    let view = CommentView {
        id: comment.id,
        student_id,
        username: claims.username.clone(),
        content: comment.content,
        created_at: comment.created_at,
    };

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse::from_view(view, recency, now)),
    ))
}

async fn comments_of(
    store: &dyn Store,
    recency: &RecencyFormatter,
    claims: &Claims,
    target: ContentRef,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    let now = Utc::now();
    engageable_owner(store, claims.student_id()?, target, now).await?;

    let comments = store
        .list_comments(target)
        .await?
        .into_iter()
        .map(|view| CommentResponse::from_view(view, recency, now))
        .collect();

    Ok(Json(comments))
}

/// Toggle like on a post.
pub async fn like_post(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    toggle_like(store.as_ref(), &claims, ContentRef::Post(id)).await
}

/// Toggle like on a story.
pub async fn like_story(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    toggle_like(store.as_ref(), &claims, ContentRef::Story(id)).await
}

pub async fn comment_post(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    add_comment(store.as_ref(), &recency, &claims, ContentRef::Post(id), payload).await
}

pub async fn comment_story(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    add_comment(store.as_ref(), &recency, &claims, ContentRef::Story(id), payload).await
}

/// Comments on a post, oldest first.
pub async fn list_post_comments(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    comments_of(store.as_ref(), &recency, &claims, ContentRef::Post(id)).await
}

/// Comments on a story, oldest first.
pub async fn list_story_comments(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    comments_of(store.as_ref(), &recency, &claims, ContentRef::Story(id)).await
}

/// Deletes a comment. Allowed for its author and for the owner of the post
/// or story it was left on.
pub async fn delete_comment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;

    let comment = store
        .find_comment(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    let target_owner = match comment.target {
        ContentRef::Post(post_id) => store.find_post(post_id).await?.map(|p| p.student_id),
        ContentRef::Story(story_id) => store.find_story(story_id).await?.map(|s| s.student_id),
    };

    if comment.student_id != student_id && target_owner != Some(student_id) {
        return Err(AppError::Forbidden(
            "You cannot delete this comment".to_string(),
        ));
    }

    store.delete_comment(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
