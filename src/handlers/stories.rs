// src/handlers/stories.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    models::story::{CreateStoryRequest, ExtendStoryRequest, NewStory, Story, StoryResponse},
    ranking::RecencyFormatter,
    store::{RelationStore, SharedStore, Store, StoryStore},
    utils::{access::ensure_can_view_owner, jwt::Claims},
};

const POPULAR_STORIES: i64 = 3;

async fn owned_story(store: &dyn Store, story_id: i64, student_id: i64) -> Result<Story, AppError> {
    let story = store
        .find_story(story_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Story not found".to_string()))?;

    if story.student_id != student_id {
        return Err(AppError::Forbidden(
            "You can only modify your own stories".to_string(),
        ));
    }

    Ok(story)
}

/// Publishes a story that stays live for 24 hours.
pub async fn create_story(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let student_id = claims.student_id()?;
    let now = Utc::now();

    let story = store
        .insert_story(NewStory::new(student_id, payload.photo.trim().to_string(), now))
        .await?;

    tracing::info!("Student {} published story {}", student_id, story.id);

    Ok((
        StatusCode::CREATED,
        Json(StoryResponse::from_story(story, &recency, now)),
    ))
}

pub async fn delete_story(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_story(store.as_ref(), id, claims.student_id()?).await?;
    store.delete_story(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Pushes the expiry of an active, non-featured story back by 1 to 24 hours.
pub async fn extend_story(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ExtendStoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let story = owned_story(store.as_ref(), id, claims.student_id()?).await?;
    if !story.is_active {
        return Err(AppError::BadRequest(
            "Archived stories cannot be extended".to_string(),
        ));
    }
    if story.is_featured {
        return Err(AppError::BadRequest(
            "Featured stories cannot be extended".to_string(),
        ));
    }

    let story = store.extend_story(id, payload.hours).await?;

    Ok(Json(StoryResponse::from_story(story, &recency, Utc::now())))
}

/// Keeps a story on the owner's profile as a highlight.
pub async fn feature_story(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let story = owned_story(store.as_ref(), id, claims.student_id()?).await?;
    if story.is_featured {
        return Err(AppError::Conflict("Story is already featured".to_string()));
    }

    let story = store.feature_story(id).await?;

    Ok(Json(StoryResponse::from_story(story, &recency, Utc::now())))
}

/// Records that the caller saw a live story. Owners are not counted.
pub async fn view_story(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = claims.student_id()?;

    let story = store
        .find_story(id)
        .await?
        .filter(|s| s.is_live(Utc::now()))
        .ok_or_else(|| AppError::NotFound("Story not found".to_string()))?;

    ensure_can_view_owner(store.as_ref(), viewer_id, story.student_id).await?;

    if story.student_id != viewer_id {
        store.record_story_view(id, viewer_id).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Live stories of followed students, newest first.
pub async fn feed(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let author_ids: Vec<i64> = store
        .following(student_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let now = Utc::now();
    let stories: Vec<StoryResponse> = store
        .list_live_stories(&author_ids, now)
        .await?
        .into_iter()
        .map(|story| StoryResponse::from_story(story, &recency, now))
        .collect();

    Ok(Json(stories))
}

/// Top live stories of public students by score.
pub async fn popular(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let stories: Vec<StoryResponse> = store
        .list_popular_stories(claims.student_id()?, now, POPULAR_STORIES)
        .await?
        .into_iter()
        .map(|story| StoryResponse::from_story(story, &recency, now))
        .collect();

    Ok(Json(stories))
}
