// src/handlers/students.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        post::PostResponse,
        story::StoryResponse,
        student::{BestPopularityEntry, ProfileResponse, Student, UpdateProfileRequest},
    },
    ranking::{RecencyFormatter, student_popularity},
    store::{PostStore, RelationStore, SharedStore, Store, StoryStore, StudentStore},
    utils::{
        access::{ensure_can_view_owner, load_active_student},
        html::{clean_html, clean_optional},
        jwt::Claims,
    },
};

const LEADERBOARD_SIZE: usize = 10;

async fn profile(
    store: &dyn Store,
    student: Student,
    is_following: bool,
) -> Result<ProfileResponse, AppError> {
    let activity = store.student_activity(student.id).await?;
    let score = student_popularity(&activity);
    Ok(ProfileResponse::new(student, &activity, score, is_following))
}

/// Current student's profile with counters and popularity.
pub async fn get_me(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student = load_active_student(store.as_ref(), claims.student_id()?).await?;
    Ok(Json(profile(store.as_ref(), student, false).await?))
}

/// Partial profile update. Text fields are sanitized before storage.
pub async fn update_me(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let student_id = claims.student_id()?;
    load_active_student(store.as_ref(), student_id).await?;

    let name = |value: Option<String>| -> Result<Option<String>, AppError> {
        match value.map(|v| clean_html(v.trim())) {
            Some(v) if v.is_empty() => {
                Err(AppError::BadRequest("Name must not be empty".to_string()))
            }
            other => Ok(other),
        }
    };

    let changes = UpdateProfileRequest {
        first_name: name(payload.first_name)?,
        last_name: name(payload.last_name)?,
        bio: payload.bio.map(|bio| clean_html(bio.trim())),
        profile_photo: clean_optional(payload.profile_photo),
        is_private: payload.is_private,
    };

    let student = store.update_profile(student_id, &changes).await?;
    tracing::debug!("Student {} updated their profile", student_id);

    Ok(Json(profile(store.as_ref(), student, false).await?))
}

/// Another student's profile. Blocks hide it entirely; private profiles still
/// show their header and counters.
pub async fn get_student(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = claims.student_id()?;
    let student = load_active_student(store.as_ref(), id).await?;

    if viewer_id != id && store.has_block_between(viewer_id, id).await? {
        return Err(AppError::Forbidden(
            "Access blocked between students".to_string(),
        ));
    }

    let is_following = viewer_id != id && store.is_following(viewer_id, id).await?;
    Ok(Json(profile(store.as_ref(), student, is_following).await?))
}

/// Top students by popularity, highest first.
pub async fn best_popularity(
    State(store): State<SharedStore>,
) -> Result<impl IntoResponse, AppError> {
    let students = store.list_active_students().await?;

    let mut ranked = Vec::with_capacity(students.len());
    for student in students {
        let activity = store.student_activity(student.id).await?;
        ranked.push(BestPopularityEntry {
            id: student.id,
            username: student.username,
            profile_photo: student.profile_photo,
            popularity_score: student_popularity(&activity),
        });
    }

    ranked.sort_by(|a, b| {
        b.popularity_score
            .cmp(&a.popularity_score)
            .then(a.id.cmp(&b.id))
    });
    ranked.truncate(LEADERBOARD_SIZE);

    Ok(Json(ranked))
}

/// A student's visible posts, newest first.
pub async fn student_posts(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_can_view_owner(store.as_ref(), claims.student_id()?, id).await?;

    let now = Utc::now();
    let posts: Vec<PostResponse> = store
        .list_student_posts(id)
        .await?
        .into_iter()
        .map(|post| PostResponse::from_post(post, &recency, now))
        .collect();

    Ok(Json(posts))
}

/// Featured stories kept on a student's profile.
pub async fn highlights(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_can_view_owner(store.as_ref(), claims.student_id()?, id).await?;

    let now = Utc::now();
    let stories: Vec<StoryResponse> = store
        .list_featured_stories(id)
        .await?
        .into_iter()
        .map(|story| StoryResponse::from_story(story, &recency, now))
        .collect();

    Ok(Json(stories))
}
