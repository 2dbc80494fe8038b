// src/handlers/relations.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppError,
    handlers::logs::record_activity,
    store::{FriendRequestStore, RelationStore, SharedStore, StudentStore},
    utils::{
        access::{ensure_can_view_owner, load_active_student},
        jwt::Claims,
    },
};

/// Follow another student.
///
/// Public students are followed at once (201 Created). A private student gets
/// a pending friend request instead (202 Accepted), and the follow only
/// exists once they accept it.
pub async fn follow(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    if student_id == id {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }

    let target = load_active_student(store.as_ref(), id).await?;

    if store.has_block_between(student_id, id).await? {
        return Err(AppError::Forbidden(
            "Access blocked between students".to_string(),
        ));
    }

    if store.is_following(student_id, id).await? {
        return Err(AppError::Conflict("Already following this student".to_string()));
    }

    let now = Utc::now();

    if target.is_private {
        let request = store.create_friend_request(student_id, id, now).await?;

        let message = format!("{} sent you a request", claims.username);
        record_activity(store.as_ref(), id, message, now).await;

        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "following": false, "request_id": request.id })),
        ));
    }

    store.follow(student_id, id, now).await?;

    let message = format!("{} started following you", claims.username);
    record_activity(store.as_ref(), id, message, now).await;

    Ok((StatusCode::CREATED, Json(json!({ "following": true }))))
}

pub async fn unfollow(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.unfollow(claims.student_id()?, id).await? {
        return Err(AppError::NotFound(
            "You are not following this student".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn followers(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_can_view_owner(store.as_ref(), claims.student_id()?, id).await?;
    Ok(Json(store.followers(id).await?))
}

pub async fn following(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_can_view_owner(store.as_ref(), claims.student_id()?, id).await?;
    Ok(Json(store.following(id).await?))
}

/// Blocks a student.
///
/// Follows in both directions disappear, and so do the likes and comments
/// each side left on the other's posts and stories.
pub async fn block(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    if student_id == id {
        return Err(AppError::BadRequest("You cannot block yourself".to_string()));
    }

    store
        .find_student(id)
        .await?
        .filter(|s| !s.is_deleted)
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    store.block(student_id, id, Utc::now()).await?;
    tracing::info!("Student {} blocked student {}", student_id, id);

    Ok((StatusCode::CREATED, Json(json!({ "blocked": true }))))
}

pub async fn unblock(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.unblock(claims.student_id()?, id).await? {
        return Err(AppError::NotFound("Student is not blocked".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Students the caller has blocked.
pub async fn blocked(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.blocked_students(claims.student_id()?).await?))
}
