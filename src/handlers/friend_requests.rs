// src/handlers/friend_requests.rs

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
    models::friend_request::{FriendRequest, FriendRequestResponse, FriendRequestView},
    ranking::RecencyFormatter,
    store::{FriendRequestStore, SharedStore, Store, StudentStore},
    utils::jwt::Claims,
};

async fn load_request(store: &dyn Store, id: i64) -> Result<FriendRequest, AppError> {
    store
        .find_friend_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))
}

/// Only the receiver may answer a request.
async fn addressed_to(
    store: &dyn Store,
    id: i64,
    claims: &Claims,
) -> Result<FriendRequest, AppError> {
    let request = load_request(store, id).await?;
    if request.receiver_id != claims.student_id()? {
        return Err(AppError::Forbidden(
            "This request is not addressed to you".to_string(),
        ));
    }
    Ok(request)
}

async fn username_of(store: &dyn Store, id: i64) -> Result<String, AppError> {
    store
        .find_student(id)
        .await?
        .filter(|s| !s.is_deleted)
        .map(|s| s.username)
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))
}

fn respond(
    views: Vec<FriendRequestView>,
    recency: &RecencyFormatter,
) -> Json<Vec<FriendRequestResponse>> {
    let now = Utc::now();
    Json(
        views
            .into_iter()
            .map(|view| FriendRequestResponse::from_view(view, recency, now))
            .collect(),
    )
}

/// Pending requests addressed to the caller, newest first.
pub async fn received(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let views = store.received_friend_requests(claims.student_id()?).await?;
    Ok(respond(views, &recency))
}

/// Pending requests the caller sent, newest first.
pub async fn sent(
    State(store): State<SharedStore>,
    State(recency): State<RecencyFormatter>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let views = store.sent_friend_requests(claims.student_id()?).await?;
    Ok(respond(views, &recency))
}

/// Accepts a request: the sender now follows the caller.
pub async fn accept(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let request = addressed_to(store.as_ref(), id, &claims).await?;
    let sender = username_of(store.as_ref(), request.sender_id).await?;

    let now = Utc::now();
    store.accept_friend_request(id, now).await?;
    tracing::info!(
        "Student {} accepted friend request {} from student {}",
        request.receiver_id,
        id,
        request.sender_id
    );

    record_activity(
        store.as_ref(),
        request.receiver_id,
        format!("{} started following you", sender),
        now,
    )
    .await;
    record_activity(
        store.as_ref(),
        request.sender_id,
        format!("{} accepted your request", claims.username),
        now,
    )
    .await;

    Ok(Json(json!({ "accepted": true })))
}

pub async fn reject(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let request = addressed_to(store.as_ref(), id, &claims).await?;

    if !store.delete_friend_request(id).await? {
        return Err(AppError::NotFound("Friend request not found".to_string()));
    }

    let message = format!("{} rejected your request", claims.username);
    record_activity(store.as_ref(), request.sender_id, message, Utc::now()).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Withdraws a request the caller sent.
pub async fn cancel(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let request = load_request(store.as_ref(), id).await?;
    if request.sender_id != claims.student_id()? {
        return Err(AppError::Forbidden(
            "Only the sender can cancel this request".to_string(),
        ));
    }

    if !store.delete_friend_request(id).await? {
        return Err(AppError::NotFound("Friend request not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
