// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::student::{CreateStudentRequest, LoginRequest, NewStudent},
    store::{SharedStore, StudentStore},
    utils::{
        hash::{hash_password, verify_password},
        html::clean_html,
        jwt::sign_jwt,
    },
};

/// Registers a new student.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the student object (excluding password).
pub async fn register(
    State(store): State<SharedStore>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let first_name = clean_html(payload.first_name.trim());
    let last_name = clean_html(payload.last_name.trim());
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;

    let student = store
        .create_student(NewStudent {
            username: payload.username,
            password_hash,
            first_name,
            last_name,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!("Registered student {} ({})", student.username, student.id);

    Ok((StatusCode::CREATED, Json(student)))
}

/// Authenticates a student and returns a JWT token.
///
/// Unknown usernames and wrong passwords get the same 401. Deactivated or
/// deleted accounts are refused after the password check.
pub async fn login(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let student = store
        .find_student_by_username(&payload.username)
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &student.password)? {
        return Err(AppError::AuthError(
            "Invalid username or password".to_string(),
        ));
    }

    if student.is_deleted || !student.is_active {
        return Err(AppError::Forbidden("This account is inactive".to_string()));
    }

    let token = sign_jwt(
        student.id,
        &student.username,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "student_id": student.id
    })))
}
