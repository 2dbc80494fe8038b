// src/models/student.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::{ranking::StudentActivity, utils::html::validate_media_url};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._]+$").expect("username pattern is valid"));

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub profile_photo: Option<String>,

    pub is_private: bool,
    pub is_active: bool,
    pub is_deleted: bool,

    pub created_at: DateTime<Utc>,
}

/// Insert payload built by the registration handler.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

/// Minimal student card used in relation lists.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RelatedStudent {
    pub id: i64,
    pub username: String,
    pub profile_photo: Option<String>,
    /// When the follow or block happened.
    pub since: DateTime<Utc>,
}

/// Profile returned by `/api/students/me` and `/api/students/{id}`.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub profile_photo: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub followers_count: u64,
    pub following_count: u64,
    pub posts_count: u64,
    pub popularity_score: i64,
    /// Whether the requesting student follows this profile.
    pub is_following: bool,
}

impl ProfileResponse {
    pub fn new(
        student: Student,
        activity: &StudentActivity,
        popularity_score: i64,
        is_following: bool,
    ) -> Self {
        Self {
            id: student.id,
            username: student.username,
            first_name: student.first_name,
            last_name: student.last_name,
            bio: student.bio,
            profile_photo: student.profile_photo,
            is_private: student.is_private,
            created_at: student.created_at,
            followers_count: activity.followers,
            following_count: activity.following,
            posts_count: activity.posts,
            popularity_score,
            is_following,
        }
    }
}

/// Leaderboard row for `/api/students/best-popularity`.
#[derive(Debug, Serialize)]
pub struct BestPopularityEntry {
    pub id: i64,
    pub username: String,
    pub profile_photo: Option<String>,
    pub popularity_score: i64,
}

/// DTO for creating a new student (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(
        length(
            min = 3,
            max = 30,
            message = "Username length must be between 3 and 30 characters."
        ),
        custom(function = validate_username)
    )]
    pub username: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
}

/// DTO for student login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 30))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for profile edits. Absent fields stay untouched.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 300, message = "Bio must be at most 300 characters"))]
    pub bio: Option<String>,
    #[validate(custom(function = validate_media_url))]
    pub profile_photo: Option<String>,
    pub is_private: Option<bool>,
}

/// Lowercase letters, digits, dots and underscores only.
fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::new("invalid_username"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str) -> CreateStudentRequest {
        CreateStudentRequest {
            username: username.to_string(),
            password: "secret123".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Yilmaz".to_string(),
        }
    }

    #[test]
    fn accepts_campus_usernames() {
        assert!(request("ada.yilmaz_21").validate().is_ok());
    }

    #[test]
    fn rejects_uppercase_and_spaces() {
        assert!(request("Ada").validate().is_err());
        assert!(request("ada yilmaz").validate().is_err());
        assert!(request("ab").validate().is_err());
    }
}
