// src/utils/access.rs

use crate::{
    error::AppError,
    models::student::Student,
    store::{RelationStore, Store, StudentStore},
};

/// Loads a student that can be interacted with.
///
/// Deleted accounts are reported as missing; deactivated ones as forbidden.
pub async fn load_active_student(store: &dyn Store, id: i64) -> Result<Student, AppError> {
    let student = store
        .find_student(id)
        .await?
        .filter(|s| !s.is_deleted)
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    if !student.is_active {
        return Err(AppError::Forbidden("This account is inactive".to_string()));
    }

    Ok(student)
}

/// Decides whether `viewer_id` may see content owned by `owner`.
///
/// Owners always see their own content. A block in either direction hides
/// everything, and a private owner is only visible to followers.
pub async fn ensure_can_view(
    store: &dyn Store,
    viewer_id: i64,
    owner: &Student,
) -> Result<(), AppError> {
    if viewer_id == owner.id {
        return Ok(());
    }

    if store.has_block_between(viewer_id, owner.id).await? {
        return Err(AppError::Forbidden(
            "Access blocked between students".to_string(),
        ));
    }

    if owner.is_private && !store.is_following(viewer_id, owner.id).await? {
        return Err(AppError::Forbidden("This profile is private".to_string()));
    }

    Ok(())
}

/// Like [`ensure_can_view`], starting from the owner's id.
pub async fn ensure_can_view_owner(
    store: &dyn Store,
    viewer_id: i64,
    owner_id: i64,
) -> Result<Student, AppError> {
    let owner = load_active_student(store, owner_id).await?;
    ensure_can_view(store, viewer_id, &owner).await?;
    Ok(owner)
}
