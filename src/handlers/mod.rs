// src/handlers/mod.rs

pub mod auth;
pub mod friend_requests;
pub mod interaction;
pub mod logs;
pub mod posts;
pub mod relations;
pub mod stories;
pub mod students;
