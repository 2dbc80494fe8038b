// src/models/mod.rs

pub mod activity_log;
pub mod comment;
pub mod content;
pub mod friend_request;
pub mod post;
pub mod story;
pub mod student;
