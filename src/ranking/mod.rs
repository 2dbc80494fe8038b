// src/ranking/mod.rs

pub mod popularity;
pub mod recency;

pub use popularity::{EngagementCounts, StudentActivity, popularity_score, student_popularity};
pub use recency::{RecencyFormatter, RecencyLocale};
