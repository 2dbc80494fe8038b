// src/models/content.rs

use serde::{Deserialize, Serialize};

/// Target of a like or a comment: exactly one post or one story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ContentRef {
    Post(i64),
    Story(i64),
}

impl ContentRef {
    pub fn post_id(&self) -> Option<i64> {
        match self {
            ContentRef::Post(id) => Some(*id),
            ContentRef::Story(_) => None,
        }
    }

    pub fn story_id(&self) -> Option<i64> {
        match self {
            ContentRef::Story(id) => Some(*id),
            ContentRef::Post(_) => None,
        }
    }

    /// Builds a reference from the two nullable columns used in storage.
    pub fn from_columns(post_id: Option<i64>, story_id: Option<i64>) -> Option<Self> {
        match (post_id, story_id) {
            (Some(id), None) => Some(ContentRef::Post(id)),
            (None, Some(id)) => Some(ContentRef::Story(id)),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentRef::Post(_) => "post",
            ContentRef::Story(_) => "story",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_must_reference_exactly_one_target() {
        assert_eq!(ContentRef::from_columns(Some(4), None), Some(ContentRef::Post(4)));
        assert_eq!(ContentRef::from_columns(None, Some(9)), Some(ContentRef::Story(9)));
        assert_eq!(ContentRef::from_columns(Some(1), Some(2)), None);
        assert_eq!(ContentRef::from_columns(None, None), None);
    }
}
