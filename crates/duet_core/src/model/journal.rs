//! Memory, milestone, reaction and comment records owned by a space.
//!
//! Only the lifecycle-relevant surface lives here: these rows are created by
//! the journal features and bulk-deleted when their space is destroyed.
//! Reactions and comments hang off a memory and go with it.

use crate::model::space::SpaceId;
use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MemoryId = Uuid;
pub type MilestoneId = Uuid;
pub type ReactionId = Uuid;
pub type CommentId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub space_id: SpaceId,
    pub content: String,
    pub mood: Option<String>,
    /// Object-storage references, in display order.
    pub photos: Vec<String>,
    pub location: Option<String>,
    pub created_by: UserId,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMemory {
    pub space_id: SpaceId,
    pub content: String,
    pub mood: Option<String>,
    pub photos: Vec<String>,
    pub location: Option<String>,
    pub created_by: UserId,
}

impl NewMemory {
    pub fn text(space_id: SpaceId, created_by: UserId, content: impl Into<String>) -> Self {
        Self {
            space_id,
            content: content.into(),
            mood: None,
            photos: Vec::new(),
            location: None,
            created_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub space_id: SpaceId,
    pub title: String,
    pub description: Option<String>,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Free-form category tag (`anniversary`, `trip`, ...).
    pub kind: String,
    pub icon: Option<String>,
    pub created_by: UserId,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMilestone {
    pub space_id: SpaceId,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub kind: String,
    pub icon: Option<String>,
    pub created_by: UserId,
}

impl NewMilestone {
    pub fn new(
        space_id: SpaceId,
        created_by: UserId,
        title: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            space_id,
            title: title.into(),
            description: None,
            date: date.into(),
            kind: "custom".to_string(),
            icon: None,
            created_by,
        }
    }
}

/// One user's reaction to a memory. A user holds at most one live reaction
/// per memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: ReactionId,
    pub memory_id: MemoryId,
    pub user_id: UserId,
    /// Reaction tag (`love`, ...).
    pub kind: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReaction {
    pub memory_id: MemoryId,
    pub user_id: UserId,
    pub kind: String,
}

impl NewReaction {
    pub fn love(memory_id: MemoryId, user_id: UserId) -> Self {
        Self {
            memory_id,
            user_id,
            kind: "love".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub memory_id: MemoryId,
    pub user_id: UserId,
    /// Comment this one replies to.
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub memory_id: MemoryId,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

impl NewComment {
    pub fn new(memory_id: MemoryId, user_id: UserId, content: impl Into<String>) -> Self {
        Self {
            memory_id,
            user_id,
            parent_id: None,
            content: content.into(),
        }
    }

    pub fn reply_to(mut self, parent_id: CommentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}
