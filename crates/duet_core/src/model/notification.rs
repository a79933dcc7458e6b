//! In-app notification record.
//!
//! Notifications are created as side effects of lifecycle operations and are
//! only mutated afterwards to flip the read flag.

use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NotificationId = Uuid;

/// Type tag for notifications emitted by the lifecycle layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PartnerJoined,
    UnbindRequested,
    UnbindCancelled,
    SpaceUnbound,
    SpaceDeleted,
    Memory,
    Milestone,
    Reminder,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PartnerJoined => "partner_joined",
            Self::UnbindRequested => "unbind_requested",
            Self::UnbindCancelled => "unbind_cancelled",
            Self::SpaceUnbound => "space_unbound",
            Self::SpaceDeleted => "space_deleted",
            Self::Memory => "memory",
            Self::Milestone => "milestone",
            Self::Reminder => "reminder",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "partner_joined" => Some(Self::PartnerJoined),
            "unbind_requested" => Some(Self::UnbindRequested),
            "unbind_cancelled" => Some(Self::UnbindCancelled),
            "space_unbound" => Some(Self::SpaceUnbound),
            "space_deleted" => Some(Self::SpaceDeleted),
            "memory" => Some(Self::Memory),
            "milestone" => Some(Self::Milestone),
            "reminder" => Some(Self::Reminder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: i64,
    pub read: bool,
    /// Client route the notification links to, if any.
    pub action_ref: Option<String>,
}

/// Input for `NotificationRepository::create_notification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_ref: Option<String>,
}
