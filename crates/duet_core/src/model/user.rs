//! User identity record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// Account owned by one person; referenced by memberships, journal entries
/// and notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Contact handle used for sign-in.
    pub email: Option<String>,
    /// Display name shown to the partner.
    pub nickname: String,
    /// Object-storage reference for the avatar image.
    pub avatar: Option<String>,
    pub created_at: i64,
    pub is_deleted: bool,
}

/// Input for `UserRepository::create_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: Option<String>,
    pub nickname: String,
    pub avatar: Option<String>,
}

impl NewUser {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            email: None,
            nickname: nickname.into(),
            avatar: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// Public projection of a user embedded in space views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: UserId,
    pub email: Option<String>,
    pub nickname: String,
    pub avatar: Option<String>,
}

impl From<User> for Partner {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            nickname: user.nickname,
            avatar: user.avatar,
        }
    }
}
