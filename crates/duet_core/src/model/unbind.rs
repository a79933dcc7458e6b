//! Unbind request record and its status machine.
//!
//! # Invariants
//! - `expires_at == requested_at + UNBIND_COOLING_OFF_MS`.
//! - Status only moves `pending -> cancelled` or `pending -> completed`.
//! - At most one `pending` request exists per space.

use crate::clock::MILLIS_PER_DAY;
use crate::model::space::SpaceId;
use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UnbindRequestId = Uuid;

pub const UNBIND_COOLING_OFF_DAYS: i64 = 7;
pub const UNBIND_COOLING_OFF_MS: i64 = UNBIND_COOLING_OFF_DAYS * MILLIS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnbindStatus {
    Pending,
    Cancelled,
    Completed,
}

impl UnbindStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Cancelled) | (Self::Pending, Self::Completed)
        )
    }
}

/// Reversible request to dissolve a space after the cooling-off period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbindRequest {
    pub id: UnbindRequestId,
    pub space_id: SpaceId,
    pub requested_by: UserId,
    pub requested_at: i64,
    pub expires_at: i64,
    pub status: UnbindStatus,
}

impl UnbindRequest {
    /// Builds a fresh pending request starting at `requested_at`.
    pub fn pending(space_id: SpaceId, requested_by: UserId, requested_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            space_id,
            requested_by,
            requested_at,
            expires_at: requested_at + UNBIND_COOLING_OFF_MS,
            status: UnbindStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == UnbindStatus::Pending
    }

    /// Expiry is inclusive: a request is due once `now >= expires_at`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}
