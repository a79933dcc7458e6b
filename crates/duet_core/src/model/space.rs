//! Space and membership records.
//!
//! # Invariants
//! - Invite codes are exactly 6 characters from `[A-Z0-9]`.
//! - A user holds at most one active membership.
//! - A space holds at most `MAX_MEMBERS_PER_SPACE` active memberships.

use crate::model::user::{Partner, UserId};
use crate::model::ValidationError;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SpaceId = Uuid;

pub const MAX_MEMBERS_PER_SPACE: usize = 2;
pub const INVITE_CODE_LEN: usize = 6;
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static INVITE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{6}$").expect("valid invite code regex"));

/// Shared container two partners bind into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub created_at: i64,
    /// `YYYY-MM-DD`.
    pub anniversary_date: String,
    pub invite_code: String,
    pub is_deleted: bool,
}

/// Input for `SpaceRepository::create_space`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSpace {
    pub anniversary_date: String,
    pub invite_code: String,
}

/// Join record linking one user to one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub space_id: SpaceId,
    pub user_id: UserId,
    pub joined_at: i64,
    /// What this user calls the partner.
    pub pet_name: Option<String>,
    /// What the partner calls this user.
    pub partner_pet_name: Option<String>,
    pub is_deleted: bool,
}

/// Space plus its active partners, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceView {
    pub id: SpaceId,
    pub created_at: i64,
    pub anniversary_date: String,
    pub invite_code: String,
    pub partners: Vec<Partner>,
}

impl SpaceView {
    pub fn new(space: Space, partners: Vec<Partner>) -> Self {
        Self {
            id: space.id,
            created_at: space.created_at,
            anniversary_date: space.anniversary_date,
            invite_code: space.invite_code,
            partners,
        }
    }

    pub fn has_partner(&self, user_id: UserId) -> bool {
        self.partners.iter().any(|partner| partner.id == user_id)
    }
}

/// Pet names seen from one member's perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetNames {
    pub my_pet_name: Option<String>,
    pub partner_pet_name: Option<String>,
}

/// Generates a random invite code from `[A-Z0-9]`.
///
/// Uniqueness is not guaranteed here; stores reject active duplicates and
/// callers regenerate.
pub fn generate_invite_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..INVITE_CODE_LEN)
        .map(|_| {
            let index = rng.gen_range(0..INVITE_CODE_ALPHABET.len());
            INVITE_CODE_ALPHABET[index] as char
        })
        .collect()
}

/// Normalizes user-typed invite codes (trim + uppercase) and validates shape.
pub fn normalize_invite_code(value: &str) -> Result<String, ValidationError> {
    let normalized = value.trim().to_ascii_uppercase();
    if !INVITE_CODE_RE.is_match(&normalized) {
        return Err(ValidationError::InvalidInviteCode(value.to_string()));
    }
    Ok(normalized)
}
