//! Persistence contract shared by every storage adapter.
//!
//! # Responsibility
//! - Define one operation per entity/action pair needed by the services.
//! - Return semantic values and semantic conflicts, never raw rows.
//! - Keep SQLite and document-store details out of the service layer.
//!
//! # Invariants
//! - `get_*` returns `Ok(None)` for absent or tombstoned records.
//! - `create_*` returns the stored entity with generated id and timestamps.
//! - Adapters enforce: one active membership per user, at most
//!   `MAX_MEMBERS_PER_SPACE` active memberships per space, one pending unbind
//!   request per space, one active space per invite code.
//! - `delete_*` calls tombstone rows and are idempotent.
//! - `destroy_space` tombstones the space row before any dependent, so a
//!   racing join or unbind request sees `NotFound` instead of a half-torn
//!   space.

pub mod document_backend;
pub mod document_repo;
pub mod sqlite_repo;

use crate::db::DbError;
use crate::model::journal::{
    Comment, CommentId, Memory, MemoryId, Milestone, MilestoneId, NewComment, NewMemory,
    NewMilestone, NewReaction, Reaction, ReactionId,
};
use crate::model::notification::{NewNotification, Notification, NotificationId};
use crate::model::session::{Session, SessionId};
use crate::model::space::{Membership, NewSpace, Space, SpaceId};
use crate::model::unbind::{UnbindRequest, UnbindRequestId, UnbindStatus};
use crate::model::user::{NewUser, User, UserId, UserUpdate};
use document_backend::BackendError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error covering transport failures and semantic conflicts.
#[derive(Debug)]
pub enum RepoError {
    /// SQLite transport or bootstrap failure.
    Db(DbError),
    /// Document backend transport failure.
    Backend(BackendError),
    /// Update target does not exist or is tombstoned.
    NotFound { entity: &'static str, id: String },
    /// Persisted state cannot be decoded into the domain model.
    InvalidData(String),
    /// Connection schema does not match the migrations of this binary.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// User already holds an active membership.
    AlreadyInSpace(UserId),
    /// Space already holds the maximum number of active memberships.
    SpaceFull(SpaceId),
    /// Space already has a pending unbind request.
    UnbindAlreadyRequested(SpaceId),
    /// Another active space owns this invite code.
    InviteCodeTaken(String),
    /// Requested status change is not a legal unbind transition.
    IllegalTransition {
        from: UnbindStatus,
        to: UnbindStatus,
    },
    /// User already holds a live reaction on this memory.
    DuplicateReaction { memory_id: MemoryId, user_id: UserId },
    /// Optimistic write kept losing races and gave up.
    Conflict { entity: &'static str, id: String },
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Backend(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match \
                 expected {expected_version}"
            ),
            Self::AlreadyInSpace(user_id) => write!(f, "user already in a space: {user_id}"),
            Self::SpaceFull(space_id) => write!(f, "space is full: {space_id}"),
            Self::UnbindAlreadyRequested(space_id) => {
                write!(f, "unbind already requested for space: {space_id}")
            }
            Self::InviteCodeTaken(code) => write!(f, "invite code already in use: {code}"),
            Self::DuplicateReaction { memory_id, user_id } => {
                write!(f, "user {user_id} already reacted to memory {memory_id}")
            }
            Self::IllegalTransition { from, to } => write!(
                f,
                "illegal unbind transition: {} -> {}",
                from.as_str(),
                to.as_str()
            ),
            Self::Conflict { entity, id } => {
                write!(f, "write conflict on {entity} {id}; retries exhausted")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<BackendError> for RepoError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// What `destroy_space` does with the space's unbind requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindDisposition {
    /// Tombstone every request of the space.
    Discard,
    /// Move this pending request to `completed` and keep it readable.
    ///
    /// The destroy only happens if the request is still pending, so
    /// overlapping sweeps finalize a space once.
    Complete(UnbindRequestId),
}

/// Result of a `destroy_space` call that did the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyedSpace {
    pub space_id: SpaceId,
    /// Users whose membership ended with the space.
    pub members: Vec<UserId>,
    /// The completed request for `UnbindDisposition::Complete`.
    pub completed: Option<UnbindRequest>,
}

pub trait UserRepository {
    fn create_user(&self, user: &NewUser) -> RepoResult<User>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    /// Applies the non-`None` fields of `update`.
    fn update_user(&self, id: UserId, update: &UserUpdate) -> RepoResult<User>;
    /// Returns active users in the order of `ids`, skipping unknown ids.
    fn get_users_by_ids(&self, ids: &[UserId]) -> RepoResult<Vec<User>>;
    fn soft_delete_user(&self, id: UserId) -> RepoResult<bool>;
}

pub trait SpaceRepository {
    /// Creates the space and its owner membership as one unit.
    ///
    /// Fails with `AlreadyInSpace` when the owner has an active membership
    /// and `InviteCodeTaken` when the code belongs to another active space.
    /// On failure neither record is visible.
    fn create_space(&self, space: &NewSpace, owner: UserId) -> RepoResult<(Space, Membership)>;
    fn get_space(&self, id: SpaceId) -> RepoResult<Option<Space>>;
    fn get_space_by_invite_code(&self, invite_code: &str) -> RepoResult<Option<Space>>;
    fn update_space_anniversary(&self, id: SpaceId, anniversary_date: &str) -> RepoResult<Space>;
    fn list_spaces(&self) -> RepoResult<Vec<Space>>;
    /// Adds a membership, re-checking capacity at write time.
    ///
    /// Fails with `NotFound`, `AlreadyInSpace` or `SpaceFull`.
    fn add_member(&self, space_id: SpaceId, user_id: UserId) -> RepoResult<Membership>;
    fn get_member(&self, space_id: SpaceId, user_id: UserId) -> RepoResult<Option<Membership>>;
    fn get_membership_for_user(&self, user_id: UserId) -> RepoResult<Option<Membership>>;
    /// Active members ordered by join time.
    fn list_members(&self, space_id: SpaceId) -> RepoResult<Vec<Membership>>;
    fn count_members(&self, space_id: SpaceId) -> RepoResult<usize>;
    /// Overwrites both pet-name fields of one membership.
    fn update_member_pet_names(
        &self,
        space_id: SpaceId,
        user_id: UserId,
        pet_name: Option<&str>,
        partner_pet_name: Option<&str>,
    ) -> RepoResult<Membership>;
    fn delete_members_by_space(&self, space_id: SpaceId) -> RepoResult<usize>;
    fn delete_space(&self, id: SpaceId) -> RepoResult<bool>;
    /// Tombstones the space before anything else, then its memberships, the
    /// members' notifications, its milestones, its memories with their
    /// reactions and comments, and finally applies `unbind` to its unbind
    /// requests.
    ///
    /// Returns `Ok(None)` when there is nothing to do: the space is already
    /// retired (`Discard`) or the request is no longer pending (`Complete`).
    fn destroy_space(
        &self,
        space_id: SpaceId,
        unbind: UnbindDisposition,
    ) -> RepoResult<Option<DestroyedSpace>>;
}

pub trait UnbindRepository {
    /// Creates a pending request expiring after the cooling-off period.
    ///
    /// Fails with `UnbindAlreadyRequested` when one is already pending and
    /// `NotFound` when the space is gone.
    fn create_unbind_request(
        &self,
        space_id: SpaceId,
        requested_by: UserId,
    ) -> RepoResult<UnbindRequest>;
    fn get_unbind_request(&self, id: UnbindRequestId) -> RepoResult<Option<UnbindRequest>>;
    fn get_pending_unbind_request(&self, space_id: SpaceId) -> RepoResult<Option<UnbindRequest>>;
    /// Most recent request for the space, whatever its status.
    fn get_latest_unbind_request(&self, space_id: SpaceId) -> RepoResult<Option<UnbindRequest>>;
    /// Compare-and-set status change.
    ///
    /// Returns `Ok(None)` when the request is missing or not in `from`.
    fn transition_unbind_request(
        &self,
        id: UnbindRequestId,
        from: UnbindStatus,
        to: UnbindStatus,
    ) -> RepoResult<Option<UnbindRequest>>;
    /// Pending requests whose expiry has elapsed, oldest first.
    fn list_expired_unbind_requests(&self) -> RepoResult<Vec<UnbindRequest>>;
    fn delete_unbind_requests_by_space(&self, space_id: SpaceId) -> RepoResult<usize>;
}

pub trait SessionRepository {
    fn create_session(&self, user_id: UserId, token: &str, expires_at: i64)
        -> RepoResult<Session>;
    /// Active, unexpired session owning `token`.
    fn get_session_by_token(&self, token: &str) -> RepoResult<Option<Session>>;
    fn refresh_session(
        &self,
        id: SessionId,
        new_token: &str,
        new_expires_at: i64,
    ) -> RepoResult<Session>;
    fn delete_session(&self, id: SessionId) -> RepoResult<bool>;
    fn delete_sessions_by_user(&self, user_id: UserId) -> RepoResult<usize>;
    fn delete_expired_sessions(&self) -> RepoResult<usize>;
}

pub trait NotificationRepository {
    fn create_notification(&self, notification: &NewNotification) -> RepoResult<Notification>;
    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>>;
    /// Newest first.
    fn list_notifications_for_user(&self, user_id: UserId) -> RepoResult<Vec<Notification>>;
    fn mark_notification_read(&self, id: NotificationId) -> RepoResult<Notification>;
    fn mark_all_notifications_read(&self, user_id: UserId) -> RepoResult<usize>;
    fn delete_notifications_by_users(&self, user_ids: &[UserId]) -> RepoResult<usize>;
}

pub trait JournalRepository {
    fn create_memory(&self, memory: &NewMemory) -> RepoResult<Memory>;
    fn get_memory(&self, id: MemoryId) -> RepoResult<Option<Memory>>;
    /// Newest first.
    fn list_memories(&self, space_id: SpaceId, limit: u32, offset: u32) -> RepoResult<Vec<Memory>>;
    fn count_memories(&self, space_id: SpaceId) -> RepoResult<usize>;
    fn delete_memory(&self, id: MemoryId) -> RepoResult<bool>;
    fn delete_memories_by_space(&self, space_id: SpaceId) -> RepoResult<usize>;

    fn create_milestone(&self, milestone: &NewMilestone) -> RepoResult<Milestone>;
    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>>;
    /// Ordered by milestone date.
    fn list_milestones(&self, space_id: SpaceId) -> RepoResult<Vec<Milestone>>;
    fn delete_milestone(&self, id: MilestoneId) -> RepoResult<bool>;
    fn delete_milestones_by_space(&self, space_id: SpaceId) -> RepoResult<usize>;
}

pub trait InteractionRepository {
    /// Fails with `DuplicateReaction` when the user already reacted.
    fn create_reaction(&self, reaction: &NewReaction) -> RepoResult<Reaction>;
    fn get_reaction(&self, memory_id: MemoryId, user_id: UserId) -> RepoResult<Option<Reaction>>;
    /// Newest first.
    fn list_reactions(&self, memory_id: MemoryId) -> RepoResult<Vec<Reaction>>;
    fn delete_reaction(&self, id: ReactionId) -> RepoResult<bool>;
    fn delete_reactions_by_memory(&self, memory_id: MemoryId) -> RepoResult<usize>;

    fn create_comment(&self, comment: &NewComment) -> RepoResult<Comment>;
    fn get_comment(&self, id: CommentId) -> RepoResult<Option<Comment>>;
    /// Oldest first.
    fn list_comments(&self, memory_id: MemoryId) -> RepoResult<Vec<Comment>>;
    fn count_comments(&self, memory_id: MemoryId) -> RepoResult<usize>;
    /// Tombstones the comment and its direct replies.
    fn delete_comment(&self, id: CommentId) -> RepoResult<usize>;
    fn delete_comments_by_memory(&self, memory_id: MemoryId) -> RepoResult<usize>;
}

/// Full storage surface consumed by the services.
///
/// Chosen once at process start (see `config::open_store`) and shared as
/// `Arc<dyn Store>`.
pub trait Store:
    UserRepository
    + SpaceRepository
    + UnbindRepository
    + SessionRepository
    + NotificationRepository
    + JournalRepository
    + InteractionRepository
    + Send
    + Sync
{
    /// Short adapter name for logs (`sqlite`, `document`).
    fn backend_name(&self) -> &'static str;
}
