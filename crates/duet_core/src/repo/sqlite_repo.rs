//! SQLite implementation of the persistence contract.
//!
//! # Responsibility
//! - Map every contract operation onto the migrated SQLite schema.
//! - Enforce membership/unbind/invite-code invariants with row constraints
//!   and `IMMEDIATE` transactions.
//! - Run every multi-table cascade inside one transaction.
//!
//! # Invariants
//! - Reads filter `is_deleted = 0`; writes never hard-delete outside `reset`.
//! - All calls serialize on one connection, so each call observes all prior
//!   writes.
//! - Read paths reject undecodable rows instead of masking them.

use crate::clock::Clock;
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory};
use crate::model::journal::{
    Comment, CommentId, Memory, MemoryId, Milestone, MilestoneId, NewComment, NewMemory,
    NewMilestone, NewReaction, Reaction, ReactionId,
};
use crate::model::notification::{
    NewNotification, Notification, NotificationId, NotificationKind,
};
use crate::model::session::{Session, SessionId};
use crate::model::space::{Membership, NewSpace, Space, SpaceId, MAX_MEMBERS_PER_SPACE};
use crate::model::unbind::{UnbindRequest, UnbindRequestId, UnbindStatus};
use crate::model::user::{NewUser, User, UserId, UserUpdate};
use crate::repo::{
    DestroyedSpace, InteractionRepository, JournalRepository, NotificationRepository, RepoError,
    RepoResult, SessionRepository, SpaceRepository, Store, UnbindDisposition, UnbindRepository,
    UserRepository,
};
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const USER_SELECT_SQL: &str =
    "SELECT id, email, nickname, avatar, created_at, is_deleted FROM users";
const SPACE_SELECT_SQL: &str =
    "SELECT id, created_at, anniversary_date, invite_code, is_deleted FROM spaces";
const MEMBER_SELECT_SQL: &str = "SELECT
    space_id,
    user_id,
    joined_at,
    pet_name,
    partner_pet_name,
    is_deleted
FROM space_members";
const UNBIND_SELECT_SQL: &str = "SELECT
    id,
    space_id,
    requested_by,
    requested_at,
    expires_at,
    status
FROM unbind_requests";
const SESSION_SELECT_SQL: &str =
    "SELECT id, user_id, token, created_at, expires_at FROM sessions";
const NOTIFICATION_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    kind,
    title,
    message,
    created_at,
    is_read,
    action_ref
FROM notifications";
const MEMORY_SELECT_SQL: &str = "SELECT
    id,
    space_id,
    content,
    mood,
    photos,
    location,
    created_by,
    created_at
FROM memories";
const MILESTONE_SELECT_SQL: &str = "SELECT
    id,
    space_id,
    title,
    description,
    date,
    kind,
    icon,
    created_by,
    created_at
FROM milestones";
const REACTION_SELECT_SQL: &str =
    "SELECT id, memory_id, user_id, kind, created_at FROM reactions";
const COMMENT_SELECT_SQL: &str =
    "SELECT id, memory_id, user_id, parent_id, content, created_at FROM comments";

/// Embedded store over one migrated SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?, clock)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?, clock)
    }

    /// Wraps an already-migrated connection.
    ///
    /// Rejects connections whose schema version differs from this binary.
    pub fn try_new(conn: Connection, clock: Arc<dyn Clock>) -> RepoResult<Self> {
        let actual_version = current_user_version(&conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Physically removes every row. Test/reset flows only.
    pub fn reset(&self) -> RepoResult<()> {
        self.conn.lock().execute_batch(
            "DELETE FROM notifications;
             DELETE FROM reactions;
             DELETE FROM comments;
             DELETE FROM milestones;
             DELETE FROM memories;
             DELETE FROM unbind_requests;
             DELETE FROM sessions;
             DELETE FROM space_members;
             DELETE FROM spaces;
             DELETE FROM users;",
        )?;
        Ok(())
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }
}

impl Store for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

impl UserRepository for SqliteStore {
    fn create_user(&self, user: &NewUser) -> RepoResult<User> {
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            created_at: self.now(),
            is_deleted: false,
        };

        self.conn.lock().execute(
            "INSERT INTO users (id, email, nickname, avatar, created_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, 0);",
            params![
                created.id.to_string(),
                created.email.as_deref(),
                created.nickname.as_str(),
                created.avatar.as_deref(),
                created.created_at,
            ],
        )?;

        Ok(created)
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        let conn = self.conn.lock();
        load_user(&conn, id)
    }

    fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{USER_SELECT_SQL}
             WHERE email = ?1
               AND is_deleted = 0
             ORDER BY created_at ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([email])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_user_row(row)?)),
            None => Ok(None),
        }
    }

    fn update_user(&self, id: UserId, update: &UserUpdate) -> RepoResult<User> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users
             SET
                nickname = COALESCE(?2, nickname),
                avatar = COALESCE(?3, avatar)
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                update.nickname.as_deref(),
                update.avatar.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("user", id));
        }

        load_user(&conn, id)?.ok_or_else(|| RepoError::not_found("user", id))
    }

    fn get_users_by_ids(&self, ids: &[UserId]) -> RepoResult<Vec<User>> {
        let conn = self.conn.lock();
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = load_user(&conn, *id)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn soft_delete_user(&self, id: UserId) -> RepoResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE users SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

impl SpaceRepository for SqliteStore {
    fn create_space(&self, space: &NewSpace, owner: UserId) -> RepoResult<(Space, Membership)> {
        let now = self.now();
        let created = Space {
            id: Uuid::new_v4(),
            created_at: now,
            anniversary_date: space.anniversary_date.clone(),
            invite_code: space.invite_code.clone(),
            is_deleted: false,
        };
        let membership = Membership {
            space_id: created.id,
            user_id: owner,
            joined_at: now,
            pet_name: None,
            partner_pet_name: None,
            is_deleted: false,
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if load_membership_for_user(&tx, owner)?.is_some() {
            return Err(RepoError::AlreadyInSpace(owner));
        }

        let inserted = tx.execute(
            "INSERT INTO spaces (id, created_at, anniversary_date, invite_code, is_deleted)
             VALUES (?1, ?2, ?3, ?4, 0);",
            params![
                created.id.to_string(),
                created.created_at,
                created.anniversary_date.as_str(),
                created.invite_code.as_str(),
            ],
        );
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(RepoError::InviteCodeTaken(created.invite_code));
            }
            return Err(err.into());
        }

        insert_membership(&tx, &membership)?;
        tx.commit()?;

        debug!(
            "event=space_insert module=repo backend=sqlite status=ok space_id={}",
            created.id
        );
        Ok((created, membership))
    }

    fn get_space(&self, id: SpaceId) -> RepoResult<Option<Space>> {
        let conn = self.conn.lock();
        load_space(&conn, id)
    }

    fn get_space_by_invite_code(&self, invite_code: &str) -> RepoResult<Option<Space>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SPACE_SELECT_SQL} WHERE invite_code = ?1 AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([invite_code])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_space_row(row)?)),
            None => Ok(None),
        }
    }

    fn update_space_anniversary(&self, id: SpaceId, anniversary_date: &str) -> RepoResult<Space> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE spaces SET anniversary_date = ?2 WHERE id = ?1 AND is_deleted = 0;",
            params![id.to_string(), anniversary_date],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("space", id));
        }
        load_space(&conn, id)?.ok_or_else(|| RepoError::not_found("space", id))
    }

    fn list_spaces(&self) -> RepoResult<Vec<Space>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SPACE_SELECT_SQL} WHERE is_deleted = 0 ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut spaces = Vec::new();
        while let Some(row) = rows.next()? {
            spaces.push(parse_space_row(row)?);
        }
        Ok(spaces)
    }

    fn add_member(&self, space_id: SpaceId, user_id: UserId) -> RepoResult<Membership> {
        let membership = Membership {
            space_id,
            user_id,
            joined_at: self.now(),
            pet_name: None,
            partner_pet_name: None,
            is_deleted: false,
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if load_space(&tx, space_id)?.is_none() {
            return Err(RepoError::not_found("space", space_id));
        }
        if load_membership_for_user(&tx, user_id)?.is_some() {
            return Err(RepoError::AlreadyInSpace(user_id));
        }
        if count_active_members(&tx, space_id)? >= MAX_MEMBERS_PER_SPACE {
            return Err(RepoError::SpaceFull(space_id));
        }

        insert_membership(&tx, &membership)?;
        tx.commit()?;
        Ok(membership)
    }

    fn get_member(&self, space_id: SpaceId, user_id: UserId) -> RepoResult<Option<Membership>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{MEMBER_SELECT_SQL}
             WHERE space_id = ?1
               AND user_id = ?2
               AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query(params![space_id.to_string(), user_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_membership_row(row)?)),
            None => Ok(None),
        }
    }

    fn get_membership_for_user(&self, user_id: UserId) -> RepoResult<Option<Membership>> {
        let conn = self.conn.lock();
        load_membership_for_user(&conn, user_id)
    }

    fn list_members(&self, space_id: SpaceId) -> RepoResult<Vec<Membership>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{MEMBER_SELECT_SQL}
             WHERE space_id = ?1
               AND is_deleted = 0
             ORDER BY joined_at ASC, member_seq ASC;"
        ))?;
        let mut rows = stmt.query([space_id.to_string()])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_membership_row(row)?);
        }
        Ok(members)
    }

    fn count_members(&self, space_id: SpaceId) -> RepoResult<usize> {
        let conn = self.conn.lock();
        count_active_members(&conn, space_id)
    }

    fn update_member_pet_names(
        &self,
        space_id: SpaceId,
        user_id: UserId,
        pet_name: Option<&str>,
        partner_pet_name: Option<&str>,
    ) -> RepoResult<Membership> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE space_members
             SET pet_name = ?3, partner_pet_name = ?4
             WHERE space_id = ?1
               AND user_id = ?2
               AND is_deleted = 0;",
            params![
                space_id.to_string(),
                user_id.to_string(),
                pet_name,
                partner_pet_name,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("membership", user_id));
        }

        load_membership_for_user(&conn, user_id)?
            .ok_or_else(|| RepoError::not_found("membership", user_id))
    }

    fn delete_members_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE space_members SET is_deleted = 1 WHERE space_id = ?1 AND is_deleted = 0;",
            [space_id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_space(&self, id: SpaceId) -> RepoResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE spaces SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn destroy_space(
        &self,
        space_id: SpaceId,
        unbind: UnbindDisposition,
    ) -> RepoResult<Option<DestroyedSpace>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let space_key = space_id.to_string();

        let space_live = load_space(&tx, space_id)?.is_some();
        match unbind {
            UnbindDisposition::Discard if !space_live => return Ok(None),
            UnbindDisposition::Discard => {}
            UnbindDisposition::Complete(request_id) => {
                let pending = load_unbind_request(&tx, request_id)?
                    .filter(|request| request.space_id == space_id && request.is_pending());
                if pending.is_none() {
                    return Ok(None);
                }
            }
        }

        let members = load_member_ids(&tx, space_id)?;
        tx.execute(
            "UPDATE spaces SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0;",
            [&space_key],
        )?;
        tx.execute(
            "UPDATE space_members SET is_deleted = 1 WHERE space_id = ?1 AND is_deleted = 0;",
            [&space_key],
        )?;
        tombstone_notifications_for(&tx, &members)?;
        tx.execute(
            "UPDATE milestones SET is_deleted = 1 WHERE space_id = ?1 AND is_deleted = 0;",
            [&space_key],
        )?;
        tombstone_memories_where(&tx, "space_id = ?1", &space_key)?;

        let completed = match unbind {
            UnbindDisposition::Discard => {
                tx.execute(
                    "UPDATE unbind_requests
                     SET is_deleted = 1
                     WHERE space_id = ?1
                       AND is_deleted = 0;",
                    [&space_key],
                )?;
                None
            }
            UnbindDisposition::Complete(request_id) => {
                tx.execute(
                    "UPDATE unbind_requests
                     SET status = 'completed'
                     WHERE id = ?1
                       AND status = 'pending'
                       AND is_deleted = 0;",
                    [request_id.to_string()],
                )?;
                load_unbind_request(&tx, request_id)?
            }
        };
        tx.commit()?;

        debug!(
            "event=space_destroy module=repo backend=sqlite status=ok \
             space_id={space_id} members={}",
            members.len()
        );
        Ok(Some(DestroyedSpace {
            space_id,
            members,
            completed,
        }))
    }
}

impl UnbindRepository for SqliteStore {
    fn create_unbind_request(
        &self,
        space_id: SpaceId,
        requested_by: UserId,
    ) -> RepoResult<UnbindRequest> {
        let request = UnbindRequest::pending(space_id, requested_by, self.now());

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if load_space(&tx, space_id)?.is_none() {
            return Err(RepoError::not_found("space", space_id));
        }

        let inserted = tx.execute(
            "INSERT INTO unbind_requests (
                id,
                space_id,
                requested_by,
                requested_at,
                expires_at,
                status,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0);",
            params![
                request.id.to_string(),
                request.space_id.to_string(),
                request.requested_by.to_string(),
                request.requested_at,
                request.expires_at,
                request.status.as_str(),
            ],
        );
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(RepoError::UnbindAlreadyRequested(space_id));
            }
            return Err(err.into());
        }

        tx.commit()?;
        Ok(request)
    }

    fn get_unbind_request(&self, id: UnbindRequestId) -> RepoResult<Option<UnbindRequest>> {
        let conn = self.conn.lock();
        load_unbind_request(&conn, id)
    }

    fn get_pending_unbind_request(&self, space_id: SpaceId) -> RepoResult<Option<UnbindRequest>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{UNBIND_SELECT_SQL}
             WHERE space_id = ?1
               AND status = 'pending'
               AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([space_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_unbind_row(row)?)),
            None => Ok(None),
        }
    }

    fn get_latest_unbind_request(&self, space_id: SpaceId) -> RepoResult<Option<UnbindRequest>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{UNBIND_SELECT_SQL}
             WHERE space_id = ?1
               AND is_deleted = 0
             ORDER BY requested_at DESC, rowid DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([space_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_unbind_row(row)?)),
            None => Ok(None),
        }
    }

    fn transition_unbind_request(
        &self,
        id: UnbindRequestId,
        from: UnbindStatus,
        to: UnbindStatus,
    ) -> RepoResult<Option<UnbindRequest>> {
        if !from.can_transition_to(to) {
            return Err(RepoError::IllegalTransition { from, to });
        }

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE unbind_requests
             SET status = ?3
             WHERE id = ?1
               AND status = ?2
               AND is_deleted = 0;",
            params![id.to_string(), from.as_str(), to.as_str()],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        load_unbind_request(&conn, id)
    }

    fn list_expired_unbind_requests(&self) -> RepoResult<Vec<UnbindRequest>> {
        let now = self.now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{UNBIND_SELECT_SQL}
             WHERE status = 'pending'
               AND is_deleted = 0
               AND expires_at <= ?1
             ORDER BY expires_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([now])?;
        let mut requests = Vec::new();
        while let Some(row) = rows.next()? {
            requests.push(parse_unbind_row(row)?);
        }
        Ok(requests)
    }

    fn delete_unbind_requests_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE unbind_requests SET is_deleted = 1 WHERE space_id = ?1 AND is_deleted = 0;",
            [space_id.to_string()],
        )?;
        Ok(changed)
    }
}

impl SessionRepository for SqliteStore {
    fn create_session(
        &self,
        user_id: UserId,
        token: &str,
        expires_at: i64,
    ) -> RepoResult<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            created_at: self.now(),
            expires_at,
        };

        self.conn.lock().execute(
            "INSERT INTO sessions (id, user_id, token, created_at, expires_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, 0);",
            params![
                session.id.to_string(),
                session.user_id.to_string(),
                session.token.as_str(),
                session.created_at,
                session.expires_at,
            ],
        )?;
        Ok(session)
    }

    fn get_session_by_token(&self, token: &str) -> RepoResult<Option<Session>> {
        let now = self.now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SESSION_SELECT_SQL}
             WHERE token = ?1
               AND is_deleted = 0
               AND expires_at > ?2;"
        ))?;
        let mut rows = stmt.query(params![token, now])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_session_row(row)?)),
            None => Ok(None),
        }
    }

    fn refresh_session(
        &self,
        id: SessionId,
        new_token: &str,
        new_expires_at: i64,
    ) -> RepoResult<Session> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE sessions
             SET token = ?2, expires_at = ?3
             WHERE id = ?1
               AND is_deleted = 0;",
            params![id.to_string(), new_token, new_expires_at],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("session", id));
        }

        load_session(&conn, id)?.ok_or_else(|| RepoError::not_found("session", id))
    }

    fn delete_session(&self, id: SessionId) -> RepoResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE sessions SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn delete_sessions_by_user(&self, user_id: UserId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE sessions SET is_deleted = 1 WHERE user_id = ?1 AND is_deleted = 0;",
            [user_id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_expired_sessions(&self) -> RepoResult<usize> {
        let now = self.now();
        let changed = self.conn.lock().execute(
            "UPDATE sessions SET is_deleted = 1 WHERE expires_at <= ?1 AND is_deleted = 0;",
            [now],
        )?;
        Ok(changed)
    }
}

impl NotificationRepository for SqliteStore {
    fn create_notification(&self, notification: &NewNotification) -> RepoResult<Notification> {
        let created = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title.clone(),
            message: notification.message.clone(),
            created_at: self.now(),
            read: false,
            action_ref: notification.action_ref.clone(),
        };

        self.conn.lock().execute(
            "INSERT INTO notifications (
                id,
                user_id,
                kind,
                title,
                message,
                created_at,
                is_read,
                action_ref,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 0);",
            params![
                created.id.to_string(),
                created.user_id.to_string(),
                created.kind.as_str(),
                created.title.as_str(),
                created.message.as_str(),
                created.created_at,
                created.action_ref.as_deref(),
            ],
        )?;
        Ok(created)
    }

    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>> {
        let conn = self.conn.lock();
        load_notification(&conn, id)
    }

    fn list_notifications_for_user(&self, user_id: UserId) -> RepoResult<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{NOTIFICATION_SELECT_SQL}
             WHERE user_id = ?1
               AND is_deleted = 0
             ORDER BY created_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([user_id.to_string()])?;
        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    fn mark_notification_read(&self, id: NotificationId) -> RepoResult<Notification> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("notification", id));
        }
        load_notification(&conn, id)?.ok_or_else(|| RepoError::not_found("notification", id))
    }

    fn mark_all_notifications_read(&self, user_id: UserId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE notifications
             SET is_read = 1
             WHERE user_id = ?1
               AND is_read = 0
               AND is_deleted = 0;",
            [user_id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_notifications_by_users(&self, user_ids: &[UserId]) -> RepoResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tombstone_notifications_for(&tx, user_ids)?;
        tx.commit()?;
        Ok(changed)
    }
}

impl JournalRepository for SqliteStore {
    fn create_memory(&self, memory: &NewMemory) -> RepoResult<Memory> {
        let created = Memory {
            id: Uuid::new_v4(),
            space_id: memory.space_id,
            content: memory.content.clone(),
            mood: memory.mood.clone(),
            photos: memory.photos.clone(),
            location: memory.location.clone(),
            created_by: memory.created_by,
            created_at: self.now(),
        };
        let photos_json = serde_json::to_string(&created.photos)?;

        self.conn.lock().execute(
            "INSERT INTO memories (
                id,
                space_id,
                content,
                mood,
                photos,
                location,
                created_by,
                created_at,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0);",
            params![
                created.id.to_string(),
                created.space_id.to_string(),
                created.content.as_str(),
                created.mood.as_deref(),
                photos_json,
                created.location.as_deref(),
                created.created_by.to_string(),
                created.created_at,
            ],
        )?;
        Ok(created)
    }

    fn get_memory(&self, id: MemoryId) -> RepoResult<Option<Memory>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{MEMORY_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_memory_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_memories(
        &self,
        space_id: SpaceId,
        limit: u32,
        offset: u32,
    ) -> RepoResult<Vec<Memory>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{MEMORY_SELECT_SQL}
             WHERE space_id = ?1
               AND is_deleted = 0
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![
            space_id.to_string(),
            i64::from(limit),
            i64::from(offset)
        ])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(parse_memory_row(row)?);
        }
        Ok(memories)
    }

    fn count_memories(&self, space_id: SpaceId) -> RepoResult<usize> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM memories WHERE space_id = ?1 AND is_deleted = 0;",
            [space_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_memory(&self, id: MemoryId) -> RepoResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tombstone_memories_where(&tx, "id = ?1", &id.to_string())?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn delete_memories_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tombstone_memories_where(&tx, "space_id = ?1", &space_id.to_string())?;
        tx.commit()?;
        Ok(changed)
    }

    fn create_milestone(&self, milestone: &NewMilestone) -> RepoResult<Milestone> {
        let created = Milestone {
            id: Uuid::new_v4(),
            space_id: milestone.space_id,
            title: milestone.title.clone(),
            description: milestone.description.clone(),
            date: milestone.date.clone(),
            kind: milestone.kind.clone(),
            icon: milestone.icon.clone(),
            created_by: milestone.created_by,
            created_at: self.now(),
        };

        self.conn.lock().execute(
            "INSERT INTO milestones (
                id,
                space_id,
                title,
                description,
                date,
                kind,
                icon,
                created_by,
                created_at,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0);",
            params![
                created.id.to_string(),
                created.space_id.to_string(),
                created.title.as_str(),
                created.description.as_deref(),
                created.date.as_str(),
                created.kind.as_str(),
                created.icon.as_deref(),
                created.created_by.to_string(),
                created.created_at,
            ],
        )?;
        Ok(created)
    }

    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{MILESTONE_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_milestone_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_milestones(&self, space_id: SpaceId) -> RepoResult<Vec<Milestone>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{MILESTONE_SELECT_SQL}
             WHERE space_id = ?1
               AND is_deleted = 0
             ORDER BY date ASC, created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([space_id.to_string()])?;
        let mut milestones = Vec::new();
        while let Some(row) = rows.next()? {
            milestones.push(parse_milestone_row(row)?);
        }
        Ok(milestones)
    }

    fn delete_milestone(&self, id: MilestoneId) -> RepoResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE milestones SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn delete_milestones_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE milestones SET is_deleted = 1 WHERE space_id = ?1 AND is_deleted = 0;",
            [space_id.to_string()],
        )?;
        Ok(changed)
    }
}

impl InteractionRepository for SqliteStore {
    fn create_reaction(&self, reaction: &NewReaction) -> RepoResult<Reaction> {
        let created = Reaction {
            id: Uuid::new_v4(),
            memory_id: reaction.memory_id,
            user_id: reaction.user_id,
            kind: reaction.kind.clone(),
            created_at: self.now(),
        };

        let inserted = self.conn.lock().execute(
            "INSERT INTO reactions (id, memory_id, user_id, kind, created_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, 0);",
            params![
                created.id.to_string(),
                created.memory_id.to_string(),
                created.user_id.to_string(),
                created.kind.as_str(),
                created.created_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(created),
            Err(err) if is_unique_violation(&err) => Err(RepoError::DuplicateReaction {
                memory_id: created.memory_id,
                user_id: created.user_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn get_reaction(&self, memory_id: MemoryId, user_id: UserId) -> RepoResult<Option<Reaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{REACTION_SELECT_SQL}
             WHERE memory_id = ?1
               AND user_id = ?2
               AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([memory_id.to_string(), user_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_reaction_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_reactions(&self, memory_id: MemoryId) -> RepoResult<Vec<Reaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{REACTION_SELECT_SQL}
             WHERE memory_id = ?1
               AND is_deleted = 0
             ORDER BY created_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([memory_id.to_string()])?;
        let mut reactions = Vec::new();
        while let Some(row) = rows.next()? {
            reactions.push(parse_reaction_row(row)?);
        }
        Ok(reactions)
    }

    fn delete_reaction(&self, id: ReactionId) -> RepoResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE reactions SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn delete_reactions_by_memory(&self, memory_id: MemoryId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE reactions SET is_deleted = 1 WHERE memory_id = ?1 AND is_deleted = 0;",
            [memory_id.to_string()],
        )?;
        Ok(changed)
    }

    fn create_comment(&self, comment: &NewComment) -> RepoResult<Comment> {
        let created = Comment {
            id: Uuid::new_v4(),
            memory_id: comment.memory_id,
            user_id: comment.user_id,
            parent_id: comment.parent_id,
            content: comment.content.clone(),
            created_at: self.now(),
        };

        self.conn.lock().execute(
            "INSERT INTO comments (
                id,
                memory_id,
                user_id,
                parent_id,
                content,
                created_at,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0);",
            params![
                created.id.to_string(),
                created.memory_id.to_string(),
                created.user_id.to_string(),
                created.parent_id.map(|parent_id| parent_id.to_string()),
                created.content.as_str(),
                created.created_at,
            ],
        )?;
        Ok(created)
    }

    fn get_comment(&self, id: CommentId) -> RepoResult<Option<Comment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{COMMENT_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_comment_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_comments(&self, memory_id: MemoryId) -> RepoResult<Vec<Comment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{COMMENT_SELECT_SQL}
             WHERE memory_id = ?1
               AND is_deleted = 0
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([memory_id.to_string()])?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(parse_comment_row(row)?);
        }
        Ok(comments)
    }

    fn count_comments(&self, memory_id: MemoryId) -> RepoResult<usize> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM comments WHERE memory_id = ?1 AND is_deleted = 0;",
            [memory_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_comment(&self, id: CommentId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE comments
             SET is_deleted = 1
             WHERE (id = ?1 OR parent_id = ?1)
               AND is_deleted = 0;",
            [id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_comments_by_memory(&self, memory_id: MemoryId) -> RepoResult<usize> {
        let changed = self.conn.lock().execute(
            "UPDATE comments SET is_deleted = 1 WHERE memory_id = ?1 AND is_deleted = 0;",
            [memory_id.to_string()],
        )?;
        Ok(changed)
    }
}

fn load_user(conn: &Connection, id: UserId) -> RepoResult<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "{USER_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_user_row(row)?)),
        None => Ok(None),
    }
}

fn load_space(conn: &Connection, id: SpaceId) -> RepoResult<Option<Space>> {
    let mut stmt = conn.prepare(&format!(
        "{SPACE_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_space_row(row)?)),
        None => Ok(None),
    }
}

fn load_membership_for_user(conn: &Connection, user_id: UserId) -> RepoResult<Option<Membership>> {
    let mut stmt = conn.prepare(&format!(
        "{MEMBER_SELECT_SQL} WHERE user_id = ?1 AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([user_id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_membership_row(row)?)),
        None => Ok(None),
    }
}

fn load_unbind_request(
    conn: &Connection,
    id: UnbindRequestId,
) -> RepoResult<Option<UnbindRequest>> {
    let mut stmt = conn.prepare(&format!(
        "{UNBIND_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_unbind_row(row)?)),
        None => Ok(None),
    }
}

fn load_session(conn: &Connection, id: SessionId) -> RepoResult<Option<Session>> {
    let mut stmt = conn.prepare(&format!(
        "{SESSION_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_session_row(row)?)),
        None => Ok(None),
    }
}

fn load_notification(conn: &Connection, id: NotificationId) -> RepoResult<Option<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "{NOTIFICATION_SELECT_SQL} WHERE id = ?1 AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_notification_row(row)?)),
        None => Ok(None),
    }
}

/// Active member ids ordered by join time.
fn load_member_ids(conn: &Connection, space_id: SpaceId) -> RepoResult<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id
         FROM space_members
         WHERE space_id = ?1
           AND is_deleted = 0
         ORDER BY joined_at ASC, member_seq ASC;",
    )?;
    let mut rows = stmt.query([space_id.to_string()])?;
    let mut member_ids = Vec::new();
    while let Some(row) = rows.next()? {
        member_ids.push(parse_uuid_column(row, "user_id", "space_members.user_id")?);
    }
    Ok(member_ids)
}

fn tombstone_notifications_for(conn: &Connection, user_ids: &[UserId]) -> RepoResult<usize> {
    let mut changed = 0;
    for user_id in user_ids {
        changed += conn.execute(
            "UPDATE notifications SET is_deleted = 1 WHERE user_id = ?1 AND is_deleted = 0;",
            [user_id.to_string()],
        )?;
    }
    Ok(changed)
}

/// Tombstones the live memories matching `predicate` (bound to `?1`) along
/// with their reactions and comments. Returns the number of memories.
fn tombstone_memories_where(
    conn: &Connection,
    predicate: &str,
    value: &str,
) -> RepoResult<usize> {
    let matching = format!("SELECT id FROM memories WHERE {predicate} AND is_deleted = 0");
    conn.execute(
        &format!(
            "UPDATE reactions SET is_deleted = 1 \
             WHERE is_deleted = 0 AND memory_id IN ({matching});"
        ),
        [value],
    )?;
    conn.execute(
        &format!(
            "UPDATE comments SET is_deleted = 1 \
             WHERE is_deleted = 0 AND memory_id IN ({matching});"
        ),
        [value],
    )?;
    let changed = conn.execute(
        &format!("UPDATE memories SET is_deleted = 1 WHERE {predicate} AND is_deleted = 0;"),
        [value],
    )?;
    Ok(changed)
}

fn count_active_members(conn: &Connection, space_id: SpaceId) -> RepoResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM space_members WHERE space_id = ?1 AND is_deleted = 0;",
        [space_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn insert_membership(conn: &Connection, membership: &Membership) -> RepoResult<()> {
    let inserted = conn.execute(
        "INSERT INTO space_members (
            space_id,
            user_id,
            joined_at,
            pet_name,
            partner_pet_name,
            is_deleted
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0);",
        params![
            membership.space_id.to_string(),
            membership.user_id.to_string(),
            membership.joined_at,
            membership.pet_name.as_deref(),
            membership.partner_pet_name.as_deref(),
        ],
    );

    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(RepoError::AlreadyInSpace(membership.user_id)),
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    Ok(User {
        id: parse_uuid_column(row, "id", "users.id")?,
        email: row.get("email")?,
        nickname: row.get("nickname")?,
        avatar: row.get("avatar")?,
        created_at: row.get("created_at")?,
        is_deleted: parse_flag_column(row, "is_deleted", "users.is_deleted")?,
    })
}

fn parse_space_row(row: &Row<'_>) -> RepoResult<Space> {
    Ok(Space {
        id: parse_uuid_column(row, "id", "spaces.id")?,
        created_at: row.get("created_at")?,
        anniversary_date: row.get("anniversary_date")?,
        invite_code: row.get("invite_code")?,
        is_deleted: parse_flag_column(row, "is_deleted", "spaces.is_deleted")?,
    })
}

fn parse_membership_row(row: &Row<'_>) -> RepoResult<Membership> {
    Ok(Membership {
        space_id: parse_uuid_column(row, "space_id", "space_members.space_id")?,
        user_id: parse_uuid_column(row, "user_id", "space_members.user_id")?,
        joined_at: row.get("joined_at")?,
        pet_name: row.get("pet_name")?,
        partner_pet_name: row.get("partner_pet_name")?,
        is_deleted: parse_flag_column(row, "is_deleted", "space_members.is_deleted")?,
    })
}

fn parse_unbind_row(row: &Row<'_>) -> RepoResult<UnbindRequest> {
    let status_text: String = row.get("status")?;
    let status = UnbindStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in unbind_requests.status"
        ))
    })?;

    Ok(UnbindRequest {
        id: parse_uuid_column(row, "id", "unbind_requests.id")?,
        space_id: parse_uuid_column(row, "space_id", "unbind_requests.space_id")?,
        requested_by: parse_uuid_column(row, "requested_by", "unbind_requests.requested_by")?,
        requested_at: row.get("requested_at")?,
        expires_at: row.get("expires_at")?,
        status,
    })
}

fn parse_session_row(row: &Row<'_>) -> RepoResult<Session> {
    Ok(Session {
        id: parse_uuid_column(row, "id", "sessions.id")?,
        user_id: parse_uuid_column(row, "user_id", "sessions.user_id")?,
        token: row.get("token")?,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
    })
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let kind_text: String = row.get("kind")?;
    let kind = NotificationKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in notifications.kind"))
    })?;

    Ok(Notification {
        id: parse_uuid_column(row, "id", "notifications.id")?,
        user_id: parse_uuid_column(row, "user_id", "notifications.user_id")?,
        kind,
        title: row.get("title")?,
        message: row.get("message")?,
        created_at: row.get("created_at")?,
        read: parse_flag_column(row, "is_read", "notifications.is_read")?,
        action_ref: row.get("action_ref")?,
    })
}

fn parse_memory_row(row: &Row<'_>) -> RepoResult<Memory> {
    let photos_text: String = row.get("photos")?;
    let photos: Vec<String> = serde_json::from_str(&photos_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in memories.photos: {err}"))
    })?;

    Ok(Memory {
        id: parse_uuid_column(row, "id", "memories.id")?,
        space_id: parse_uuid_column(row, "space_id", "memories.space_id")?,
        content: row.get("content")?,
        mood: row.get("mood")?,
        photos,
        location: row.get("location")?,
        created_by: parse_uuid_column(row, "created_by", "memories.created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_milestone_row(row: &Row<'_>) -> RepoResult<Milestone> {
    Ok(Milestone {
        id: parse_uuid_column(row, "id", "milestones.id")?,
        space_id: parse_uuid_column(row, "space_id", "milestones.space_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        date: row.get("date")?,
        kind: row.get("kind")?,
        icon: row.get("icon")?,
        created_by: parse_uuid_column(row, "created_by", "milestones.created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_reaction_row(row: &Row<'_>) -> RepoResult<Reaction> {
    Ok(Reaction {
        id: parse_uuid_column(row, "id", "reactions.id")?,
        memory_id: parse_uuid_column(row, "memory_id", "reactions.memory_id")?,
        user_id: parse_uuid_column(row, "user_id", "reactions.user_id")?,
        kind: row.get("kind")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_comment_row(row: &Row<'_>) -> RepoResult<Comment> {
    let parent_id = match row.get::<_, Option<String>>("parent_id")? {
        Some(text) => Some(Uuid::parse_str(&text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{text}` in comments.parent_id"))
        })?),
        None => None,
    };

    Ok(Comment {
        id: parse_uuid_column(row, "id", "comments.id")?,
        memory_id: parse_uuid_column(row, "memory_id", "comments.memory_id")?,
        user_id: parse_uuid_column(row, "user_id", "comments.user_id")?,
        parent_id,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_uuid_column(row: &Row<'_>, column: &str, qualified: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{text}` in {qualified}")))
}

fn parse_flag_column(row: &Row<'_>, column: &str, qualified: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {qualified}"
        ))),
    }
}
