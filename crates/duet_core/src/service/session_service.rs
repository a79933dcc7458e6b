//! Session token service.
//!
//! # Responsibility
//! - Issue opaque bearer tokens and resolve them to user ids.
//! - Slide the token forward when a session is close to expiry.
//!
//! # Invariants
//! - Tokens are `SESSION_TOKEN_LEN` alphanumeric characters.
//! - A rotated token replaces the previous one; the old token stops resolving.

use crate::clock::{Clock, MILLIS_PER_DAY};
use crate::model::session::Session;
use crate::model::user::UserId;
use crate::repo::{RepoError, SessionRepository, Store, UserRepository};
use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const SESSION_TOKEN_LEN: usize = 48;
pub const SESSION_TTL_MS: i64 = 7 * MILLIS_PER_DAY;
/// Sessions with less than this left are rotated on resolve.
pub const SESSION_REFRESH_THRESHOLD_MS: i64 = MILLIS_PER_DAY;

#[derive(Debug)]
pub enum SessionServiceError {
    /// Token is unknown, revoked, or expired.
    InvalidToken,
    /// Session owner does not exist or is soft-deleted.
    UserNotFound(UserId),
    Store(RepoError),
}

impl Display for SessionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToken => write!(f, "session token is invalid or expired"),
            Self::UserNotFound(user_id) => write!(f, "user not found: {user_id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SessionServiceError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Result of resolving a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub user_id: UserId,
    pub session: Session,
    /// True when resolve issued a new token; callers must hand it back.
    pub rotated: bool,
}

pub struct SessionService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn issue(&self, user_id: UserId) -> Result<Session, SessionServiceError> {
        if self.store.get_user(user_id)?.is_none() {
            return Err(SessionServiceError::UserNotFound(user_id));
        }

        let expires_at = self.clock.now_ms() + SESSION_TTL_MS;
        let session = self
            .store
            .create_session(user_id, &generate_token(), expires_at)?;
        info!(
            "event=session_issue module=service status=ok session_id={}",
            session.id
        );
        Ok(session)
    }

    /// Resolves `token`, rotating it when less than a day remains.
    pub fn resolve(&self, token: &str) -> Result<ResolvedSession, SessionServiceError> {
        let session = self
            .store
            .get_session_by_token(token)?
            .ok_or(SessionServiceError::InvalidToken)?;

        let now = self.clock.now_ms();
        if session.remaining_ms(now) >= SESSION_REFRESH_THRESHOLD_MS {
            return Ok(ResolvedSession {
                user_id: session.user_id,
                session,
                rotated: false,
            });
        }

        let refreshed =
            self.store
                .refresh_session(session.id, &generate_token(), now + SESSION_TTL_MS)?;
        info!(
            "event=session_rotate module=service status=ok session_id={}",
            refreshed.id
        );
        Ok(ResolvedSession {
            user_id: refreshed.user_id,
            session: refreshed,
            rotated: true,
        })
    }

    /// Revokes the session owning `token`. Returns false if none is active.
    pub fn revoke(&self, token: &str) -> Result<bool, SessionServiceError> {
        match self.store.get_session_by_token(token)? {
            Some(session) => Ok(self.store.delete_session(session.id)?),
            None => Ok(false),
        }
    }

    pub fn revoke_all(&self, user_id: UserId) -> Result<usize, SessionServiceError> {
        Ok(self.store.delete_sessions_by_user(user_id)?)
    }

    pub fn purge_expired(&self) -> Result<usize, SessionServiceError> {
        Ok(self.store.delete_expired_sessions()?)
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect()
}
