//! Space lifecycle use-case service.
//!
//! # Responsibility
//! - Drive the space state machine: create, join, request/cancel unbind,
//!   finalize expired unbinds, delete.
//! - Translate store conflicts into caller-visible lifecycle errors.
//! - Fan state changes out to the other member after the mutation is durable.
//!
//! # Invariants
//! - Mutual exclusion lives in the store; this service holds no locks.
//! - Notification failures never fail or roll back a lifecycle operation.
//! - Finalization is idempotent: a request that is no longer pending is
//!   skipped.
//! - Delete and finalize tear a space down through `destroy_space`, which
//!   retires the space before its members, so a racing join fails with
//!   `SpaceNotFound` instead of leaving a membership behind.
//! - Cancellation only applies while the cooling-off period is running.

use crate::clock::Clock;
use crate::model::notification::NotificationKind;
use crate::model::space::{
    generate_invite_code, normalize_invite_code, Membership, NewSpace, PetNames, Space, SpaceId,
    SpaceView,
};
use crate::model::unbind::{UnbindRequest, UnbindStatus};
use crate::model::user::{Partner, UserId};
use crate::model::{validate_calendar_date, ValidationError};
use crate::repo::{
    RepoError, SpaceRepository, Store, UnbindDisposition, UnbindRepository, UserRepository,
};
use crate::service::notify::{notify_partners, Notice, Notifier};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Invite-code regeneration attempts before `create_space` gives up.
pub const MAX_INVITE_CODE_ATTEMPTS: usize = 5;

/// Errors from space lifecycle operations.
#[derive(Debug)]
pub enum SpaceServiceError {
    /// User already holds an active membership.
    AlreadyInSpace(UserId),
    /// User is not an active member of the target space (or of any space).
    NotMember(UserId),
    /// Target space already has two members.
    SpaceFull(SpaceId),
    /// Target space already has a pending unbind request.
    UnbindAlreadyRequested(SpaceId),
    /// Target space has no cancellable unbind request.
    NoUnbindRequest(SpaceId),
    /// No active space matches the id or invite code.
    SpaceNotFound(String),
    /// Caller input failed validation.
    InvalidInput(ValidationError),
    /// Storage failure, propagated unchanged.
    Store(RepoError),
}

impl SpaceServiceError {
    /// Stable wire code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInSpace(_) => "ALREADY_IN_SPACE",
            Self::NotMember(_) => "NOT_MEMBER",
            Self::SpaceFull(_) => "SPACE_FULL",
            Self::UnbindAlreadyRequested(_) => "UNBIND_ALREADY_REQUESTED",
            Self::NoUnbindRequest(_) => "NO_UNBIND_REQUEST",
            Self::SpaceNotFound(_) => "SPACE_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Store(_) => "INTERNAL",
        }
    }

    /// Whether the failure is the caller's (4xx-equivalent, never retried).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

impl Display for SpaceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInSpace(user_id) => write!(f, "user already in a space: {user_id}"),
            Self::NotMember(user_id) => write!(f, "user is not a member of the space: {user_id}"),
            Self::SpaceFull(space_id) => write!(f, "space is full: {space_id}"),
            Self::UnbindAlreadyRequested(space_id) => {
                write!(f, "unbind already requested for space: {space_id}")
            }
            Self::NoUnbindRequest(space_id) => {
                write!(f, "no pending unbind request for space: {space_id}")
            }
            Self::SpaceNotFound(reference) => write!(f, "space not found: {reference}"),
            Self::InvalidInput(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SpaceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SpaceServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::AlreadyInSpace(user_id) => Self::AlreadyInSpace(user_id),
            RepoError::SpaceFull(space_id) => Self::SpaceFull(space_id),
            RepoError::UnbindAlreadyRequested(space_id) => Self::UnbindAlreadyRequested(space_id),
            RepoError::NotFound { entity: "space", id } => Self::SpaceNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationError> for SpaceServiceError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidInput(value)
    }
}

pub type SpaceServiceResult<T> = Result<T, SpaceServiceError>;

/// Source of candidate invite codes.
pub trait InviteCodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

/// Draws codes from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomInviteCodes;

impl InviteCodeSource for RandomInviteCodes {
    fn next_code(&self) -> String {
        generate_invite_code(&mut rand::thread_rng())
    }
}

/// Outcome of one finalization sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Requests moved to `completed` by this run.
    pub completed: usize,
    /// Requests another run already handled.
    pub skipped: usize,
    /// Requests that hit a storage error; retried by the next sweep.
    pub failed: usize,
}

/// Space lifecycle service facade.
pub struct SpaceService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    invite_codes: Arc<dyn InviteCodeSource>,
}

impl SpaceService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
            invite_codes: Arc::new(RandomInviteCodes),
        }
    }

    /// Replaces the invite-code generator.
    pub fn with_invite_codes(mut self, invite_codes: Arc<dyn InviteCodeSource>) -> Self {
        self.invite_codes = invite_codes;
        self
    }

    /// Creates a space owned by `user_id`.
    ///
    /// Regenerates the invite code when it collides with an active space.
    pub fn create_space(
        &self,
        user_id: UserId,
        anniversary_date: &str,
    ) -> SpaceServiceResult<SpaceView> {
        let anniversary_date = anniversary_date.trim();
        validate_calendar_date(anniversary_date)?;
        if self.store.get_membership_for_user(user_id)?.is_some() {
            return Err(SpaceServiceError::AlreadyInSpace(user_id));
        }

        let mut last_err = None;
        for attempt in 1..=MAX_INVITE_CODE_ATTEMPTS {
            let request = NewSpace {
                anniversary_date: anniversary_date.to_string(),
                invite_code: self.invite_codes.next_code(),
            };
            match self.store.create_space(&request, user_id) {
                Ok((space, _)) => {
                    info!(
                        "event=space_create module=service status=ok \
                         space_id={} attempts={attempt}",
                        space.id
                    );
                    return self.space_view(space);
                }
                Err(RepoError::InviteCodeTaken(code)) => {
                    debug!(
                        "event=invite_code_collision module=service status=retry attempt={attempt}"
                    );
                    last_err = Some(RepoError::InviteCodeTaken(code));
                }
                Err(err) => return Err(err.into()),
            }
        }

        error!(
            "event=space_create module=service status=error \
             reason=invite_code_exhausted attempts={MAX_INVITE_CODE_ATTEMPTS}"
        );
        Err(SpaceServiceError::Store(last_err.unwrap_or(
            RepoError::Conflict {
                entity: "invite_code",
                id: String::new(),
            },
        )))
    }

    pub fn get_space_by_id(&self, space_id: SpaceId) -> SpaceServiceResult<Option<SpaceView>> {
        match self.store.get_space(space_id)? {
            Some(space) => Ok(Some(self.space_view(space)?)),
            None => Ok(None),
        }
    }

    /// Space the user currently belongs to, if any.
    pub fn get_user_space(&self, user_id: UserId) -> SpaceServiceResult<Option<SpaceView>> {
        let Some(membership) = self.store.get_membership_for_user(user_id)? else {
            return Ok(None);
        };
        self.get_space_by_id(membership.space_id)
    }

    pub fn is_user_in_space(&self, user_id: UserId, space_id: SpaceId) -> SpaceServiceResult<bool> {
        Ok(self.store.get_member(space_id, user_id)?.is_some())
    }

    /// Joins the space owning `invite_code` and notifies the existing member.
    pub fn join_space_by_invite_code(
        &self,
        user_id: UserId,
        invite_code: &str,
    ) -> SpaceServiceResult<SpaceView> {
        if self.store.get_membership_for_user(user_id)?.is_some() {
            return Err(SpaceServiceError::AlreadyInSpace(user_id));
        }
        // A malformed code cannot match any space.
        let code = normalize_invite_code(invite_code)
            .map_err(|_| SpaceServiceError::SpaceNotFound(invite_code.trim().to_string()))?;
        let space = self
            .store
            .get_space_by_invite_code(&code)?
            .ok_or_else(|| SpaceServiceError::SpaceNotFound(code.clone()))?;

        self.store.add_member(space.id, user_id)?;
        info!(
            "event=space_join module=service status=ok space_id={}",
            space.id
        );

        let view = self.space_view(space)?;
        let joiner = view
            .partners
            .iter()
            .find(|partner| partner.id == user_id)
            .map_or("Your partner", |partner| partner.nickname.as_str());
        let notice = Notice::new(
            NotificationKind::PartnerJoined,
            "Partner joined",
            format!("{joiner} joined your space"),
        )
        .with_action_ref(space_action_ref(view.id));
        self.fanout(&partner_ids(&view.partners), Some(user_id), &notice);
        Ok(view)
    }

    /// Opens the cooling-off period for dissolving the space.
    pub fn request_unbind(
        &self,
        space_id: SpaceId,
        user_id: UserId,
    ) -> SpaceServiceResult<UnbindRequest> {
        self.ensure_member(space_id, user_id)?;
        if self.store.get_pending_unbind_request(space_id)?.is_some() {
            return Err(SpaceServiceError::UnbindAlreadyRequested(space_id));
        }

        let request = self.store.create_unbind_request(space_id, user_id)?;
        info!(
            "event=unbind_request module=service status=ok \
             space_id={space_id} request_id={} expires_at={}",
            request.id, request.expires_at
        );

        let notice = Notice::new(
            NotificationKind::UnbindRequested,
            "Unbind requested",
            "Your partner asked to unbind the space. \
             It will be removed in 7 days unless cancelled.",
        )
        .with_action_ref(unbind_action_ref(space_id));
        self.fanout_members(space_id, user_id, &notice);
        Ok(request)
    }

    /// Cancels the pending request while its cooling-off period is running.
    pub fn cancel_unbind(
        &self,
        space_id: SpaceId,
        user_id: UserId,
    ) -> SpaceServiceResult<UnbindRequest> {
        self.ensure_member(space_id, user_id)?;
        let pending = self
            .store
            .get_pending_unbind_request(space_id)?
            .ok_or(SpaceServiceError::NoUnbindRequest(space_id))?;
        if pending.is_expired(self.clock.now_ms()) {
            return Err(SpaceServiceError::NoUnbindRequest(space_id));
        }

        let cancelled = self
            .store
            .transition_unbind_request(pending.id, UnbindStatus::Pending, UnbindStatus::Cancelled)?
            .ok_or(SpaceServiceError::NoUnbindRequest(space_id))?;
        info!(
            "event=unbind_cancel module=service status=ok space_id={space_id} request_id={}",
            cancelled.id
        );

        let notice = Notice::new(
            NotificationKind::UnbindCancelled,
            "Unbind cancelled",
            "The unbind request for your space was cancelled.",
        )
        .with_action_ref(space_action_ref(space_id));
        self.fanout_members(space_id, user_id, &notice);
        Ok(cancelled)
    }

    /// Latest unbind request of the space, whatever its status.
    pub fn get_unbind_status(
        &self,
        space_id: SpaceId,
        user_id: UserId,
    ) -> SpaceServiceResult<Option<UnbindRequest>> {
        self.ensure_member(space_id, user_id)?;
        Ok(self.store.get_latest_unbind_request(space_id)?)
    }

    /// Destroys every space whose unbind request outlived the cooling-off
    /// period and marks those requests completed.
    ///
    /// One failing space does not stop the sweep; it is retried next run.
    pub fn finalize_expired_unbind_requests(&self) -> SpaceServiceResult<FinalizeReport> {
        let started_at = Instant::now();
        let expired = self.store.list_expired_unbind_requests()?;

        let mut report = FinalizeReport::default();
        for request in &expired {
            match self.finalize_request(request) {
                Ok(true) => report.completed += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(
                        "event=unbind_finalize module=service status=error \
                         space_id={} request_id={} error={err}",
                        request.space_id, request.id
                    );
                }
            }
        }

        info!(
            "event=unbind_sweep module=service status=ok \
             due={} completed={} skipped={} failed={} duration_ms={}",
            expired.len(),
            report.completed,
            report.skipped,
            report.failed,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Immediately destroys the space and everything that depends on it.
    pub fn delete_space(&self, space_id: SpaceId, user_id: UserId) -> SpaceServiceResult<()> {
        self.ensure_member(space_id, user_id)?;
        let Some(destroyed) = self
            .store
            .destroy_space(space_id, UnbindDisposition::Discard)?
        else {
            // A concurrent delete or finalize retired it after the member check.
            info!(
                "event=space_delete module=service status=skip reason=already_retired \
                 space_id={space_id}"
            );
            return Ok(());
        };
        info!(
            "event=space_delete module=service status=ok space_id={space_id} members={}",
            destroyed.members.len()
        );

        let notice = Notice::new(
            NotificationKind::SpaceDeleted,
            "Space deleted",
            "Your partner deleted your shared space.",
        );
        self.fanout(&destroyed.members, Some(user_id), &notice);
        Ok(())
    }

    pub fn update_anniversary_date(
        &self,
        space_id: SpaceId,
        user_id: UserId,
        anniversary_date: &str,
    ) -> SpaceServiceResult<SpaceView> {
        let anniversary_date = anniversary_date.trim();
        validate_calendar_date(anniversary_date)?;
        self.ensure_member(space_id, user_id)?;

        let space = self
            .store
            .update_space_anniversary(space_id, anniversary_date)?;
        self.space_view(space)
    }

    pub fn get_pet_names(&self, user_id: UserId) -> SpaceServiceResult<PetNames> {
        let membership = self
            .store
            .get_membership_for_user(user_id)?
            .ok_or(SpaceServiceError::NotMember(user_id))?;
        Ok(pet_names(&membership))
    }

    /// Overwrites both pet names on the caller's membership. Blank clears.
    pub fn update_pet_names(
        &self,
        user_id: UserId,
        my_pet_name: Option<&str>,
        partner_pet_name: Option<&str>,
    ) -> SpaceServiceResult<PetNames> {
        let membership = self
            .store
            .get_membership_for_user(user_id)?
            .ok_or(SpaceServiceError::NotMember(user_id))?;

        let updated = self.store.update_member_pet_names(
            membership.space_id,
            user_id,
            non_blank(my_pet_name),
            non_blank(partner_pet_name),
        )?;
        Ok(pet_names(&updated))
    }

    fn finalize_request(&self, request: &UnbindRequest) -> SpaceServiceResult<bool> {
        let space_id = request.space_id;
        let Some(destroyed) = self
            .store
            .destroy_space(space_id, UnbindDisposition::Complete(request.id))?
        else {
            return Ok(false);
        };

        info!(
            "event=unbind_finalize module=service status=ok space_id={space_id} \
             request_id={} members={}",
            request.id,
            destroyed.members.len()
        );
        let notice = Notice::new(
            NotificationKind::SpaceUnbound,
            "Space unbound",
            "The cooling-off period ended and your shared space was removed.",
        );
        self.fanout(&destroyed.members, None, &notice);
        Ok(true)
    }

    fn ensure_member(&self, space_id: SpaceId, user_id: UserId) -> SpaceServiceResult<Membership> {
        self.store
            .get_member(space_id, user_id)?
            .ok_or(SpaceServiceError::NotMember(user_id))
    }

    fn member_ids(&self, space_id: SpaceId) -> SpaceServiceResult<Vec<UserId>> {
        Ok(self
            .store
            .list_members(space_id)?
            .into_iter()
            .map(|membership| membership.user_id)
            .collect())
    }

    fn space_view(&self, space: Space) -> SpaceServiceResult<SpaceView> {
        let member_ids = self.member_ids(space.id)?;
        let partners = self
            .store
            .get_users_by_ids(&member_ids)?
            .into_iter()
            .map(Partner::from)
            .collect();
        Ok(SpaceView::new(space, partners))
    }

    fn fanout_members(&self, space_id: SpaceId, actor: UserId, notice: &Notice) {
        match self.member_ids(space_id) {
            Ok(member_ids) => self.fanout(&member_ids, Some(actor), notice),
            Err(err) => error!(
                "event=notify_fanout module=service status=error \
                 kind={} space_id={space_id} error={err}",
                notice.kind.as_str()
            ),
        }
    }

    fn fanout(&self, recipients: &[UserId], actor: Option<UserId>, notice: &Notice) {
        let delivered = notify_partners(self.notifier.as_ref(), recipients, actor, notice);
        debug!(
            "event=notify_fanout module=service status=ok kind={} delivered={delivered}",
            notice.kind.as_str()
        );
    }
}

fn partner_ids(partners: &[Partner]) -> Vec<UserId> {
    partners.iter().map(|partner| partner.id).collect()
}

fn pet_names(membership: &Membership) -> PetNames {
    PetNames {
        my_pet_name: membership.pet_name.clone(),
        partner_pet_name: membership.partner_pet_name.clone(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn space_action_ref(space_id: SpaceId) -> String {
    format!("spaces/{space_id}")
}

fn unbind_action_ref(space_id: SpaceId) -> String {
    format!("spaces/{space_id}/unbind")
}

#[cfg(test)]
mod tests {
    use super::SpaceServiceError;
    use crate::model::ValidationError;
    use crate::repo::RepoError;
    use uuid::Uuid;

    #[test]
    fn repo_conflicts_map_to_lifecycle_codes() {
        let space_id = Uuid::new_v4();
        let cases = [
            (RepoError::AlreadyInSpace(Uuid::new_v4()), "ALREADY_IN_SPACE"),
            (RepoError::SpaceFull(space_id), "SPACE_FULL"),
            (
                RepoError::UnbindAlreadyRequested(space_id),
                "UNBIND_ALREADY_REQUESTED",
            ),
            (RepoError::not_found("space", space_id), "SPACE_NOT_FOUND"),
            (RepoError::not_found("membership", space_id), "INTERNAL"),
            (RepoError::InvalidData("bad".to_string()), "INTERNAL"),
        ];
        for (repo_err, code) in cases {
            assert_eq!(SpaceServiceError::from(repo_err).code(), code);
        }
    }

    #[test]
    fn only_store_errors_are_internal() {
        assert!(SpaceServiceError::NotMember(Uuid::new_v4()).is_client_error());
        assert!(
            SpaceServiceError::InvalidInput(ValidationError::InvalidDate("x".to_string()))
                .is_client_error()
        );
        let store_error = SpaceServiceError::Store(RepoError::InvalidData("x".to_string()));
        assert!(!store_error.is_client_error());
    }
}
