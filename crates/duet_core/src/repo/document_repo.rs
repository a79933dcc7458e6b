//! Document-store implementation of the persistence contract.
//!
//! # Responsibility
//! - Map every contract operation onto keyed documents of a
//!   `DocumentBackend`.
//! - Enforce the membership, capacity, invite-code and single-flight unbind
//!   invariants without multi-document transactions.
//!
//! # Invariants
//! - Membership documents are keyed by user id, so a user can only ever hold
//!   one membership document; rejoining reuses a tombstoned one by CAS.
//! - The space document carries `member_count`. A join reserves a slot by CAS
//!   on the count before claiming the membership and releases it if the claim
//!   fails.
//! - The space document carries `pending_unbind_id`. A pending request only
//!   counts once the pointer references it.
//! - Invite codes are claimed in `invite_codes` keyed by code and released
//!   when the owning space is deleted.
//! - Reaction documents are keyed by `memory:user`, so a user holds at most
//!   one reaction document per memory.
//! - Deletion is a tombstone flag; reads never return tombstoned documents.
//!
//! # Space teardown
//! `destroy_space` cannot be atomic here. It marks the space document deleted
//! first and records the departing members on it, so joins and unbind
//! requests fail from that point on. It then tombstones, in order: the invite
//! code claim, the members' notifications, milestones, memories with their
//! reactions and comments, memberships, and last the unbind requests. Every
//! step is idempotent. A failed teardown is resumed by calling
//! `destroy_space` again: a sweep retries a `Complete` teardown because its
//! request is still pending, and a member retries a `Discard` teardown
//! because the membership is only released near the end. A resumed
//! `Discard` finishes the cascade but reports `None` like any call on an
//! already retired space.

use crate::clock::Clock;
use crate::model::journal::{
    Comment, CommentId, Memory, MemoryId, Milestone, MilestoneId, NewComment, NewMemory,
    NewMilestone, NewReaction, Reaction, ReactionId,
};
use crate::model::notification::{NewNotification, Notification, NotificationId};
use crate::model::session::{Session, SessionId};
use crate::model::space::{Membership, NewSpace, Space, SpaceId, MAX_MEMBERS_PER_SPACE};
use crate::model::unbind::{UnbindRequest, UnbindRequestId, UnbindStatus};
use crate::model::user::{NewUser, User, UserId, UserUpdate};
use crate::repo::document_backend::{BackendError, Document, DocumentBackend, Filter};
use crate::repo::{
    DestroyedSpace, InteractionRepository, JournalRepository, NotificationRepository, RepoError,
    RepoResult, SessionRepository, SpaceRepository, Store, UnbindDisposition, UnbindRepository,
    UserRepository,
};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const USERS: &str = "users";
const SPACES: &str = "spaces";
const MEMBERS: &str = "space_members";
const INVITE_CODES: &str = "invite_codes";
const UNBIND_REQUESTS: &str = "unbind_requests";
const SESSIONS: &str = "sessions";
const NOTIFICATIONS: &str = "notifications";
const MEMORIES: &str = "memories";
const MILESTONES: &str = "milestones";
const REACTIONS: &str = "reactions";
const COMMENTS: &str = "comments";

/// Upper bound for optimistic read-modify-write attempts on one document.
const MAX_WRITE_ATTEMPTS: usize = 8;

/// Space document: the space itself plus its write-arbitration fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpaceDoc {
    #[serde(flatten)]
    space: Space,
    member_count: usize,
    pending_unbind_id: Option<UnbindRequestId>,
    /// Members at the moment the space was marked deleted.
    #[serde(default)]
    departed_members: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InviteCodeDoc {
    space_id: SpaceId,
    is_deleted: bool,
}

/// Adds a tombstone flag to records whose domain type has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tombstoned<T> {
    #[serde(flatten)]
    record: T,
    is_deleted: bool,
}

impl<T> Tombstoned<T> {
    fn live(record: T) -> Self {
        Self {
            record,
            is_deleted: false,
        }
    }
}

trait SoftDelete {
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self);
}

impl<T> SoftDelete for Tombstoned<T> {
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }
}

impl SoftDelete for User {
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }
}

impl SoftDelete for Membership {
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }
}

/// Outcome of marking a space document deleted.
struct Retired {
    members: Vec<UserId>,
    /// Whether this call flipped the flag.
    now: bool,
}

/// Decision taken by a read-modify-write closure.
enum Mutation {
    Write,
    Skip,
}

/// Outcome of `DocumentStore::mutate`.
struct Mutated<T> {
    value: T,
    written: bool,
}

/// Document-store adapter over any `DocumentBackend`.
pub struct DocumentStore<B: DocumentBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
}

impl<B: DocumentBackend> DocumentStore<B> {
    pub fn new(backend: B, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    fn load<T: DeserializeOwned>(&self, collection: &str, id: &str) -> RepoResult<Option<T>> {
        match self.backend.get(collection, id)? {
            Some(doc) => Ok(Some(decode(&doc)?)),
            None => Ok(None),
        }
    }

    fn load_live<T: DeserializeOwned + SoftDelete>(
        &self,
        collection: &str,
        id: &str,
    ) -> RepoResult<Option<T>> {
        Ok(self
            .load::<T>(collection, id)?
            .filter(|value| !value.is_deleted()))
    }

    fn query_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> RepoResult<Vec<T>> {
        self.backend
            .query(collection, filters)?
            .iter()
            .map(decode)
            .collect()
    }

    fn insert<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> RepoResult<()> {
        self.backend
            .create(collection, id, serde_json::to_value(value)?)?;
        Ok(())
    }

    /// Optimistic read-modify-write of one document.
    ///
    /// `apply` runs against a freshly decoded value on every attempt.
    /// Returns `Ok(None)` when the document does not exist.
    fn mutate<T, F>(
        &self,
        collection: &'static str,
        id: &str,
        mut apply: F,
    ) -> RepoResult<Option<Mutated<T>>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> RepoResult<Mutation>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(doc) = self.backend.get(collection, id)? else {
                return Ok(None);
            };
            let mut value: T = decode(&doc)?;
            if let Mutation::Skip = apply(&mut value)? {
                return Ok(Some(Mutated {
                    value,
                    written: false,
                }));
            }

            match self
                .backend
                .replace(collection, id, doc.revision, serde_json::to_value(&value)?)
            {
                Ok(_) => {
                    return Ok(Some(Mutated {
                        value,
                        written: true,
                    }))
                }
                Err(BackendError::RevisionMismatch { .. }) => {
                    debug!(
                        "event=doc_cas_retry module=repo backend=document \
                         collection={collection} attempt={attempt}"
                    );
                }
                Err(BackendError::Missing { .. }) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }

        Err(RepoError::Conflict {
            entity: collection,
            id: id.to_string(),
        })
    }

    /// Sets the tombstone flag on one document. Returns whether it changed.
    fn tombstone<T>(&self, collection: &'static str, id: &str) -> RepoResult<bool>
    where
        T: Serialize + DeserializeOwned + SoftDelete,
    {
        let outcome = self.mutate::<T, _>(collection, id, |value| {
            if value.is_deleted() {
                return Ok(Mutation::Skip);
            }
            value.mark_deleted();
            Ok(Mutation::Write)
        })?;
        Ok(outcome.map_or(false, |mutated| mutated.written))
    }

    /// Tombstones every live document matching `filters`.
    fn tombstone_where<T>(&self, collection: &'static str, filters: &[Filter]) -> RepoResult<usize>
    where
        T: Serialize + DeserializeOwned + SoftDelete,
    {
        let mut filters = filters.to_vec();
        filters.push(Filter::eq("is_deleted", false));

        let mut changed = 0;
        for doc in self.backend.query(collection, &filters)? {
            if self.tombstone::<T>(collection, &doc.id)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn load_space_doc(&self, id: SpaceId) -> RepoResult<Option<SpaceDoc>> {
        self.load(SPACES, &id.to_string())
    }

    fn load_live_space_doc(&self, id: SpaceId) -> RepoResult<Option<SpaceDoc>> {
        Ok(self
            .load_space_doc(id)?
            .filter(|doc| !doc.space.is_deleted))
    }

    fn load_unbind_doc(
        &self,
        id: UnbindRequestId,
    ) -> RepoResult<Option<Tombstoned<UnbindRequest>>> {
        self.load_live(UNBIND_REQUESTS, &id.to_string())
    }

    fn is_live_pending(&self, id: UnbindRequestId) -> RepoResult<bool> {
        Ok(self
            .load_unbind_doc(id)?
            .map_or(false, |doc| doc.record.is_pending()))
    }

    /// Claims `code` for `space_id`, reusing a released code document.
    fn claim_invite_code(&self, code: &str, space_id: SpaceId) -> RepoResult<()> {
        let claim = InviteCodeDoc {
            space_id,
            is_deleted: false,
        };
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.insert(INVITE_CODES, code, &claim) {
                Ok(()) => return Ok(()),
                Err(RepoError::Backend(BackendError::AlreadyExists { .. })) => {}
                Err(err) => return Err(err),
            }

            let reused = self.mutate::<InviteCodeDoc, _>(INVITE_CODES, code, |doc| {
                if !doc.is_deleted {
                    return Err(RepoError::InviteCodeTaken(code.to_string()));
                }
                *doc = claim.clone();
                Ok(Mutation::Write)
            })?;
            if reused.is_some() {
                return Ok(());
            }
        }

        Err(RepoError::Conflict {
            entity: INVITE_CODES,
            id: code.to_string(),
        })
    }

    /// Releases `code` if `space_id` still owns it.
    fn release_invite_code(&self, code: &str, space_id: SpaceId) -> RepoResult<()> {
        self.mutate::<InviteCodeDoc, _>(INVITE_CODES, code, |doc| {
            if doc.is_deleted || doc.space_id != space_id {
                return Ok(Mutation::Skip);
            }
            doc.is_deleted = true;
            Ok(Mutation::Write)
        })?;
        Ok(())
    }

    /// Writes the membership document for `membership.user_id`.
    ///
    /// Fails with `AlreadyInSpace` when the user's document is live.
    fn claim_membership(&self, membership: &Membership) -> RepoResult<()> {
        let key = membership.user_id.to_string();
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.insert(MEMBERS, &key, membership) {
                Ok(()) => return Ok(()),
                Err(RepoError::Backend(BackendError::AlreadyExists { .. })) => {}
                Err(err) => return Err(err),
            }

            let reused = self.mutate::<Membership, _>(MEMBERS, &key, |existing| {
                if !existing.is_deleted {
                    return Err(RepoError::AlreadyInSpace(membership.user_id));
                }
                *existing = membership.clone();
                Ok(Mutation::Write)
            })?;
            if reused.is_some() {
                return Ok(());
            }
        }

        Err(RepoError::Conflict {
            entity: MEMBERS,
            id: key,
        })
    }

    /// Gives back a slot reserved by `add_member`.
    fn release_member_slot(&self, space_id: SpaceId) {
        let released = self.mutate::<SpaceDoc, _>(SPACES, &space_id.to_string(), |doc| {
            if doc.member_count == 0 {
                return Ok(Mutation::Skip);
            }
            doc.member_count -= 1;
            Ok(Mutation::Write)
        });
        if let Err(err) = released {
            warn!(
                "event=doc_compensate module=repo backend=document status=error \
                 step=release_member_slot space_id={space_id} error={err}"
            );
        }
    }

    /// Undoes a half-finished `create_space`.
    fn discard_space(&self, space: &Space) {
        if let Err(err) = self.backend.remove(SPACES, &space.id.to_string()) {
            warn!(
                "event=doc_compensate module=repo backend=document status=error \
                 step=remove_space space_id={} error={err}",
                space.id
            );
        }
        if let Err(err) = self.release_invite_code(&space.invite_code, space.id) {
            warn!(
                "event=doc_compensate module=repo backend=document status=error \
                 step=release_invite_code space_id={} error={err}",
                space.id
            );
        }
    }

    fn discard_unbind_request(&self, id: UnbindRequestId) {
        let discarded =
            self.tombstone::<Tombstoned<UnbindRequest>>(UNBIND_REQUESTS, &id.to_string());
        if let Err(err) = discarded {
            warn!(
                "event=doc_compensate module=repo backend=document status=error \
                 step=discard_unbind request_id={id} error={err}"
            );
        }
    }

    /// Clears the space's pending pointer if it still references `request_id`.
    fn clear_pending_pointer(
        &self,
        space_id: SpaceId,
        request_id: UnbindRequestId,
    ) -> RepoResult<()> {
        self.mutate::<SpaceDoc, _>(SPACES, &space_id.to_string(), |doc| {
            if doc.pending_unbind_id != Some(request_id) {
                return Ok(Mutation::Skip);
            }
            doc.pending_unbind_id = None;
            Ok(Mutation::Write)
        })?;
        Ok(())
    }

    fn live_member_ids(&self, space_id: SpaceId) -> RepoResult<Vec<UserId>> {
        Ok(self
            .list_members(space_id)?
            .into_iter()
            .map(|membership| membership.user_id)
            .collect())
    }

    /// Marks the space document deleted, recording its live members.
    ///
    /// Returns `None` when the document is missing. An already deleted space
    /// keeps the members recorded the first time.
    fn mark_space_deleted(&self, space_id: SpaceId) -> RepoResult<Option<Retired>> {
        let marked = self.mutate::<SpaceDoc, _>(SPACES, &space_id.to_string(), |doc| {
            if doc.space.is_deleted {
                return Ok(Mutation::Skip);
            }
            doc.departed_members = self.live_member_ids(space_id)?;
            doc.space.is_deleted = true;
            doc.member_count = 0;
            doc.pending_unbind_id = None;
            Ok(Mutation::Write)
        })?;

        let Some(marked) = marked else {
            return Ok(None);
        };
        // Runs on resumed teardowns too; the claim may still be held.
        self.release_invite_code(&marked.value.space.invite_code, space_id)?;
        Ok(Some(Retired {
            members: marked.value.departed_members,
            now: marked.written,
        }))
    }

    /// Tombstones one memory after its reactions and comments.
    fn tombstone_memory(&self, memory_id: &str) -> RepoResult<bool> {
        self.tombstone_where::<Tombstoned<Reaction>>(
            REACTIONS,
            &[Filter::eq("memory_id", memory_id)],
        )?;
        self.tombstone_where::<Tombstoned<Comment>>(
            COMMENTS,
            &[Filter::eq("memory_id", memory_id)],
        )?;
        self.tombstone::<Tombstoned<Memory>>(MEMORIES, memory_id)
    }

    /// Live unbind requests of a space, dropping pending ones that lost the
    /// single-flight race and are not yet tombstoned.
    fn visible_unbind_requests(&self, space_id: SpaceId) -> RepoResult<Vec<UnbindRequest>> {
        let pointer = self
            .load_live_space_doc(space_id)?
            .map(|doc| doc.pending_unbind_id);
        let docs: Vec<Tombstoned<UnbindRequest>> = self.query_as(
            UNBIND_REQUESTS,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;

        Ok(docs
            .into_iter()
            .map(|doc| doc.record)
            .filter(|request| match pointer {
                Some(pointer) if request.is_pending() => pointer == Some(request.id),
                _ => true,
            })
            .collect())
    }
}

impl<B: DocumentBackend> Store for DocumentStore<B> {
    fn backend_name(&self) -> &'static str {
        "document"
    }
}

impl<B: DocumentBackend> UserRepository for DocumentStore<B> {
    fn create_user(&self, user: &NewUser) -> RepoResult<User> {
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            created_at: self.now(),
            is_deleted: false,
        };
        self.insert(USERS, &created.id.to_string(), &created)?;
        Ok(created)
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.load_live(USERS, &id.to_string())
    }

    fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let users: Vec<User> = self.query_as(
            USERS,
            &[Filter::eq("email", email), Filter::eq("is_deleted", false)],
        )?;
        Ok(users.into_iter().next())
    }

    fn update_user(&self, id: UserId, update: &UserUpdate) -> RepoResult<User> {
        let updated = self.mutate::<User, _>(USERS, &id.to_string(), |user| {
            if user.is_deleted {
                return Err(RepoError::not_found("user", id));
            }
            if let Some(nickname) = &update.nickname {
                user.nickname = nickname.clone();
            }
            if let Some(avatar) = &update.avatar {
                user.avatar = Some(avatar.clone());
            }
            Ok(Mutation::Write)
        })?;
        updated
            .map(|mutated| mutated.value)
            .ok_or_else(|| RepoError::not_found("user", id))
    }

    fn get_users_by_ids(&self, ids: &[UserId]) -> RepoResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.get_user(*id)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn soft_delete_user(&self, id: UserId) -> RepoResult<bool> {
        self.tombstone::<User>(USERS, &id.to_string())
    }
}

impl<B: DocumentBackend> SpaceRepository for DocumentStore<B> {
    fn create_space(&self, space: &NewSpace, owner: UserId) -> RepoResult<(Space, Membership)> {
        if self.get_membership_for_user(owner)?.is_some() {
            return Err(RepoError::AlreadyInSpace(owner));
        }

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

        self.claim_invite_code(&created.invite_code, created.id)?;
        let space_doc = SpaceDoc {
            space: created.clone(),
            member_count: 1,
            pending_unbind_id: None,
            departed_members: Vec::new(),
        };
        if let Err(err) = self.insert(SPACES, &created.id.to_string(), &space_doc) {
            self.discard_space(&created);
            return Err(err);
        }
        if let Err(err) = self.claim_membership(&membership) {
            self.discard_space(&created);
            return Err(err);
        }

        debug!(
            "event=space_insert module=repo backend=document status=ok space_id={}",
            created.id
        );
        Ok((created, membership))
    }

    fn get_space(&self, id: SpaceId) -> RepoResult<Option<Space>> {
        Ok(self.load_live_space_doc(id)?.map(|doc| doc.space))
    }

    fn get_space_by_invite_code(&self, invite_code: &str) -> RepoResult<Option<Space>> {
        let Some(claim) = self.load::<InviteCodeDoc>(INVITE_CODES, invite_code)? else {
            return Ok(None);
        };
        if claim.is_deleted {
            return Ok(None);
        }
        self.get_space(claim.space_id)
    }

    fn update_space_anniversary(&self, id: SpaceId, anniversary_date: &str) -> RepoResult<Space> {
        let updated = self.mutate::<SpaceDoc, _>(SPACES, &id.to_string(), |doc| {
            if doc.space.is_deleted {
                return Err(RepoError::not_found("space", id));
            }
            doc.space.anniversary_date = anniversary_date.to_string();
            Ok(Mutation::Write)
        })?;
        updated
            .map(|mutated| mutated.value.space)
            .ok_or_else(|| RepoError::not_found("space", id))
    }

    fn list_spaces(&self) -> RepoResult<Vec<Space>> {
        let docs: Vec<SpaceDoc> = self.query_as(SPACES, &[Filter::eq("is_deleted", false)])?;
        let mut spaces: Vec<Space> = docs.into_iter().map(|doc| doc.space).collect();
        spaces.sort_by_key(|space| space.created_at);
        Ok(spaces)
    }

    fn add_member(&self, space_id: SpaceId, user_id: UserId) -> RepoResult<Membership> {
        let key = space_id.to_string();
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(doc) = self.backend.get(SPACES, &key)? else {
                return Err(RepoError::not_found("space", space_id));
            };
            let space_doc: SpaceDoc = decode(&doc)?;
            if space_doc.space.is_deleted {
                return Err(RepoError::not_found("space", space_id));
            }
            if self.get_membership_for_user(user_id)?.is_some() {
                return Err(RepoError::AlreadyInSpace(user_id));
            }
            if space_doc.member_count >= MAX_MEMBERS_PER_SPACE {
                return Err(RepoError::SpaceFull(space_id));
            }

            let reserved = SpaceDoc {
                member_count: space_doc.member_count + 1,
                ..space_doc
            };
            match self
                .backend
                .replace(SPACES, &key, doc.revision, serde_json::to_value(&reserved)?)
            {
                Ok(_) => {}
                Err(BackendError::RevisionMismatch { .. }) => {
                    debug!(
                        "event=doc_cas_retry module=repo backend=document \
                         collection={SPACES} attempt={attempt}"
                    );
                    continue;
                }
                Err(BackendError::Missing { .. }) => {
                    return Err(RepoError::not_found("space", space_id))
                }
                Err(err) => return Err(err.into()),
            }

            let membership = Membership {
                space_id,
                user_id,
                joined_at: self.now(),
                pet_name: None,
                partner_pet_name: None,
                is_deleted: false,
            };
            if let Err(err) = self.claim_membership(&membership) {
                self.release_member_slot(space_id);
                return Err(err);
            }

            // The space may have been deleted between the reservation and the claim.
            if self.get_space(space_id)?.is_none() {
                self.tombstone::<Membership>(MEMBERS, &user_id.to_string())?;
                return Err(RepoError::not_found("space", space_id));
            }
            return Ok(membership);
        }

        Err(RepoError::Conflict {
            entity: SPACES,
            id: key,
        })
    }

    fn get_member(&self, space_id: SpaceId, user_id: UserId) -> RepoResult<Option<Membership>> {
        Ok(self
            .get_membership_for_user(user_id)?
            .filter(|membership| membership.space_id == space_id))
    }

    fn get_membership_for_user(&self, user_id: UserId) -> RepoResult<Option<Membership>> {
        self.load_live(MEMBERS, &user_id.to_string())
    }

    fn list_members(&self, space_id: SpaceId) -> RepoResult<Vec<Membership>> {
        let mut members: Vec<Membership> = self.query_as(
            MEMBERS,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;
        members.sort_by_key(|membership| membership.joined_at);
        Ok(members)
    }

    fn count_members(&self, space_id: SpaceId) -> RepoResult<usize> {
        Ok(self.backend.count(
            MEMBERS,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?)
    }

    fn update_member_pet_names(
        &self,
        space_id: SpaceId,
        user_id: UserId,
        pet_name: Option<&str>,
        partner_pet_name: Option<&str>,
    ) -> RepoResult<Membership> {
        let updated = self.mutate::<Membership, _>(MEMBERS, &user_id.to_string(), |membership| {
            if membership.is_deleted || membership.space_id != space_id {
                return Err(RepoError::not_found("membership", user_id));
            }
            membership.pet_name = pet_name.map(str::to_string);
            membership.partner_pet_name = partner_pet_name.map(str::to_string);
            Ok(Mutation::Write)
        })?;
        updated
            .map(|mutated| mutated.value)
            .ok_or_else(|| RepoError::not_found("membership", user_id))
    }

    fn delete_members_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let changed = self.tombstone_where::<Membership>(
            MEMBERS,
            &[Filter::eq("space_id", space_id.to_string())],
        )?;
        self.mutate::<SpaceDoc, _>(SPACES, &space_id.to_string(), |doc| {
            if doc.member_count == 0 {
                return Ok(Mutation::Skip);
            }
            doc.member_count = 0;
            Ok(Mutation::Write)
        })?;
        Ok(changed)
    }

    fn delete_space(&self, id: SpaceId) -> RepoResult<bool> {
        let deleted = self.mutate::<SpaceDoc, _>(SPACES, &id.to_string(), |doc| {
            if doc.space.is_deleted {
                return Ok(Mutation::Skip);
            }
            doc.space.is_deleted = true;
            Ok(Mutation::Write)
        })?;

        match deleted {
            Some(mutated) if mutated.written => {
                self.release_invite_code(&mutated.value.space.invite_code, id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn destroy_space(
        &self,
        space_id: SpaceId,
        unbind: UnbindDisposition,
    ) -> RepoResult<Option<DestroyedSpace>> {
        if let UnbindDisposition::Complete(request_id) = unbind {
            let pending = self
                .get_unbind_request(request_id)?
                .filter(|request| request.space_id == space_id && request.is_pending());
            if pending.is_none() {
                return Ok(None);
            }
        }

        let retired = match self.mark_space_deleted(space_id)? {
            Some(retired) => retired,
            None if unbind == UnbindDisposition::Discard => return Ok(None),
            None => Retired {
                members: Vec::new(),
                now: false,
            },
        };
        let members = retired.members;
        let space_key = space_id.to_string();

        self.delete_notifications_by_users(&members)?;
        self.delete_milestones_by_space(space_id)?;
        self.delete_memories_by_space(space_id)?;
        self.tombstone_where::<Membership>(MEMBERS, &[Filter::eq("space_id", space_key.as_str())])?;

        let completed = match unbind {
            UnbindDisposition::Discard => {
                self.tombstone_where::<Tombstoned<UnbindRequest>>(
                    UNBIND_REQUESTS,
                    &[Filter::eq("space_id", space_key.as_str())],
                )?;
                if !retired.now {
                    // Finished an earlier teardown; report it as already gone.
                    return Ok(None);
                }
                None
            }
            UnbindDisposition::Complete(request_id) => {
                let completed = self.transition_unbind_request(
                    request_id,
                    UnbindStatus::Pending,
                    UnbindStatus::Completed,
                )?;
                if completed.is_none() {
                    // A concurrent teardown of the same request won.
                    return Ok(None);
                }
                completed
            }
        };

        debug!(
            "event=space_destroy module=repo backend=document status=ok \
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

impl<B: DocumentBackend> UnbindRepository for DocumentStore<B> {
    fn create_unbind_request(
        &self,
        space_id: SpaceId,
        requested_by: UserId,
    ) -> RepoResult<UnbindRequest> {
        let Some(space_doc) = self.load_live_space_doc(space_id)? else {
            return Err(RepoError::not_found("space", space_id));
        };
        if let Some(pending_id) = space_doc.pending_unbind_id {
            if self.is_live_pending(pending_id)? {
                return Err(RepoError::UnbindAlreadyRequested(space_id));
            }
        }

        let request = UnbindRequest::pending(space_id, requested_by, self.now());
        self.insert(
            UNBIND_REQUESTS,
            &request.id.to_string(),
            &Tombstoned::live(request.clone()),
        )?;

        let arbitrated = self.mutate::<SpaceDoc, _>(SPACES, &space_id.to_string(), |doc| {
            if doc.space.is_deleted {
                return Err(RepoError::not_found("space", space_id));
            }
            if let Some(existing) = doc.pending_unbind_id {
                if existing != request.id && self.is_live_pending(existing)? {
                    return Err(RepoError::UnbindAlreadyRequested(space_id));
                }
            }
            doc.pending_unbind_id = Some(request.id);
            Ok(Mutation::Write)
        });

        match arbitrated {
            Ok(Some(_)) => Ok(request),
            Ok(None) => {
                self.discard_unbind_request(request.id);
                Err(RepoError::not_found("space", space_id))
            }
            Err(err) => {
                self.discard_unbind_request(request.id);
                Err(err)
            }
        }
    }

    fn get_unbind_request(&self, id: UnbindRequestId) -> RepoResult<Option<UnbindRequest>> {
        Ok(self.load_unbind_doc(id)?.map(|doc| doc.record))
    }

    fn get_pending_unbind_request(&self, space_id: SpaceId) -> RepoResult<Option<UnbindRequest>> {
        Ok(self
            .visible_unbind_requests(space_id)?
            .into_iter()
            .find(UnbindRequest::is_pending))
    }

    fn get_latest_unbind_request(&self, space_id: SpaceId) -> RepoResult<Option<UnbindRequest>> {
        let mut latest: Option<UnbindRequest> = None;
        for request in self.visible_unbind_requests(space_id)? {
            let newer = latest
                .as_ref()
                .map_or(true, |current| request.requested_at >= current.requested_at);
            if newer {
                latest = Some(request);
            }
        }
        Ok(latest)
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

        let transitioned =
            self.mutate::<Tombstoned<UnbindRequest>, _>(UNBIND_REQUESTS, &id.to_string(), |doc| {
                if doc.is_deleted || doc.record.status != from {
                    return Ok(Mutation::Skip);
                }
                doc.record.status = to;
                Ok(Mutation::Write)
            })?;

        match transitioned {
            Some(mutated) if mutated.written => {
                let request = mutated.value.record;
                self.clear_pending_pointer(request.space_id, request.id)?;
                Ok(Some(request))
            }
            _ => Ok(None),
        }
    }

    fn list_expired_unbind_requests(&self) -> RepoResult<Vec<UnbindRequest>> {
        let docs: Vec<Tombstoned<UnbindRequest>> = self.query_as(
            UNBIND_REQUESTS,
            &[
                Filter::eq("status", UnbindStatus::Pending.as_str()),
                Filter::eq("is_deleted", false),
                Filter::lte("expires_at", self.now()),
            ],
        )?;

        let mut expired = Vec::with_capacity(docs.len());
        for doc in docs {
            let request = doc.record;
            // Skip requests that lost the single-flight race on a live space.
            if let Some(space_doc) = self.load_live_space_doc(request.space_id)? {
                if space_doc.pending_unbind_id != Some(request.id) {
                    continue;
                }
            }
            expired.push(request);
        }
        expired.sort_by_key(|request| request.expires_at);
        Ok(expired)
    }

    fn delete_unbind_requests_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let changed = self.tombstone_where::<Tombstoned<UnbindRequest>>(
            UNBIND_REQUESTS,
            &[Filter::eq("space_id", space_id.to_string())],
        )?;
        self.mutate::<SpaceDoc, _>(SPACES, &space_id.to_string(), |doc| {
            if doc.pending_unbind_id.is_none() {
                return Ok(Mutation::Skip);
            }
            doc.pending_unbind_id = None;
            Ok(Mutation::Write)
        })?;
        Ok(changed)
    }
}

impl<B: DocumentBackend> SessionRepository for DocumentStore<B> {
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
        self.insert(
            SESSIONS,
            &session.id.to_string(),
            &Tombstoned::live(session.clone()),
        )?;
        Ok(session)
    }

    fn get_session_by_token(&self, token: &str) -> RepoResult<Option<Session>> {
        let docs: Vec<Tombstoned<Session>> = self.query_as(
            SESSIONS,
            &[
                Filter::eq("token", token),
                Filter::eq("is_deleted", false),
                Filter::gt("expires_at", self.now()),
            ],
        )?;
        Ok(docs.into_iter().next().map(|doc| doc.record))
    }

    fn refresh_session(
        &self,
        id: SessionId,
        new_token: &str,
        new_expires_at: i64,
    ) -> RepoResult<Session> {
        let refreshed =
            self.mutate::<Tombstoned<Session>, _>(SESSIONS, &id.to_string(), |doc| {
                if doc.is_deleted {
                    return Err(RepoError::not_found("session", id));
                }
                doc.record.token = new_token.to_string();
                doc.record.expires_at = new_expires_at;
                Ok(Mutation::Write)
            })?;
        refreshed
            .map(|mutated| mutated.value.record)
            .ok_or_else(|| RepoError::not_found("session", id))
    }

    fn delete_session(&self, id: SessionId) -> RepoResult<bool> {
        self.tombstone::<Tombstoned<Session>>(SESSIONS, &id.to_string())
    }

    fn delete_sessions_by_user(&self, user_id: UserId) -> RepoResult<usize> {
        self.tombstone_where::<Tombstoned<Session>>(
            SESSIONS,
            &[Filter::eq("user_id", user_id.to_string())],
        )
    }

    fn delete_expired_sessions(&self) -> RepoResult<usize> {
        self.tombstone_where::<Tombstoned<Session>>(
            SESSIONS,
            &[Filter::lte("expires_at", self.now())],
        )
    }
}

impl<B: DocumentBackend> NotificationRepository for DocumentStore<B> {
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
        self.insert(
            NOTIFICATIONS,
            &created.id.to_string(),
            &Tombstoned::live(created.clone()),
        )?;
        Ok(created)
    }

    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>> {
        Ok(self
            .load_live::<Tombstoned<Notification>>(NOTIFICATIONS, &id.to_string())?
            .map(|doc| doc.record))
    }

    fn list_notifications_for_user(&self, user_id: UserId) -> RepoResult<Vec<Notification>> {
        let docs: Vec<Tombstoned<Notification>> = self.query_as(
            NOTIFICATIONS,
            &[
                Filter::eq("user_id", user_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;
        Ok(newest_first(
            docs.into_iter().map(|doc| doc.record).collect(),
            |notification| notification.created_at,
        ))
    }

    fn mark_notification_read(&self, id: NotificationId) -> RepoResult<Notification> {
        let marked =
            self.mutate::<Tombstoned<Notification>, _>(NOTIFICATIONS, &id.to_string(), |doc| {
                if doc.is_deleted {
                    return Err(RepoError::not_found("notification", id));
                }
                if doc.record.read {
                    return Ok(Mutation::Skip);
                }
                doc.record.read = true;
                Ok(Mutation::Write)
            })?;
        marked
            .map(|mutated| mutated.value.record)
            .ok_or_else(|| RepoError::not_found("notification", id))
    }

    fn mark_all_notifications_read(&self, user_id: UserId) -> RepoResult<usize> {
        let unread = self.backend.query(
            NOTIFICATIONS,
            &[
                Filter::eq("user_id", user_id.to_string()),
                Filter::eq("read", false),
                Filter::eq("is_deleted", false),
            ],
        )?;

        let mut changed = 0;
        for doc in unread {
            let marked =
                self.mutate::<Tombstoned<Notification>, _>(NOTIFICATIONS, &doc.id, |doc| {
                    if doc.is_deleted || doc.record.read {
                        return Ok(Mutation::Skip);
                    }
                    doc.record.read = true;
                    Ok(Mutation::Write)
                })?;
            if marked.map_or(false, |mutated| mutated.written) {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn delete_notifications_by_users(&self, user_ids: &[UserId]) -> RepoResult<usize> {
        let mut changed = 0;
        for user_id in user_ids {
            changed += self.tombstone_where::<Tombstoned<Notification>>(
                NOTIFICATIONS,
                &[Filter::eq("user_id", user_id.to_string())],
            )?;
        }
        Ok(changed)
    }
}

impl<B: DocumentBackend> JournalRepository for DocumentStore<B> {
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
        self.insert(
            MEMORIES,
            &created.id.to_string(),
            &Tombstoned::live(created.clone()),
        )?;
        Ok(created)
    }

    fn get_memory(&self, id: MemoryId) -> RepoResult<Option<Memory>> {
        Ok(self
            .load_live::<Tombstoned<Memory>>(MEMORIES, &id.to_string())?
            .map(|doc| doc.record))
    }

    fn list_memories(
        &self,
        space_id: SpaceId,
        limit: u32,
        offset: u32,
    ) -> RepoResult<Vec<Memory>> {
        let docs: Vec<Tombstoned<Memory>> = self.query_as(
            MEMORIES,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;
        Ok(newest_first(
            docs.into_iter().map(|doc| doc.record).collect(),
            |memory| memory.created_at,
        )
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect())
    }

    fn count_memories(&self, space_id: SpaceId) -> RepoResult<usize> {
        Ok(self.backend.count(
            MEMORIES,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?)
    }

    fn delete_memory(&self, id: MemoryId) -> RepoResult<bool> {
        self.tombstone_memory(&id.to_string())
    }

    fn delete_memories_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        let live = self.backend.query(
            MEMORIES,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;

        let mut changed = 0;
        for doc in live {
            if self.tombstone_memory(&doc.id)? {
                changed += 1;
            }
        }
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
        self.insert(
            MILESTONES,
            &created.id.to_string(),
            &Tombstoned::live(created.clone()),
        )?;
        Ok(created)
    }

    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>> {
        Ok(self
            .load_live::<Tombstoned<Milestone>>(MILESTONES, &id.to_string())?
            .map(|doc| doc.record))
    }

    fn list_milestones(&self, space_id: SpaceId) -> RepoResult<Vec<Milestone>> {
        let docs: Vec<Tombstoned<Milestone>> = self.query_as(
            MILESTONES,
            &[
                Filter::eq("space_id", space_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;
        let mut milestones: Vec<Milestone> = docs.into_iter().map(|doc| doc.record).collect();
        milestones.sort_by(|left, right| {
            left.date
                .cmp(&right.date)
                .then(left.created_at.cmp(&right.created_at))
        });
        Ok(milestones)
    }

    fn delete_milestone(&self, id: MilestoneId) -> RepoResult<bool> {
        self.tombstone::<Tombstoned<Milestone>>(MILESTONES, &id.to_string())
    }

    fn delete_milestones_by_space(&self, space_id: SpaceId) -> RepoResult<usize> {
        self.tombstone_where::<Tombstoned<Milestone>>(
            MILESTONES,
            &[Filter::eq("space_id", space_id.to_string())],
        )
    }
}

impl<B: DocumentBackend> InteractionRepository for DocumentStore<B> {
    fn create_reaction(&self, reaction: &NewReaction) -> RepoResult<Reaction> {
        let created = Reaction {
            id: Uuid::new_v4(),
            memory_id: reaction.memory_id,
            user_id: reaction.user_id,
            kind: reaction.kind.clone(),
            created_at: self.now(),
        };
        let key = reaction_key(created.memory_id, created.user_id);
        let doc = Tombstoned::live(created.clone());

        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.insert(REACTIONS, &key, &doc) {
                Ok(()) => return Ok(created),
                Err(RepoError::Backend(BackendError::AlreadyExists { .. })) => {}
                Err(err) => return Err(err),
            }

            let reused = self.mutate::<Tombstoned<Reaction>, _>(REACTIONS, &key, |existing| {
                if !existing.is_deleted {
                    return Err(RepoError::DuplicateReaction {
                        memory_id: created.memory_id,
                        user_id: created.user_id,
                    });
                }
                *existing = doc.clone();
                Ok(Mutation::Write)
            })?;
            if reused.is_some() {
                return Ok(created);
            }
        }

        Err(RepoError::Conflict {
            entity: REACTIONS,
            id: key,
        })
    }

    fn get_reaction(&self, memory_id: MemoryId, user_id: UserId) -> RepoResult<Option<Reaction>> {
        Ok(self
            .load_live::<Tombstoned<Reaction>>(REACTIONS, &reaction_key(memory_id, user_id))?
            .map(|doc| doc.record))
    }

    fn list_reactions(&self, memory_id: MemoryId) -> RepoResult<Vec<Reaction>> {
        let docs: Vec<Tombstoned<Reaction>> = self.query_as(
            REACTIONS,
            &[
                Filter::eq("memory_id", memory_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;
        Ok(newest_first(
            docs.into_iter().map(|doc| doc.record).collect(),
            |reaction| reaction.created_at,
        ))
    }

    fn delete_reaction(&self, id: ReactionId) -> RepoResult<bool> {
        let changed = self.tombstone_where::<Tombstoned<Reaction>>(
            REACTIONS,
            &[Filter::eq("id", id.to_string())],
        )?;
        Ok(changed > 0)
    }

    fn delete_reactions_by_memory(&self, memory_id: MemoryId) -> RepoResult<usize> {
        self.tombstone_where::<Tombstoned<Reaction>>(
            REACTIONS,
            &[Filter::eq("memory_id", memory_id.to_string())],
        )
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
        self.insert(
            COMMENTS,
            &created.id.to_string(),
            &Tombstoned::live(created.clone()),
        )?;
        Ok(created)
    }

    fn get_comment(&self, id: CommentId) -> RepoResult<Option<Comment>> {
        Ok(self
            .load_live::<Tombstoned<Comment>>(COMMENTS, &id.to_string())?
            .map(|doc| doc.record))
    }

    fn list_comments(&self, memory_id: MemoryId) -> RepoResult<Vec<Comment>> {
        let docs: Vec<Tombstoned<Comment>> = self.query_as(
            COMMENTS,
            &[
                Filter::eq("memory_id", memory_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?;
        let mut comments: Vec<Comment> = docs.into_iter().map(|doc| doc.record).collect();
        comments.sort_by_key(|comment| comment.created_at);
        Ok(comments)
    }

    fn count_comments(&self, memory_id: MemoryId) -> RepoResult<usize> {
        Ok(self.backend.count(
            COMMENTS,
            &[
                Filter::eq("memory_id", memory_id.to_string()),
                Filter::eq("is_deleted", false),
            ],
        )?)
    }

    fn delete_comment(&self, id: CommentId) -> RepoResult<usize> {
        let replies = self.tombstone_where::<Tombstoned<Comment>>(
            COMMENTS,
            &[Filter::eq("parent_id", id.to_string())],
        )?;
        let comment = self.tombstone::<Tombstoned<Comment>>(COMMENTS, &id.to_string())?;
        Ok(replies + usize::from(comment))
    }

    fn delete_comments_by_memory(&self, memory_id: MemoryId) -> RepoResult<usize> {
        self.tombstone_where::<Tombstoned<Comment>>(
            COMMENTS,
            &[Filter::eq("memory_id", memory_id.to_string())],
        )
    }
}

fn reaction_key(memory_id: MemoryId, user_id: UserId) -> String {
    format!("{memory_id}:{user_id}")
}

fn decode<T: DeserializeOwned>(doc: &Document) -> RepoResult<T> {
    serde_json::from_value(doc.data.clone())
        .map_err(|err| RepoError::InvalidData(format!("document {}: {err}", doc.id)))
}

/// Sorts creation-ordered records newest first; ties keep the later-created
/// record first.
fn newest_first<T>(mut records: Vec<T>, created_at: impl Fn(&T) -> i64) -> Vec<T> {
    records.reverse();
    records.sort_by(|left, right| created_at(right).cmp(&created_at(left)));
    records
}

#[cfg(test)]
mod tests {
    use super::{DocumentStore, SpaceDoc, INVITE_CODES, MEMBERS, SPACES};
    use crate::clock::ManualClock;
    use crate::model::space::NewSpace;
    use crate::model::user::NewUser;
    use crate::repo::document_backend::{DocumentBackend, MemoryDocumentBackend};
    use crate::repo::{
        RepoError, SpaceRepository, UnbindDisposition, UnbindRepository, UserRepository,
    };
    use std::sync::Arc;

    fn store() -> DocumentStore<Arc<MemoryDocumentBackend>> {
        DocumentStore::new(
            Arc::new(MemoryDocumentBackend::new()),
            Arc::new(ManualClock::new(1_000)),
        )
    }

    fn new_space(code: &str) -> NewSpace {
        NewSpace {
            anniversary_date: "2024-02-14".to_string(),
            invite_code: code.to_string(),
        }
    }

    #[test]
    fn space_doc_tracks_member_count() {
        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let b = store.create_user(&NewUser::new("b")).unwrap();
        let (space, _) = store.create_space(&new_space("AAAAAA"), a.id).unwrap();
        store.add_member(space.id, b.id).unwrap();

        let doc = store
            .backend()
            .get(SPACES, &space.id.to_string())
            .unwrap()
            .unwrap();
        let space_doc: SpaceDoc = serde_json::from_value(doc.data).unwrap();
        assert_eq!(space_doc.member_count, 2);
    }

    #[test]
    fn failed_membership_claim_releases_slot_and_code() {
        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let b = store.create_user(&NewUser::new("b")).unwrap();
        let (space, _) = store.create_space(&new_space("AAAAAA"), a.id).unwrap();

        // `b` already belongs elsewhere, so joining must leave the count at 1.
        store.create_space(&new_space("BBBBBB"), b.id).unwrap();
        let err = store.add_member(space.id, b.id).unwrap_err();
        assert!(matches!(err, RepoError::AlreadyInSpace(_)));
        assert_eq!(store.count_members(space.id).unwrap(), 1);

        let doc = store
            .backend()
            .get(SPACES, &space.id.to_string())
            .unwrap()
            .unwrap();
        let space_doc: SpaceDoc = serde_json::from_value(doc.data).unwrap();
        assert_eq!(space_doc.member_count, 1);
    }

    #[test]
    fn deleted_space_frees_invite_code_for_reuse() {
        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let b = store.create_user(&NewUser::new("b")).unwrap();
        let (space, _) = store.create_space(&new_space("CCCCCC"), a.id).unwrap();
        store.delete_members_by_space(space.id).unwrap();
        assert!(store.delete_space(space.id).unwrap());

        let (reused, _) = store.create_space(&new_space("CCCCCC"), b.id).unwrap();
        assert_eq!(
            store.get_space_by_invite_code("CCCCCC").unwrap().unwrap().id,
            reused.id
        );
        assert_eq!(store.backend().len(INVITE_CODES), 1);
    }

    #[test]
    fn rejoin_reuses_tombstoned_membership_doc() {
        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let (first, _) = store.create_space(&new_space("DDDDDD"), a.id).unwrap();
        store.delete_members_by_space(first.id).unwrap();
        store.delete_space(first.id).unwrap();

        let (second, membership) = store.create_space(&new_space("EEEEEE"), a.id).unwrap();
        assert_eq!(membership.space_id, second.id);
        assert_eq!(store.backend().len(MEMBERS), 1);
        assert_eq!(
            store.get_membership_for_user(a.id).unwrap().unwrap().space_id,
            second.id
        );
    }

    #[test]
    fn pending_pointer_clears_after_transition() {
        use crate::model::unbind::UnbindStatus;

        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let (space, _) = store.create_space(&new_space("FFFFFF"), a.id).unwrap();
        let request = store.create_unbind_request(space.id, a.id).unwrap();
        store
            .transition_unbind_request(request.id, UnbindStatus::Pending, UnbindStatus::Cancelled)
            .unwrap()
            .unwrap();

        let again = store.create_unbind_request(space.id, a.id).unwrap();
        assert_ne!(again.id, request.id);
        assert_eq!(
            store.get_pending_unbind_request(space.id).unwrap().unwrap().id,
            again.id
        );
    }

    #[test]
    fn destroyed_space_doc_records_departed_members() {
        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let b = store.create_user(&NewUser::new("b")).unwrap();
        let (space, _) = store.create_space(&new_space("GGGGGG"), a.id).unwrap();
        store.add_member(space.id, b.id).unwrap();

        let destroyed = store
            .destroy_space(space.id, UnbindDisposition::Discard)
            .unwrap()
            .unwrap();
        assert_eq!(destroyed.members, vec![a.id, b.id]);

        let doc = store
            .backend()
            .get(SPACES, &space.id.to_string())
            .unwrap()
            .unwrap();
        let space_doc: SpaceDoc = serde_json::from_value(doc.data).unwrap();
        assert!(space_doc.space.is_deleted);
        assert_eq!(space_doc.member_count, 0);
        assert_eq!(space_doc.departed_members, vec![a.id, b.id]);

        assert!(store
            .destroy_space(space.id, UnbindDisposition::Discard)
            .unwrap()
            .is_none());
        assert!(store.get_membership_for_user(a.id).unwrap().is_none());
    }

    #[test]
    fn join_after_teardown_mark_is_refused() {
        let store = store();
        let a = store.create_user(&NewUser::new("a")).unwrap();
        let b = store.create_user(&NewUser::new("b")).unwrap();
        let (space, _) = store.create_space(&new_space("HHHHHH"), a.id).unwrap();
        store.mark_space_deleted(space.id).unwrap().unwrap();

        let err = store.add_member(space.id, b.id).unwrap_err();
        assert!(matches!(err, RepoError::NotFound { entity: "space", .. }));
        assert!(store.get_membership_for_user(b.id).unwrap().is_none());
    }
}
