#[macro_use]
mod common;

use common::Fixture;
use duet_core::clock::MILLIS_PER_DAY;
use duet_core::model::journal::{NewMemory, NewMilestone};
use duet_core::model::notification::NotificationKind;
use duet_core::model::user::UserId;
use duet_core::repo::{JournalRepository, SpaceRepository, UnbindRepository};
use duet_core::service::notify::NotifyError;
use duet_core::{Clock, Notice, Notifier, PetNames, SpaceService, SpaceServiceError, UnbindStatus};
use std::sync::Arc;

adapter_tests!(
    two_partners_bind_request_and_cancel_unbind,
    cancel_is_rejected_once_cooling_off_elapsed,
    sweep_dissolves_space_after_cooling_off,
    sweep_ignores_requests_still_cooling_off,
    join_rejects_full_space_and_unknown_codes,
    second_space_is_rejected_for_member,
    non_members_cannot_touch_space,
    unbind_is_single_flight_per_space,
    solo_owner_may_request_unbind,
    invite_code_collision_is_regenerated,
    invalid_anniversary_is_rejected,
    notifier_failures_do_not_fail_operations,
    delete_space_cascades_immediately,
    pet_names_and_anniversary_update,
);

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _recipient: UserId, _notice: &Notice) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("push gateway unavailable".to_string()))
    }
}

fn expect_code<T: std::fmt::Debug>(result: Result<T, SpaceServiceError>, code: &str) {
    match result {
        Err(err) => {
            assert_eq!(err.code(), code, "unexpected error: {err}");
            assert!(err.is_client_error());
        }
        Ok(value) => panic!("expected {code}, got {value:?}"),
    }
}

fn two_partners_bind_request_and_cancel_unbind(fx: &Fixture) {
    let spaces = fx.spaces_with_codes(&["X7K2P9"]);
    let a = fx.user("alex");
    let b = fx.user("blair");

    let created = spaces.create_space(a.id, "2024-02-14").unwrap();
    assert_eq!(created.invite_code, "X7K2P9");
    assert_eq!(created.anniversary_date, "2024-02-14");
    assert!(created.has_partner(a.id));
    assert_eq!(created.partners.len(), 1);

    let joined = spaces.join_space_by_invite_code(b.id, " x7k2p9 ").unwrap();
    assert_eq!(joined.id, created.id);
    assert_eq!(joined.partners.len(), 2);
    assert!(spaces.is_user_in_space(b.id, created.id).unwrap());
    assert_eq!(
        spaces.get_user_space(a.id).unwrap().unwrap().partners.len(),
        2
    );
    assert_eq!(fx.notification_kinds(a.id), vec![NotificationKind::PartnerJoined]);
    assert!(fx.notification_kinds(b.id).is_empty());

    fx.clock.advance_ms(1_000);
    let requested_at = fx.clock.now_ms();
    let request = spaces.request_unbind(created.id, a.id).unwrap();
    assert_eq!(request.status, UnbindStatus::Pending);
    assert_eq!(request.requested_by, a.id);
    assert_eq!(request.expires_at, requested_at + 7 * MILLIS_PER_DAY);

    for user in [a.id, b.id] {
        let status = spaces.get_unbind_status(created.id, user).unwrap().unwrap();
        assert_eq!(status.id, request.id);
        assert_eq!(status.status, UnbindStatus::Pending);
        assert_eq!(status.expires_at, request.expires_at);
    }
    assert_eq!(fx.notification_kinds(b.id), vec![NotificationKind::UnbindRequested]);

    fx.clock.advance_days(3);
    let cancelled = spaces.cancel_unbind(created.id, b.id).unwrap();
    assert_eq!(cancelled.status, UnbindStatus::Cancelled);
    assert_eq!(
        spaces
            .get_unbind_status(created.id, a.id)
            .unwrap()
            .unwrap()
            .status,
        UnbindStatus::Cancelled
    );
    assert_eq!(fx.store.count_members(created.id).unwrap(), 2);
    assert_eq!(
        fx.notification_kinds(a.id),
        vec![NotificationKind::UnbindCancelled, NotificationKind::PartnerJoined]
    );
    assert_eq!(fx.notification_kinds(b.id), vec![NotificationKind::UnbindRequested]);

    expect_code(spaces.cancel_unbind(created.id, a.id), "NO_UNBIND_REQUEST");
    assert!(spaces.get_space_by_id(created.id).unwrap().is_some());
}

fn cancel_is_rejected_once_cooling_off_elapsed(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();
    spaces.request_unbind(space.id, a.id).unwrap();

    fx.clock.advance_days(7);
    expect_code(spaces.cancel_unbind(space.id, b.id), "NO_UNBIND_REQUEST");
    assert_eq!(
        spaces.get_unbind_status(space.id, b.id).unwrap().unwrap().status,
        UnbindStatus::Pending
    );
}

fn sweep_dissolves_space_after_cooling_off(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();
    fx.store
        .create_memory(&NewMemory::text(space.id, a.id, "first trip"))
        .unwrap();
    fx.store
        .create_milestone(&NewMilestone::new(space.id, b.id, "moved in", "2024-05-01"))
        .unwrap();
    let request = spaces.request_unbind(space.id, a.id).unwrap();

    fx.clock.advance_days(7);
    let report = spaces.finalize_expired_unbind_requests().unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    assert!(spaces.get_space_by_id(space.id).unwrap().is_none());
    assert!(spaces.get_user_space(a.id).unwrap().is_none());
    assert!(spaces.get_user_space(b.id).unwrap().is_none());
    assert_eq!(fx.store.count_memories(space.id).unwrap(), 0);
    assert!(fx.store.list_milestones(space.id).unwrap().is_empty());
    assert_eq!(
        fx.store.get_unbind_request(request.id).unwrap().unwrap().status,
        UnbindStatus::Completed
    );
    assert_eq!(fx.notification_kinds(a.id), vec![NotificationKind::SpaceUnbound]);
    assert_eq!(fx.notification_kinds(b.id), vec![NotificationKind::SpaceUnbound]);

    let again = spaces.finalize_expired_unbind_requests().unwrap();
    assert_eq!(again.completed + again.skipped + again.failed, 0);

    // Both users are free to start over.
    let fresh = spaces.create_space(b.id, "2025-01-01").unwrap();
    spaces.join_space_by_invite_code(a.id, &fresh.invite_code).unwrap();
}

fn sweep_ignores_requests_still_cooling_off(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.request_unbind(space.id, a.id).unwrap();

    fx.clock.advance_ms(7 * MILLIS_PER_DAY - 1);
    let report = spaces.finalize_expired_unbind_requests().unwrap();
    assert_eq!(report.completed, 0);
    assert!(spaces.get_space_by_id(space.id).unwrap().is_some());

    fx.clock.advance_ms(1);
    assert_eq!(spaces.finalize_expired_unbind_requests().unwrap().completed, 1);
}

fn join_rejects_full_space_and_unknown_codes(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let c = fx.user("casey");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();

    expect_code(
        spaces.join_space_by_invite_code(c.id, &space.invite_code),
        "SPACE_FULL",
    );
    assert!(spaces.get_user_space(c.id).unwrap().is_none());
    assert_eq!(fx.store.count_members(space.id).unwrap(), 2);

    expect_code(spaces.join_space_by_invite_code(c.id, "ZZZZZZ"), "SPACE_NOT_FOUND");
    expect_code(spaces.join_space_by_invite_code(c.id, "abc"), "SPACE_NOT_FOUND");
}

fn second_space_is_rejected_for_member(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let first = spaces.create_space(a.id, "2024-02-14").unwrap();
    let second = spaces.create_space(b.id, "2024-03-01").unwrap();

    expect_code(spaces.create_space(a.id, "2024-02-14"), "ALREADY_IN_SPACE");
    expect_code(
        spaces.join_space_by_invite_code(a.id, &second.invite_code),
        "ALREADY_IN_SPACE",
    );
    expect_code(
        spaces.join_space_by_invite_code(a.id, &first.invite_code),
        "ALREADY_IN_SPACE",
    );
    assert_eq!(fx.store.list_spaces().unwrap().len(), 2);
}

fn non_members_cannot_touch_space(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let c = fx.user("casey");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();

    expect_code(spaces.request_unbind(space.id, c.id), "NOT_MEMBER");
    expect_code(spaces.cancel_unbind(space.id, c.id), "NOT_MEMBER");
    expect_code(spaces.get_unbind_status(space.id, c.id), "NOT_MEMBER");
    expect_code(spaces.delete_space(space.id, c.id), "NOT_MEMBER");
    expect_code(
        spaces.update_anniversary_date(space.id, c.id, "2024-01-01"),
        "NOT_MEMBER",
    );
    expect_code(spaces.get_pet_names(c.id), "NOT_MEMBER");
    expect_code(spaces.update_pet_names(c.id, Some("x"), None), "NOT_MEMBER");
    assert!(!spaces.is_user_in_space(c.id, space.id).unwrap());
    assert!(spaces.get_space_by_id(space.id).unwrap().is_some());
}

fn unbind_is_single_flight_per_space(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();

    let first = spaces.request_unbind(space.id, a.id).unwrap();
    expect_code(spaces.request_unbind(space.id, b.id), "UNBIND_ALREADY_REQUESTED");
    expect_code(spaces.request_unbind(space.id, a.id), "UNBIND_ALREADY_REQUESTED");
    expect_code(spaces.cancel_unbind(uuid::Uuid::new_v4(), a.id), "NOT_MEMBER");

    spaces.cancel_unbind(space.id, b.id).unwrap();
    fx.clock.advance_ms(1_000);
    let second = spaces.request_unbind(space.id, b.id).unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(
        spaces.get_unbind_status(space.id, a.id).unwrap().unwrap().id,
        second.id
    );
}

fn solo_owner_may_request_unbind(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();

    assert!(spaces.get_unbind_status(space.id, a.id).unwrap().is_none());
    spaces.request_unbind(space.id, a.id).unwrap();
    assert!(fx.notification_kinds(a.id).is_empty());
}

fn invite_code_collision_is_regenerated(fx: &Fixture) {
    let spaces = fx.spaces_with_codes(&["AAAAAA", "AAAAAA", "AAAAAA", "BBBBBB"]);
    let a = fx.user("alex");
    let b = fx.user("blair");

    assert_eq!(spaces.create_space(a.id, "2024-02-14").unwrap().invite_code, "AAAAAA");
    let second = spaces.create_space(b.id, "2024-02-14").unwrap();
    assert_eq!(second.invite_code, "BBBBBB");
    assert!(fx.store.get_membership_for_user(b.id).unwrap().is_some());
}

fn invalid_anniversary_is_rejected(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");

    expect_code(spaces.create_space(a.id, "2023-02-29"), "INVALID_INPUT");
    expect_code(spaces.create_space(a.id, "14/02/2024"), "INVALID_INPUT");
    assert!(spaces.get_user_space(a.id).unwrap().is_none());

    let leap = spaces.create_space(a.id, " 2024-02-29 ").unwrap();
    assert_eq!(leap.anniversary_date, "2024-02-29");
    expect_code(
        spaces.update_anniversary_date(leap.id, a.id, "2024-13-01"),
        "INVALID_INPUT",
    );
}

fn notifier_failures_do_not_fail_operations(fx: &Fixture) {
    let spaces = SpaceService::new(fx.store.clone(), Arc::new(FailingNotifier), fx.clock());
    let a = fx.user("alex");
    let b = fx.user("blair");

    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();
    spaces.request_unbind(space.id, a.id).unwrap();
    spaces.cancel_unbind(space.id, b.id).unwrap();
    spaces.request_unbind(space.id, b.id).unwrap();

    fx.clock.advance_days(7);
    assert_eq!(spaces.finalize_expired_unbind_requests().unwrap().completed, 1);
    assert!(fx.notification_kinds(a.id).is_empty());
}

fn delete_space_cascades_immediately(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();
    fx.store
        .create_memory(&NewMemory::text(space.id, b.id, "picnic"))
        .unwrap();
    let request = spaces.request_unbind(space.id, a.id).unwrap();

    spaces.delete_space(space.id, b.id).unwrap();

    assert!(spaces.get_space_by_id(space.id).unwrap().is_none());
    assert!(fx.store.get_space_by_invite_code(&space.invite_code).unwrap().is_none());
    assert_eq!(fx.store.count_members(space.id).unwrap(), 0);
    assert_eq!(fx.store.count_memories(space.id).unwrap(), 0);
    assert!(fx.store.get_unbind_request(request.id).unwrap().is_none());
    assert_eq!(fx.notification_kinds(a.id), vec![NotificationKind::SpaceDeleted]);
    assert!(fx.notification_kinds(b.id).is_empty());

    fx.clock.advance_days(7);
    let report = spaces.finalize_expired_unbind_requests().unwrap();
    assert_eq!(report.completed + report.skipped + report.failed, 0);
    expect_code(spaces.delete_space(space.id, b.id), "NOT_MEMBER");
}

fn pet_names_and_anniversary_update(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();

    assert_eq!(spaces.get_pet_names(a.id).unwrap(), PetNames::default());
    let names = spaces
        .update_pet_names(a.id, Some(" Sunshine "), Some("   "))
        .unwrap();
    assert_eq!(names.my_pet_name.as_deref(), Some("Sunshine"));
    assert_eq!(names.partner_pet_name, None);
    assert_eq!(spaces.get_pet_names(a.id).unwrap(), names);
    assert_eq!(spaces.get_pet_names(b.id).unwrap().my_pet_name, None);

    let updated = spaces
        .update_anniversary_date(space.id, b.id, "2023-11-05")
        .unwrap();
    assert_eq!(updated.anniversary_date, "2023-11-05");
    assert_eq!(
        spaces.get_user_space(a.id).unwrap().unwrap().anniversary_date,
        "2023-11-05"
    );
}
