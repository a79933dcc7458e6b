#[macro_use]
mod common;

use common::Fixture;
use duet_core::clock::MILLIS_PER_DAY;
use duet_core::repo::UserRepository;
use duet_core::service::session_service::{SESSION_TOKEN_LEN, SESSION_TTL_MS};
use duet_core::SessionServiceError;

adapter_tests!(
    issued_token_resolves_to_user,
    token_rotates_inside_refresh_window,
    expired_token_is_rejected_and_purged,
    revoke_invalidates_tokens,
    unknown_or_deleted_user_gets_no_session,
);

fn issued_token_resolves_to_user(fx: &Fixture) {
    let sessions = fx.sessions();
    let a = fx.user("alex");

    let session = sessions.issue(a.id).unwrap();
    assert_eq!(session.token.len(), SESSION_TOKEN_LEN);
    assert_eq!(session.expires_at, common::START_MS + SESSION_TTL_MS);

    let resolved = sessions.resolve(&session.token).unwrap();
    assert_eq!(resolved.user_id, a.id);
    assert!(!resolved.rotated);
    assert_eq!(resolved.session, session);

    assert!(matches!(
        sessions.resolve("not-a-token"),
        Err(SessionServiceError::InvalidToken)
    ));
}

fn token_rotates_inside_refresh_window(fx: &Fixture) {
    let sessions = fx.sessions();
    let a = fx.user("alex");
    let session = sessions.issue(a.id).unwrap();

    fx.clock.advance_days(6);
    assert!(!sessions.resolve(&session.token).unwrap().rotated);

    fx.clock.advance_ms(1);
    let rotated = sessions.resolve(&session.token).unwrap();
    assert!(rotated.rotated);
    assert_eq!(rotated.session.id, session.id);
    assert_ne!(rotated.session.token, session.token);
    assert_eq!(
        rotated.session.expires_at,
        common::START_MS + 6 * MILLIS_PER_DAY + 1 + SESSION_TTL_MS
    );

    assert!(matches!(
        sessions.resolve(&session.token),
        Err(SessionServiceError::InvalidToken)
    ));
    let again = sessions.resolve(&rotated.session.token).unwrap();
    assert!(!again.rotated);
    assert_eq!(again.user_id, a.id);
}

fn expired_token_is_rejected_and_purged(fx: &Fixture) {
    let sessions = fx.sessions();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let stale = sessions.issue(a.id).unwrap();

    fx.clock.advance_days(1);
    let fresh = sessions.issue(b.id).unwrap();

    fx.clock.advance_days(6);
    assert!(matches!(
        sessions.resolve(&stale.token),
        Err(SessionServiceError::InvalidToken)
    ));
    assert_eq!(sessions.purge_expired().unwrap(), 1);
    assert_eq!(sessions.purge_expired().unwrap(), 0);
    assert_eq!(sessions.resolve(&fresh.token).unwrap().user_id, b.id);
}

fn revoke_invalidates_tokens(fx: &Fixture) {
    let sessions = fx.sessions();
    let a = fx.user("alex");
    let phone = sessions.issue(a.id).unwrap();
    let laptop = sessions.issue(a.id).unwrap();
    let tablet = sessions.issue(a.id).unwrap();

    assert!(sessions.revoke(&phone.token).unwrap());
    assert!(!sessions.revoke(&phone.token).unwrap());
    assert!(sessions.resolve(&phone.token).is_err());
    assert!(sessions.resolve(&laptop.token).is_ok());

    assert_eq!(sessions.revoke_all(a.id).unwrap(), 2);
    assert!(sessions.resolve(&laptop.token).is_err());
    assert!(sessions.resolve(&tablet.token).is_err());
}

fn unknown_or_deleted_user_gets_no_session(fx: &Fixture) {
    let sessions = fx.sessions();
    let ghost = uuid::Uuid::new_v4();
    assert!(matches!(
        sessions.issue(ghost),
        Err(SessionServiceError::UserNotFound(id)) if id == ghost
    ));

    let a = fx.user("alex");
    fx.store.soft_delete_user(a.id).unwrap();
    assert!(matches!(
        sessions.issue(a.id),
        Err(SessionServiceError::UserNotFound(_))
    ));
}
