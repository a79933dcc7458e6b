//! Notification delivery seam and partner fanout.
//!
//! # Responsibility
//! - Define the `Notifier` capability consumed by lifecycle operations.
//! - Persist notifications through the store by default.
//! - Fan one event out to every member except the actor.
//!
//! # Invariants
//! - Fanout never fails its caller; delivery errors are logged and dropped.

use crate::model::notification::{NewNotification, NotificationKind};
use crate::model::user::UserId;
use crate::repo::{NotificationRepository, RepoError, Store};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Delivery failure reported by a `Notifier`.
#[derive(Debug)]
pub enum NotifyError {
    Store(RepoError),
    /// Transport-specific failure of a non-store notifier.
    Delivery(String),
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Delivery(message) => write!(f, "notification delivery failed: {message}"),
        }
    }
}

impl Error for NotifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Delivery(_) => None,
        }
    }
}

impl From<RepoError> for NotifyError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Event to deliver to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_ref: Option<String>,
}

impl Notice {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            action_ref: None,
        }
    }

    pub fn with_action_ref(mut self, action_ref: impl Into<String>) -> Self {
        self.action_ref = Some(action_ref.into());
        self
    }
}

/// Fire-and-forget notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, recipient: UserId, notice: &Notice) -> Result<(), NotifyError>;
}

/// Notifier that records notifications in the shared store.
pub struct StoreNotifier {
    store: Arc<dyn Store>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Notifier for StoreNotifier {
    fn notify(&self, recipient: UserId, notice: &Notice) -> Result<(), NotifyError> {
        self.store.create_notification(&NewNotification {
            user_id: recipient,
            kind: notice.kind,
            title: notice.title.clone(),
            message: notice.message.clone(),
            action_ref: notice.action_ref.clone(),
        })?;
        Ok(())
    }
}

/// Delivers `notice` to every recipient except `actor`.
///
/// Returns the number of successful deliveries.
pub fn notify_partners(
    notifier: &dyn Notifier,
    recipients: &[UserId],
    actor: Option<UserId>,
    notice: &Notice,
) -> usize {
    let mut delivered = 0;
    for recipient in recipients.iter().copied() {
        if Some(recipient) == actor {
            continue;
        }
        match notifier.notify(recipient, notice) {
            Ok(()) => delivered += 1,
            Err(err) => warn!(
                "event=notify_fanout module=service status=error kind={} recipient={} error={}",
                notice.kind.as_str(),
                recipient,
                err
            ),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::{notify_partners, Notice, Notifier, NotifyError};
    use crate::model::notification::NotificationKind;
    use crate::model::user::UserId;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<UserId>>,
        fail_for: Option<UserId>,
    }

    impl Notifier for Recording {
        fn notify(&self, recipient: UserId, _notice: &Notice) -> Result<(), NotifyError> {
            if self.fail_for == Some(recipient) {
                return Err(NotifyError::Delivery("offline".to_string()));
            }
            self.seen.lock().push(recipient);
            Ok(())
        }
    }

    fn notice() -> Notice {
        Notice::new(NotificationKind::PartnerJoined, "Partner joined", "hello")
    }

    #[test]
    fn fanout_skips_actor() {
        let notifier = Recording::default();
        let actor = Uuid::new_v4();
        let partner = Uuid::new_v4();

        let delivered = notify_partners(&notifier, &[actor, partner], Some(actor), &notice());
        assert_eq!(delivered, 1);
        assert_eq!(*notifier.seen.lock(), vec![partner]);
    }

    #[test]
    fn fanout_swallows_failures_and_continues() {
        let broken = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        let notifier = Recording {
            seen: Mutex::new(Vec::new()),
            fail_for: Some(broken),
        };

        let delivered = notify_partners(&notifier, &[broken, healthy], None, &notice());
        assert_eq!(delivered, 1);
        assert_eq!(*notifier.seen.lock(), vec![healthy]);
    }
}
