#![allow(dead_code)]

use duet_core::clock::{Clock, ManualClock};
use duet_core::model::notification::NotificationKind;
use duet_core::model::space::generate_invite_code;
use duet_core::model::user::{NewUser, User, UserId};
use duet_core::repo::{NotificationRepository, UserRepository};
use duet_core::{
    DocumentStore, InviteCodeSource, MemoryDocumentBackend, ReminderService, SessionService,
    SpaceService, SqliteStore, Store, StoreNotifier,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Expands each listed `fn(&Fixture)` into one test per store adapter.
macro_rules! adapter_tests {
    ($($name:ident),* $(,)?) => {
        mod sqlite {
            $(
                #[test]
                fn $name() {
                    crate::$name(&crate::common::sqlite_fixture());
                }
            )*
        }

        mod document {
            $(
                #[test]
                fn $name() {
                    crate::$name(&crate::common::document_fixture());
                }
            )*
        }
    };
}

/// 2024-02-14T00:00:00Z.
pub const START_MS: i64 = 1_707_868_800_000;

pub struct Fixture {
    pub store: Arc<dyn Store>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn user(&self, nickname: &str) -> User {
        self.store
            .create_user(&NewUser::new(nickname).with_email(format!("{nickname}@example.com")))
            .unwrap()
    }

    pub fn spaces(&self) -> SpaceService {
        let notifier = Arc::new(StoreNotifier::new(self.store.clone()));
        SpaceService::new(self.store.clone(), notifier, self.clock())
    }

    /// Space service handing out `codes` in order before falling back to random ones.
    pub fn spaces_with_codes(&self, codes: &[&str]) -> SpaceService {
        self.spaces()
            .with_invite_codes(Arc::new(SequenceCodes::new(codes)))
    }

    pub fn reminders(&self) -> ReminderService {
        let notifier = Arc::new(StoreNotifier::new(self.store.clone()));
        ReminderService::new(self.store.clone(), notifier, self.clock())
    }

    /// Titles of reminder notifications delivered to `user_id`, newest first.
    pub fn reminder_titles(&self, user_id: UserId) -> Vec<String> {
        self.store
            .list_notifications_for_user(user_id)
            .unwrap()
            .into_iter()
            .filter(|notification| notification.kind == NotificationKind::Reminder)
            .map(|notification| notification.title)
            .collect()
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(self.store.clone(), self.clock())
    }

    /// Notification kinds delivered to `user_id`, newest first.
    pub fn notification_kinds(&self, user_id: UserId) -> Vec<NotificationKind> {
        self.store
            .list_notifications_for_user(user_id)
            .unwrap()
            .into_iter()
            .map(|notification| notification.kind)
            .collect()
    }
}

pub struct SequenceCodes {
    codes: Mutex<VecDeque<String>>,
}

impl SequenceCodes {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|code| code.to_string()).collect()),
        }
    }
}

impl InviteCodeSource for SequenceCodes {
    fn next_code(&self) -> String {
        self.codes
            .lock()
            .pop_front()
            .unwrap_or_else(|| generate_invite_code(&mut rand::thread_rng()))
    }
}

pub fn sqlite_fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = SqliteStore::open_in_memory(clock.clone()).unwrap();
    Fixture {
        store: Arc::new(store),
        clock,
    }
}

pub fn document_fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = DocumentStore::new(MemoryDocumentBackend::new(), clock.clone());
    Fixture {
        store: Arc::new(store),
        clock,
    }
}
