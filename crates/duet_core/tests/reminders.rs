#[macro_use]
mod common;

use common::Fixture;
use duet_core::model::journal::NewMilestone;
use duet_core::model::notification::NotificationKind;
use duet_core::repo::{JournalRepository, NotificationRepository};

adapter_tests!(
    anniversary_reminders_fire_on_lead_days,
    reminders_are_sent_once_per_day,
    milestone_reminders_link_to_the_milestone,
    past_milestones_and_dissolved_spaces_are_ignored,
);

fn anniversary_reminders_fire_on_lead_days(fx: &Fixture) {
    let spaces = fx.spaces();
    let reminders = fx.reminders();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2020-02-21").unwrap();
    spaces.join_space_by_invite_code(b.id, &space.invite_code).unwrap();

    // 2024-02-14: one week out, both members are reminded.
    let report = reminders.run().unwrap();
    assert_eq!(report.anniversary, 2);
    assert_eq!(report.failed_spaces, 0);

    fx.clock.advance_days(1);
    assert_eq!(reminders.run().unwrap().anniversary, 0);

    fx.clock.advance_days(3);
    assert_eq!(reminders.run().unwrap().anniversary, 2);
    fx.clock.advance_days(2);
    assert_eq!(reminders.run().unwrap().anniversary, 2);
    fx.clock.advance_days(1);
    assert_eq!(reminders.run().unwrap().anniversary, 2);

    let expected: Vec<String> = [
        "Happy 4 Year Anniversary!",
        "Anniversary Tomorrow!",
        "Anniversary in 3 days!",
        "Anniversary in 1 week!",
    ]
    .iter()
    .map(|title| title.to_string())
    .collect();
    assert_eq!(fx.reminder_titles(a.id), expected);
    assert_eq!(fx.reminder_titles(b.id), expected);

    let latest = fx.store.list_notifications_for_user(b.id).unwrap();
    assert_eq!(latest[0].action_ref.as_deref(), Some("dashboard"));
}

fn reminders_are_sent_once_per_day(fx: &Fixture) {
    let spaces = fx.spaces();
    let reminders = fx.reminders();
    let a = fx.user("alex");
    spaces.create_space(a.id, "2024-02-14").unwrap();

    assert_eq!(reminders.run().unwrap().anniversary, 1);
    fx.clock.advance_ms(60 * 60 * 1000);
    assert_eq!(reminders.run().unwrap().anniversary, 0);
    assert_eq!(fx.reminder_titles(a.id), vec!["Happy Anniversary!".to_string()]);

    // A read notification still counts as sent.
    fx.store.mark_all_notifications_read(a.id).unwrap();
    assert_eq!(reminders.run().unwrap().anniversary, 0);
}

fn milestone_reminders_link_to_the_milestone(fx: &Fixture) {
    let spaces = fx.spaces();
    let reminders = fx.reminders();
    let a = fx.user("alex");
    let space = spaces.create_space(a.id, "2019-06-01").unwrap();
    let trip = fx
        .store
        .create_milestone(&NewMilestone::new(space.id, a.id, "Trip", "2024-02-17"))
        .unwrap();
    fx.store
        .create_milestone(&NewMilestone::new(space.id, a.id, "Concert", "2024-02-15"))
        .unwrap();

    let report = reminders.run().unwrap();
    assert_eq!(report.milestone, 2);
    assert_eq!(report.anniversary, 0);

    let mut titles = fx.reminder_titles(a.id);
    titles.sort();
    assert_eq!(
        titles,
        vec![
            "\"Concert\" is Tomorrow!".to_string(),
            "\"Trip\" in 3 days!".to_string(),
        ]
    );
    let trip_ref = format!("milestones/{}", trip.id);
    assert!(fx
        .store
        .list_notifications_for_user(a.id)
        .unwrap()
        .iter()
        .any(|notification| notification.action_ref.as_deref() == Some(trip_ref.as_str())));

    fx.clock.advance_days(3);
    assert_eq!(reminders.run().unwrap().milestone, 1);
    assert_eq!(fx.reminder_titles(a.id)[0], "Today: Trip");
}

fn past_milestones_and_dissolved_spaces_are_ignored(fx: &Fixture) {
    let spaces = fx.spaces();
    let reminders = fx.reminders();
    let a = fx.user("alex");
    let b = fx.user("blair");
    let kept = spaces.create_space(a.id, "2019-06-01").unwrap();
    fx.store
        .create_milestone(&NewMilestone::new(kept.id, a.id, "Move in", "2024-02-13"))
        .unwrap();

    let gone = spaces.create_space(b.id, "2020-02-14").unwrap();
    fx.store
        .create_milestone(&NewMilestone::new(gone.id, b.id, "Trip", "2024-02-14"))
        .unwrap();
    spaces.delete_space(gone.id, b.id).unwrap();

    let report = reminders.run().unwrap();
    assert_eq!(report.anniversary, 0);
    assert_eq!(report.milestone, 0);
    assert!(fx.reminder_titles(a.id).is_empty());
    assert!(!fx.notification_kinds(b.id).contains(&NotificationKind::Reminder));
}
