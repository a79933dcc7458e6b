#[macro_use]
mod common;

use common::Fixture;
use duet_core::repo::SpaceRepository;
use duet_core::SweepTask;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

adapter_tests!(
    run_once_reports_finalized_spaces_and_purged_sessions,
    run_once_sends_reminders_once_per_day,
    periodic_sweep_runs_until_stopped,
);

fn sweep_task(fx: &Fixture) -> Arc<SweepTask> {
    Arc::new(SweepTask::new(
        Arc::new(fx.spaces()),
        Arc::new(fx.reminders()),
        Arc::new(fx.sessions()),
    ))
}

fn run_once_reports_finalized_spaces_and_purged_sessions(fx: &Fixture) {
    let spaces = fx.spaces();
    let sessions = fx.sessions();
    let task = sweep_task(fx);
    let a = fx.user("alex");
    let b = fx.user("blair");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.request_unbind(space.id, a.id).unwrap();
    sessions.issue(b.id).unwrap();

    let idle = task.run_once().unwrap();
    assert_eq!(idle.unbind.completed, 0);
    assert_eq!(idle.sessions_purged, 0);

    fx.clock.advance_days(7);
    let report = task.run_once().unwrap();
    assert_eq!(report.unbind.completed, 1);
    assert_eq!(report.unbind.failed, 0);
    assert_eq!(report.sessions_purged, 1);
    assert!(fx.store.get_space(space.id).unwrap().is_none());

    let repeat = task.run_once().unwrap();
    assert_eq!(repeat.unbind.completed, 0);
    assert_eq!(repeat.sessions_purged, 0);
}

fn run_once_sends_reminders_once_per_day(fx: &Fixture) {
    let spaces = fx.spaces();
    let task = sweep_task(fx);
    let a = fx.user("alex");
    // Seven days after the fixture start date.
    spaces.create_space(a.id, "2021-02-21").unwrap();

    let first = task.run_once().unwrap();
    assert_eq!(first.reminders.anniversary, 1);
    let again = task.run_once().unwrap();
    assert_eq!(again.reminders.anniversary, 0);
    assert_eq!(fx.reminder_titles(a.id), vec!["Anniversary in 1 week!".to_string()]);
}

fn periodic_sweep_runs_until_stopped(fx: &Fixture) {
    let spaces = fx.spaces();
    let a = fx.user("alex");
    let space = spaces.create_space(a.id, "2024-02-14").unwrap();
    spaces.request_unbind(space.id, a.id).unwrap();
    fx.clock.advance_days(7);

    let handle = sweep_task(fx)
        .spawn_periodic(Duration::from_millis(10))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while fx.store.get_space(space.id).unwrap().is_some() {
        assert!(Instant::now() < deadline, "sweep thread never finalized the space");
        thread::sleep(Duration::from_millis(5));
    }
    handle.stop();

    // Nothing runs after stop; a new expiry stays untouched.
    let b = fx.user("blair");
    let next = spaces.create_space(b.id, "2024-02-14").unwrap();
    spaces.request_unbind(next.id, b.id).unwrap();
    fx.clock.advance_days(7);
    thread::sleep(Duration::from_millis(30));
    assert!(fx.store.get_space(next.id).unwrap().is_some());
}
