//! Anniversary and milestone reminders.
//!
//! # Responsibility
//! - Find anniversaries 7, 3, 1 or 0 days away and milestones 3, 1 or 0
//!   days away, then remind every member of the owning space.
//!
//! # Invariants
//! - "Today" is the UTC calendar date of the injected clock.
//! - A member receives a given reminder title at most once per UTC day.
//!   The check reads the store's notification history, so notices must be
//!   recorded there (`StoreNotifier`).
//! - A failure on one space is logged; the pass continues with the next.

use crate::clock::Clock;
use crate::model::journal::Milestone;
use crate::model::notification::NotificationKind;
use crate::model::space::Space;
use crate::model::user::UserId;
use crate::repo::{JournalRepository, NotificationRepository, RepoError, SpaceRepository, Store};
use crate::service::notify::{Notice, Notifier};
use chrono::{DateTime, Datelike, NaiveDate};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DASHBOARD_ACTION_REF: &str = "dashboard";

#[derive(Debug)]
pub enum ReminderError {
    Store(RepoError),
    /// The clock reported a time outside the calendar range.
    ClockOutOfRange(i64),
}

impl Display for ReminderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::ClockOutOfRange(now_ms) => write!(f, "clock time {now_ms} has no calendar date"),
        }
    }
}

impl Error for ReminderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::ClockOutOfRange(_) => None,
        }
    }
}

impl From<RepoError> for ReminderError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Deliveries made by one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub anniversary: usize,
    pub milestone: usize,
    /// Spaces skipped because a store read failed.
    pub failed_spaces: usize,
}

pub struct ReminderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Sends every reminder due today that has not been sent yet.
    pub fn run(&self) -> Result<ReminderReport, ReminderError> {
        let started_at = Instant::now();
        let now_ms = self.clock.now_ms();
        let today = utc_date(now_ms).ok_or(ReminderError::ClockOutOfRange(now_ms))?;

        let mut report = ReminderReport::default();
        for space in self.store.list_spaces()? {
            match self.remind_space(&space, today) {
                Ok(sent) => {
                    report.anniversary += sent.anniversary;
                    report.milestone += sent.milestone;
                }
                Err(err) => {
                    report.failed_spaces += 1;
                    warn!(
                        "event=reminder_space module=service status=error space_id={} error={err}",
                        space.id
                    );
                }
            }
        }

        info!(
            "event=reminder_pass module=service status=ok today={today} anniversary={} \
             milestone={} failed_spaces={} duration_ms={}",
            report.anniversary,
            report.milestone,
            report.failed_spaces,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn remind_space(
        &self,
        space: &Space,
        today: NaiveDate,
    ) -> Result<ReminderReport, ReminderError> {
        let members: Vec<UserId> = self
            .store
            .list_members(space.id)?
            .into_iter()
            .map(|membership| membership.user_id)
            .collect();
        let mut sent = ReminderReport::default();
        if members.is_empty() {
            return Ok(sent);
        }

        match parse_date(&space.anniversary_date) {
            Some(anniversary) => {
                if let Some(notice) = anniversary_notice(anniversary, today) {
                    sent.anniversary += self.deliver(&members, &notice, today)?;
                }
            }
            None => debug!(
                "event=reminder_space module=service status=skip \
                 reason=bad_anniversary space_id={}",
                space.id
            ),
        }

        for milestone in self.store.list_milestones(space.id)? {
            if let Some(notice) = milestone_notice(&milestone, today) {
                sent.milestone += self.deliver(&members, &notice, today)?;
            }
        }
        Ok(sent)
    }

    fn deliver(
        &self,
        members: &[UserId],
        notice: &Notice,
        today: NaiveDate,
    ) -> Result<usize, ReminderError> {
        let mut delivered = 0;
        for member in members.iter().copied() {
            if self.already_reminded(member, &notice.title, today)? {
                continue;
            }
            match self.notifier.notify(member, notice) {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    "event=reminder_deliver module=service status=error recipient={member} \
                     error={err}"
                ),
            }
        }
        Ok(delivered)
    }

    fn already_reminded(
        &self,
        user_id: UserId,
        title: &str,
        today: NaiveDate,
    ) -> Result<bool, ReminderError> {
        Ok(self
            .store
            .list_notifications_for_user(user_id)?
            .iter()
            .any(|notification| {
                notification.kind == NotificationKind::Reminder
                    && notification.title == title
                    && utc_date(notification.created_at) == Some(today)
            }))
    }
}

fn utc_date(epoch_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(epoch_ms).map(|time| time.date_naive())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// `date` moved to `year`; Feb 29 falls back to Feb 28 outside leap years.
fn in_year(date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), date.day() - 1))
}

/// First occurrence of the anniversary on or after `today`.
fn next_anniversary(anniversary: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    match in_year(anniversary, today.year()) {
        Some(this_year) if this_year >= today => Some(this_year),
        _ => in_year(anniversary, today.year() + 1),
    }
}

fn anniversary_notice(anniversary: NaiveDate, today: NaiveDate) -> Option<Notice> {
    let next = next_anniversary(anniversary, today)?;
    let (title, message) = match days_between(today, next) {
        7 => (
            "Anniversary in 1 week!".to_string(),
            "Your special day is coming up. Time to plan something memorable!",
        ),
        3 => (
            "Anniversary in 3 days!".to_string(),
            "Don't forget, your anniversary is almost here!",
        ),
        1 => (
            "Anniversary Tomorrow!".to_string(),
            "Get ready to celebrate your love story!",
        ),
        0 => {
            let years = next.year() - anniversary.year();
            let title = if years > 0 {
                format!("Happy {years} Year Anniversary!")
            } else {
                "Happy Anniversary!".to_string()
            };
            (
                title,
                "Today marks another beautiful chapter in your journey together.",
            )
        }
        _ => return None,
    };
    Some(
        Notice::new(NotificationKind::Reminder, title, message)
            .with_action_ref(DASHBOARD_ACTION_REF),
    )
}

fn milestone_notice(milestone: &Milestone, today: NaiveDate) -> Option<Notice> {
    let date = parse_date(&milestone.date)?;
    let (title, message) = match days_between(today, date) {
        3 => (
            format!("\"{}\" in 3 days!", milestone.title),
            format!("Your milestone is coming up on {}.", milestone.date),
        ),
        1 => (
            format!("\"{}\" is Tomorrow!", milestone.title),
            "Get ready for your special milestone!".to_string(),
        ),
        0 => (
            format!("Today: {}", milestone.title),
            "It's here! Make the most of this special moment.".to_string(),
        ),
        _ => return None,
    };
    Some(
        Notice::new(NotificationKind::Reminder, title, message)
            .with_action_ref(format!("milestones/{}", milestone.id)),
    )
}

#[cfg(test)]
mod tests {
    use super::{anniversary_notice, next_anniversary, parse_date, utc_date};
    use chrono::NaiveDate;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    #[test]
    fn anniversary_rolls_to_next_year_once_passed() {
        let anniversary = date("2019-02-10");
        assert_eq!(
            next_anniversary(anniversary, date("2024-02-09")),
            Some(date("2024-02-10"))
        );
        assert_eq!(
            next_anniversary(anniversary, date("2024-02-10")),
            Some(date("2024-02-10"))
        );
        assert_eq!(
            next_anniversary(anniversary, date("2024-02-11")),
            Some(date("2025-02-10"))
        );
    }

    #[test]
    fn leap_day_anniversary_lands_on_feb_28() {
        let anniversary = date("2020-02-29");
        assert_eq!(
            next_anniversary(anniversary, date("2023-02-01")),
            Some(date("2023-02-28"))
        );
        assert_eq!(
            next_anniversary(anniversary, date("2024-02-01")),
            Some(date("2024-02-29"))
        );

        let notice = anniversary_notice(anniversary, date("2023-02-28")).unwrap();
        assert_eq!(notice.title, "Happy 3 Year Anniversary!");
    }

    #[test]
    fn anniversary_titles_follow_lead_days() {
        let anniversary = date("2020-03-01");
        let title = |today: &str| anniversary_notice(anniversary, date(today)).map(|n| n.title);
        assert_eq!(title("2024-02-23").as_deref(), Some("Anniversary in 1 week!"));
        assert_eq!(title("2024-02-24"), None);
        assert_eq!(title("2024-02-27").as_deref(), Some("Anniversary in 3 days!"));
        assert_eq!(title("2024-02-29").as_deref(), Some("Anniversary Tomorrow!"));
        assert_eq!(title("2024-03-01").as_deref(), Some("Happy 4 Year Anniversary!"));
    }

    #[test]
    fn first_anniversary_day_has_no_year_count() {
        let anniversary = date("2024-02-14");
        let notice = anniversary_notice(anniversary, date("2024-02-14")).unwrap();
        assert_eq!(notice.title, "Happy Anniversary!");
        assert_eq!(notice.action_ref.as_deref(), Some("dashboard"));
    }

    #[test]
    fn utc_date_truncates_epoch_millis() {
        // 2024-02-14T23:59:59.999Z
        assert_eq!(utc_date(1_707_955_199_999), Some(date("2024-02-14")));
        assert_eq!(utc_date(1_707_955_200_000), Some(date("2024-02-15")));
    }
}
