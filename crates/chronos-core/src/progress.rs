//! Display status of a scheduled activity derived from its time window.
//!
//! Pure and independent of the cycle engine: it is re-evaluated on every
//! refresh of a list that shows activities.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minutes past the end of a window before an unfinished activity is flagged.
pub const GRACE_MINUTES: u32 = 5;

/// A scheduled activity's window, owned by the scheduling collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityWindow {
    pub date: NaiveDate,
    /// Minutes since local midnight.
    pub start_minute: u32,
    pub end_minute: u32,
    #[serde(default)]
    pub completed: bool,
}

impl ActivityWindow {
    pub fn new(date: NaiveDate, start_minute: u32, end_minute: u32) -> Result<Self, ValidationError> {
        if end_minute < start_minute {
            return Err(ValidationError::InvalidWindow {
                start: start_minute,
                end: end_minute,
            });
        }
        Ok(Self {
            date,
            start_minute,
            end_minute,
            completed: false,
        })
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end_minute.saturating_sub(self.start_minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivityStatus {
    Completed,
    /// Scheduled for a later day.
    Awaiting,
    /// The window is over but nobody marked it done.
    AwaitingCompletion,
    /// Later today.
    Upcoming,
    InProgress { percent: f64 },
}

/// Classify with the default grace buffer.
pub fn classify(activity: &ActivityWindow, now: NaiveDateTime) -> ActivityStatus {
    classify_with_grace(activity, now, GRACE_MINUTES)
}

pub fn classify_with_grace(
    activity: &ActivityWindow,
    now: NaiveDateTime,
    grace_minutes: u32,
) -> ActivityStatus {
    if activity.completed {
        return ActivityStatus::Completed;
    }
    let today = now.date();
    if activity.date > today {
        return ActivityStatus::Awaiting;
    }
    if activity.date < today {
        return ActivityStatus::AwaitingCompletion;
    }

    let now_minute = minute_of_day(now);
    let start = f64::from(activity.start_minute);
    let end = f64::from(activity.end_minute);

    if now_minute > end + f64::from(grace_minutes) {
        return ActivityStatus::AwaitingCompletion;
    }
    if now_minute < start {
        return ActivityStatus::Upcoming;
    }

    let span = end - start;
    let percent = if span <= 0.0 {
        100.0
    } else {
        ((now_minute - start) / span * 100.0).clamp(0.0, 100.0)
    };
    ActivityStatus::InProgress { percent }
}

fn minute_of_day(now: NaiveDateTime) -> f64 {
    f64::from(now.hour() * 60 + now.minute()) + f64::from(now.second()) / 60.0
}
