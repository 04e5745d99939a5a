use std::cell::Cell;

use chrono::{prelude::*, Duration};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}

/// Clock that starts at a fixed instant and advances by `step` on every read.
pub struct SteppingClock {
    next: Cell<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Cell::new(truncate_to_millis(start)),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.next.get();
        self.next.set(now + self.step);
        now
    }
}

/// Stored timestamps carry millisecond precision; anything finer would not survive a save.
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    millis_to_datetime(time.timestamp_millis()).unwrap_or(time)
}

pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| truncate_to_millis(t.with_timezone(&Utc)))
}

pub fn pluralize(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

/// Short form used by the history view, e.g. `Oct 19, 3:04 PM`.
pub fn short_datetime(time: DateTime<Utc>) -> String {
    time.format("%b %-d, %-I:%M %p").to_string()
}
