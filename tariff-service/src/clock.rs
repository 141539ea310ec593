use time::{macros::format_description, Date, Duration, OffsetDateTime};

use crate::error::SwitcherError;

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    fn today(&self) -> Date {
        self.now().date()
    }
}

/// Wall clock in the host's local offset, or UTC when the offset can't be
/// determined.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Result<Date, SwitcherError> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| SwitcherError::Validation(format!("invalid date {s:?}: {e}")))
}

/// Every date from `start` through the day before `today`. Empty when
/// `start` is today or later.
pub fn dates_until_yesterday(start: Date, today: Date) -> Vec<Date> {
    let mut dates = Vec::new();
    let mut d = start;
    while d < today {
        dates.push(d);
        d += Duration::days(1);
    }
    dates
}

/// `period_from`/`period_to` query bounds covering a whole UTC day.
pub fn day_bounds(date: Date) -> (String, String) {
    (format!("{date}T00:00:00Z"), format!("{date}T23:59:59Z"))
}
