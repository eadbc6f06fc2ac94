use chrono::{DateTime, Datelike, Duration, Months, Utc};

/// Source of "now" for time-windowed aggregation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(dt: DateTime<Utc>) -> usize {
    dt.weekday().num_days_from_sunday() as usize
}

/// Fractional days from `earlier` to `later`, never negative.
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds().max(0);
    millis as f64 / Duration::days(1).num_milliseconds() as f64
}

pub fn months_ago(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months)).unwrap_or(now)
}

/// Start of a window of `days` ending at `now`. Windows reaching past the
/// representable range start at the earliest representable instant.
pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days.max(0))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
