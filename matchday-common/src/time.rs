//! Timestamp utilities and the clock abstraction
//!
//! Everything that waits (rate limiting, pacing between work items) goes
//! through [`Clock`] so tests can substitute [`ManualClock`] and observe the
//! requested sleeps without spending wall-clock time.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Date format used for match identity keys (`DD-MM-YYYY`)
pub const MATCH_DATE_FORMAT: &str = "%d-%m-%Y";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a calendar date as a match date string
pub fn format_match_date(date: NaiveDate) -> String {
    date.format(MATCH_DATE_FORMAT).to_string()
}

/// Parse a `DD-MM-YYYY` match date string
pub fn parse_match_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), MATCH_DATE_FORMAT).ok()
}

/// Time remaining until local midnight following `now`
pub fn duration_until_next_midnight(now: DateTime<Local>) -> Duration {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    let midnight = tomorrow
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());

    match midnight {
        Some(midnight) => (midnight - now).to_std().unwrap_or(Duration::ZERO),
        // Midnight skipped by a DST jump; one day is a safe upper bound
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Source of "now" and of suspension
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current local wall-clock time
    fn now(&self) -> DateTime<Local>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);

    /// Current local calendar date
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Real clock backed by the system time and `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Deterministic clock for tests
///
/// `sleep` returns immediately after advancing the clock by the requested
/// duration, and records the duration so tests can assert on it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sum of all recorded sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_match_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(format_match_date(date), "09-03-2025");
        assert_eq!(parse_match_date("09-03-2025"), Some(date));
    }

    #[test]
    fn test_parse_match_date_rejects_iso() {
        assert_eq!(parse_match_date("2025-03-09"), None);
    }

    #[test]
    fn test_duration_until_next_midnight() {
        let now = local(2025, 6, 14, 23, 0, 0);
        assert_eq!(duration_until_next_midnight(now), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_and_records() {
        let clock = ManualClock::new(local(2025, 6, 14, 12, 0, 0));
        clock.sleep(Duration::from_secs(30)).await;
        clock.sleep(Duration::from_secs(15)).await;

        assert_eq!(clock.now(), local(2025, 6, 14, 12, 0, 45));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(30), Duration::from_secs(15)]
        );
        assert_eq!(clock.total_slept(), Duration::from_secs(45));
    }

    #[test]
    fn test_manual_clock_advance_crosses_day() {
        let clock = ManualClock::new(local(2025, 6, 14, 23, 59, 30));
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert!(clock.sleeps().is_empty());
    }
}
