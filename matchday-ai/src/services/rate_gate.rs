//! Request rate gate for AI service calls
//!
//! Tracks a one-minute request window and a calendar-day request count, and
//! suspends callers until both budgets allow another call. A fixed pacing
//! delay per model is applied on top of the counters.
//!
//! The budget is process-wide: one [`RateGate`] is shared (via `Arc`) by
//! every conversation, and acquisitions are serialized by holding the budget
//! lock across the waits.

use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use matchday_common::time::{duration_until_next_midnight, Clock};

use crate::models::RateLimits;

/// Length of the rolling minute window
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Margin added after local midnight before the day budget is reused
const DAY_ROLLOVER_MARGIN: Duration = Duration::from_secs(60);

/// Fixed pacing per model (bare, lower-case model name)
const MODEL_DELAYS: &[(&str, Duration)] = &[
    ("gemini-1.0-pro", Duration::from_millis(500)),
    ("gemini-1.5-pro-latest", Duration::from_millis(700)),
    ("gemini-2.0-flash", Duration::from_millis(200)),
];

/// Fixed delay applied before every call to `model_id`
pub fn model_delay(model_id: &str) -> Duration {
    let bare = model_id.trim();
    let bare = bare.strip_prefix("models/").unwrap_or(bare).to_ascii_lowercase();
    MODEL_DELAYS
        .iter()
        .find(|(name, _)| *name == bare)
        .map(|(_, delay)| *delay)
        .unwrap_or(Duration::ZERO)
}

/// Counters guarded by the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBudget {
    pub per_minute_limit: Option<u32>,
    pub per_day_limit: Option<u32>,
    pub minute_window_start: DateTime<Local>,
    pub minute_count: u32,
    pub day_key: NaiveDate,
    pub day_count: u32,
}

impl RateBudget {
    fn new(now: DateTime<Local>) -> Self {
        Self {
            per_minute_limit: None,
            per_day_limit: None,
            minute_window_start: now,
            minute_count: 0,
            day_key: now.date_naive(),
            day_count: 0,
        }
    }

    fn reset_minute(&mut self, now: DateTime<Local>) {
        self.minute_window_start = now;
        self.minute_count = 0;
    }

    fn reset_day(&mut self, today: NaiveDate) {
        self.day_key = today;
        self.day_count = 0;
    }
}

/// Gate every outbound AI call passes through
pub struct RateGate {
    clock: Arc<dyn Clock>,
    budget: Mutex<RateBudget>,
}

impl RateGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let budget = RateBudget::new(clock.now());
        Self {
            clock,
            budget: Mutex::new(budget),
        }
    }

    /// Suspend until a call is permitted, then record one unit of consumption
    ///
    /// `None` or zero limits mean "no limit" on that axis.
    pub async fn acquire(
        &self,
        per_minute_limit: Option<u32>,
        per_day_limit: Option<u32>,
        model_id: Option<&str>,
    ) {
        let per_minute_limit = per_minute_limit.filter(|l| *l > 0);
        let per_day_limit = per_day_limit.filter(|l| *l > 0);

        let mut budget = self.budget.lock().await;
        budget.per_minute_limit = per_minute_limit;
        budget.per_day_limit = per_day_limit;

        // Any wait can cross a window boundary, so re-check both budgets after it
        loop {
            let now = self.roll_windows(&mut budget);

            if let Some(limit) = per_day_limit {
                if budget.day_count >= limit {
                    let wait = duration_until_next_midnight(now) + DAY_ROLLOVER_MARGIN;
                    warn!(
                        day_count = budget.day_count,
                        limit,
                        wait_secs = wait.as_secs(),
                        "Daily request budget exhausted, waiting for next day"
                    );
                    self.clock.sleep(wait).await;
                    continue;
                }
            }

            if let Some(limit) = per_minute_limit {
                if budget.minute_count >= limit {
                    let wait = MINUTE_WINDOW
                        .saturating_sub(elapsed_since(budget.minute_window_start, now));
                    debug!(
                        minute_count = budget.minute_count,
                        limit,
                        wait_ms = wait.as_millis() as u64,
                        "Per-minute request budget reached, waiting"
                    );
                    self.clock.sleep(wait).await;
                    continue;
                }
            }

            break;
        }

        if let Some(model_id) = model_id {
            let delay = model_delay(model_id);
            if !delay.is_zero() {
                debug!(model = model_id, delay_ms = delay.as_millis() as u64, "Model pacing delay");
                self.clock.sleep(delay).await;
                self.roll_windows(&mut budget);
            }
        }

        budget.minute_count += 1;
        budget.day_count += 1;
    }

    /// [`acquire`](Self::acquire) with limits taken from a task
    pub async fn acquire_for(&self, limits: &RateLimits, model_id: &str) {
        self.acquire(limits.per_minute, limits.per_day, Some(model_id))
            .await
    }

    /// Start a fresh minute window or calendar day when the clock has left the current one
    fn roll_windows(&self, budget: &mut RateBudget) -> DateTime<Local> {
        let now = self.clock.now();
        if elapsed_since(budget.minute_window_start, now) >= MINUTE_WINDOW {
            budget.reset_minute(now);
        }
        let today = self.clock.today();
        if today != budget.day_key {
            budget.reset_day(today);
        }
        now
    }

    /// Copy of the current counters
    pub async fn snapshot(&self) -> RateBudget {
        self.budget.lock().await.clone()
    }
}

fn elapsed_since(start: DateTime<Local>, now: DateTime<Local>) -> Duration {
    (now - start).to_std().unwrap_or(Duration::ZERO)
}
