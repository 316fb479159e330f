//! Shared request/read budget for the external model services.
//!
//! The governor tracks two independent limits:
//! - the services' short sliding window (limit / remaining / reset time),
//!   mirrored from the headers they report, and
//! - a monthly cumulative call count against a fixed monthly budget.
//!
//! It is constructed explicitly and shared behind an `Arc`; all mutation goes
//! through one mutex so interleaved async tasks see a serialized view.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::types::RateLimitSnapshot;

/// Estimated number of calls one full finder run consumes.
pub const FINDER_RUN_COST: u64 = 1_300;

/// Point-in-time view of the governor, surfaced to callers for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub remaining: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    pub monthly_remaining: u64,
}

#[derive(Debug)]
struct GovernorState {
    window_limit: u32,
    window_remaining: u32,
    window_resets_at: Option<DateTime<Utc>>,
    monthly_used: u64,
    month: (i32, u32),
}

#[derive(Debug)]
pub struct BudgetGovernor {
    monthly_budget: u64,
    state: Mutex<GovernorState>,
}

fn month_key(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

impl BudgetGovernor {
    /// A fresh governor with a full window and no monthly usage.
    #[must_use]
    pub fn new(monthly_budget: u64, window_limit: u32) -> Self {
        Self::with_usage_at(monthly_budget, window_limit, 0, Utc::now())
    }

    /// A governor seeded with usage already spent this month.
    #[must_use]
    pub fn with_usage(monthly_budget: u64, window_limit: u32, monthly_used: u64) -> Self {
        Self::with_usage_at(monthly_budget, window_limit, monthly_used, Utc::now())
    }

    fn with_usage_at(
        monthly_budget: u64,
        window_limit: u32,
        monthly_used: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            monthly_budget,
            state: Mutex::new(GovernorState {
                window_limit,
                window_remaining: window_limit,
                window_resets_at: None,
                monthly_used,
                month: month_key(now),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state and roll the monthly counter over if the calendar month changed.
    fn lock_at(&self, now: DateTime<Utc>) -> MutexGuard<'_, GovernorState> {
        let mut state = self.lock();
        let current = month_key(now);
        if state.month != current {
            tracing::info!(
                previous_used = state.monthly_used,
                "new month, resetting monthly usage"
            );
            state.month = current;
            state.monthly_used = 0;
        }
        state
    }

    /// Whether the short window allows another call right now.
    #[must_use]
    pub fn can_make_request(&self) -> bool {
        self.can_make_request_at(Utc::now())
    }

    /// Whether the short window allows another call at `now`.
    ///
    /// An exhausted window whose reset time has passed is refilled to its limit.
    #[must_use]
    pub fn can_make_request_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.lock_at(now);
        if state.window_remaining > 0 {
            return true;
        }
        match state.window_resets_at {
            Some(reset) if reset <= now => {
                state.window_remaining = state.window_limit;
                state.window_resets_at = None;
                true
            }
            _ => false,
        }
    }

    /// Whether enough monthly budget remains to start a full finder run.
    #[must_use]
    pub fn has_finder_budget(&self) -> bool {
        self.has_finder_budget_at(Utc::now())
    }

    #[must_use]
    pub fn has_finder_budget_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.lock_at(now);
        self.monthly_budget.saturating_sub(state.monthly_used) >= FINDER_RUN_COST
    }

    /// Record one completed call.
    ///
    /// When the service reported its window the governor adopts those values;
    /// otherwise it decrements its own copy of the window.
    pub fn track_request(&self, reported: Option<&RateLimitSnapshot>) {
        self.track_request_at(reported, Utc::now());
    }

    pub fn track_request_at(&self, reported: Option<&RateLimitSnapshot>, now: DateTime<Utc>) {
        let mut state = self.lock_at(now);
        match reported {
            Some(snapshot) => {
                state.window_limit = snapshot.limit;
                state.window_remaining = snapshot.remaining;
                if snapshot.reset_at.is_some() {
                    state.window_resets_at = snapshot.reset_at;
                }
            }
            None => {
                state.window_remaining = state.window_remaining.saturating_sub(1);
            }
        }
        state.monthly_used = state.monthly_used.saturating_add(1);
        tracing::debug!(
            window_remaining = state.window_remaining,
            monthly_used = state.monthly_used,
            "tracked model request"
        );
    }

    /// Add `n` calls made outside [`Self::track_request`] (batch operations).
    pub fn add_monthly_usage(&self, n: u64) {
        let mut state = self.lock_at(Utc::now());
        state.monthly_used = state.monthly_used.saturating_add(n);
    }

    #[must_use]
    pub fn monthly_used(&self) -> u64 {
        self.lock_at(Utc::now()).monthly_used
    }

    #[must_use]
    pub fn monthly_remaining(&self) -> u64 {
        let used = self.lock_at(Utc::now()).monthly_used;
        self.monthly_budget.saturating_sub(used)
    }

    #[must_use]
    pub fn status(&self) -> BudgetStatus {
        let state = self.lock_at(Utc::now());
        BudgetStatus {
            remaining: state.window_remaining,
            limit: state.window_limit,
            resets_at: state.window_resets_at,
            monthly_remaining: self.monthly_budget.saturating_sub(state.monthly_used),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn fresh_governor_allows_requests_and_runs() {
        let gov = BudgetGovernor::with_usage_at(15_000, 450, 0, march());
        assert!(gov.can_make_request_at(march()));
        assert!(gov.has_finder_budget_at(march()));
    }

    #[test]
    fn finder_budget_requires_full_run_cost() {
        let gov = BudgetGovernor::with_usage_at(15_000, 450, 15_000 - FINDER_RUN_COST, march());
        assert!(gov.has_finder_budget_at(march()));

        gov.track_request_at(None, march());
        assert!(
            !gov.has_finder_budget_at(march()),
            "one call short of the run cost must block a run"
        );
    }

    #[test]
    fn reported_window_is_adopted() {
        let gov = BudgetGovernor::with_usage_at(15_000, 450, 0, march());
        let reset = march() + Duration::minutes(15);
        gov.track_request_at(
            Some(&RateLimitSnapshot {
                limit: 300,
                remaining: 0,
                reset_at: Some(reset),
            }),
            march(),
        );
        assert!(!gov.can_make_request_at(march()));
        assert!(!gov.can_make_request_at(reset - Duration::seconds(1)));
        assert!(
            gov.can_make_request_at(reset),
            "window should refill once reset time passes"
        );
        assert!(gov.can_make_request_at(reset + Duration::seconds(1)));
    }

    #[test]
    fn exhausted_window_without_reset_stays_closed() {
        let gov = BudgetGovernor::with_usage_at(15_000, 1, 0, march());
        gov.track_request_at(None, march());
        assert!(!gov.can_make_request_at(march() + Duration::hours(1)));
    }

    #[test]
    fn each_tracked_request_costs_one_monthly_unit() {
        let gov = BudgetGovernor::with_usage_at(100, 450, 0, march());
        gov.track_request_at(None, march());
        gov.track_request_at(None, march());
        let state = gov.lock_at(march());
        assert_eq!(state.monthly_used, 2);
        assert_eq!(state.window_remaining, 448);
    }

    #[test]
    fn batch_usage_is_added() {
        let gov = BudgetGovernor::new(100, 450);
        gov.add_monthly_usage(40);
        assert_eq!(gov.monthly_used(), 40);
        assert_eq!(gov.monthly_remaining(), 60);
    }

    #[test]
    fn monthly_usage_rolls_over_with_the_calendar() {
        let gov = BudgetGovernor::with_usage_at(15_000, 450, 15_000, march());
        assert!(!gov.has_finder_budget_at(march()));
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 1).unwrap();
        assert!(gov.has_finder_budget_at(april));
    }

    #[test]
    fn status_serializes_camel_case() {
        let gov = BudgetGovernor::new(2_000, 450);
        let json = serde_json::to_value(gov.status()).unwrap();
        assert_eq!(json["remaining"], 450);
        assert_eq!(json["limit"], 450);
        assert_eq!(json["monthlyRemaining"], 2_000);
        assert!(json.get("resetsAt").is_none());
    }
}
