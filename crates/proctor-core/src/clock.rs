//! Duration clock: derives remaining time from a persisted start instant
//! and a fixed budget, and detects the expiry edge exactly once.
//!
//! Remaining time is never stored — it is always recomputed from
//! `(start_instant, budget_secs, now)`, so a page reload that restores the
//! same start instant reports the true remaining time immediately.

use chrono::{DateTime, Utc};

/// Remaining whole seconds: `max(0, budget - elapsed)`.
///
/// Pure and monotonically non-increasing in `now`. A `now` before
/// `start_instant` (clock skew after restore) is treated as elapsed zero.
pub fn remaining_secs(start_instant: DateTime<Utc>, budget_secs: u64, now: DateTime<Utc>) -> u64 {
    let elapsed = now.signed_duration_since(start_instant).num_seconds();
    if elapsed <= 0 {
        return budget_secs;
    }
    budget_secs.saturating_sub(elapsed as u64)
}

/// Edge-detection state for the one-shot `Expired` signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    expiry_signaled: bool,
}

impl ClockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expiry_signaled(self) -> bool {
        self.expiry_signaled
    }
}

/// Output of one clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    /// Remaining seconds at this tick.
    pub remaining_secs: u64,
    /// True exactly once: on the first tick where remaining reaches zero.
    pub expired: bool,
}

/// Evaluate one tick of the countdown.
///
/// The first tick observing `remaining == 0` reports `expired = true`;
/// every later tick reports `expired = false` even though remaining stays
/// at zero. Callers route the edge to the lock controller and ignore the
/// rest.
pub fn tick(
    state: ClockState,
    start_instant: DateTime<Utc>,
    budget_secs: u64,
    now: DateTime<Utc>,
) -> (ClockState, ClockTick) {
    let remaining = remaining_secs(start_instant, budget_secs, now);
    let expired = remaining == 0 && !state.expiry_signaled;
    let next = ClockState {
        expiry_signaled: state.expiry_signaled || remaining == 0,
    };
    (next, ClockTick {
        remaining_secs: remaining,
        expired,
    })
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid RFC3339")
            .with_timezone(&Utc)
    }

    fn t0() -> DateTime<Utc> {
        ts("2026-08-26T09:00:00Z")
    }

    // ── 1. Remaining derivation ─────────────────────────────────────

    #[test]
    fn remaining_is_budget_minus_elapsed() {
        let start = t0();
        assert_eq!(remaining_secs(start, 60, start), 60);
        assert_eq!(remaining_secs(start, 60, start + TimeDelta::seconds(10)), 50);
        assert_eq!(remaining_secs(start, 60, start + TimeDelta::seconds(59)), 1);
        assert_eq!(remaining_secs(start, 60, start + TimeDelta::seconds(60)), 0);
    }

    // ── 2. Remaining clamps at zero ─────────────────────────────────

    #[test]
    fn remaining_clamps_at_zero_past_budget() {
        let start = t0();
        assert_eq!(remaining_secs(start, 60, start + TimeDelta::seconds(61)), 0);
        assert_eq!(
            remaining_secs(start, 60, start + TimeDelta::seconds(3600)),
            0
        );
    }

    // ── 3. Clock skew before start ──────────────────────────────────

    #[test]
    fn now_before_start_reports_full_budget() {
        let start = t0();
        assert_eq!(remaining_secs(start, 60, start - TimeDelta::seconds(5)), 60);
    }

    // ── 4. Monotone non-increasing in now ───────────────────────────

    #[test]
    fn remaining_monotone_non_increasing() {
        let start = t0();
        let mut prev = u64::MAX;
        for s in 0..=70 {
            let r = remaining_secs(start, 60, start + TimeDelta::seconds(s));
            assert!(r <= prev, "remaining increased at t={s}");
            prev = r;
        }
    }

    // ── 5. Expiry edge fires exactly once ───────────────────────────

    #[test]
    fn expiry_edge_fires_once() {
        let start = t0();
        let state = ClockState::new();

        let (state, out) = tick(state, start, 60, start + TimeDelta::seconds(59));
        assert_eq!(out.remaining_secs, 1);
        assert!(!out.expired);

        let (state, out) = tick(state, start, 60, start + TimeDelta::seconds(60));
        assert_eq!(out.remaining_secs, 0);
        assert!(out.expired, "first zero tick must signal expiry");

        let (state, out) = tick(state, start, 60, start + TimeDelta::seconds(61));
        assert_eq!(out.remaining_secs, 0);
        assert!(!out.expired, "expiry must not re-signal");
        assert!(state.expiry_signaled());
    }

    // ── 6. Expiry edge on late first tick ───────────────────────────

    #[test]
    fn late_first_tick_still_signals_once() {
        // Restored session whose budget already ran out during the reload.
        let start = t0();
        let (state, out) = tick(ClockState::new(), start, 60, start + TimeDelta::seconds(300));
        assert_eq!(out.remaining_secs, 0);
        assert!(out.expired);

        let (_, out) = tick(state, start, 60, start + TimeDelta::seconds(301));
        assert!(!out.expired);
    }

    // ── 7. Reload keeps elapsed time ────────────────────────────────

    #[test]
    fn restored_anchor_reports_true_remaining() {
        // Session started at T, reload at T+10: fresh ClockState, same
        // start instant.
        let start = t0();
        let (_, out) = tick(ClockState::new(), start, 60, start + TimeDelta::seconds(10));
        assert_eq!(out.remaining_secs, 50);
        assert!(!out.expired);
    }
}
