//! Fullscreen guard: a two-phase state machine with a bounded grace
//! period for transient fullscreen loss.
//!
//! - `Present` → `GracePending` on a fullscreen-exit signal, recording
//!   `deadline = now + grace_secs`.
//! - `GracePending` → `Present` on recovery before the deadline.
//! - A tick at or past the deadline while still `GracePending` emits
//!   `grace_expired` exactly once — fatal regardless of the infraction
//!   threshold. Later signals of any kind are no-ops.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ─── Policy ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    /// Seconds the participant has to recover fullscreen before the
    /// session locks.
    pub grace_secs: u64,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self { grace_secs: 3 }
    }
}

// ─── State ───────────────────────────────────────────────────────

/// Fullscreen presence phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    #[default]
    Present,
    GracePending {
        deadline: DateTime<Utc>,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GuardState {
    phase: GuardPhase,
    expired_signaled: bool,
}

impl GuardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(self) -> GuardPhase {
        self.phase
    }

    /// The grace deadline, present iff the guard is in `GracePending`.
    pub fn grace_deadline(self) -> Option<DateTime<Utc>> {
        match self.phase {
            GuardPhase::Present => None,
            GuardPhase::GracePending { deadline } => Some(deadline),
        }
    }

    pub fn expired_signaled(self) -> bool {
        self.expired_signaled
    }
}

/// Output of one guard transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOutput {
    /// True exactly once: on the tick that observes the deadline passed.
    pub grace_expired: bool,
    /// Whether the grace sub-state was entered or left by this transition.
    pub phase_changed: bool,
}

const NO_OP: GuardOutput = GuardOutput {
    grace_expired: false,
    phase_changed: false,
};

// ─── Transitions ─────────────────────────────────────────────────

/// Fullscreen-exit signal: open the grace window.
///
/// Ignored while already `GracePending` (the original deadline stands —
/// repeated exit events must not extend the window) and after the expiry
/// edge has fired.
pub fn on_fullscreen_exit(
    state: GuardState,
    policy: &GuardPolicy,
    now: DateTime<Utc>,
) -> (GuardState, GuardOutput) {
    if state.expired_signaled || matches!(state.phase, GuardPhase::GracePending { .. }) {
        return (state, NO_OP);
    }
    let deadline = now + TimeDelta::seconds(policy.grace_secs as i64);
    let next = GuardState {
        phase: GuardPhase::GracePending { deadline },
        expired_signaled: false,
    };
    (next, GuardOutput {
        grace_expired: false,
        phase_changed: true,
    })
}

/// Fullscreen-recovery signal: cancel the grace window.
///
/// A no-op when not `GracePending`, and after expiry — re-entering
/// fullscreen once the grace window has lapsed does not resurrect the
/// session.
pub fn on_fullscreen_recover(state: GuardState) -> (GuardState, GuardOutput) {
    if state.expired_signaled || matches!(state.phase, GuardPhase::Present) {
        return (state, NO_OP);
    }
    let next = GuardState {
        phase: GuardPhase::Present,
        expired_signaled: false,
    };
    (next, GuardOutput {
        grace_expired: false,
        phase_changed: true,
    })
}

/// Countdown tick: checks the grace deadline.
pub fn tick(state: GuardState, now: DateTime<Utc>) -> (GuardState, GuardOutput) {
    match state.phase {
        GuardPhase::GracePending { deadline } if !state.expired_signaled && now >= deadline => {
            let next = GuardState {
                phase: state.phase,
                expired_signaled: true,
            };
            (next, GuardOutput {
                grace_expired: true,
                phase_changed: false,
            })
        }
        _ => (state, NO_OP),
    }
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

    fn policy() -> GuardPolicy {
        GuardPolicy::default()
    }

    // ── 1. Exit opens the grace window ──────────────────────────────

    #[test]
    fn exit_opens_grace_window_with_deadline() {
        let now = t0();
        let (state, out) = on_fullscreen_exit(GuardState::new(), &policy(), now);
        assert!(out.phase_changed);
        assert!(!out.grace_expired);
        assert_eq!(state.grace_deadline(), Some(now + TimeDelta::seconds(3)));
    }

    // ── 2. Recovery before deadline cancels ─────────────────────────

    #[test]
    fn recovery_before_deadline_cancels() {
        // Lost at t=10, recovered at t=12 with a 3s grace: no expiry.
        let lost = t0() + TimeDelta::seconds(10);
        let (state, _) = on_fullscreen_exit(GuardState::new(), &policy(), lost);

        let (state, out) = on_fullscreen_recover(state);
        assert!(out.phase_changed);
        assert_eq!(state.grace_deadline(), None);

        // A later tick sees nothing pending.
        let (state, out) = tick(state, lost + TimeDelta::seconds(30));
        assert!(!out.grace_expired);
        assert!(!state.expired_signaled());
    }

    // ── 3. Deadline reached while pending expires once ──────────────

    #[test]
    fn deadline_reached_expires_exactly_once() {
        let lost = t0() + TimeDelta::seconds(20);
        let (state, _) = on_fullscreen_exit(GuardState::new(), &policy(), lost);

        let (state, out) = tick(state, lost + TimeDelta::seconds(2));
        assert!(!out.grace_expired, "before deadline");

        let (state, out) = tick(state, lost + TimeDelta::seconds(3));
        assert!(out.grace_expired, "at deadline");

        let (state, out) = tick(state, lost + TimeDelta::seconds(4));
        assert!(!out.grace_expired, "must not re-signal");
        assert!(state.expired_signaled());
    }

    // ── 4. Lose, recover, lose again ────────────────────────────────

    #[test]
    fn second_loss_gets_fresh_window() {
        let first = t0() + TimeDelta::seconds(10);
        let (state, _) = on_fullscreen_exit(GuardState::new(), &policy(), first);
        let (state, _) = on_fullscreen_recover(state);

        let second = t0() + TimeDelta::seconds(20);
        let (state, out) = on_fullscreen_exit(state, &policy(), second);
        assert!(out.phase_changed);
        assert_eq!(state.grace_deadline(), Some(second + TimeDelta::seconds(3)));

        let (_, out) = tick(state, second + TimeDelta::seconds(3));
        assert!(out.grace_expired, "expires at t=23");
    }

    // ── 5. Repeated exit does not extend the deadline ───────────────

    #[test]
    fn repeated_exit_keeps_original_deadline() {
        let lost = t0();
        let (state, _) = on_fullscreen_exit(GuardState::new(), &policy(), lost);
        let (state, out) = on_fullscreen_exit(state, &policy(), lost + TimeDelta::seconds(2));
        assert!(!out.phase_changed);
        assert_eq!(state.grace_deadline(), Some(lost + TimeDelta::seconds(3)));
    }

    // ── 6. Recovery after expiry has no effect ──────────────────────

    #[test]
    fn recovery_after_expiry_is_noop() {
        let lost = t0();
        let (state, _) = on_fullscreen_exit(GuardState::new(), &policy(), lost);
        let (state, out) = tick(state, lost + TimeDelta::seconds(3));
        assert!(out.grace_expired);

        let (state, out) = on_fullscreen_recover(state);
        assert!(!out.phase_changed);
        assert!(state.expired_signaled());

        let (_, out) = on_fullscreen_exit(state, &policy(), lost + TimeDelta::seconds(5));
        assert!(!out.phase_changed);
    }

    // ── 7. Recovery while present is a no-op ────────────────────────

    #[test]
    fn recovery_while_present_is_noop() {
        let (state, out) = on_fullscreen_recover(GuardState::new());
        assert!(!out.phase_changed);
        assert_eq!(state, GuardState::new());
    }

    // ── 8. Custom grace seconds ─────────────────────────────────────

    #[test]
    fn custom_grace_window() {
        let policy = GuardPolicy { grace_secs: 10 };
        let lost = t0();
        let (state, _) = on_fullscreen_exit(GuardState::new(), &policy, lost);

        let (state, out) = tick(state, lost + TimeDelta::seconds(9));
        assert!(!out.grace_expired);
        let (_, out) = tick(state, lost + TimeDelta::seconds(10));
        assert!(out.grace_expired);
    }
}
