//! Infraction monitor: counts environment signals against a configurable
//! policy and signals `ThresholdExceeded` exactly once.
//!
//! The monitor is deliberately dumb about the environment: the runtime
//! layer translates raw host events into [`InfractionKind`] values and
//! feeds them here. A signal class the host cannot observe simply never
//! arrives — there is no registration handshake to fail.

use serde::{Deserialize, Serialize};

use crate::types::InfractionKind;

// ─── Policy ──────────────────────────────────────────────────────

/// Which signal classes count toward the lock threshold, and the threshold
/// itself.
///
/// `TabHidden` always counts. The remaining classes are advisory by
/// default: surfaced to the user (the count in notifications includes
/// them only when configured) but not lock-worthy unless a deployment
/// opts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorPolicy {
    /// Counting infractions at or above this value lock the session.
    pub threshold: u32,
    pub count_clipboard_use: bool,
    pub count_context_menu: bool,
    pub count_blocked_shortcut: bool,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            count_clipboard_use: false,
            count_context_menu: false,
            count_blocked_shortcut: false,
        }
    }
}

impl MonitorPolicy {
    /// Whether a signal class counts toward the threshold under this policy.
    pub fn counts(&self, kind: InfractionKind) -> bool {
        match kind {
            InfractionKind::TabHidden => true,
            InfractionKind::ClipboardUse => self.count_clipboard_use,
            InfractionKind::ContextMenu => self.count_context_menu,
            InfractionKind::BlockedShortcut => self.count_blocked_shortcut,
        }
    }
}

// ─── State & transition ──────────────────────────────────────────

/// Running monitor state. `count` is monotone non-decreasing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorState {
    count: u32,
    threshold_signaled: bool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(self) -> u32 {
        self.count
    }

    pub fn threshold_signaled(self) -> bool {
        self.threshold_signaled
    }
}

/// Output of recording one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOutput {
    /// Whether this signal counted toward the threshold.
    pub counted: bool,
    /// Count after this signal.
    pub count: u32,
    /// True exactly once: on the counting signal that reaches the threshold.
    pub threshold_exceeded: bool,
}

/// Record one observed signal.
///
/// Advisory (non-counting) signals leave the count untouched. Once the
/// threshold edge has fired, further counting signals still increment the
/// count for display but never re-signal.
pub fn record(
    state: MonitorState,
    policy: &MonitorPolicy,
    kind: InfractionKind,
) -> (MonitorState, MonitorOutput) {
    if !policy.counts(kind) {
        return (state, MonitorOutput {
            counted: false,
            count: state.count,
            threshold_exceeded: false,
        });
    }

    let count = state.count.saturating_add(1);
    let crossed = count >= policy.threshold && !state.threshold_signaled;
    let next = MonitorState {
        count,
        threshold_signaled: state.threshold_signaled || count >= policy.threshold,
    };
    (next, MonitorOutput {
        counted: true,
        count,
        threshold_exceeded: crossed,
    })
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── 1. Threshold crossing fires once ────────────────────────────

    #[test]
    fn third_tab_hidden_locks_once() {
        let policy = MonitorPolicy::default();
        let mut state = MonitorState::new();

        for expected in 1..=2u32 {
            let (next, out) = record(state, &policy, InfractionKind::TabHidden);
            assert_eq!(out.count, expected);
            assert!(out.counted);
            assert!(!out.threshold_exceeded);
            state = next;
        }

        let (state, out) = record(state, &policy, InfractionKind::TabHidden);
        assert_eq!(out.count, 3);
        assert!(out.threshold_exceeded, "third counting signal crosses");

        // Fourth event: count still advances, edge does not re-fire.
        let (state, out) = record(state, &policy, InfractionKind::TabHidden);
        assert_eq!(out.count, 4);
        assert!(!out.threshold_exceeded);
        assert!(state.threshold_signaled());
    }

    // ── 2. Advisory signals do not count by default ─────────────────

    #[test]
    fn advisory_signals_do_not_count_by_default() {
        let policy = MonitorPolicy::default();
        let state = MonitorState::new();

        for kind in [
            InfractionKind::ClipboardUse,
            InfractionKind::ContextMenu,
            InfractionKind::BlockedShortcut,
        ] {
            let (next, out) = record(state, &policy, kind);
            assert!(!out.counted);
            assert_eq!(out.count, 0);
            assert!(!out.threshold_exceeded);
            assert_eq!(next, state);
        }
    }

    // ── 3. Policy can promote advisory classes ──────────────────────

    #[test]
    fn policy_can_make_clipboard_count() {
        let policy = MonitorPolicy {
            threshold: 2,
            count_clipboard_use: true,
            ..MonitorPolicy::default()
        };
        let state = MonitorState::new();

        let (state, out) = record(state, &policy, InfractionKind::ClipboardUse);
        assert!(out.counted);
        assert!(!out.threshold_exceeded);

        let (_, out) = record(state, &policy, InfractionKind::TabHidden);
        assert_eq!(out.count, 2);
        assert!(out.threshold_exceeded);
    }

    // ── 4. Count is monotone ────────────────────────────────────────

    #[test]
    fn count_never_decreases() {
        let policy = MonitorPolicy::default();
        let mut state = MonitorState::new();
        let mut prev = 0;

        let signals = [
            InfractionKind::TabHidden,
            InfractionKind::ClipboardUse,
            InfractionKind::TabHidden,
            InfractionKind::ContextMenu,
            InfractionKind::TabHidden,
            InfractionKind::TabHidden,
        ];
        for kind in signals {
            let (next, out) = record(state, &policy, kind);
            assert!(out.count >= prev);
            prev = out.count;
            state = next;
        }
        assert_eq!(state.count(), 4);
    }

    // ── 5. Threshold of one ─────────────────────────────────────────

    #[test]
    fn threshold_one_locks_on_first_signal() {
        let policy = MonitorPolicy {
            threshold: 1,
            ..MonitorPolicy::default()
        };
        let (_, out) = record(MonitorState::new(), &policy, InfractionKind::TabHidden);
        assert!(out.threshold_exceeded);
    }
}
