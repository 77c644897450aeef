//! Lock controller: the single authority for terminal transitions.
//!
//! Four trigger kinds race for a non-terminal session — clock expiry,
//! infraction threshold, grace expiry, and an explicit user submit. The
//! first one to arrive decides the terminal state and wins the right to
//! finalize; every later trigger is dropped, not queued. The caller
//! performs the actual submission side effect when handed a
//! [`LockDecision::Finalize`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SessionState;

// ─── Triggers ────────────────────────────────────────────────────

/// The four concurrent triggers that can end a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalTrigger {
    /// The duration clock reached zero.
    Expired,
    /// The infraction monitor crossed its threshold.
    ThresholdExceeded,
    /// Fullscreen was not recovered within the grace window.
    GraceExpired,
    /// The participant pressed submit.
    UserSubmit,
}

impl TerminalTrigger {
    /// Terminal state this trigger maps to.
    pub fn terminal_state(self) -> SessionState {
        match self {
            Self::Expired => SessionState::Expired,
            Self::ThresholdExceeded | Self::GraceExpired => SessionState::Locked,
            Self::UserSubmit => SessionState::Finalized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::ThresholdExceeded => "threshold_exceeded",
            Self::GraceExpired => "grace_expired",
            Self::UserSubmit => "user_submit",
        }
    }
}

impl fmt::Display for TerminalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Controller ──────────────────────────────────────────────────

/// Decision returned for each trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// This trigger won: transition to `next_state` and finalize exactly
    /// once.
    Finalize {
        next_state: SessionState,
        trigger: TerminalTrigger,
    },
    /// The session was already terminal; drop the trigger.
    Ignored,
}

/// Tracks whether the session has reached a terminal state and which
/// trigger got there first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockController {
    terminal: Option<(SessionState, TerminalTrigger)>,
}

impl LockController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal_state(&self) -> Option<SessionState> {
        self.terminal.map(|(state, _)| state)
    }

    /// The trigger that won the race, once terminal.
    pub fn winning_trigger(&self) -> Option<TerminalTrigger> {
        self.terminal.map(|(_, trigger)| trigger)
    }

    /// Apply a trigger. The first trigger on a non-terminal session wins;
    /// all later triggers return [`LockDecision::Ignored`].
    pub fn apply(&mut self, trigger: TerminalTrigger) -> LockDecision {
        if self.terminal.is_some() {
            return LockDecision::Ignored;
        }
        let next_state = trigger.terminal_state();
        self.terminal = Some((next_state, trigger));
        LockDecision::Finalize {
            next_state,
            trigger,
        }
    }

    /// Record that the finalize submission failed after all retries. The
    /// session stays terminal — it never reverts to active — but the
    /// user-visible surface becomes [`SessionState::SubmitFailed`]. The
    /// winning trigger is preserved for diagnostics.
    pub fn mark_submit_failed(&mut self) {
        if let Some((state, _)) = self.terminal.as_mut() {
            *state = SessionState::SubmitFailed;
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
