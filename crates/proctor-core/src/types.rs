use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ─── Session identity ─────────────────────────────────────────────

/// Opaque identifier for one timed attempt. Stable for the lifetime of the
/// attempt, including across page reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ─── Session state ────────────────────────────────────────────────

/// Session lifecycle state. `Locked`, `Expired`, `Finalized`, and
/// `SubmitFailed` are terminal: once reached, no field of the session may
/// mutate again.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionState {
    #[default]
    Active,
    /// Fullscreen was lost; the grace countdown is running.
    GracePending,
    /// Terminated by an integrity violation.
    Locked,
    /// Terminated by clock expiry.
    Expired,
    /// Terminated by a successful submit (user or automatic).
    Finalized,
    /// Finalize was triggered but submission failed after all retries.
    SubmitFailed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Locked | Self::Expired | Self::Finalized | Self::SubmitFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::GracePending => "grace_pending",
            Self::Locked => "locked",
            Self::Expired => "expired",
            Self::Finalized => "finalized",
            Self::SubmitFailed => "submit_failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Infractions ──────────────────────────────────────────────────

/// Discrete environment signal suggesting a rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum InfractionKind {
    /// Visibility lost (tab switch, window minimize).
    TabHidden,
    /// Copy/cut/paste attempt.
    ClipboardUse,
    /// Right-click / context menu opened.
    ContextMenu,
    /// A blocked keyboard shortcut was attempted (devtools, view-source).
    BlockedShortcut,
}

impl InfractionKind {
    pub const ALL: [Self; 4] = [
        Self::TabHidden,
        Self::ClipboardUse,
        Self::ContextMenu,
        Self::BlockedShortcut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabHidden => "tab_hidden",
            Self::ClipboardUse => "clipboard_use",
            Self::ContextMenu => "context_menu",
            Self::BlockedShortcut => "blocked_shortcut",
        }
    }
}

impl fmt::Display for InfractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfractionKind {
    type Err = ProctorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tab_hidden" => Ok(Self::TabHidden),
            "clipboard_use" => Ok(Self::ClipboardUse),
            "context_menu" => Ok(Self::ContextMenu),
            "blocked_shortcut" => Ok(Self::BlockedShortcut),
            _ => Err(ProctorError::InvalidInfraction(s.to_string())),
        }
    }
}

// ─── Questions & answers ──────────────────────────────────────────

/// One question as delivered by the quiz-content collaborator. Correctness
/// is never computed here; `correct_answer` is carried only so a results
/// renderer can display it after finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// One answer slot in the finalize payload. `selected_answer` is `None` for
/// an unanswered question — serialized as an explicit `null`, never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub selected_answer: Option<String>,
}

/// Ordered answer sheet covering every question of the quiz. A slot exists
/// for each question from construction, so the finalize payload always has
/// one entry per question regardless of how many were answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    slots: Vec<Answer>,
}

impl AnswerSheet {
    pub fn new(questions: &[Question]) -> Self {
        let slots = questions
            .iter()
            .map(|q| Answer {
                question_id: q.question_id.clone(),
                selected_answer: None,
            })
            .collect();
        Self { slots }
    }

    /// Record (or overwrite) the selection for a question.
    pub fn select(
        &mut self,
        question_id: &str,
        selected: impl Into<String>,
    ) -> Result<(), ProctorError> {
        match self.slots.iter_mut().find(|a| a.question_id == question_id) {
            Some(slot) => {
                slot.selected_answer = Some(selected.into());
                Ok(())
            }
            None => Err(ProctorError::UnknownQuestion(question_id.to_string())),
        }
    }

    pub fn answers(&self) -> &[Answer] {
        &self.slots
    }

    /// Number of questions with a recorded selection.
    pub fn answered(&self) -> usize {
        self.slots
            .iter()
            .filter(|a| a.selected_answer.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ─── Submission wire types ────────────────────────────────────────

/// Finalize payload sent to the submission collaborator. `session_id`
/// doubles as the idempotency key: a retried request carries the same id so
/// the collaborator can de-duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub session_id: SessionId,
    pub answers: Vec<Answer>,
}

/// Score record returned by the submission collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub result_id: String,
    pub score: u32,
    pub total: u32,
    pub percentage: f64,
    pub status: String,
}

// ─── Notifications & snapshot ─────────────────────────────────────

/// State-change notification pushed to the host for re-rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNotification {
    pub remaining_secs: u64,
    pub state: SessionState,
    pub infraction_count: u32,
}

/// Read-only view of the full session, for synchronous host queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub budget_secs: u64,
    pub start_instant: DateTime<Utc>,
    pub state: SessionState,
    pub infraction_count: u32,
    /// Present iff `state == GracePending`.
    pub grace_deadline: Option<DateTime<Utc>>,
}

/// Render remaining seconds as `m:ss` for countdown display.
pub fn format_clock(remaining_secs: u64) -> String {
    format!("{}:{:02}", remaining_secs / 60, remaining_secs % 60)
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    #[error("session already terminal ({0}); mutation rejected")]
    SessionTerminal(SessionState),

    #[error("unknown infraction kind: {0}")]
    InvalidInfraction(String),
}

// ─── Tests ───────────────────────────────────────────────────────
