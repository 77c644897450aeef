//! External collaborator contracts: the quiz-content provider and the
//! submission sink. Both are consumed by the session controller, never
//! implemented here beyond in-memory variants for tests and the harness.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use proctor_core::types::{Question, SubmissionOutcome, SubmissionRequest};

// ─── Types ───────────────────────────────────────────────────────

/// One quiz as delivered by the content collaborator: an ordered question
/// list under a stable id and title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub quiz_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collaborator rejected request: status {status}")]
    Rejected { status: u16 },

    #[error("no quiz titled {0:?}")]
    QuizNotFound(String),
}

// ─── Contracts ───────────────────────────────────────────────────

/// Quiz-content collaborator: resolves a quiz reference to its ordered
/// question list. Correctness is never computed on this side.
#[async_trait]
pub trait QuizSource: Send + Sync {
    async fn fetch_quiz(&self, title: &str) -> Result<Quiz, CollabError>;
}

/// Submission collaborator: receives the finalize payload exactly once per
/// session under normal operation. Retries carry the same `session_id` so
/// the collaborator can de-duplicate.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionOutcome, CollabError>;
}

// ─── Retry ───────────────────────────────────────────────────────

/// Bounded retry with exponential backoff for the finalize submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (default 3).
    pub attempts: u32,
    /// Delay before the first retry in milliseconds (default 250).
    pub base_delay_ms: u64,
    /// Backoff multiplier per retry (default 2.0).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 250,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ms = self.base_delay_ms as f64 * self.multiplier.powi(retry as i32);
        Duration::from_millis(ms as u64)
    }
}

/// Submit with bounded retry. Returns the first success, or the last error
/// once the attempt budget is exhausted. The request (and its idempotency
/// key) is identical across attempts.
pub async fn submit_with_retry(
    sink: &dyn SubmissionSink,
    request: &SubmissionRequest,
    policy: &RetryPolicy,
) -> Result<SubmissionOutcome, CollabError> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match sink.submit(request).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                tracing::warn!(
                    session_id = %request.session_id,
                    attempt = attempt + 1,
                    attempts,
                    %err,
                    "submission attempt failed"
                );
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    // attempts >= 1, so at least one error was recorded.
    Err(last_err.unwrap_or(CollabError::Rejected { status: 0 }))
}

// ─── In-memory implementations ───────────────────────────────────

/// Fixed quiz list, for tests and the headless harness.
pub struct StaticQuizSource {
    quizzes: Vec<Quiz>,
}

impl StaticQuizSource {
    pub fn new(quizzes: Vec<Quiz>) -> Self {
        Self { quizzes }
    }
}

#[async_trait]
impl QuizSource for StaticQuizSource {
    async fn fetch_quiz(&self, title: &str) -> Result<Quiz, CollabError> {
        self.quizzes
            .iter()
            .find(|q| q.title == title)
            .cloned()
            .ok_or_else(|| CollabError::QuizNotFound(title.to_string()))
    }
}

/// Records every submission it receives; can be told to fail the next N
/// attempts to exercise the retry path.
#[derive(Default)]
pub struct RecordingSink {
    requests: Mutex<Vec<SubmissionRequest>>,
    failures_left: AtomicU32,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submit calls with a 500 before succeeding.
    pub fn with_failures(n: u32) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(n),
        }
    }

    /// Every request seen so far, including failed attempts.
    pub fn requests(&self) -> Vec<SubmissionRequest> {
        self.requests.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionOutcome, CollabError> {
        self.requests.lock().expect("sink lock").push(request.clone());

        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CollabError::Rejected { status: 500 });
        }

        let total = request.answers.len() as u32;
        Ok(SubmissionOutcome {
            result_id: format!("result-{}", request.session_id),
            score: 0,
            total,
            percentage: 0.0,
            status: "recorded".to_string(),
        })
    }
}

/// Discards submissions, acknowledging each with a canned outcome. Used by
/// the harness when no backend is configured.
pub struct NullSink;

#[async_trait]
impl SubmissionSink for NullSink {
    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionOutcome, CollabError> {
        tracing::info!(
            session_id = %request.session_id,
            answers = request.answers.len(),
            "discarding submission (no sink configured)"
        );
        Ok(SubmissionOutcome {
            result_id: format!("null-{}", request.session_id),
            score: 0,
            total: request.answers.len() as u32,
            percentage: 0.0,
            status: "discarded".to_string(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────
