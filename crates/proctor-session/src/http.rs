//! HTTP implementations of the collaborator contracts against the backend
//! REST API: `GET /api/quizzes` for content and `POST /api/scores/submit`
//! for finalize. Wire documents use the backend's field names and are
//! translated into core types at this boundary.

use async_trait::async_trait;
use serde::Deserialize;

use proctor_core::types::{Question, SubmissionOutcome, SubmissionRequest};

use crate::collab::{CollabError, Quiz, QuizSource, SubmissionSink};

// ─── Wire documents ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QuizDoc {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    questions: Vec<QuestionDoc>,
}

#[derive(Debug, Deserialize)]
struct QuestionDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "questionText")]
    question_text: String,
    options: Vec<String>,
    #[serde(rename = "correctAnswer")]
    correct_answer: String,
}

impl From<QuizDoc> for Quiz {
    fn from(doc: QuizDoc) -> Self {
        Quiz {
            quiz_id: doc.id,
            title: doc.title,
            questions: doc
                .questions
                .into_iter()
                .map(|q| Question {
                    question_id: q.id,
                    text: q.question_text,
                    options: q.options,
                    correct_answer: q.correct_answer,
                })
                .collect(),
        }
    }
}

// ─── Client ──────────────────────────────────────────────────────

/// Backend API client implementing both collaborator contracts.
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl QuizSource for ApiClient {
    async fn fetch_quiz(&self, title: &str) -> Result<Quiz, CollabError> {
        let url = format!("{}/api/quizzes", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected {
                status: response.status().as_u16(),
            });
        }
        let docs: Vec<QuizDoc> = response.json().await?;
        docs.into_iter()
            .find(|d| d.title == title)
            .map(Quiz::from)
            .ok_or_else(|| CollabError::QuizNotFound(title.to_string()))
    }
}

#[async_trait]
impl SubmissionSink for ApiClient {
    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionOutcome, CollabError> {
        let url = format!("{}/api/scores/submit", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

// ─── Tests ───────────────────────────────────────────────────────
