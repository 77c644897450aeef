//! `proctor run`: wire one session to stdin/stdout.
//!
//! Input protocol, one JSON value per line:
//!   {"signal": "tab_hidden"}
//!   {"answer": {"question_id": "q1", "selected": "4"}}
//!   "submit"
//!
//! Output: one JSON state notification per line; a final `{"outcome": ...}`
//! line when the session finalized successfully.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use proctor_core::guard::GuardPolicy;
use proctor_core::monitor::MonitorPolicy;
use proctor_session::collab::{NullSink, Quiz, SubmissionSink};
use proctor_session::controller::{EnvSignal, ExamSessionController, SessionConfig};
use proctor_session::http::ApiClient;
use proctor_store::AnchorStore;

use crate::cli::RunOpts;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HostLine {
    Signal(EnvSignal),
    Answer { question_id: String, selected: String },
    Submit,
}

pub async fn cmd_run(opts: RunOpts) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&opts.quiz)?;
    let quiz: Quiz = serde_json::from_str(&raw)?;

    let sink: Arc<dyn SubmissionSink> = match &opts.backend_url {
        Some(url) => Arc::new(ApiClient::new(url.clone())),
        None => Arc::new(NullSink),
    };
    let store = AnchorStore::open_or_degrade(&opts.db);

    let config = SessionConfig {
        session_id: opts.session_id.clone().into(),
        budget_secs: opts.budget_secs,
        monitor: MonitorPolicy {
            threshold: opts.threshold,
            count_clipboard_use: opts.count_clipboard,
            count_context_menu: opts.count_context_menu,
            count_blocked_shortcut: opts.count_blocked_shortcut,
        },
        guard: GuardPolicy {
            grace_secs: opts.grace_secs,
        },
        ..SessionConfig::new(opts.session_id.as_str(), opts.budget_secs)
    };

    let handle = ExamSessionController::start(config, quiz, store, sink);
    let mut notifications = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Ok(n) => {
                    println!("{}", serde_json::to_string(&n)?);
                    if n.state.is_terminal() {
                        break;
                    }
                }
                Err(_) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<HostLine>(line) {
                        Ok(HostLine::Signal(signal)) => {
                            handle.signal(signal).await;
                        }
                        Ok(HostLine::Answer { question_id, selected }) => {
                            handle.select_answer(&question_id, &selected).await;
                        }
                        Ok(HostLine::Submit) => {
                            handle.submit().await;
                        }
                        Err(err) => warn!(%err, "unparseable input line"),
                    }
                }
                // stdin closed: the host went away.
                None => {
                    info!("stdin closed; tearing down");
                    break;
                }
            },
        }
    }

    handle.teardown().await;
    if let Some(outcome) = handle.outcome() {
        println!("{}", serde_json::to_string(&serde_json::json!({ "outcome": outcome }))?);
    }
    Ok(())
}
