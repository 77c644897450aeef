//! Exam session controller: composes the duration clock, infraction
//! monitor, fullscreen guard, and lock controller into one owning tokio
//! task, and exposes the session to the host through a handle.
//!
//! One loop, one suspension discipline: a 1-second tick plus an mpsc
//! channel of host events, both raced against a cancellation token. Every
//! timer and listener the session acquires is released when the loop
//! exits, on every exit path. The finalize side effect fires at most once
//! per session — the lock controller decides the winner among the four
//! concurrent triggers, and this loop only performs what it is told.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use proctor_core::clock::{self, ClockState};
use proctor_core::guard::{self, GuardPolicy, GuardState};
use proctor_core::lock::{LockController, LockDecision, TerminalTrigger};
use proctor_core::monitor::{self, MonitorPolicy, MonitorState};
use proctor_core::types::{
    AnswerSheet, InfractionKind, SessionId, SessionSnapshot, SessionState, StateNotification,
    SubmissionOutcome, SubmissionRequest,
};
use proctor_store::AnchorStore;

use crate::collab::{Quiz, RetryPolicy, SubmissionSink, submit_with_retry};

// ─── Time source ─────────────────────────────────────────────────

/// Wall-clock access for the runtime layer. The pure machines take time as
/// a parameter; this trait is the single place the controller reads it, so
/// tests can inject a deterministic clock.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production time source.
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ─── Configuration & events ──────────────────────────────────────

/// Per-session configuration. The budget is fixed at session start and
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: SessionId,
    pub budget_secs: u64,
    pub monitor: MonitorPolicy,
    pub guard: GuardPolicy,
    pub retry: RetryPolicy,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<SessionId>, budget_secs: u64) -> Self {
        Self {
            session_id: session_id.into(),
            budget_secs,
            monitor: MonitorPolicy::default(),
            guard: GuardPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Raw environment signals forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSignal {
    TabHidden,
    ClipboardUse,
    ContextMenu,
    BlockedShortcut,
    FullscreenExited,
    FullscreenRecovered,
}

/// Host-side events consumed by the session loop.
#[derive(Debug, Clone)]
enum SessionEvent {
    Signal(EnvSignal),
    SelectAnswer { question_id: String, selected: String },
    Submit,
}

// ─── Handle ──────────────────────────────────────────────────────

struct SessionShared {
    snapshot: SessionSnapshot,
    outcome: Option<SubmissionOutcome>,
}

/// Live handle to a running session. Dropping the handle cancels the
/// session loop; [`SessionHandle::teardown`] does so explicitly and waits
/// for the loop to finish releasing its resources.
pub struct SessionHandle {
    shared: Arc<Mutex<SessionShared>>,
    events: mpsc::Sender<SessionEvent>,
    notify: broadcast::Sender<StateNotification>,
    time: Arc<dyn TimeSource>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    /// Remaining whole seconds, derived from the persisted start instant.
    pub fn remaining_secs(&self) -> u64 {
        let shared = self.shared.lock().expect("session lock");
        clock::remaining_secs(
            shared.snapshot.start_instant,
            shared.snapshot.budget_secs,
            self.time.now(),
        )
    }

    pub fn current_state(&self) -> SessionState {
        self.shared.lock().expect("session lock").snapshot.state
    }

    pub fn infraction_count(&self) -> u32 {
        self.shared
            .lock()
            .expect("session lock")
            .snapshot
            .infraction_count
    }

    /// Full read-only view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().expect("session lock").snapshot.clone()
    }

    /// Score record from a successful finalize, once available.
    pub fn outcome(&self) -> Option<SubmissionOutcome> {
        self.shared.lock().expect("session lock").outcome.clone()
    }

    /// Subscribe to state-change notifications for re-rendering.
    pub fn subscribe(&self) -> broadcast::Receiver<StateNotification> {
        self.notify.subscribe()
    }

    /// Forward an environment signal. Returns `false` once the session
    /// loop has stopped accepting events (terminal or torn down).
    pub async fn signal(&self, signal: EnvSignal) -> bool {
        self.events.send(SessionEvent::Signal(signal)).await.is_ok()
    }

    /// Record an answer selection.
    pub async fn select_answer(&self, question_id: &str, selected: &str) -> bool {
        self.events
            .send(SessionEvent::SelectAnswer {
                question_id: question_id.to_string(),
                selected: selected.to_string(),
            })
            .await
            .is_ok()
    }

    /// Explicit user submit.
    pub async fn submit(&self) -> bool {
        self.events.send(SessionEvent::Submit).await.is_ok()
    }

    /// Cancel the session loop and wait for it to release its timers and
    /// listeners. Idempotent — safe to call twice.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().expect("task lock").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Controller ──────────────────────────────────────────────────

/// Composition root. [`ExamSessionController::start`] is the only way the
/// host reaches the integrity subsystem.
pub struct ExamSessionController;

impl ExamSessionController {
    /// Start (or resume, after a reload) a session and return its handle.
    ///
    /// The start instant is anchored through the store: the first start for
    /// a session id persists `now`, every later start reads the original
    /// value back, so the countdown survives reloads. If the store fails,
    /// the session degrades to an in-memory anchor rather than crashing.
    pub fn start(
        config: SessionConfig,
        quiz: Quiz,
        store: AnchorStore,
        sink: Arc<dyn SubmissionSink>,
    ) -> SessionHandle {
        Self::start_with_time(config, quiz, store, sink, Arc::new(SystemTimeSource))
    }

    pub fn start_with_time(
        config: SessionConfig,
        quiz: Quiz,
        mut store: AnchorStore,
        sink: Arc<dyn SubmissionSink>,
        time: Arc<dyn TimeSource>,
    ) -> SessionHandle {
        let now = time.now();
        let start_instant = match store.get_or_create(config.session_id.as_str(), now) {
            Ok(instant) => instant,
            Err(err) => {
                warn!(%err, "anchor store failed; degrading to in-memory anchor");
                store = AnchorStore::degraded();
                store
                    .get_or_create(config.session_id.as_str(), now)
                    .unwrap_or(now)
            }
        };

        let snapshot = SessionSnapshot {
            session_id: config.session_id.clone(),
            budget_secs: config.budget_secs,
            start_instant,
            state: SessionState::Active,
            infraction_count: 0,
            grace_deadline: None,
        };
        let shared = Arc::new(Mutex::new(SessionShared {
            snapshot,
            outcome: None,
        }));

        let (event_tx, event_rx) = mpsc::channel(64);
        let (notify_tx, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();

        info!(
            session_id = %config.session_id,
            budget_secs = config.budget_secs,
            %start_instant,
            questions = quiz.questions.len(),
            "session started"
        );

        let session_loop = SessionLoop {
            config,
            sheet: AnswerSheet::new(&quiz.questions),
            clock: ClockState::new(),
            monitor: MonitorState::new(),
            guard: GuardState::new(),
            lock: LockController::new(),
            store,
            sink,
            time: Arc::clone(&time),
            shared: Arc::clone(&shared),
            notify: notify_tx.clone(),
        };
        let task = tokio::spawn(session_loop.run(event_rx, cancel.clone()));

        SessionHandle {
            shared,
            events: event_tx,
            notify: notify_tx,
            time,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }
}

// ─── Session loop ────────────────────────────────────────────────

struct SessionLoop {
    config: SessionConfig,
    sheet: AnswerSheet,
    clock: ClockState,
    monitor: MonitorState,
    guard: GuardState,
    lock: LockController,
    store: AnchorStore,
    sink: Arc<dyn SubmissionSink>,
    time: Arc<dyn TimeSource>,
    shared: Arc<Mutex<SessionShared>>,
    notify: broadcast::Sender<StateNotification>,
}

impl SessionLoop {
    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The interval fires immediately; consume the zeroth tick so the
        // cadence is one tick per elapsed second.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = %self.config.session_id, "session torn down");
                    break;
                }
                _ = ticker.tick() => {
                    if self.on_tick().await {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if self.on_event(event).await {
                            break;
                        }
                    }
                    // All handles gone — nothing can observe the session.
                    None => break,
                },
            }
        }
        // Receiver drops here: later sends fail, later ticks never run.
        // This is the single release point for every exit path.
    }

    /// One second elapsed. Returns `true` when the session reached a
    /// terminal state and finalize has settled.
    async fn on_tick(&mut self) -> bool {
        let now = self.time.now();

        let (clock_next, clock_out) = clock::tick(
            self.clock,
            self.start_instant(),
            self.config.budget_secs,
            now,
        );
        self.clock = clock_next;
        if clock_out.expired && self.trigger(TerminalTrigger::Expired).await {
            return true;
        }

        let (guard_next, guard_out) = guard::tick(self.guard, now);
        self.guard = guard_next;
        if guard_out.grace_expired && self.trigger(TerminalTrigger::GraceExpired).await {
            return true;
        }

        // Countdown display update.
        self.publish();
        false
    }

    /// Host event. Returns `true` when the event finalized the session.
    async fn on_event(&mut self, event: SessionEvent) -> bool {
        if self.lock.is_terminal() {
            // Dropped, not queued: the race is already decided.
            return false;
        }
        match event {
            SessionEvent::Signal(signal) => self.on_signal(signal).await,
            SessionEvent::SelectAnswer {
                question_id,
                selected,
            } => {
                if let Err(err) = self.sheet.select(&question_id, selected) {
                    warn!(session_id = %self.config.session_id, %err, "answer rejected");
                }
                false
            }
            SessionEvent::Submit => self.trigger(TerminalTrigger::UserSubmit).await,
        }
    }

    async fn on_signal(&mut self, signal: EnvSignal) -> bool {
        let now = self.time.now();
        match signal {
            EnvSignal::TabHidden => self.on_infraction(InfractionKind::TabHidden).await,
            EnvSignal::ClipboardUse => self.on_infraction(InfractionKind::ClipboardUse).await,
            EnvSignal::ContextMenu => self.on_infraction(InfractionKind::ContextMenu).await,
            EnvSignal::BlockedShortcut => {
                self.on_infraction(InfractionKind::BlockedShortcut).await
            }
            EnvSignal::FullscreenExited => {
                let (next, out) = guard::on_fullscreen_exit(self.guard, &self.config.guard, now);
                self.guard = next;
                if out.phase_changed {
                    info!(
                        session_id = %self.config.session_id,
                        deadline = ?self.guard.grace_deadline(),
                        "fullscreen lost; grace period open"
                    );
                    self.set_phase(SessionState::GracePending, self.guard.grace_deadline());
                }
                false
            }
            EnvSignal::FullscreenRecovered => {
                let (next, out) = guard::on_fullscreen_recover(self.guard);
                self.guard = next;
                if out.phase_changed {
                    info!(session_id = %self.config.session_id, "fullscreen recovered in time");
                    self.set_phase(SessionState::Active, None);
                }
                false
            }
        }
    }

    async fn on_infraction(&mut self, kind: InfractionKind) -> bool {
        let (next, out) = monitor::record(self.monitor, &self.config.monitor, kind);
        self.monitor = next;
        if out.counted {
            info!(
                session_id = %self.config.session_id,
                %kind,
                count = out.count,
                threshold = self.config.monitor.threshold,
                "infraction recorded"
            );
            {
                let mut shared = self.shared.lock().expect("session lock");
                shared.snapshot.infraction_count = out.count;
            }
            self.publish();
        } else {
            debug!(session_id = %self.config.session_id, %kind, "advisory signal observed");
        }
        if out.threshold_exceeded {
            return self.trigger(TerminalTrigger::ThresholdExceeded).await;
        }
        false
    }

    /// Route a trigger through the lock controller; perform the finalize
    /// protocol if this trigger won. Returns `true` when it did.
    async fn trigger(&mut self, trigger: TerminalTrigger) -> bool {
        let decision = self.lock.apply(trigger);
        let LockDecision::Finalize {
            next_state,
            trigger,
        } = decision
        else {
            return false;
        };

        info!(
            session_id = %self.config.session_id,
            %trigger,
            state = %next_state,
            "terminal transition"
        );
        self.set_phase(next_state, None);
        self.finalize(next_state).await;
        true
    }

    /// Invoke the submission collaborator exactly once (with bounded
    /// retries inside), then settle the terminal surface.
    async fn finalize(&mut self, terminal_state: SessionState) {
        let request = SubmissionRequest {
            session_id: self.config.session_id.clone(),
            answers: self.sheet.answers().to_vec(),
        };
        match submit_with_retry(self.sink.as_ref(), &request, &self.config.retry).await {
            Ok(outcome) => {
                info!(
                    session_id = %self.config.session_id,
                    result_id = %outcome.result_id,
                    answered = self.sheet.answered(),
                    total = self.sheet.len(),
                    "submission accepted"
                );
                {
                    let mut shared = self.shared.lock().expect("session lock");
                    shared.outcome = Some(outcome);
                }
                // A locked session keeps its anchor so a reload cannot
                // restart the clock on a fresh-looking attempt.
                if matches!(
                    terminal_state,
                    SessionState::Finalized | SessionState::Expired
                ) {
                    if let Err(err) = self.store.clear(self.config.session_id.as_str()) {
                        warn!(session_id = %self.config.session_id, %err, "anchor clear failed");
                    }
                }
                self.publish();
            }
            Err(err) => {
                warn!(
                    session_id = %self.config.session_id,
                    %err,
                    "submission failed after retries; surfacing to user"
                );
                self.lock.mark_submit_failed();
                self.set_phase(SessionState::SubmitFailed, None);
            }
        }
    }

    fn start_instant(&self) -> DateTime<Utc> {
        self.shared
            .lock()
            .expect("session lock")
            .snapshot
            .start_instant
    }

    fn set_phase(&self, state: SessionState, grace_deadline: Option<DateTime<Utc>>) {
        {
            let mut shared = self.shared.lock().expect("session lock");
            shared.snapshot.state = state;
            shared.snapshot.grace_deadline = grace_deadline;
        }
        self.publish();
    }

    /// Broadcast the current view. Send errors only mean nobody is
    /// subscribed, which is fine.
    fn publish(&self) {
        let notification = {
            let shared = self.shared.lock().expect("session lock");
            StateNotification {
                remaining_secs: clock::remaining_secs(
                    shared.snapshot.start_instant,
                    shared.snapshot.budget_secs,
                    self.time.now(),
                ),
                state: shared.snapshot.state,
                infraction_count: shared.snapshot.infraction_count,
            }
        };
        let _ = self.notify.send(notification);
    }
}
