//! Drives one remote analysis from submission to a terminal state.
//!
//! [`PollingController`] is the state machine
//! (`Idle -> Submitting -> Polling -> Finalizing -> Succeeded | Failed`). It is
//! driven either directly (`submit` then repeated `tick`) or on a worker thread
//! through [`spawn_analysis`], which returns a [`PollHandle`] for cancellation.
//! Everything the controller observes is reported back as [`Delta`]s.

use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::WorkflowError;
use crate::state::{AnalysisResult, Delta, JobParams, LogEntry, Match, Phase, Severity};
use crate::synthesis::map_synthesis;
use crate::workflow_client::{StepName, WorkflowApi, WorkflowSession, WorkflowStatus};

/// Shared "still active" flag. Once cancelled, holders of a live guard are done
/// and no new guard is handed out.
#[derive(Debug, Clone)]
pub struct CancelToken {
    active: Arc<Mutex<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(true)),
        }
    }

    pub fn cancel(&self) {
        *self.active.lock().expect("cancel token lock poisoned") = false;
    }

    pub fn is_cancelled(&self) -> bool {
        !*self.active.lock().expect("cancel token lock poisoned")
    }

    // Held while applying the outcome of a remote call so `cancel` cannot
    // interleave with log appends or emitted deltas.
    fn live(&self) -> Option<MutexGuard<'_, bool>> {
        let guard = self.active.lock().expect("cancel token lock poisoned");
        if *guard { Some(guard) } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Poll,
    Stop,
    Finalize,
}

pub struct PollingController<A> {
    api: A,
    home_team: String,
    transport_retries: u32,
    token: CancelToken,
    events: Sender<Delta>,
    phase: Phase,
    session: Option<WorkflowSession>,
    record: Option<Match>,
    log: Vec<LogEntry>,
    logged_steps: HashSet<StepName>,
    transport_failures: u32,
    result: Option<AnalysisResult>,
    polls: usize,
}

impl<A: WorkflowApi> PollingController<A> {
    pub fn new(api: A, home_team: &str, events: Sender<Delta>) -> Self {
        Self {
            api,
            home_team: home_team.to_string(),
            transport_retries: 0,
            token: CancelToken::new(),
            events,
            phase: Phase::Idle,
            session: None,
            record: None,
            log: Vec::new(),
            logged_steps: HashSet::new(),
            transport_failures: 0,
            result: None,
            polls: 0,
        }
    }

    /// Tolerate up to `retries` consecutive transport failures while polling.
    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.transport_retries = retries;
        self
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn session(&self) -> Option<&WorkflowSession> {
        self.session.as_ref()
    }

    pub fn record(&self) -> Option<&Match> {
        self.record.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn cancel(&mut self) {
        self.token.cancel();
        self.settle_cancelled();
    }

    /// Starts the remote job. Only valid from `Idle`; later calls are ignored.
    pub fn submit(&mut self, params: &JobParams) {
        if self.phase != Phase::Idle {
            warn!(phase = ?self.phase, "submit ignored; controller already used");
            return;
        }
        let token = self.token.clone();
        let record = Match::from_params(params);
        {
            let Some(_live) = token.live() else {
                self.settle_cancelled();
                return;
            };
            self.log.clear();
            self.logged_steps.clear();
            self.set_phase(Phase::Submitting);
            self.emit(Delta::UpsertMatch(record.clone()));
            self.append(Severity::Info, "Analysis request sent to the backend.");
            self.append(
                Severity::Info,
                format!(
                    "Opponent: {}, Competition: {}",
                    record.opponent, record.competition
                ),
            );
        }
        self.record = Some(record);

        let outcome = self.api.start(params);

        let Some(_live) = token.live() else {
            self.settle_cancelled();
            return;
        };
        match outcome {
            Ok(session_id) => {
                info!(session = %session_id, "analysis workflow started");
                self.append(
                    Severity::Success,
                    format!("Workflow started successfully. Session ID: {session_id}"),
                );
                self.append(
                    Severity::Info,
                    "The backend is processing. The log will update with progress.",
                );
                self.session = Some(WorkflowSession::new(session_id));
                self.set_phase(Phase::Polling);
            }
            Err(err) => self.fail(&err),
        }
    }

    /// One poll of the job status. Returns whether polling should continue.
    ///
    /// A tick after cancellation or outside `Polling` does nothing.
    pub fn tick(&mut self) -> bool {
        if self.phase != Phase::Polling {
            return false;
        }
        if self.token.is_cancelled() {
            self.settle_cancelled();
            return false;
        }
        let Some(session_id) = self.session.as_ref().map(|s| s.session_id.clone()) else {
            return false;
        };

        self.polls += 1;
        let outcome = self.api.poll_status(&session_id);

        let token = self.token.clone();
        let next = {
            let Some(_live) = token.live() else {
                self.settle_cancelled();
                return false;
            };
            match outcome {
                Ok(status) => {
                    self.transport_failures = 0;
                    self.observe(status)
                }
                Err(err)
                    if err.is_transport() && self.transport_failures < self.transport_retries =>
                {
                    self.transport_failures += 1;
                    self.append(
                        Severity::Info,
                        format!(
                            "Status poll failed ({}/{}), retrying: {}",
                            self.transport_failures,
                            self.transport_retries,
                            err.message()
                        ),
                    );
                    Next::Poll
                }
                Err(err) => {
                    self.fail(&err);
                    Next::Stop
                }
            }
        };

        match next {
            Next::Poll => true,
            Next::Stop => false,
            Next::Finalize => {
                self.finalize(&session_id);
                false
            }
        }
    }

    fn observe(&mut self, status: WorkflowStatus) -> Next {
        if let Some(step) = status.current_step
            && self.logged_steps.insert(step)
        {
            self.append(
                Severity::Critical,
                format!("{} ({}%)", step.description(), status.progress_percent),
            );
        }

        if let Some(error) = status.error {
            self.fail_with(error);
            return Next::Stop;
        }
        if status.is_complete() {
            return Next::Finalize;
        }
        Next::Poll
    }

    fn finalize(&mut self, session_id: &str) {
        let token = self.token.clone();
        {
            let Some(_live) = token.live() else {
                self.settle_cancelled();
                return;
            };
            self.set_phase(Phase::Finalizing);
            self.append(
                Severity::Success,
                "Backend analysis finished. Fetching and processing the final results...",
            );
        }

        let outcome = self.api.fetch_result(session_id);

        let Some(_live) = token.live() else {
            self.settle_cancelled();
            return;
        };
        let raw = match outcome {
            Ok(raw) => raw,
            Err(err) => {
                self.fail(&err);
                return;
            }
        };
        self.append(
            Severity::Info,
            "Mapping the synthesis data into the report format...",
        );

        let Some(record) = self.record.clone() else {
            self.fail_with("Analysis finished without a match record.".to_string());
            return;
        };
        let mapped = map_synthesis(&raw, &record, &self.home_team);
        if !mapped.defaulted.is_empty() {
            debug!(session = %session_id, fields = ?mapped.defaulted, "synthesis fields defaulted");
        }

        let completed = record.completed(mapped.result.clone());
        self.emit(Delta::MergePlayers(mapped.result.collected_players.clone()));
        self.emit(Delta::UpsertMatch(completed.clone()));
        self.record = Some(completed);
        self.result = Some(mapped.result);
        info!(session = %session_id, "analysis completed");
        self.set_phase(Phase::Succeeded);
    }

    fn fail(&mut self, err: &WorkflowError) {
        self.fail_with(err.message().to_string());
    }

    fn fail_with(&mut self, message: String) {
        warn!(error = %message, "analysis failed");
        self.append(Severity::Error, message.clone());
        if let Some(record) = self.record.as_ref() {
            let failed = record.failed(message.clone());
            self.emit(Delta::UpsertMatch(failed.clone()));
            self.record = Some(failed);
        }
        self.set_phase(Phase::Failed(message));
    }

    fn settle_cancelled(&mut self) {
        if !self.phase.is_terminal() {
            debug!(phase = ?self.phase, "analysis abandoned");
            self.phase = Phase::Cancelled;
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase.clone();
        self.emit(Delta::PhaseChanged(phase));
    }

    fn append(&mut self, severity: Severity, text: impl Into<String>) {
        let entry = LogEntry::new(severity, text);
        self.log.push(entry.clone());
        self.emit(Delta::Log(entry));
    }

    fn emit(&self, delta: Delta) {
        let _ = self.events.send(delta);
    }
}

/// Handle to an analysis running on its own thread.
///
/// Dropping the handle cancels the analysis.
pub struct PollHandle<A> {
    token: CancelToken,
    wake: Sender<()>,
    join: Option<JoinHandle<PollingController<A>>>,
}

impl<A> PollHandle<A> {
    /// Stops the loop without waiting for it. No call, log line or delta
    /// happens after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
        let _ = self.wake.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Waits for the worker and hands back the controller for inspection.
    pub fn join(mut self) -> Option<PollingController<A>> {
        self.join.take()?.join().ok()
    }
}

impl<A> Drop for PollHandle<A> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel();
        }
    }
}

pub fn spawn_analysis<A>(
    mut controller: PollingController<A>,
    params: JobParams,
    interval: Duration,
) -> PollHandle<A>
where
    A: WorkflowApi + 'static,
{
    let token = controller.token();
    let (wake_tx, wake_rx) = mpsc::channel::<()>();
    let join = thread::spawn(move || {
        controller.submit(&params);
        while controller.phase() == &Phase::Polling {
            match wake_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if !controller.tick() {
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    controller.cancel();
                    break;
                }
            }
        }
        controller
    });
    PollHandle {
        token,
        wake: wake_tx,
        join: Some(join),
    }
}

/// Keeps at most one analysis loop alive; starting a new one cancels the last.
pub struct AnalysisRunner<A> {
    api: A,
    home_team: String,
    interval: Duration,
    transport_retries: u32,
    events: Sender<Delta>,
    active: Option<PollHandle<A>>,
}

impl<A> AnalysisRunner<A>
where
    A: WorkflowApi + Clone + 'static,
{
    pub fn new(api: A, cfg: &AppConfig, events: Sender<Delta>) -> Self {
        Self {
            api,
            home_team: cfg.home_team.clone(),
            interval: cfg.poll_interval,
            transport_retries: cfg.transport_retries,
            events,
            active: None,
        }
    }

    pub fn start(&mut self, params: JobParams) {
        self.cancel();
        let controller =
            PollingController::new(self.api.clone(), &self.home_team, self.events.clone())
                .with_transport_retries(self.transport_retries);
        self.active = Some(spawn_analysis(controller, params, self.interval));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Blocks until the current analysis ends.
    pub fn wait(&mut self) -> Option<PollingController<A>> {
        self.active.take()?.join()
    }
}
