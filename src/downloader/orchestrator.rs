// Session orchestrator - one download at a time
//
// Idle -> Running -> {Completed, Cancelled, Failed}; every terminal phase
// accepts the next request. Requests arriving while Running are rejected.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::classifier::LineClassifier;
use super::errors::SessionError;
use super::launcher::{self, ChildProcess};
use super::models::{DownloadRequest, EventKind, SessionOutcome, SessionPhase, SessionReport};
use super::policy::policy_for;
use super::tools::ToolManager;
use super::traits::EventSink;

type SharedPhase = Arc<Mutex<SessionPhase>>;

/// How long output is still drained after a cancel before it is abandoned
const CANCEL_GRACE: Duration = Duration::from_secs(2);

pub struct Downloader {
    tools: ToolManager,
    phase: SharedPhase,
}

impl Downloader {
    pub fn new(tools: ToolManager) -> Self {
        Self {
            tools,
            phase: Arc::new(Mutex::new(SessionPhase::Idle)),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.phase() == SessionPhase::Running
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    /// Start a session. Launch failures are returned here, before any event
    /// is delivered; the read loop then runs on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(
        &self,
        request: DownloadRequest,
        sink: Arc<dyn EventSink>,
    ) -> Result<SessionHandle, SessionError> {
        let guard = PhaseGuard::claim(&self.phase)?;
        let policy = policy_for(request.mode);

        let child = self
            .tools
            .resolve()
            .and_then(|toolchain| launcher::launch(&request, policy, &toolchain))
            .map_err(|e| {
                tracing::error!(url = %request.url, error = %e, "launch failed");
                SessionError::from(e)
            })?;

        let cancel = Arc::new(Notify::new());
        let task = tokio::spawn(read_loop(
            child,
            LineClassifier::new(policy),
            sink,
            cancel.clone(),
            guard,
        ));

        Ok(SessionHandle {
            canceller: Canceller(cancel),
            task,
        })
    }
}

/// Stops a running session's child process
#[derive(Debug, Clone)]
pub struct Canceller(Arc<Notify>);

impl Canceller {
    /// Safe to call before the loop starts or after it ends
    pub fn cancel(&self) {
        self.0.notify_one();
    }
}

pub struct SessionHandle {
    canceller: Canceller,
    task: JoinHandle<Result<SessionReport, SessionError>>,
}

impl SessionHandle {
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Wait for the session to end. Dropping the handle instead detaches the session.
    pub async fn wait(self) -> Result<SessionReport, SessionError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Aborted(e.to_string())),
        }
    }
}

/// Holds the Running claim; a session that ends without `finish` (panic in a sink) becomes Failed
struct PhaseGuard {
    phase: SharedPhase,
    finished: bool,
}

impl PhaseGuard {
    fn claim(phase: &SharedPhase) -> Result<Self, SessionError> {
        let mut current = phase.lock().unwrap_or_else(PoisonError::into_inner);
        if !current.accepts_requests() {
            return Err(SessionError::Busy);
        }
        *current = SessionPhase::Running;
        Ok(Self {
            phase: phase.clone(),
            finished: false,
        })
    }

    fn finish(mut self, terminal: SessionPhase) {
        self.set(terminal);
        self.finished = true;
    }

    fn set(&self, value: SessionPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.set(SessionPhase::Failed);
        }
    }
}

#[derive(Default)]
struct Tally {
    events: usize,
    succeeded: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, kind: EventKind) {
        self.events += 1;
        if kind == EventKind::ItemSucceeded {
            self.succeeded += 1;
        } else if kind.is_item_failure() {
            self.failed += 1;
        }
    }
}

async fn read_loop(
    mut child: ChildProcess,
    mut classifier: LineClassifier,
    sink: Arc<dyn EventSink>,
    cancel: Arc<Notify>,
    guard: PhaseGuard,
) -> Result<SessionReport, SessionError> {
    let mut tally = Tally::default();
    // set on cancel; draining stops here even if a stray helper keeps the pipe open
    let mut drain_deadline: Option<Instant> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.notified(), if drain_deadline.is_none() => {
                tracing::info!(pid = ?child.id(), "cancelling download");
                drain_deadline = Some(Instant::now() + CANCEL_GRACE);
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "failed to kill yt-dlp");
                }
                // keep draining whatever was already written
                continue;
            }
            _ = tokio::time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() => {
                tracing::warn!("yt-dlp output still open after cancel, abandoning it");
                break;
            }
            line = child.next_line() => line,
        };

        match next {
            Some(Ok(line)) => {
                tracing::trace!(line = %line, "yt-dlp");
                if let Some(event) = classifier.classify(&line) {
                    tally.record(event.kind);
                    sink.deliver(event).await;
                }
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "lost yt-dlp output stream");
                let _ = child.start_kill();
                guard.finish(SessionPhase::Failed);
                return Err(SessionError::Read(e));
            }
            None => break,
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            guard.finish(SessionPhase::Failed);
            return Err(SessionError::Wait(e));
        }
    };

    let cancelled = drain_deadline.is_some();
    if !status.success() && !cancelled {
        // one blocked playlist item is enough for a non-zero exit
        tracing::info!(exit_code = ?status.code(), "yt-dlp exited with failure status");
    }

    let outcome = if cancelled {
        SessionOutcome::Cancelled
    } else {
        SessionOutcome::Completed
    };
    guard.finish(match outcome {
        SessionOutcome::Completed => SessionPhase::Completed,
        SessionOutcome::Cancelled => SessionPhase::Cancelled,
    });

    tracing::info!(?outcome, events = tally.events, succeeded = tally.succeeded, failed = tally.failed, "session finished");
    Ok(SessionReport {
        outcome,
        exit_code: status.code(),
        events: tally.events,
        succeeded: tally.succeeded,
        failed: tally.failed,
    })
}
