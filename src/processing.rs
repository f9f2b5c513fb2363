//! Processing stage: wait for the pipeline's output to appear in storage.
//!
//! ## Session lifecycle
//!
//! ```text
//!            ┌──────── clock tick (1 s) ──────┐
//!            │  ┌───── step tick (1.2 s) ───┐ │
//! spawn ─▶ polling ◀──── check tick (15 s) ─┘ │
//!            │                                 │
//!            ├─ output exists + presigned ─▶ Ready(ProcessedResult)
//!            ├─ attempt == max_attempts ───▶ TimedOut { attempts }
//!            └─ handle cancelled ──────────▶ Cancelled
//! ```
//!
//! ## Why one task instead of three timers?
//!
//! All three intervals live in a single `tokio::select!` loop owned by one
//! task, so reaching any terminal state stops every timer at once and the
//! ready callback cannot fire twice. The [`ProcessingHandle`] is the only
//! owner of that task: dropping it aborts the session, so a new upload can
//! never leave an old session running.
//!
//! Existence checks do not overlap. A check tick that fires while the
//! previous HEAD or presign is still in flight is skipped and does not count
//! as an attempt.
//!
//! Failures while waiting (network errors, a presign failing after a
//! successful HEAD) count as a used attempt and are reported through
//! [`ProcessingProgressCallback::on_attempt_failed`], never as `Err`.

use crate::config::{ClientConfig, PollingConfig};
use crate::error::RemediateError;
use crate::format::FormatProfile;
use crate::progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
use crate::results::ProcessedResult;
use crate::storage::{ObjectStore, PresignOptions};
use crate::upload::UploadReceipt;
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Cosmetic steps shown while waiting, cycled in order.
pub const PROCESSING_STEPS: [&str; 4] = [
    "Analyzing Document Structure",
    "Adding Accessibility Tags",
    "Adding Metadata",
    "Generating Accessible PDF",
];

/// `m:ss`
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Snapshot of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingState {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub elapsed_secs: u64,
    pub current_step: usize,
}

impl PollingState {
    fn new(polling: &PollingConfig) -> Self {
        Self {
            attempt_count: 0,
            max_attempts: polling.max_attempts,
            interval_ms: polling.check_interval_ms,
            elapsed_secs: 0,
            current_step: 0,
        }
    }

    pub fn step_title(&self) -> &'static str {
        PROCESSING_STEPS[self.current_step % PROCESSING_STEPS.len()]
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// The output exists; here is its download link.
    Ready(ProcessedResult),
    /// Every check ran without the output appearing.
    TimedOut { attempts: u32 },
    /// The handle was cancelled.
    Cancelled,
}

impl ProcessingOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProcessingOutcome::Ready(_))
    }

    pub fn into_result(self) -> Option<ProcessedResult> {
        match self {
            ProcessingOutcome::Ready(r) => Some(r),
            _ => None,
        }
    }
}

/// A configured, not-yet-started processing session.
pub struct ProcessingSession {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    result_key: String,
    download_filename: String,
    polling: PollingConfig,
    callback: ProgressCallback,
}

impl ProcessingSession {
    /// Prepare a session for the output of `receipt`.
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn ObjectStore>,
        receipt: &UploadReceipt,
    ) -> Result<Self, RemediateError> {
        let profile = FormatProfile::resolve(config, receipt.format())?;
        Ok(Self {
            store,
            bucket: profile.bucket().to_string(),
            result_key: profile.result_key(&receipt.object_name),
            download_filename: profile.download_filename(receipt.sanitized_name()),
            polling: config.polling,
            callback: Arc::new(NoopProgressCallback),
        })
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = callback;
        self
    }

    /// Key whose existence ends the session.
    pub fn result_key(&self) -> &str {
        &self.result_key
    }

    pub fn download_filename(&self) -> &str {
        &self.download_filename
    }

    /// Start polling on the current tokio runtime.
    pub fn spawn(self) -> ProcessingHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(PollingState::new(&self.polling));
        info!(
            "Waiting for {}/{} (up to {} checks every {} ms)",
            self.bucket, self.result_key, self.polling.max_attempts, self.polling.check_interval_ms
        );
        let task = tokio::spawn(self.run(cancel_rx, state_tx));
        ProcessingHandle {
            task,
            cancel: Some(cancel_tx),
            state: state_rx,
        }
    }

    fn check(&self) -> BoxFuture<'static, Result<Option<String>, RemediateError>> {
        let store = Arc::clone(&self.store);
        let bucket = self.bucket.clone();
        let key = self.result_key.clone();
        let options =
            PresignOptions::attachment(&self.download_filename, self.polling.presign_expiry_secs);
        async move {
            if !store.exists(&bucket, &key).await? {
                return Ok(None);
            }
            store.presign_get(&bucket, &key, &options).await.map(Some)
        }
        .boxed()
    }

    async fn run(
        self,
        mut cancel: oneshot::Receiver<()>,
        state_tx: watch::Sender<PollingState>,
    ) -> ProcessingOutcome {
        let start = Instant::now();
        let mut state = PollingState::new(&self.polling);
        let cb = Arc::clone(&self.callback);

        let mut clock = interval_at(start + self.polling.clock_tick(), self.polling.clock_tick());
        let mut steps = interval_at(start + self.polling.step_interval(), self.polling.step_interval());
        let mut checks =
            interval_at(start + self.polling.check_interval(), self.polling.check_interval());
        checks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: BoxFuture<'static, Result<Option<String>, RemediateError>> =
            future::pending().boxed();
        let mut checking = false;

        loop {
            tokio::select! {
                _ = &mut cancel => {
                    debug!("Processing session cancelled after {} checks", state.attempt_count);
                    return ProcessingOutcome::Cancelled;
                }
                _ = clock.tick() => {
                    state.elapsed_secs += 1;
                    cb.on_elapsed(state.elapsed_secs);
                }
                _ = steps.tick() => {
                    state.current_step = (state.current_step + 1) % PROCESSING_STEPS.len();
                    cb.on_step(state.current_step, state.step_title());
                }
                _ = checks.tick() => {
                    if checking {
                        debug!("Check {} still in flight; skipping tick", state.attempt_count);
                    } else {
                        state.attempt_count += 1;
                        cb.on_attempt(state.attempt_count, state.max_attempts);
                        in_flight = self.check();
                        checking = true;
                    }
                }
                result = &mut in_flight, if checking => {
                    checking = false;
                    in_flight = future::pending().boxed();
                    match result {
                        Ok(Some(url)) => {
                            state.current_step = PROCESSING_STEPS.len() - 1;
                            state_tx.send_replace(state);
                            cb.on_step(state.current_step, state.step_title());

                            let secs = start.elapsed().as_secs_f64().round() as i64;
                            let result = ProcessedResult::new(url, Some(secs))
                                .with_download_filename(self.download_filename.clone());
                            info!(
                                "Output ready after {} checks ({}s)",
                                state.attempt_count, secs
                            );
                            cb.on_ready(&result);
                            return ProcessingOutcome::Ready(result);
                        }
                        Ok(None) => {
                            debug!("Check {}: {} not there yet", state.attempt_count, self.result_key);
                        }
                        Err(e) => {
                            debug!("Check {} failed: {}", state.attempt_count, e);
                            cb.on_attempt_failed(state.attempt_count, &e.to_string());
                        }
                    }
                    if state.attempts_exhausted() {
                        state_tx.send_replace(state);
                        warn!(
                            "Gave up on {} after {} checks",
                            self.result_key, state.attempt_count
                        );
                        cb.on_timed_out(state.attempt_count);
                        return ProcessingOutcome::TimedOut {
                            attempts: state.attempt_count,
                        };
                    }
                }
            }
            state_tx.send_replace(state);
        }
    }
}

/// Sole owner of a running session. Dropping it stops the session.
pub struct ProcessingHandle {
    task: JoinHandle<ProcessingOutcome>,
    cancel: Option<oneshot::Sender<()>>,
    state: watch::Receiver<PollingState>,
}

impl ProcessingHandle {
    /// Latest published state.
    pub fn state(&self) -> PollingState {
        *self.state.borrow()
    }

    /// Ask the session to stop. [`wait`](Self::wait) then yields
    /// [`ProcessingOutcome::Cancelled`] unless the session already finished.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(mut self) -> ProcessingOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_panic() {
                    warn!("Processing session panicked: {}", e);
                }
                ProcessingOutcome::Cancelled
            }
        }
    }
}

impl Drop for ProcessingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
