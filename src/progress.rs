//! Progress-callback trait for processing-session events.
//!
//! Pass an [`Arc<dyn ProcessingProgressCallback>`] to
//! [`crate::processing::ProcessingSession::spawn`] to follow a session while
//! the remediation pipeline works on an upload.
//!
//! # Why callbacks instead of channels?
//!
//! A terminal spinner, a web socket and a log line all want different
//! shapes of the same events. A `Send + Sync` trait with no-op defaults lets
//! each caller override only what it renders, without the library choosing
//! a channel type for them. Callbacks run on the session task, so they
//! should return quickly.
//!
//! # Example
//!
//! ```rust
//! use pdf_remediate::ProcessingProgressCallback;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! struct AttemptCounter(AtomicU32);
//!
//! impl ProcessingProgressCallback for AttemptCounter {
//!     fn on_attempt(&self, attempt: u32, max_attempts: u32) {
//!         self.0.store(attempt, Ordering::SeqCst);
//!         eprintln!("check {attempt}/{max_attempts}");
//!     }
//! }
//! ```

use crate::results::ProcessedResult;
use std::sync::Arc;

/// Called by a processing session as it polls for the remediated output.
///
/// Every method has a default no-op implementation. Within one session the
/// callbacks are invoked sequentially from a single task; `on_ready` and
/// `on_timed_out` are mutually exclusive and fire at most once.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Elapsed-clock tick.
    fn on_elapsed(&self, elapsed_secs: u64) {
        let _ = elapsed_secs;
    }

    /// The cosmetic step changed.
    ///
    /// # Arguments
    /// * `index` — 0-based index into [`crate::processing::PROCESSING_STEPS`]
    /// * `title` — the step's title
    fn on_step(&self, index: usize, title: &str) {
        let _ = (index, title);
    }

    /// An existence check is about to run (1-based `attempt`).
    fn on_attempt(&self, attempt: u32, max_attempts: u32) {
        let _ = (attempt, max_attempts);
    }

    /// An existence check or the presign that follows it failed.
    fn on_attempt_failed(&self, attempt: u32, error: &str) {
        let _ = (attempt, error);
    }

    /// The output exists and a download URL was issued.
    fn on_ready(&self, result: &ProcessedResult) {
        let _ = result;
    }

    /// Every attempt was used up without the output appearing.
    fn on_timed_out(&self, attempts: u32) {
        let _ = attempts;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        elapsed: AtomicU64,
        attempts: AtomicU32,
        failures: AtomicU32,
    }

    impl ProcessingProgressCallback for TrackingCallback {
        fn on_elapsed(&self, elapsed_secs: u64) {
            self.elapsed.store(elapsed_secs, Ordering::SeqCst);
        }

        fn on_attempt(&self, attempt: u32, _max_attempts: u32) {
            self.attempts.store(attempt, Ordering::SeqCst);
        }

        fn on_attempt_failed(&self, _attempt: u32, _error: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_elapsed(3);
        cb.on_step(1, "Adding Accessibility Tags");
        cb.on_attempt(1, 120);
        cb.on_attempt_failed(1, "HTTP 500");
        cb.on_timed_out(120);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_elapsed(15);
        tracker.on_attempt(1, 120);
        tracker.on_attempt_failed(1, "timeout");
        tracker.on_attempt(2, 120);

        assert_eq!(tracker.elapsed.load(Ordering::SeqCst), 15);
        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_step(0, "Analyzing Document Structure");
        cb.on_ready(&ProcessedResult::new("https://example.com/x", Some(42)));
    }
}
