//! Bounded polling with a fixed delay and a wall-clock deadline.
//!
//! # Design
//! - The first attempt runs immediately; every later attempt is preceded by
//!   the configured delay. There is no backoff.
//! - Elapsed time is measured from loop start and is only checked after an
//!   attempt reports "not ready", so a slow attempt is never cut short.
//! - Progress reporting goes through an injected [`ProgressSink`] and never
//!   influences control flow.

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Default overall deadline.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing and labelling for a single wait condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Pause inserted before every attempt after the first.
    pub delay: Duration,
    /// Deadline measured from loop start.
    pub timeout: Duration,
    /// Human-readable description; enables progress reporting when set.
    pub label: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_RETRY_TIMEOUT,
            label: None,
        }
    }
}

impl RetryConfig {
    /// Configuration with the default 2s delay and 30s deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pause between attempts.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the overall deadline. A zero deadline still runs one attempt.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Describe the awaited condition for progress output and errors.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Result of a completed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Whether the condition was satisfied.
    pub ready: bool,
    /// Number of attempts performed, including the successful one.
    pub attempts: u32,
    /// Time from loop start until the successful attempt returned.
    pub elapsed: Duration,
}

/// Raised when every attempt inside the deadline reported "not ready".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("timed out after {timeout:?} waiting for {label} ({attempts} attempts)")]
pub struct RetryTimeout {
    /// Description of the awaited condition.
    pub label: String,
    /// Attempts performed.
    pub attempts: u32,
    /// Time elapsed when the loop gave up.
    pub elapsed: Duration,
    /// Configured deadline.
    pub timeout: Duration,
}

/// Receives progress notifications from a labelled [`RetryLoop`].
pub trait ProgressSink: Send + Sync {
    /// Called once before the first attempt.
    fn waiting(&self, label: &str);

    /// Called after every attempt with the time left until the deadline.
    fn attempted(&self, label: &str, attempt: u32, remaining: Duration);
}

/// Progress sink that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn waiting(&self, label: &str) {
        tracing::info!(label, "waiting for condition");
    }

    fn attempted(&self, label: &str, attempt: u32, remaining: Duration) {
        tracing::info!(
            label,
            attempt,
            remaining_secs = remaining.as_secs(),
            "condition checked"
        );
    }
}

/// Progress sink that writes plain lines to any [`Write`] target.
///
/// Write failures are ignored.
#[derive(Debug)]
pub struct WriterProgress<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterProgress<W> {
    /// Wrap a writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(writer, "{line}");
        let _ = writer.flush();
    }
}

impl WriterProgress<std::io::Stderr> {
    /// Progress lines on standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> ProgressSink for WriterProgress<W> {
    fn waiting(&self, label: &str) {
        self.write_line(&format!("Waiting for: {label}"));
    }

    fn attempted(&self, _label: &str, _attempt: u32, remaining: Duration) {
        self.write_line(&format!("+ retry: {} secs left", remaining.as_secs()));
    }
}

/// Executor for one wait condition. `run` consumes the loop, so each
/// condition needs its own instance.
pub struct RetryLoop {
    config: RetryConfig,
    progress: Arc<dyn ProgressSink>,
}

impl RetryLoop {
    /// Loop reporting progress through `tracing`.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            progress: Arc::new(TracingProgress),
        }
    }

    /// Replace the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Run `operation` until it returns `Ok(true)` or the deadline passes.
    ///
    /// `operation` receives the 1-based attempt number. An `Err` from the
    /// operation aborts the loop immediately and is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or a [`RetryTimeout`] converted into
    /// `E` when an attempt reports "not ready" after the deadline.
    pub async fn run<F, Fut, E>(self, mut operation: F) -> Result<RetryOutcome, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: From<RetryTimeout>,
    {
        let started = Instant::now();
        let label = self.config.label.as_deref();
        if let Some(label) = label {
            self.progress.waiting(label);
        }

        let mut attempts: u32 = 0;
        loop {
            if attempts > 0 {
                sleep(self.config.delay).await;
            }
            attempts = attempts.saturating_add(1);

            let ready = operation(attempts).await?;
            let elapsed = started.elapsed();

            if let Some(label) = label {
                let remaining = self.config.timeout.saturating_sub(elapsed);
                self.progress.attempted(label, attempts, remaining);
            }

            if ready {
                return Ok(RetryOutcome {
                    ready,
                    attempts,
                    elapsed,
                });
            }

            if elapsed >= self.config.timeout {
                return Err(RetryTimeout {
                    label: label.unwrap_or("condition").to_string(),
                    attempts,
                    elapsed,
                    timeout: self.config.timeout,
                }
                .into());
            }

            tracing::debug!(attempt = attempts, ?elapsed, "condition not met; retrying");
        }
    }
}
