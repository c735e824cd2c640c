//! Cross-cutting decorators for stages.
//!
//! A decorator owns exactly one delegate stage and wraps its `apply` with
//! one behavior. Decorators stack in any order, and the order matters:
//!
//! - `Timeout(Retry(Logging(base)))` logs every attempt, but checks the
//!   deadline once, against the total time of all attempts.
//! - `Retry(Timeout(Logging(base)))` checks every attempt against the
//!   deadline; a missed deadline is a failure the retry absorbs.
//!
//! Timeouts are detected after the delegate returns. Nothing here can
//! interrupt a stage that is already running.

use crate::observe::{AttemptEvent, NoopSink, ObservationSink, TimingEvent};
use crate::stage::{Role, RoleStage, Stage, StageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Logging
// ============================================================================

/// Times every delegated call and reports it to a sink.
pub struct Logging<S> {
    inner: S,
    sink: Arc<dyn ObservationSink>,
}

impl<S: Stage> Logging<S> {
    pub fn new(inner: S, sink: Arc<dyn ObservationSink>) -> Self {
        Self { inner, sink }
    }
}

impl<S: Stage> Stage for Logging<S> {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        let mut timer = TimingGuard::start(self.sink.as_ref(), self.inner.describe());
        let result = self.inner.apply(input);
        timer.succeeded = result.is_ok();
        result
    }

    fn describe(&self) -> String {
        format!("Logging({})", self.inner.describe())
    }
}

/// RAII timer. Emits a [`TimingEvent`] when dropped, so a call is reported
/// whether it returns, fails or unwinds.
struct TimingGuard<'a> {
    sink: &'a dyn ObservationSink,
    label: String,
    start: Instant,
    succeeded: bool,
}

impl<'a> TimingGuard<'a> {
    fn start(sink: &'a dyn ObservationSink, label: String) -> Self {
        Self {
            sink,
            label,
            start: Instant::now(),
            succeeded: false,
        }
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.sink.on_timing(&TimingEvent {
            label: std::mem::take(&mut self.label),
            elapsed: self.start.elapsed(),
            succeeded: self.succeeded,
        });
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Reattempts a failing delegate up to a fixed number of total attempts.
///
/// Only [retryable](StageError::is_retryable) errors trigger another
/// attempt. Once the budget is spent the last error is returned as-is.
pub struct Retry<S> {
    inner: S,
    attempts: u32,
    delay: Duration,
    sink: Arc<dyn ObservationSink>,
}

impl<S: Stage> Retry<S> {
    /// Wrap `inner` with a budget of `attempts` total calls.
    ///
    /// `attempts` must be at least 1.
    pub fn new(inner: S, attempts: u32) -> Result<Self, StageError> {
        if attempts == 0 {
            return Err(StageError::InvalidConfiguration(
                "retry attempts must be at least 1".into(),
            ));
        }
        Ok(Self {
            inner,
            attempts,
            delay: Duration::ZERO,
            sink: Arc::new(NoopSink),
        })
    }

    /// Report each attempt to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Pause between a failed attempt and the next one.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl<S: Stage> Stage for Retry<S> {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        let label = self.inner.describe();
        let mut attempt = 1;
        loop {
            self.sink.on_attempt(&AttemptEvent {
                label: label.clone(),
                attempt,
                attempts_remaining: self.attempts - attempt,
            });

            match self.inner.apply(input) {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    tracing::debug!(stage = %label, attempt, error = %err, "attempt failed");
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn describe(&self) -> String {
        format!("Retry({})", self.inner.describe())
    }
}

// ============================================================================
// Timeout
// ============================================================================

/// Fails a call that took longer than `limit`.
///
/// The delegate always runs to completion first. If it took too long, its
/// output is discarded and [`StageError::DeadlineExceeded`] is returned;
/// any side effects it had remain.
pub struct Timeout<S> {
    inner: S,
    limit: Duration,
}

impl<S: Stage> Timeout<S> {
    /// `limit` must be non-zero.
    pub fn new(inner: S, limit: Duration) -> Result<Self, StageError> {
        if limit.is_zero() {
            return Err(StageError::InvalidConfiguration(
                "timeout limit must be greater than zero".into(),
            ));
        }
        Ok(Self { inner, limit })
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl<S: Stage> Stage for Timeout<S> {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        let start = Instant::now();
        let output = self.inner.apply(input)?;
        let elapsed = start.elapsed();

        if elapsed > self.limit {
            let stage = self.inner.describe();
            tracing::warn!(%stage, ?elapsed, limit = ?self.limit, "deadline exceeded");
            return Err(StageError::DeadlineExceeded {
                stage,
                elapsed,
                limit: self.limit,
            });
        }
        Ok(output)
    }

    fn describe(&self) -> String {
        format!("Timeout({})", self.inner.describe())
    }
}

// ============================================================================
// Composition helpers
// ============================================================================

/// Builder-style decorator methods for any stage.
///
/// ```rust,ignore
/// let stage = JsonTransform
///     .logged(sink.clone())
///     .retried(3)?
///     .timed(Duration::from_millis(500))?;
/// assert_eq!(stage.describe(), "Timeout(Retry(Logging(Json)))");
/// ```
pub trait StageExt: Stage + Sized {
    fn logged(self, sink: Arc<dyn ObservationSink>) -> Logging<Self> {
        Logging::new(self, sink)
    }

    fn retried(self, attempts: u32) -> Result<Retry<Self>, StageError> {
        Retry::new(self, attempts)
    }

    fn timed(self, limit: Duration) -> Result<Timeout<Self>, StageError> {
        Timeout::new(self, limit)
    }
}

impl<S: Stage> StageExt for S {}

impl<R: Role> RoleStage<R> {
    pub fn with_logging(self, sink: Arc<dyn ObservationSink>) -> Self {
        self.wrap(|inner| Logging::new(inner, sink))
    }

    pub fn with_retry(
        self,
        attempts: u32,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Self, StageError> {
        self.try_wrap(|inner| Ok(Retry::new(inner, attempts)?.with_sink(sink)))
    }

    pub fn with_timeout(self, limit: Duration) -> Result<Self, StageError> {
        self.try_wrap(|inner| Timeout::new(inner, limit))
    }

    /// Apply `layers` in order, innermost first.
    pub fn with_layers(
        self,
        layers: &[Layer],
        sink: &Arc<dyn ObservationSink>,
    ) -> Result<Self, StageError> {
        layers
            .iter()
            .try_fold(self, |stage, layer| stage.try_wrap(|inner| layer.apply(inner, sink)))
    }
}

/// A decorator described as data, as used in pipeline definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Layer {
    Logging,
    Retry {
        attempts: u32,
        #[serde(default)]
        delay_ms: u64,
    },
    Timeout {
        limit_ms: u64,
    },
}

impl Layer {
    /// Wrap `stage` with this layer.
    pub fn apply(
        &self,
        stage: Box<dyn Stage>,
        sink: &Arc<dyn ObservationSink>,
    ) -> Result<Box<dyn Stage>, StageError> {
        let wrapped: Box<dyn Stage> = match self {
            Layer::Logging => Box::new(Logging::new(stage, Arc::clone(sink))),
            Layer::Retry { attempts, delay_ms } => Box::new(
                Retry::new(stage, *attempts)?
                    .with_sink(Arc::clone(sink))
                    .with_delay(Duration::from_millis(*delay_ms)),
            ),
            Layer::Timeout { limit_ms } => {
                Box::new(Timeout::new(stage, Duration::from_millis(*limit_ms))?)
            }
        };
        Ok(wrapped)
    }
}
