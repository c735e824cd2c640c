//! Observation events and sinks.
//!
//! Decorators report what they see (call durations, retry attempts) to an
//! injected [`ObservationSink`]. The engine only defines the event shapes;
//! rendering them is up to the sink.
//!
//! Serialized events use snake_case keys: `elapsed_ms` (milliseconds as a
//! float), `succeeded`, `attempt` and `attempts_remaining`.

use serde::{Serialize, Serializer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Duration of one delegated stage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingEvent {
    /// Label of the timed stage (`describe()` of the delegate).
    pub label: String,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub succeeded: bool,
}

/// One try made by a retry decorator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptEvent {
    pub label: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub attempts_remaining: u32,
}

/// Either kind of observation, as collected by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Observation {
    Timing(TimingEvent),
    Attempt(AttemptEvent),
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_micros() as f64 / 1000.0)
}

/// Receiver for decorator observations.
pub trait ObservationSink: Send + Sync {
    fn on_timing(&self, event: &TimingEvent);

    fn on_attempt(&self, event: &AttemptEvent);
}

/// Discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservationSink for NoopSink {
    fn on_timing(&self, _event: &TimingEvent) {}

    fn on_attempt(&self, _event: &AttemptEvent) {}
}

/// Forwards observations to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn on_timing(&self, event: &TimingEvent) {
        if event.succeeded {
            tracing::debug!(
                stage = %event.label,
                elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
                "stage finished"
            );
        } else {
            tracing::warn!(
                stage = %event.label,
                elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
                "stage failed"
            );
        }
    }

    fn on_attempt(&self, event: &AttemptEvent) {
        if event.attempt == 1 {
            tracing::debug!(
                stage = %event.label,
                attempt = event.attempt,
                remaining = event.attempts_remaining,
                "stage attempt"
            );
        } else {
            tracing::info!(
                stage = %event.label,
                attempt = event.attempt,
                remaining = event.attempts_remaining,
                "retrying stage"
            );
        }
    }
}

/// Keeps every observation in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Observation>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning a shareable handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<Observation> {
        self.lock().clone()
    }

    pub fn timings(&self) -> Vec<TimingEvent> {
        self.lock()
            .iter()
            .filter_map(|o| match o {
                Observation::Timing(t) => Some(t.clone()),
                Observation::Attempt(_) => None,
            })
            .collect()
    }

    pub fn attempts(&self) -> Vec<AttemptEvent> {
        self.lock()
            .iter()
            .filter_map(|o| match o {
                Observation::Attempt(a) => Some(a.clone()),
                Observation::Timing(_) => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Observation>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ObservationSink for RecordingSink {
    fn on_timing(&self, event: &TimingEvent) {
        self.lock().push(Observation::Timing(event.clone()));
    }

    fn on_attempt(&self, event: &AttemptEvent) {
        self.lock().push(Observation::Attempt(event.clone()));
    }
}

/// Fans observations out to several sinks.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ObservationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ObservationSink for FanoutSink {
    fn on_timing(&self, event: &TimingEvent) {
        for sink in &self.sinks {
            sink.on_timing(event);
        }
    }

    fn on_attempt(&self, event: &AttemptEvent) {
        for sink in &self.sinks {
            sink.on_attempt(event);
        }
    }
}
