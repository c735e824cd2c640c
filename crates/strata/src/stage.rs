//! Stage contract, pipeline roles and stage errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A single unit of work in an export pipeline.
///
/// Stages assume their input has already been validated and trimmed by the
/// caller. `apply` must depend only on its input and the stage's own
/// configuration, never on where the stage sits in a pipeline.
pub trait Stage: Send + Sync {
    /// Run the stage on `input`.
    fn apply(&self, input: &str) -> Result<String, StageError>;

    /// Human-readable label, stable for a given configuration.
    ///
    /// Used for diagnostics only.
    fn describe(&self) -> String;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        (**self).apply(input)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: Stage + ?Sized> Stage for Arc<S> {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        (**self).apply(input)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Runtime tag for the three pipeline slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Transform,
    Compression,
    Format,
}

impl RoleKind {
    /// All roles, in pipeline order.
    pub const ALL: [RoleKind; 3] = [RoleKind::Transform, RoleKind::Compression, RoleKind::Format];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Transform => "transform",
            RoleKind::Compression => "compression",
            RoleKind::Format => "format",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile-time pipeline role.
///
/// Implemented by the marker types [`Transform`], [`Compression`] and
/// [`Format`]. A [`RoleStage`] carries its role in its type, so a stage
/// resolved for one slot cannot be plugged into another.
pub trait Role: Copy + Send + Sync + 'static {
    const KIND: RoleKind;
}

/// Serialization into the target format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transform;

/// Compression of the transformed payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compression;

/// Presentation formatting of the final output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Format;

impl Role for Transform {
    const KIND: RoleKind = RoleKind::Transform;
}

impl Role for Compression {
    const KIND: RoleKind = RoleKind::Compression;
}

impl Role for Format {
    const KIND: RoleKind = RoleKind::Format;
}

/// An owned stage bound to a pipeline role.
pub struct RoleStage<R: Role> {
    inner: Box<dyn Stage>,
    _role: PhantomData<R>,
}

pub type TransformStage = RoleStage<Transform>;
pub type CompressionStage = RoleStage<Compression>;
pub type FormatStage = RoleStage<Format>;

impl<R: Role> RoleStage<R> {
    /// Tag `stage` with role `R`.
    pub fn new(stage: impl Stage + 'static) -> Self {
        Self::from_boxed(Box::new(stage))
    }

    pub fn from_boxed(inner: Box<dyn Stage>) -> Self {
        Self {
            inner,
            _role: PhantomData,
        }
    }

    /// The role this stage is bound to.
    pub fn role(&self) -> RoleKind {
        R::KIND
    }

    /// Wrap the current stage, keeping the role.
    ///
    /// `wrap` is the general form behind `with_logging`, `with_retry` and
    /// `with_timeout`; calls nest outward, so the last wrap is outermost.
    pub fn wrap<S, F>(self, f: F) -> Self
    where
        S: Stage + 'static,
        F: FnOnce(Box<dyn Stage>) -> S,
    {
        Self::new(f(self.inner))
    }

    /// Fallible form of [`wrap`](Self::wrap), for decorators with
    /// validated parameters.
    pub fn try_wrap<S, F>(self, f: F) -> Result<Self, StageError>
    where
        S: Stage + 'static,
        F: FnOnce(Box<dyn Stage>) -> Result<S, StageError>,
    {
        Ok(Self::new(f(self.inner)?))
    }

    pub fn into_inner(self) -> Box<dyn Stage> {
        self.inner
    }
}

impl<R: Role> Stage for RoleStage<R> {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        self.inner.apply(input)
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

impl<R: Role> fmt::Debug for RoleStage<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleStage")
            .field("role", &R::KIND)
            .field("stage", &self.inner.describe())
            .finish()
    }
}

/// Errors raised while resolving, configuring or running stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no {role} stage registered for key '{key}'")]
    StageNotFound { role: RoleKind, key: String },

    #[error("stage execution failed: {0}")]
    StageExecutionFailure(String),

    #[error("{stage} exceeded its deadline: took {elapsed:?}, limit {limit:?}")]
    DeadlineExceeded {
        stage: String,
        elapsed: Duration,
        limit: Duration,
    },
}

impl StageError {
    /// Shorthand for an opaque execution failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        StageError::StageExecutionFailure(msg.into())
    }

    /// Whether a retry decorator may absorb this error and try again.
    ///
    /// Only execution failures and missed deadlines are retryable;
    /// argument, configuration and lookup errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StageError::StageExecutionFailure(_) | StageError::DeadlineExceeded { .. }
        )
    }
}

/// A stage built from a closure. Handy for ad-hoc stages and tests.
pub struct FnStage<F> {
    label: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(&str) -> Result<String, StageError> + Send + Sync,
{
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            label: label.into(),
            f,
        }
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(&str) -> Result<String, StageError> + Send + Sync,
{
    fn apply(&self, input: &str) -> Result<String, StageError> {
        (self.f)(input)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Identity stage: returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Stage for Passthrough {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        Ok(input.to_string())
    }

    fn describe(&self) -> String {
        "Passthrough".into()
    }
}
