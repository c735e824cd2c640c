//! Strata: pluggable three-stage export pipeline
//!
//! Input flows through a transform, a compression and a format stage. Each
//! stage is looked up by key in a [`Registry`] and can be wrapped in
//! decorators ([`Logging`], [`Retry`], [`Timeout`]) that add timing,
//! reattempts or deadline checks without touching the stage itself.

mod decorator;
mod definition;
mod exporter;
mod observe;
mod pipeline;
mod registry;
mod stage;

pub use decorator::{Layer, Logging, Retry, StageExt, Timeout};
pub use definition::{DefinitionError, PipelineDef, StageDef};
pub use exporter::{DefaultHooks, ExportHooks, Exporter};
pub use observe::{
    AttemptEvent, FanoutSink, NoopSink, Observation, ObservationSink, RecordingSink, TimingEvent,
    TracingSink,
};
pub use pipeline::{ExportResult, ExportStats, Pipeline};
pub use registry::{Constructor, Registry};
pub use stage::{
    Compression, CompressionStage, FnStage, Format, FormatStage, Passthrough, Role, RoleKind,
    RoleStage, Stage, StageError, Transform, TransformStage,
};
