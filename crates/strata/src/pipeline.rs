//! The fixed three-stage export pipeline.

use crate::registry::Registry;
use crate::stage::{
    Compression, CompressionStage, Format, FormatStage, Stage, StageError, Transform,
    TransformStage,
};
use indexmap::IndexMap;
use std::time::{Duration, Instant};

/// Transform, then compression, then format.
///
/// Each slot holds exactly one stage, bound at construction. The order is
/// part of the pipeline's shape and cannot be changed at runtime.
#[derive(Debug)]
pub struct Pipeline {
    transform: TransformStage,
    compression: CompressionStage,
    format: FormatStage,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Output of the format stage.
    pub output: String,
    /// Execution statistics.
    pub stats: ExportStats,
}

/// Statistics from a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportStats {
    /// Total wall time across all stages.
    pub duration: Duration,
    /// Number of stages that ran.
    pub stages_executed: usize,
}

impl Pipeline {
    pub fn new(
        transform: TransformStage,
        compression: CompressionStage,
        format: FormatStage,
    ) -> Self {
        Self {
            transform,
            compression,
            format,
        }
    }

    /// Resolve one stage per role from `registry` and assemble them.
    pub fn resolve(
        registry: &Registry,
        transform: &str,
        compression: &str,
        format: &str,
    ) -> Result<Self, StageError> {
        Ok(Self::new(
            registry.resolve(Transform, transform)?,
            registry.resolve(Compression, compression)?,
            registry.resolve(Format, format)?,
        ))
    }

    /// Run `input` through all three stages.
    ///
    /// The first failing stage aborts the run; its error is returned as-is.
    pub fn export(&self, input: &str) -> Result<String, StageError> {
        self.export_with_stats(input).map(|result| result.output)
    }

    /// Like [`export`](Self::export), also reporting timing statistics.
    pub fn export_with_stats(&self, input: &str) -> Result<ExportResult, StageError> {
        let start = Instant::now();
        let mut current = input.to_string();

        for (step, stage) in self.stages().into_iter().enumerate() {
            current = stage.apply(&current).inspect_err(|err| {
                tracing::debug!(
                    step = step + 1,
                    stage = %stage.describe(),
                    error = %err,
                    "export aborted"
                );
            })?;
        }

        Ok(ExportResult {
            output: current,
            stats: ExportStats {
                duration: start.elapsed(),
                stages_executed: 3,
            },
        })
    }

    /// Label of each stage, keyed by position (1 = transform,
    /// 2 = compression, 3 = format).
    pub fn describe_configuration(&self) -> IndexMap<usize, String> {
        self.stages()
            .into_iter()
            .enumerate()
            .map(|(i, stage)| (i + 1, stage.describe()))
            .collect()
    }

    pub fn transform(&self) -> &TransformStage {
        &self.transform
    }

    pub fn compression(&self) -> &CompressionStage {
        &self.compression
    }

    pub fn format(&self) -> &FormatStage {
        &self.format
    }

    fn stages(&self) -> [&dyn Stage; 3] {
        [&self.transform, &self.compression, &self.format]
    }
}
