//! Validation boundary around a pipeline.
//!
//! Stages assume clean input. [`Exporter`] is the layer that makes that
//! true: it rejects empty input, sanitizes it, and runs optional hooks
//! before and after the pipeline.

use crate::pipeline::Pipeline;
use crate::stage::StageError;

/// Customization points around an export.
pub trait ExportHooks: Send + Sync {
    /// Clean up raw input before it reaches the pipeline.
    fn sanitize(&self, input: &str) -> String {
        input.trim().to_string()
    }

    /// Called with the raw and sanitized input, right before the pipeline runs.
    fn before_export(&self, original: &str, sanitized: &str) {
        let _ = (original, sanitized);
    }

    /// Post-process the pipeline output.
    fn after_export(&self, output: String) -> String {
        output
    }
}

/// Trims input and otherwise leaves everything alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ExportHooks for DefaultHooks {}

/// A pipeline behind input validation and export hooks.
#[derive(Debug)]
pub struct Exporter<H = DefaultHooks> {
    pipeline: Pipeline,
    hooks: H,
}

impl Exporter<DefaultHooks> {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            hooks: DefaultHooks,
        }
    }
}

impl<H: ExportHooks> Exporter<H> {
    pub fn with_hooks(pipeline: Pipeline, hooks: H) -> Self {
        Self { pipeline, hooks }
    }

    /// Validate, sanitize and export `input`.
    ///
    /// Empty input, or input that sanitizes to nothing, is rejected with
    /// [`StageError::InvalidArgument`] before any stage runs.
    pub fn export(&self, input: &str) -> Result<String, StageError> {
        if input.is_empty() {
            return Err(StageError::InvalidArgument("input cannot be empty".into()));
        }

        let sanitized = self.hooks.sanitize(input);
        if sanitized.is_empty() {
            return Err(StageError::InvalidArgument(
                "input is empty after sanitizing".into(),
            ));
        }

        self.hooks.before_export(input, &sanitized);
        let output = self.pipeline.export(&sanitized)?;
        Ok(self.hooks.after_export(output))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{CompressionStage, FnStage, FormatStage, Passthrough, TransformStage};
    use std::sync::Mutex;

    fn sample_pipeline() -> Pipeline {
        Pipeline::new(
            TransformStage::new(FnStage::new("Upper", |s| Ok(s.to_uppercase()))),
            CompressionStage::new(FnStage::new("C", |s| Ok(format!("C({s})")))),
            FormatStage::new(FnStage::new("F", |s| Ok(format!("F({s})")))),
        )
    }

    #[test]
    fn test_end_to_end_trims_input() {
        let exporter = Exporter::new(sample_pipeline());
        assert_eq!(exporter.export("  hello  ").unwrap(), "F(C(HELLO))");
    }

    #[test]
    fn test_rejects_empty_input() {
        let exporter = Exporter::new(sample_pipeline());

        assert!(matches!(
            exporter.export(""),
            Err(StageError::InvalidArgument(_))
        ));
        assert!(matches!(
            exporter.export("   "),
            Err(StageError::InvalidArgument(_))
        ));
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ExportHooks for Recorder {
        fn sanitize(&self, input: &str) -> String {
            input.trim().replace(' ', "_")
        }

        fn before_export(&self, original: &str, sanitized: &str) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{original:?} -> {sanitized:?}"));
        }

        fn after_export(&self, output: String) -> String {
            format!("{output}\n<!-- done -->")
        }
    }

    #[test]
    fn test_hooks_run_around_pipeline() {
        let pipeline = Pipeline::new(
            TransformStage::new(Passthrough),
            CompressionStage::new(Passthrough),
            FormatStage::new(Passthrough),
        );
        let exporter = Exporter::with_hooks(pipeline, Recorder::default());

        let output = exporter.export(" a b ").unwrap();
        assert_eq!(output, "a_b\n<!-- done -->");
        assert_eq!(
            exporter.hooks.seen.lock().unwrap().as_slice(),
            [r#"" a b " -> "a_b""#]
        );
    }
}
