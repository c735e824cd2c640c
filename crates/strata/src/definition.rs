//! Serializable pipeline definitions.
//!
//! A definition names one registry key per role, plus the decorator layers
//! to put around each stage:
//!
//! ```yaml
//! transform:
//!   key: json
//!   layers:
//!     - kind: logging
//!     - kind: retry
//!       attempts: 3
//! compression: gzip
//! format: indent
//! ```
//!
//! Layers are applied in list order, innermost first.

use crate::decorator::Layer;
use crate::observe::ObservationSink;
use crate::pipeline::Pipeline;
use crate::registry::Registry;
use crate::stage::{Compression, Format, Role, RoleStage, StageError, Transform};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A complete pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDef {
    pub transform: StageDef,
    pub compression: StageDef,
    pub format: StageDef,
}

/// One slot of a pipeline definition.
///
/// May be written as a bare key string when no layers are needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StageDefRepr")]
pub struct StageDef {
    /// Registry key (case-insensitive).
    pub key: String,
    /// Decorators, innermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Layer>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StageDefRepr {
    Key(String),
    Full {
        key: String,
        #[serde(default)]
        layers: Vec<Layer>,
    },
}

impl From<StageDefRepr> for StageDef {
    fn from(repr: StageDefRepr) -> Self {
        match repr {
            StageDefRepr::Key(key) => StageDef::new(key),
            StageDefRepr::Full { key, layers } => StageDef { key, layers },
        }
    }
}

impl StageDef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            layers: Vec::new(),
        }
    }

    /// Add a layer outside the existing ones.
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    fn build<R: Role>(
        &self,
        role: R,
        registry: &Registry,
        sink: &Arc<dyn ObservationSink>,
    ) -> Result<RoleStage<R>, StageError> {
        registry
            .resolve(role, &self.key)?
            .with_layers(&self.layers, sink)
    }
}

impl PipelineDef {
    pub fn new(
        transform: impl Into<String>,
        compression: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            transform: StageDef::new(transform),
            compression: StageDef::new(compression),
            format: StageDef::new(format),
        }
    }

    /// Apply `layer` to every slot.
    pub fn layer_all(mut self, layer: Layer) -> Self {
        for slot in [&mut self.transform, &mut self.compression, &mut self.format] {
            slot.layers.push(layer.clone());
        }
        self
    }

    /// Resolve every slot from `registry` and wrap it in its layers.
    pub fn build(
        &self,
        registry: &Registry,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Pipeline, StageError> {
        Ok(Pipeline::new(
            self.transform.build(Transform, registry, &sink)?,
            self.compression.build(Compression, registry, &sink)?,
            self.format.build(Format, registry, &sink)?,
        ))
    }

    /// Parse a definition from bytes, detecting the format from `path`.
    ///
    /// Falls back to YAML when the path is missing or unrecognized.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self, DefinitionError> {
        let format = path
            .and_then(detect_format)
            .unwrap_or_else(|| "yaml".to_string());

        Self::from_bytes_format(data, &format)
    }

    /// Parse a definition from bytes with explicit format.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, DefinitionError> {
        match format {
            "json" => {
                serde_json::from_slice(data).map_err(|e| DefinitionError::Parse(e.to_string()))
            }
            "yaml" | "yml" => {
                serde_yaml::from_slice(data).map_err(|e| DefinitionError::Parse(e.to_string()))
            }
            "toml" => {
                let s = std::str::from_utf8(data)
                    .map_err(|e| DefinitionError::Parse(format!("Invalid UTF-8: {}", e)))?;
                toml::from_str(s).map_err(|e| DefinitionError::Parse(e.to_string()))
            }
            _ => Err(DefinitionError::Parse(format!(
                "Unsupported definition format: {}",
                format
            ))),
        }
    }

    /// Serialize the definition.
    pub fn to_bytes(&self, format: &str) -> Result<Vec<u8>, DefinitionError> {
        match format {
            "json" => serde_json::to_vec_pretty(self)
                .map_err(|e| DefinitionError::Serialize(e.to_string())),
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map(|s| s.into_bytes())
                .map_err(|e| DefinitionError::Serialize(e.to_string())),
            "toml" => toml::to_string_pretty(self)
                .map(|s| s.into_bytes())
                .map_err(|e| DefinitionError::Serialize(e.to_string())),
            _ => Err(DefinitionError::Serialize(format!(
                "Unsupported definition format: {}",
                format
            ))),
        }
    }
}

/// Errors from reading or writing a definition.
///
/// Building a definition into a pipeline fails with [`StageError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to parse pipeline definition: {0}")]
    Parse(String),

    #[error("failed to serialize pipeline definition: {0}")]
    Serialize(String),
}

/// Detect definition format from file path extension.
fn detect_format(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    match ext.to_lowercase().as_str() {
        "json" => Some("json".into()),
        "yaml" | "yml" => Some("yaml".into()),
        "toml" => Some("toml".into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::RecordingSink;
    use crate::stage::{FnStage, Passthrough, Stage};

    fn make_registry() -> Registry {
        let registry = Registry::new();
        registry
            .register(Transform, "upper", || FnStage::new("Upper", |s| Ok(s.to_uppercase())))
            .register(Compression, "none", || Passthrough)
            .register(Format, "brackets", || {
                FnStage::new("Brackets", |s| Ok(format!("[{s}]")))
            });
        registry
    }

    #[test]
    fn test_parse_yaml_with_bare_keys() {
        let yaml = br#"
transform:
  key: upper
  layers:
    - kind: logging
    - kind: retry
      attempts: 2
compression: none
format: brackets
"#;
        let def = PipelineDef::from_bytes(yaml, Some("pipeline.yaml")).unwrap();

        assert_eq!(def.transform.key, "upper");
        assert_eq!(def.transform.layers.len(), 2);
        assert_eq!(def.compression, StageDef::new("none"));
        assert_eq!(def.format.key, "brackets");
    }

    #[test]
    fn test_parse_toml() {
        let toml = br#"
compression = "none"
format = "brackets"

[transform]
key = "upper"
layers = [{ kind = "timeout", limit_ms = 250 }]
"#;
        let def = PipelineDef::from_bytes(toml, Some("pipeline.toml")).unwrap();
        assert_eq!(def.transform.layers, vec![Layer::Timeout { limit_ms: 250 }]);
    }

    #[test]
    fn test_build_pipeline() {
        let registry = make_registry();
        let sink = RecordingSink::shared();
        let def = PipelineDef::new("upper", "none", "brackets").layer_all(Layer::Logging);

        let pipeline = def.build(&registry, sink.clone()).unwrap();
        assert_eq!(pipeline.export("ab").unwrap(), "[AB]");
        assert_eq!(pipeline.transform().describe(), "Logging(Upper)");
        assert_eq!(sink.timings().len(), 3);
    }

    #[test]
    fn test_build_unknown_key() {
        let registry = make_registry();
        let def = PipelineDef::new("upper", "zstd", "brackets");

        let err = def.build(&registry, Arc::new(crate::observe::NoopSink)).unwrap_err();
        assert_eq!(
            err,
            StageError::StageNotFound {
                role: crate::stage::RoleKind::Compression,
                key: "zstd".into(),
            }
        );
    }

    #[test]
    fn test_build_invalid_layer() {
        let registry = make_registry();
        let mut def = PipelineDef::new("upper", "none", "brackets");
        def.format = def.format.layer(Layer::Retry {
            attempts: 0,
            delay_ms: 0,
        });

        let err = def.build(&registry, Arc::new(crate::observe::NoopSink)).unwrap_err();
        assert!(matches!(err, StageError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_definition_json_roundtrip() {
        let def = PipelineDef::new("upper", "none", "brackets").layer_all(Layer::Retry {
            attempts: 3,
            delay_ms: 10,
        });

        let bytes = def.to_bytes("json").unwrap();
        let parsed = PipelineDef::from_bytes_format(&bytes, "json").unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn test_unsupported_format() {
        let result = PipelineDef::from_bytes_format(b"", "ini");
        assert!(matches!(result, Err(DefinitionError::Parse(_))));
    }

    #[test]
    fn test_write_errors_are_not_parse_errors() {
        let def = PipelineDef::new("upper", "none", "brackets");

        let err = def.to_bytes("ini").unwrap_err();
        assert!(matches!(err, DefinitionError::Serialize(_)));
        assert!(err.to_string().starts_with("failed to serialize"));
    }
}
