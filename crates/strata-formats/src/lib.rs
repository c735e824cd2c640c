//! Stock stages for Strata.
//!
//! This crate provides ready-made stages for every pipeline role. Enable
//! backends via feature flags.
//!
//! # Features
//!
//! ## Transforms
//! - `json` (default) - `{"data": "..."}` via serde_json
//! - `yaml` (default) - `data: ...` via serde_yaml
//! - `xml` (default) - `<data>...</data>` escaped via quick-xml
//! - `csv` (default) - `data,...` via the csv writer
//!
//! ## Compression
//! - `gzip` - gzip via flate2, emitted as base64 text
//! - `base64` - Base64 encoding
//!
//! ## Feature group
//! - `all` - All stages
//!
//! The `none` compression and the `plain`, `indent` and `xml-declaration`
//! formats are always available.

use strata::{Compression, Format, Registry, Stage, StageError, Transform};

/// Register all enabled stages with the registry.
pub fn register_all(registry: &Registry) {
    // Transforms
    #[cfg(feature = "json")]
    registry.register(Transform, "json", || JsonTransform);
    #[cfg(feature = "yaml")]
    registry.register(Transform, "yaml", || YamlTransform);
    #[cfg(feature = "xml")]
    registry.register(Transform, "xml", || XmlTransform);
    #[cfg(feature = "csv")]
    registry.register(Transform, "csv", || CsvTransform);

    // Compression
    registry.register(Compression, "none", || NoCompression);
    #[cfg(feature = "gzip")]
    registry.register(Compression, "gzip", || GzipCompression);
    #[cfg(feature = "base64")]
    registry.register(Compression, "base64", || Base64Compression);

    // Formats
    registry
        .register(Format, "plain", || PlainFormat)
        .register(Format, "indent", || IndentFormat::new(2))
        .register(Format, "xml-declaration", || XmlDeclarationFormat);
}

#[cfg(any(feature = "json", feature = "yaml"))]
#[derive(serde::Serialize)]
struct Payload<'a> {
    data: &'a str,
}

// ============================================
// Transforms
// ============================================

#[cfg(feature = "json")]
mod json_impl {
    use super::*;

    /// Wrap input as a JSON object: `{"data":"..."}`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct JsonTransform;

    impl Stage for JsonTransform {
        fn apply(&self, input: &str) -> Result<String, StageError> {
            serde_json::to_string(&Payload { data: input })
                .map_err(|e| StageError::failed(format!("JSON serialization failed: {}", e)))
        }

        fn describe(&self) -> String {
            "Json".into()
        }
    }
}

#[cfg(feature = "json")]
pub use json_impl::JsonTransform;

#[cfg(feature = "yaml")]
mod yaml_impl {
    use super::*;

    /// Wrap input as a YAML mapping: `data: ...`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct YamlTransform;

    impl Stage for YamlTransform {
        fn apply(&self, input: &str) -> Result<String, StageError> {
            serde_yaml::to_string(&Payload { data: input })
                .map(|s| s.trim_end().to_string())
                .map_err(|e| StageError::failed(format!("YAML serialization failed: {}", e)))
        }

        fn describe(&self) -> String {
            "Yaml".into()
        }
    }
}

#[cfg(feature = "yaml")]
pub use yaml_impl::YamlTransform;

#[cfg(feature = "xml")]
mod xml_impl {
    use super::*;

    /// Wrap input in a `<data>` element.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct XmlTransform;

    impl Stage for XmlTransform {
        fn apply(&self, input: &str) -> Result<String, StageError> {
            Ok(format!("<data>{}</data>", quick_xml::escape::escape(input)))
        }

        fn describe(&self) -> String {
            "Xml".into()
        }
    }
}

#[cfg(feature = "xml")]
pub use xml_impl::XmlTransform;

#[cfg(feature = "csv")]
mod csv_impl {
    use super::*;

    /// Emit a single `data,<value>` record, spaces replaced by underscores.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CsvTransform;

    impl Stage for CsvTransform {
        fn apply(&self, input: &str) -> Result<String, StageError> {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record(["data", &input.replace(' ', "_")])
                .map_err(|e| StageError::failed(format!("CSV write failed: {}", e)))?;
            let bytes = writer
                .into_inner()
                .map_err(|e| StageError::failed(format!("CSV flush failed: {}", e)))?;
            let text = String::from_utf8(bytes)
                .map_err(|e| StageError::failed(format!("Invalid UTF-8: {}", e)))?;
            Ok(text.trim_end().to_string())
        }

        fn describe(&self) -> String {
            "Csv".into()
        }
    }
}

#[cfg(feature = "csv")]
pub use csv_impl::CsvTransform;

// ============================================
// Compression
// ============================================

/// Leaves the payload as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Stage for NoCompression {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        Ok(input.to_string())
    }

    fn describe(&self) -> String {
        "None".into()
    }
}

#[cfg(feature = "gzip")]
mod gzip_impl {
    use super::*;
    use base64::prelude::*;
    use flate2::Compression as Level;
    use flate2::read::GzEncoder;
    use std::io::Read;

    /// Gzip the payload and base64-encode the result.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct GzipCompression;

    impl Stage for GzipCompression {
        fn apply(&self, input: &str) -> Result<String, StageError> {
            let mut encoder = GzEncoder::new(input.as_bytes(), Level::default());
            let mut output = Vec::new();
            encoder
                .read_to_end(&mut output)
                .map_err(|e| StageError::failed(format!("Gzip compression failed: {}", e)))?;
            Ok(BASE64_STANDARD.encode(output))
        }

        fn describe(&self) -> String {
            "Gzip".into()
        }
    }
}

#[cfg(feature = "gzip")]
pub use gzip_impl::GzipCompression;

#[cfg(feature = "base64")]
mod base64_impl {
    use super::*;
    use base64::prelude::*;

    /// Base64-encode the payload.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Base64Compression;

    impl Stage for Base64Compression {
        fn apply(&self, input: &str) -> Result<String, StageError> {
            Ok(BASE64_STANDARD.encode(input))
        }

        fn describe(&self) -> String {
            "Base64".into()
        }
    }
}

#[cfg(feature = "base64")]
pub use base64_impl::Base64Compression;

// ============================================
// Formats
// ============================================

/// Output exactly as produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormat;

impl Stage for PlainFormat {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        Ok(input.to_string())
    }

    fn describe(&self) -> String {
        "Plain".into()
    }
}

/// Indent every line by a fixed number of spaces, keeping line endings.
#[derive(Debug, Clone, Copy)]
pub struct IndentFormat {
    width: usize,
}

impl IndentFormat {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl Stage for IndentFormat {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        let pad = " ".repeat(self.width);
        Ok(input
            .split_inclusive('\n')
            .map(|line| format!("{pad}{line}"))
            .collect())
    }

    fn describe(&self) -> String {
        format!("Indent({})", self.width)
    }
}

/// Frame the output as an XML document with a trailing marker comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDeclarationFormat;

impl Stage for XmlDeclarationFormat {
    fn apply(&self, input: &str) -> Result<String, StageError> {
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{input}\n<!-- Exported by strata -->"
        ))
    }

    fn describe(&self) -> String {
        "XmlDeclaration".into()
    }
}
