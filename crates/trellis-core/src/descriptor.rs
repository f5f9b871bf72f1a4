//! Module descriptor parsing.
//!
//! The concrete metadata format is a collaborator concern. The bundled
//! [`JsonDescriptorParser`] reads and writes the serde form of
//! [`ModuleDescriptor`], which is also what the cache stores.

use std::fs;
use std::path::Path;

use thiserror::Error;
use trellis_schema::ModuleDescriptor;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("descriptor I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse descriptor {path}: {message}")]
    Syntax { path: String, message: String },

    #[error("invalid descriptor {path}: {message}")]
    Invalid { path: String, message: String },
}

pub trait DescriptorParser: Send + Sync + std::fmt::Debug {
    /// Parse the descriptor at `path`, optionally validating it.
    fn parse(&self, path: &Path, validate: bool) -> Result<ModuleDescriptor, ParseError>;

    /// Write `descriptor` to `path` in the parser's format.
    fn write(&self, descriptor: &ModuleDescriptor, path: &Path) -> Result<(), ParseError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDescriptorParser;

impl JsonDescriptorParser {
    fn validate(descriptor: &ModuleDescriptor, path: &Path) -> Result<(), ParseError> {
        let invalid = |message: String| ParseError::Invalid {
            path: path.display().to_string(),
            message,
        };
        let c = &descriptor.coordinate;
        for (field, value) in [
            ("organisation", &c.organisation),
            ("module", &c.module),
            ("revision", &c.revision),
            ("status", &descriptor.status),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("empty {field}")));
            }
        }
        for artifact in &descriptor.artifacts {
            for conf in &artifact.confs {
                if conf != "*" && !descriptor.configurations.contains(conf) {
                    return Err(invalid(format!(
                        "artifact {} references unknown configuration '{conf}'",
                        artifact.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl DescriptorParser for JsonDescriptorParser {
    fn parse(&self, path: &Path, validate: bool) -> Result<ModuleDescriptor, ParseError> {
        let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let descriptor: ModuleDescriptor =
            serde_json::from_str(&content).map_err(|e| ParseError::Syntax {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if validate {
            Self::validate(&descriptor, path)?;
        }
        Ok(descriptor)
    }

    fn write(&self, descriptor: &ModuleDescriptor, path: &Path) -> Result<(), ParseError> {
        let write_err = |source| ParseError::Io {
            path: path.display().to_string(),
            source,
        };
        let content = serde_json::to_string_pretty(descriptor).map_err(|e| ParseError::Syntax {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        crate::fsutil::atomic_write(path, content.as_bytes()).map_err(write_err)
    }
}
