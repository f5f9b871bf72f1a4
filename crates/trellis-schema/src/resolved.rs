use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Coordinate, ModuleDescriptor};

/// A module revision selected for a request, with its provenance.
///
/// Resolver identity is carried by name; the settings registry maps names
/// back to resolvers when artifacts are later downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModule {
    /// Descriptor with the concrete resolved revision.
    pub descriptor: ModuleDescriptor,
    /// Resolver that found the metadata.
    pub resolver: String,
    /// Resolver responsible for downloading the artifacts.
    pub artifact_resolver: String,
    /// Whether a repository was consulted (false on cache hits).
    pub searched: bool,
    /// Whether the descriptor was transferred during this resolution.
    pub downloaded: bool,
    /// Selected with priority over any later candidate.
    #[serde(default)]
    pub force: bool,
    /// Locally materialized descriptor file, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_descriptor: Option<PathBuf>,
    /// Effective publication date used for ranking and date constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl ResolvedModule {
    /// Resolution found by `resolver`, which also serves its artifacts.
    pub fn new(descriptor: ModuleDescriptor, resolver: impl Into<String>) -> Self {
        let resolver = resolver.into();
        Self {
            descriptor,
            artifact_resolver: resolver.clone(),
            resolver,
            searched: true,
            downloaded: false,
            force: false,
            local_descriptor: None,
            published: None,
        }
    }

    /// The resolved coordinate.
    pub fn id(&self) -> &Coordinate {
        &self.descriptor.coordinate
    }

    /// Whether the descriptor was synthesized.
    pub fn is_default(&self) -> bool {
        self.descriptor.is_default
    }

    /// Copy whose artifacts are downloaded through `resolver`.
    pub fn with_artifact_resolver(&self, resolver: impl Into<String>) -> Self {
        Self {
            artifact_resolver: resolver.into(),
            ..self.clone()
        }
    }
}
