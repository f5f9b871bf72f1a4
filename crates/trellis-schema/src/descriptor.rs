use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Artifact, Coordinate, DependencyRequest};

/// Name of the configuration every synthesized descriptor declares.
pub const DEFAULT_CONFIGURATION: &str = "default";

/// Status given to synthesized descriptors.
pub const DEFAULT_STATUS: &str = "integration";

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if hands out a reference
fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

/// An artifact as declared by a module descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredArtifact {
    /// Artifact name.
    pub name: String,
    /// Artifact type.
    #[serde(rename = "type")]
    pub kind: String,
    /// File extension.
    pub ext: String,
    /// Optional classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Configurations publishing this artifact. Empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confs: Vec<String>,
    /// Explicit fallback location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DeclaredArtifact {
    /// Declare an artifact published in every configuration.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ext: ext.into(),
            classifier: None,
            confs: Vec::new(),
            url: None,
        }
    }

    fn in_conf(&self, conf: &str) -> bool {
        self.confs.is_empty() || self.confs.iter().any(|c| c == conf || c == "*")
    }

    fn to_artifact(&self, module: &Coordinate) -> Artifact {
        Artifact {
            module: module.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            ext: self.ext.clone(),
            classifier: self.classifier.clone(),
            url: self.url.clone(),
            extra: BTreeMap::new(),
        }
    }
}

/// A dependency as declared by a module descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    /// Requested coordinate, possibly dynamic.
    pub coordinate: Coordinate,
    /// Whether the dependency is flagged as changing.
    #[serde(default, skip_serializing_if = "is_false")]
    pub changing: bool,
    /// Whether the dependency's own dependencies are followed.
    #[serde(default = "default_true")]
    pub transitive: bool,
    /// Whether the declared revision must win over any other.
    #[serde(default, skip_serializing_if = "is_false")]
    pub force: bool,
}

impl DeclaredDependency {
    /// Turn the declaration into a resolution request.
    pub fn to_request(&self) -> DependencyRequest {
        DependencyRequest {
            coordinate: self.coordinate.clone(),
            changing: self.changing,
            force: self.force,
            transitive: self.transitive,
            as_of: None,
        }
    }
}

/// Parsed module metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Coordinate declared by the descriptor.
    pub coordinate: Coordinate,
    /// Maturity status (`release`, `milestone`, `integration`, ...).
    pub status: String,
    /// Publication date, when the descriptor carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<DateTime<Utc>>,
    /// Declared configuration names.
    #[serde(default)]
    pub configurations: Vec<String>,
    /// Declared artifacts.
    #[serde(default)]
    pub artifacts: Vec<DeclaredArtifact>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<DeclaredDependency>,
    /// Free-form key/value information.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_info: BTreeMap<String, String>,
    /// Set on descriptors synthesized because no metadata file exists.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_default: bool,
}

impl ModuleDescriptor {
    /// Create an empty descriptor with the given status.
    pub fn new(coordinate: Coordinate, status: impl Into<String>) -> Self {
        Self {
            coordinate,
            status: status.into(),
            publication: None,
            configurations: vec![DEFAULT_CONFIGURATION.to_string()],
            artifacts: Vec::new(),
            dependencies: Vec::new(),
            extra_info: BTreeMap::new(),
            is_default: false,
        }
    }

    /// Synthesize the descriptor of a module published without metadata.
    ///
    /// It declares one `default` configuration holding a single `jar`
    /// artifact named after the module.
    pub fn default_for(coordinate: Coordinate) -> Self {
        let artifact = DeclaredArtifact::new(coordinate.module.clone(), "jar", "jar");
        Self {
            artifacts: vec![artifact],
            is_default: true,
            ..Self::new(coordinate, DEFAULT_STATUS)
        }
    }

    /// Artifacts published in `conf`.
    pub fn artifacts_for(&self, conf: &str) -> Vec<Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.in_conf(conf))
            .map(|a| a.to_artifact(&self.coordinate))
            .collect()
    }

    /// Every declared artifact, once.
    pub fn all_artifacts(&self) -> Vec<Artifact> {
        self.artifacts
            .iter()
            .map(|a| a.to_artifact(&self.coordinate))
            .collect()
    }

    /// Copy of the descriptor with a resolved revision.
    pub fn with_revision(&self, revision: &str) -> Self {
        Self {
            coordinate: self.coordinate.with_revision(revision),
            ..self.clone()
        }
    }
}
