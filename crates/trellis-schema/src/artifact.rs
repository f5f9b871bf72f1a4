use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Coordinate;

/// Artifact type used for module descriptors.
pub const DESCRIPTOR_TYPE: &str = "descriptor";

/// File name (without extension) of a module descriptor artifact.
pub const DESCRIPTOR_NAME: &str = "module";

/// Extension of a module descriptor artifact.
pub const DESCRIPTOR_EXT: &str = "json";

/// One file belonging to a module revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    /// Module revision the artifact belongs to.
    pub module: Coordinate,
    /// Artifact name, substituted for `[artifact]`.
    pub name: String,
    /// Artifact type (`jar`, `source`, `descriptor`, ...), substituted for `[type]`.
    #[serde(rename = "type")]
    pub kind: String,
    /// File extension, substituted for `[ext]`.
    pub ext: String,
    /// Optional classifier, substituted for `[classifier]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Explicit location used when pattern based lookup finds nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extra attributes, usable as pattern tokens.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Artifact {
    /// Create an artifact of the given module.
    pub fn new(
        module: Coordinate,
        name: impl Into<String>,
        kind: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            module,
            name: name.into(),
            kind: kind.into(),
            ext: ext.into(),
            classifier: None,
            url: None,
            extra: BTreeMap::new(),
        }
    }

    /// The descriptor artifact of a module revision.
    pub fn descriptor(module: Coordinate) -> Self {
        Self::new(module, DESCRIPTOR_NAME, DESCRIPTOR_TYPE, DESCRIPTOR_EXT)
    }

    /// Set the classifier.
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Set the explicit fallback location.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Whether this artifact is a module descriptor.
    pub fn is_descriptor(&self) -> bool {
        self.kind == DESCRIPTOR_TYPE
    }

    /// Same artifact attached to another module revision.
    pub fn with_module(&self, module: Coordinate) -> Self {
        Self {
            module,
            ..self.clone()
        }
    }

    /// Key identifying the artifact within its module revision.
    pub fn key(&self) -> String {
        let mut key = format!("{}.{}.{}", self.name, self.kind, self.ext);
        if let Some(classifier) = &self.classifier {
            key.push('-');
            key.push_str(classifier);
        }
        key
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.module, self.name)?;
        if let Some(classifier) = &self.classifier {
            write!(f, "-{classifier}")?;
        }
        write!(f, ".{}", self.ext)?;
        if self.kind != self.ext {
            write!(f, "({})", self.kind)?;
        }
        Ok(())
    }
}

/// Where a cached artifact originally came from.
///
/// Saved after every successful or no-op download so that later resolutions
/// can skip the transfer, or read the file in place when it is local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOrigin {
    /// Whether the location is on the local filesystem.
    pub is_local: bool,
    /// Repository location of the artifact.
    pub location: String,
}

impl ArtifactOrigin {
    /// Origin on the local filesystem.
    pub fn local(location: impl Into<String>) -> Self {
        Self {
            is_local: true,
            location: location.into(),
        }
    }

    /// Origin on a remote repository.
    pub fn remote(location: impl Into<String>) -> Self {
        Self {
            is_local: false,
            location: location.into(),
        }
    }
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_local { "local" } else { "remote" };
        write!(f, "{} ({kind})", self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_artifact_revision_id() {
        let module = Coordinate::new("acme", "mod", "1.0");
        let jar = Artifact::new(module.clone(), "lib", "jar", "jar");
        assert_eq!(jar.to_string(), "acme#mod;1.0!lib.jar");

        let src = Artifact::new(module, "lib", "source", "jar").with_classifier("sources");
        assert_eq!(src.to_string(), "acme#mod;1.0!lib-sources.jar(source)");
    }

    #[test]
    fn test_descriptor_artifact() {
        let md = Artifact::descriptor(Coordinate::new("acme", "mod", "1.0"));
        assert!(md.is_descriptor());
        assert_eq!(md.name, DESCRIPTOR_NAME);
        assert_eq!(md.ext, DESCRIPTOR_EXT);
    }

    #[test]
    fn test_key_distinguishes_classifier() {
        let module = Coordinate::new("acme", "mod", "1.0");
        let a = Artifact::new(module.clone(), "lib", "jar", "jar");
        let b = a.clone().with_classifier("sources");
        assert_ne!(a.key(), b.key());
    }
}
