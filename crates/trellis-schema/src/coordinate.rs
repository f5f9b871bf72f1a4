use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix of revisions synthesized for modules found without an explicit revision.
pub const WORKING_PREFIX: &str = "working@";

/// Builds the `working@<name>` revision used when a pattern carries no revision token.
pub fn working_revision(name: &str) -> String {
    format!("{WORKING_PREFIX}{name}")
}

/// Errors raised while parsing a textual coordinate.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CoordinateError {
    /// The text does not follow `org#module[#branch];revision`.
    #[error("malformed coordinate '{0}': expected org#module[#branch];revision")]
    Malformed(String),

    /// A mandatory part of the coordinate is empty.
    #[error("empty {field} in coordinate '{text}'")]
    Empty {
        /// Name of the empty part.
        field: &'static str,
        /// Original text.
        text: String,
    },
}

/// Organisation and module name, without revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    /// Owning organisation (e.g. `org.example`).
    pub organisation: String,
    /// Module name inside the organisation.
    pub name: String,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.organisation, self.name)
    }
}

/// Identity of one module revision.
///
/// The revision is either exact (`1.2.0`) or a dynamic expression such as
/// `[1.0,2.0)`, `latest.integration` or `1.+`. Deciding which is the job of
/// a version matcher, not of the coordinate itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    /// Owning organisation.
    pub organisation: String,
    /// Module name.
    pub module: String,
    /// Optional branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Exact or dynamic revision.
    pub revision: String,
    /// Extra attributes, usable as pattern tokens.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Coordinate {
    /// Create a coordinate without branch or extra attributes.
    pub fn new(
        organisation: impl Into<String>,
        module: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            organisation: organisation.into(),
            module: module.into(),
            branch: None,
            revision: revision.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Set the branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Add an extra attribute.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Copy of this coordinate pointing at another revision.
    pub fn with_revision(&self, revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            ..self.clone()
        }
    }

    /// Copy of this coordinate with another organisation.
    pub fn with_organisation(&self, organisation: impl Into<String>) -> Self {
        Self {
            organisation: organisation.into(),
            ..self.clone()
        }
    }

    /// The module part of the coordinate.
    pub fn module_id(&self) -> ModuleId {
        ModuleId {
            organisation: self.organisation.clone(),
            name: self.module.clone(),
        }
    }

    /// Whether the revision was synthesized as `working@<name>`.
    pub fn is_working(&self) -> bool {
        self.revision.starts_with(WORKING_PREFIX)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.organisation, self.module)?;
        if let Some(branch) = &self.branch {
            write!(f, "#{branch}")?;
        }
        write!(f, ";{}", self.revision)
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    /// Parse `org#module;revision` or `org#module#branch;revision`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ident, revision) = s
            .rsplit_once(';')
            .ok_or_else(|| CoordinateError::Malformed(s.to_string()))?;
        let parts: Vec<&str> = ident.split('#').collect();
        let (organisation, module, branch) = match parts.as_slice() {
            [org, module] => (*org, *module, None),
            [org, module, branch] => (*org, *module, Some(*branch)),
            _ => return Err(CoordinateError::Malformed(s.to_string())),
        };

        for (field, value) in [
            ("organisation", organisation),
            ("module", module),
            ("revision", revision),
        ] {
            if value.trim().is_empty() {
                return Err(CoordinateError::Empty {
                    field,
                    text: s.to_string(),
                });
            }
        }

        let mut coordinate = Coordinate::new(organisation.trim(), module.trim(), revision.trim());
        if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            coordinate.branch = Some(branch.to_string());
        }
        Ok(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let c: Coordinate = "org.example#core;1.0".parse().unwrap();
        assert_eq!(c.organisation, "org.example");
        assert_eq!(c.module, "core");
        assert_eq!(c.revision, "1.0");
        assert!(c.branch.is_none());
        assert_eq!(c.to_string(), "org.example#core;1.0");
    }

    #[test]
    fn test_parse_with_branch_and_range() {
        let c: Coordinate = "acme#lib#trunk;[1.0,2.0)".parse().unwrap();
        assert_eq!(c.branch.as_deref(), Some("trunk"));
        assert_eq!(c.revision, "[1.0,2.0)");
        assert_eq!(c.to_string(), "acme#lib#trunk;[1.0,2.0)");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            "acme-lib-1.0".parse::<Coordinate>(),
            Err(CoordinateError::Malformed(_))
        ));
        assert!(matches!(
            "acme#;1.0".parse::<Coordinate>(),
            Err(CoordinateError::Empty { field: "module", .. })
        ));
    }

    #[test]
    fn test_working_revision() {
        let c = Coordinate::new("acme", "lib", working_revision("local"));
        assert!(c.is_working());
        assert_eq!(c.revision, "working@local");
        assert!(!c.with_revision("1.0").is_working());
    }
}
