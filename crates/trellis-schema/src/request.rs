use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Coordinate;

/// One request to resolve a module revision.
///
/// Created once per top-level resolve call, and once per transitive
/// dependency followed while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRequest {
    /// Requested coordinate, possibly with a dynamic revision.
    pub coordinate: Coordinate,
    /// Artifacts of this revision may change over time and must be revalidated.
    #[serde(default)]
    pub changing: bool,
    /// The requested revision must win over previously resolved candidates.
    #[serde(default)]
    pub force: bool,
    /// Dependencies of the resolved module are followed.
    #[serde(default = "default_transitive")]
    pub transitive: bool,
    /// Only revisions published on or before this date are acceptable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

fn default_transitive() -> bool {
    true
}

impl DependencyRequest {
    /// Plain transitive request for `coordinate`.
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            changing: false,
            force: false,
            transitive: true,
            as_of: None,
        }
    }

    /// Flag the request as changing.
    pub fn changing(mut self, changing: bool) -> Self {
        self.changing = changing;
        self
    }

    /// Flag the request as forced.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set whether dependencies are followed.
    pub fn transitive(mut self, transitive: bool) -> Self {
        self.transitive = transitive;
        self
    }

    /// Restrict acceptable revisions to those published before `date`.
    pub fn as_of(mut self, date: DateTime<Utc>) -> Self {
        self.as_of = Some(date);
        self
    }

    /// Same constraints, another coordinate.
    pub fn with_coordinate(&self, coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            ..self.clone()
        }
    }
}

impl fmt::Display for DependencyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coordinate)?;
        if self.changing {
            write!(f, " [changing]")?;
        }
        if self.force {
            write!(f, " [force]")?;
        }
        Ok(())
    }
}
