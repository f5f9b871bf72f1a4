use serde::{Deserialize, Serialize};

/// Ordered set of known module statuses, most mature first.
///
/// The default set is `release`, `milestone`, `integration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSet(Vec<String>);

impl Default for StatusSet {
    fn default() -> Self {
        Self(vec![
            "release".to_string(),
            "milestone".to_string(),
            "integration".to_string(),
        ])
    }
}

impl StatusSet {
    /// Build a set from statuses ordered most mature first.
    pub fn new(statuses: Vec<String>) -> Self {
        Self(statuses)
    }

    /// Whether `status` is a known status.
    pub fn is_known(&self, status: &str) -> bool {
        self.priority(status).is_some()
    }

    /// Position of `status`, lower is more mature.
    pub fn priority(&self, status: &str) -> Option<usize> {
        self.0.iter().position(|s| s == status)
    }

    /// The least mature status of the set.
    pub fn least_mature(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Whether `status` is at least as mature as `required`.
    ///
    /// Unknown statuses never satisfy a requirement.
    pub fn satisfies(&self, status: &str, required: &str) -> bool {
        match (self.priority(status), self.priority(required)) {
            (Some(have), Some(want)) => have <= want,
            _ => false,
        }
    }

    /// Known statuses, most mature first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ordering() {
        let statuses = StatusSet::default();
        assert!(statuses.satisfies("release", "integration"));
        assert!(statuses.satisfies("milestone", "milestone"));
        assert!(!statuses.satisfies("integration", "release"));
        assert_eq!(statuses.least_mature(), Some("integration"));
    }

    #[test]
    fn test_unknown_status() {
        let statuses = StatusSet::default();
        assert!(!statuses.is_known("nightly"));
        assert!(!statuses.satisfies("nightly", "integration"));
    }
}
