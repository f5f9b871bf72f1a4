//! Staged publication for layouts keeping one directory per revision.
//!
//! While a transaction is open, everything published for the module lands
//! under `<revision>.part`. Commit renames that directory onto the real
//! revision directory; abort deletes it.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use trellis_schema::Coordinate;

use crate::locator::PART_SUFFIX;
use crate::pattern::{PatternError, TokenValues, substitute, tokens};

static REVISION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*[/\\]\[revision\])([/\\].+)$").expect("static regex"));

/// Patterns rewritten to publish into the staging directory.
#[derive(Debug, Clone)]
pub(crate) struct TransactionLayout {
    /// Pattern of the revision directory, shared by the publish patterns.
    base: String,
    /// Publish pattern to its staged counterpart.
    staged: HashMap<String, String>,
}

impl TransactionLayout {
    /// Check that the first descriptor and artifact patterns both keep the
    /// revision as the directory right above the file, and in the same place.
    ///
    /// Returns the reason transactions cannot be supported otherwise.
    pub(crate) fn detect(descriptor: Option<&String>, artifact: Option<&String>) -> Result<Self, String> {
        let mut base: Option<String> = None;
        let mut staged = HashMap::new();

        for (pattern, kind) in [(descriptor, "descriptor"), (artifact, "artifact")] {
            let Some(pattern) = pattern else { continue };
            let Some(caps) = REVISION_DIR.captures(pattern) else {
                return Err(format!("{kind} pattern does not use revision as a directory"));
            };
            let dir = &caps[1];
            match &base {
                Some(existing) if existing != dir => {
                    return Err(
                        "descriptor pattern and artifact pattern do not use the same directory for revision"
                            .to_string(),
                    );
                }
                Some(_) => {}
                None => base = Some(dir.to_string()),
            }
            staged.insert(pattern.clone(), format!("{dir}{PART_SUFFIX}{}", &caps[2]));
        }

        match base {
            Some(base) => Ok(Self { base, staged }),
            None => Err("no pattern defined".to_string()),
        }
    }

    /// Staged counterpart of a publish pattern.
    pub(crate) fn staged_pattern(&self, pattern: &str) -> Option<&str> {
        self.staged.get(pattern).map(String::as_str)
    }

    /// `(staging, destination)` directories of `module` (in path form).
    pub(crate) fn directories(&self, module: &Coordinate) -> Result<(String, String), PatternError> {
        let mut values = TokenValues::for_module(module);
        let destination = substitute(&self.base, &values)?;
        values.set(tokens::REVISION, format!("{}{PART_SUFFIX}", module.revision));
        let staging = substitute(&self.base, &values)?;
        Ok((staging, destination))
    }
}

/// The transaction in progress.
#[derive(Debug, Clone)]
pub(crate) struct OpenTransaction {
    pub(crate) staging: String,
    pub(crate) destination: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_detect_shared_revision_directory() {
        let ivy = p("/repo/[organisation]/[module]/[revision]/module.json");
        let art = p("/repo/[organisation]/[module]/[revision]/[artifact].[ext]");
        let layout = TransactionLayout::detect(Some(&ivy), Some(&art)).unwrap();
        assert_eq!(
            layout.staged_pattern(&art),
            Some("/repo/[organisation]/[module]/[revision].part/[artifact].[ext]")
        );

        let (staging, dest) = layout
            .directories(&Coordinate::new("acme", "lib", "1.0"))
            .unwrap();
        assert_eq!(staging, "/repo/acme/lib/1.0.part");
        assert_eq!(dest, "/repo/acme/lib/1.0");
    }

    #[test]
    fn test_detect_rejections() {
        let flat = p("/repo/[organisation]/[module]-[revision].jar");
        let err = TransactionLayout::detect(None, Some(&flat)).unwrap_err();
        assert_eq!(err, "artifact pattern does not use revision as a directory");

        let ivy = p("/repo/ivy/[module]/[revision]/module.json");
        let art = p("/repo/art/[module]/[revision]/[artifact].[ext]");
        let err = TransactionLayout::detect(Some(&ivy), Some(&art)).unwrap_err();
        assert!(err.contains("do not use the same directory"));

        assert!(TransactionLayout::detect(None, None).is_err());
    }
}
