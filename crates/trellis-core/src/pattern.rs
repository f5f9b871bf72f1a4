//! Pattern token substitution.
//!
//! Patterns such as `/repo/[organisation]/[module]/[revision]/[artifact](-[classifier]).[ext]`
//! map coordinates to resource paths. A token without a value is kept
//! literally, so a partially substituted pattern can still be used for
//! listing. A parenthesised section is only emitted when its token has a
//! non-empty value.

use std::collections::BTreeMap;

use thiserror::Error;
use trellis_schema::{Artifact, Coordinate};

/// Token names understood by [`substitute`].
pub mod tokens {
    /// `[organisation]`
    pub const ORGANISATION: &str = "organisation";
    /// `[organization]`, alias of `[organisation]`
    pub const ORGANIZATION: &str = "organization";
    /// `[orgPath]`, organisation with dots turned into slashes
    pub const ORG_PATH: &str = "orgPath";
    /// `[module]`
    pub const MODULE: &str = "module";
    /// `[branch]`
    pub const BRANCH: &str = "branch";
    /// `[revision]`
    pub const REVISION: &str = "revision";
    /// `[artifact]`
    pub const ARTIFACT: &str = "artifact";
    /// `[type]`
    pub const TYPE: &str = "type";
    /// `[ext]`
    pub const EXT: &str = "ext";
    /// `[classifier]`
    pub const CLASSIFIER: &str = "classifier";
    /// `[conf]`
    pub const CONF: &str = "conf";
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("invalid start of optional part at position {position} in pattern {pattern}")]
    OptionalStart { position: usize, pattern: String },

    #[error("invalid end of optional part at position {position} in pattern {pattern}")]
    OptionalEnd { position: usize, pattern: String },

    #[error("invalid start of token at position {position} in pattern {pattern}")]
    TokenStart { position: usize, pattern: String },

    #[error("invalid end of token at position {position} in pattern {pattern}")]
    TokenEnd { position: usize, pattern: String },

    #[error("last token hasn't been closed in pattern {0}")]
    UnclosedToken(String),

    #[error("optional part hasn't been closed in pattern {0}")]
    UnclosedOptional(String),
}

/// Values available for substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenValues(BTreeMap<String, String>);

impl TokenValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(token.into(), value.into());
        self
    }

    pub fn remove(&mut self, token: &str) -> Option<String> {
        self.0.remove(token)
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.0.get(token).map(String::as_str)
    }

    /// Tokens of a module coordinate. Artifact tokens get their defaults.
    pub fn for_module(coordinate: &Coordinate) -> Self {
        let mut values = Self::new();
        for (key, value) in &coordinate.extra {
            values.set(unqualified(key), value.clone());
        }
        let org = &coordinate.organisation;
        values
            .set(tokens::ORGANISATION, org.clone())
            .set(tokens::ORGANIZATION, org.clone())
            .set(tokens::ORG_PATH, org.replace('.', "/"))
            .set(tokens::MODULE, coordinate.module.clone())
            .set(
                tokens::BRANCH,
                coordinate.branch.clone().unwrap_or_default(),
            )
            .set(tokens::REVISION, coordinate.revision.clone())
            .set(tokens::ARTIFACT, coordinate.module.clone())
            .set(tokens::TYPE, "jar")
            .set(tokens::EXT, "jar")
            .set(tokens::CONF, "default");
        values
    }

    /// Tokens of an artifact, including those of its module.
    pub fn for_artifact(artifact: &Artifact) -> Self {
        let mut values = Self::for_module(&artifact.module);
        for (key, value) in &artifact.extra {
            values.set(unqualified(key), value.clone());
        }
        values
            .set(tokens::ARTIFACT, artifact.name.clone())
            .set(tokens::TYPE, artifact.kind.clone())
            .set(tokens::EXT, artifact.ext.clone());
        if let Some(classifier) = &artifact.classifier {
            values.set(tokens::CLASSIFIER, classifier.clone());
        }
        values
    }
}

fn unqualified(key: &str) -> &str {
    match key.find(':') {
        Some(idx) if idx > 0 => &key[idx + 1..],
        _ => key,
    }
}

/// Substitute `values` into `pattern`.
///
/// # Errors
///
/// Returns a [`PatternError`] when brackets or parentheses are unbalanced or nested.
pub fn substitute(pattern: &str, values: &TokenValues) -> Result<String, PatternError> {
    let mut buffer = String::with_capacity(pattern.len());
    let mut optional = String::new();
    let mut token = String::new();
    let mut inside_optional = false;
    let mut inside_token = false;
    let mut token_seen = false;
    let mut token_had_value = false;

    for (position, ch) in pattern.chars().enumerate() {
        match ch {
            '(' => {
                if inside_optional {
                    return Err(PatternError::OptionalStart {
                        position,
                        pattern: pattern.to_string(),
                    });
                }
                optional.clear();
                inside_optional = true;
                token_seen = false;
                token_had_value = false;
            }
            ')' => {
                if !inside_optional || inside_token {
                    return Err(PatternError::OptionalEnd {
                        position,
                        pattern: pattern.to_string(),
                    });
                }
                if token_had_value {
                    buffer.push_str(&optional);
                } else if !token_seen {
                    buffer.push('(');
                    buffer.push_str(&optional);
                    buffer.push(')');
                }
                inside_optional = false;
            }
            '[' => {
                if inside_token {
                    return Err(PatternError::TokenStart {
                        position,
                        pattern: pattern.to_string(),
                    });
                }
                token.clear();
                inside_token = true;
            }
            ']' => {
                if !inside_token {
                    return Err(PatternError::TokenEnd {
                        position,
                        pattern: pattern.to_string(),
                    });
                }
                let value = values.get(&token);
                if inside_optional {
                    token_had_value = value.is_some_and(|v| !v.is_empty());
                    optional.push_str(value.unwrap_or_default());
                } else if let Some(value) = value {
                    buffer.push_str(value);
                } else {
                    buffer.push('[');
                    buffer.push_str(&token);
                    buffer.push(']');
                }
                inside_token = false;
                token_seen = true;
            }
            _ if inside_token => token.push(ch),
            _ if inside_optional => optional.push(ch),
            _ => buffer.push(ch),
        }
    }

    if inside_token {
        return Err(PatternError::UnclosedToken(pattern.to_string()));
    }
    if inside_optional {
        return Err(PatternError::UnclosedOptional(pattern.to_string()));
    }
    Ok(buffer)
}

/// Literally replace every `[token]` with `value`.
pub fn substitute_token(pattern: &str, token: &str, value: &str) -> String {
    pattern.replace(&token_string(token), value)
}

/// `[token]`
pub fn token_string(token: &str) -> String {
    format!("[{token}]")
}

/// Whether `pattern` references `token`.
pub fn has_token(pattern: &str, token: &str) -> bool {
    pattern.contains(&token_string(token))
}

/// Prefix of `pattern` before its first token or optional section.
pub fn token_root(pattern: &str) -> &str {
    let Some(index) = pattern.find('[') else {
        return pattern;
    };
    let index = pattern.find('(').map_or(index, |opt| opt.min(index));
    &pattern[..index]
}

/// Name of the first token of `pattern`.
pub fn first_token(pattern: &str) -> Option<&str> {
    let start = pattern.find('[')?;
    let end = pattern[start..].find(']')? + start;
    Some(&pattern[start + 1..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const IVY_LAYOUT: &str =
        "/repo/[organisation]/[module](/[branch])/[revision]/[artifact](-[classifier]).[ext]";

    fn artifact() -> Artifact {
        Artifact::new(Coordinate::new("org.acme", "widget", "1.2"), "widget", "jar", "jar")
    }

    #[test]
    fn test_substitute_with_optional_parts() {
        let path = substitute(IVY_LAYOUT, &TokenValues::for_artifact(&artifact())).unwrap();
        assert_eq!(path, "/repo/org.acme/widget/1.2/widget.jar");

        let mut with_branch = artifact().with_classifier("sources");
        with_branch.module = with_branch.module.with_branch("trunk");
        let path = substitute(IVY_LAYOUT, &TokenValues::for_artifact(&with_branch)).unwrap();
        assert_eq!(path, "/repo/org.acme/widget/trunk/1.2/widget-sources.jar");
    }

    #[test]
    fn test_unknown_tokens_kept_literally() {
        let mut values = TokenValues::for_artifact(&artifact());
        values.remove(tokens::REVISION);
        let path = substitute("[orgPath]/[module]/[revision]/[unknown].[ext]", &values).unwrap();
        assert_eq!(path, "org/acme/widget/[revision]/[unknown].jar");
    }

    #[test]
    fn test_optional_without_token_is_kept() {
        let values = TokenValues::for_artifact(&artifact());
        assert_eq!(substitute("a(b)c", &values).unwrap(), "a(b)c");
    }

    #[test]
    fn test_extra_attributes_unqualified() {
        let coordinate = Coordinate::new("acme", "widget", "1.0").with_extra("e:platform", "linux");
        let values = TokenValues::for_module(&coordinate);
        assert_eq!(
            substitute("[module]-[platform]", &values).unwrap(),
            "widget-linux"
        );
    }

    #[test]
    fn test_malformed_patterns() {
        let values = TokenValues::new();
        assert!(matches!(
            substitute("a/[module", &values),
            Err(PatternError::UnclosedToken(_))
        ));
        assert!(matches!(
            substitute("a/((b)", &values),
            Err(PatternError::OptionalStart { position: 3, .. })
        ));
        assert!(matches!(
            substitute("a/b]", &values),
            Err(PatternError::TokenEnd { .. })
        ));
        assert!(matches!(
            substitute("a/(b", &values),
            Err(PatternError::UnclosedOptional(_))
        ));
    }

    #[test]
    fn test_token_root_and_first_token() {
        assert_eq!(token_root("/repo/[organisation]/[module]"), "/repo/");
        assert_eq!(token_root("lib/([branch]/)[module]"), "lib/");
        assert_eq!(token_root("plain/path"), "plain/path");
        assert_eq!(first_token("/repo/[organisation]/[module]"), Some("organisation"));
        assert_eq!(first_token("/repo/"), None);
    }
}
