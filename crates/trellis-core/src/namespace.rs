//! Coordinate translation between the system namespace and a resolver's local one.
//!
//! A [`Namespace`] holds two rule lists. Requests go through `from_system`
//! before a resolver looks at them; results come back through `to_system`.
//! In each list the first rule whose matchers all match is applied.

use std::fmt;

use regex::{Captures, Regex};
use serde::Deserialize;
use trellis_schema::{Artifact, Coordinate, ModuleDescriptor};

/// A rewrite of coordinates.
pub trait CoordinateTransform: Send + Sync + fmt::Debug {
    fn transform(&self, coordinate: &Coordinate) -> Coordinate;

    /// Whether [`Self::transform`] always returns its input.
    fn is_identity(&self) -> bool {
        false
    }
}

/// Leaves coordinates unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl CoordinateTransform for Identity {
    fn transform(&self, coordinate: &Coordinate) -> Coordinate {
        coordinate.clone()
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Maven-style organisation paths: `org.acme` is searched under `org/acme`.
///
/// Only used for resource path substitution; the logical coordinate keeps its dots.
#[derive(Debug, Clone, Copy, Default)]
pub struct M2Layout;

impl CoordinateTransform for M2Layout {
    fn transform(&self, coordinate: &Coordinate) -> Coordinate {
        coordinate.with_organisation(coordinate.organisation.replace('.', "/"))
    }
}

/// Declarative form of a [`Rule`], as found in settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    /// Regex the organisation must fully match. Absent matches anything.
    pub organisation: Option<String>,
    pub module: Option<String>,
    pub revision: Option<String>,
    /// Replacement template for the organisation. Absent keeps the value.
    pub to_organisation: Option<String>,
    pub to_module: Option<String>,
    pub to_revision: Option<String>,
}

#[derive(Debug, Clone)]
struct Field {
    matcher: Option<Regex>,
    template: Option<String>,
}

impl Field {
    fn compile(pattern: Option<&str>, template: Option<&String>) -> Result<Self, regex::Error> {
        let matcher = pattern
            .map(|p| Regex::new(&format!("^(?:{p})$")))
            .transpose()?;
        Ok(Self {
            matcher,
            template: template.cloned(),
        })
    }

    fn captures<'t>(&self, value: &'t str) -> Option<Option<Captures<'t>>> {
        match &self.matcher {
            None => Some(None),
            Some(re) => re.captures(value).map(Some),
        }
    }
}

/// One matcher/replacement rule.
///
/// Templates reference capture groups with `$n` (groups of the same
/// field) or `$on`, `$mn`, `$rn` (groups of the organisation, module or
/// revision matcher).
#[derive(Debug, Clone)]
pub struct Rule {
    organisation: Field,
    module: Field,
    revision: Field,
}

impl Rule {
    /// Compile a rule from its settings form.
    ///
    /// # Errors
    ///
    /// Returns the regex error of the first invalid matcher.
    pub fn compile(spec: &RuleSpec) -> Result<Self, regex::Error> {
        Ok(Self {
            organisation: Field::compile(spec.organisation.as_deref(), spec.to_organisation.as_ref())?,
            module: Field::compile(spec.module.as_deref(), spec.to_module.as_ref())?,
            revision: Field::compile(spec.revision.as_deref(), spec.to_revision.as_ref())?,
        })
    }

    fn apply(&self, coordinate: &Coordinate) -> Option<Coordinate> {
        let org = self.organisation.captures(&coordinate.organisation)?;
        let module = self.module.captures(&coordinate.module)?;
        let revision = self.revision.captures(&coordinate.revision)?;
        let groups = Groups {
            organisation: org.as_ref(),
            module: module.as_ref(),
            revision: revision.as_ref(),
        };

        let mut result = coordinate.clone();
        if let Some(template) = &self.organisation.template {
            result.organisation = groups.expand(template, org.as_ref());
        }
        if let Some(template) = &self.module.template {
            result.module = groups.expand(template, module.as_ref());
        }
        if let Some(template) = &self.revision.template {
            result.revision = groups.expand(template, revision.as_ref());
        }
        Some(result)
    }
}

struct Groups<'a, 't> {
    organisation: Option<&'a Captures<'t>>,
    module: Option<&'a Captures<'t>>,
    revision: Option<&'a Captures<'t>>,
}

impl Groups<'_, '_> {
    fn expand(&self, template: &str, own: Option<&Captures<'_>>) -> String {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '$' {
                out.push(ch);
                continue;
            }
            let source = match chars.peek() {
                Some('o') => Some(self.organisation),
                Some('m') => Some(self.module),
                Some('r') => Some(self.revision),
                _ => None,
            };
            let mut lookahead = chars.clone();
            if source.is_some() {
                lookahead.next();
            }
            let digits: String = std::iter::from_fn(|| lookahead.next_if(char::is_ascii_digit)).collect();
            let Ok(index) = digits.parse::<usize>() else {
                out.push(ch);
                continue;
            };
            chars = lookahead;
            let captures = source.unwrap_or(own);
            if let Some(group) = captures.and_then(|c| c.get(index)) {
                out.push_str(group.as_str());
            }
        }
        out
    }
}

/// Ordered rules; the first matching one applies.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

impl CoordinateTransform for RuleSet {
    fn transform(&self, coordinate: &Coordinate) -> Coordinate {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(coordinate))
            .unwrap_or_else(|| coordinate.clone())
    }

    fn is_identity(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Named pair of rule sets.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub name: String,
    from_system: RuleSet,
    to_system: RuleSet,
}

impl Namespace {
    pub fn new(name: impl Into<String>, from_system: RuleSet, to_system: RuleSet) -> Self {
        Self {
            name: name.into(),
            from_system,
            to_system,
        }
    }

    /// System coordinate to the resolver's local one.
    pub fn from_system(&self) -> &dyn CoordinateTransform {
        &self.from_system
    }

    /// Local coordinate back to the system one.
    pub fn to_system(&self) -> &dyn CoordinateTransform {
        &self.to_system
    }
}

/// Apply `transform` to a descriptor and everything it references.
pub fn transform_descriptor(
    transform: &dyn CoordinateTransform,
    descriptor: &ModuleDescriptor,
) -> ModuleDescriptor {
    if transform.is_identity() {
        return descriptor.clone();
    }
    let mut result = descriptor.clone();
    result.coordinate = transform.transform(&descriptor.coordinate);
    for dependency in &mut result.dependencies {
        dependency.coordinate = transform.transform(&dependency.coordinate);
    }
    result
}

pub fn transform_artifact(transform: &dyn CoordinateTransform, artifact: &Artifact) -> Artifact {
    if transform.is_identity() {
        return artifact.clone();
    }
    artifact.with_module(transform.transform(&artifact.module))
}
