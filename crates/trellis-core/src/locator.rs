//! Pattern based resource location and dynamic revision discovery.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;
use trellis_schema::{Artifact, Coordinate, ModuleDescriptor, working_revision};

use crate::context::ResolveContext;
use crate::descriptor::DescriptorParser;
use crate::error::ResolveError;
use crate::latest::RevisionInfo;
use crate::pattern::{
    TokenValues, first_token, has_token, substitute, substitute_token, token_string, tokens,
};
use crate::repository::{Repository, RepositoryError, Resource};
use crate::version::VersionMatcher;

/// Suffix of staging entries, never offered as candidates.
pub const PART_SUFFIX: &str = ".part";

/// A located resource standing for one revision.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub resource: Resource,
    pub revision: String,
    pub repository: Arc<dyn Repository>,
    /// Descriptor parsed while locating, when the revision could only be read from it.
    pub descriptor: Option<ModuleDescriptor>,
}

impl Candidate {
    pub fn new(resource: Resource, revision: impl Into<String>, repository: Arc<dyn Repository>) -> Self {
        Self {
            resource,
            revision: revision.into(),
            repository,
            descriptor: None,
        }
    }

    /// Coordinate of `asked` at this candidate's revision.
    pub fn coordinate(&self, asked: &Coordinate) -> Coordinate {
        asked.with_revision(self.revision.clone())
    }
}

impl RevisionInfo for Candidate {
    fn revision(&self) -> &str {
        &self.revision
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.resource.last_modified
    }
}

fn transfer(location: &str) -> impl FnOnce(RepositoryError) -> ResolveError + '_ {
    move |source| ResolveError::Transfer {
        location: location.to_string(),
        source,
    }
}

/// Names directly under `parent`, without trailing slashes.
fn list_all(repository: &dyn Repository, parent: &str) -> Result<Option<Vec<String>>, RepositoryError> {
    Ok(repository.list(parent)?.map(|names| {
        names
            .into_iter()
            .map(|n| n.trim_end_matches('/').to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }))
}

/// Values of `token` found by listing the repository along `pattern`.
///
/// Every token before `token` must already be substituted. Returns `None`
/// when the pattern lacks the token or the parent cannot be listed.
///
/// # Errors
///
/// Returns the repository error of a failed listing.
pub fn list_token_values(
    repository: &dyn Repository,
    pattern: &str,
    token: &str,
) -> Result<Option<Vec<String>>, RepositoryError> {
    let token_str = token_string(token);
    let Some(index) = pattern.find(&token_str) else {
        return Ok(None);
    };
    let after = index + token_str.len();
    let is_separator = |c: u8| c == b'/' || c == b'\\';
    let starts_segment = index == 0 || is_separator(pattern.as_bytes()[index - 1]);
    let ends_segment = after == pattern.len() || is_separator(pattern.as_bytes()[after]);

    if starts_segment && ends_segment {
        return list_all(repository, &pattern[..index]);
    }

    // Part of a name: match siblings against the segment with the token as a group
    let slash = pattern[..index].rfind(['/', '\\']);
    let root = slash.map_or("", |i| &pattern[..i]);
    let segment_start = slash.map_or(0, |i| i + 1);
    let segment_end = pattern[after..]
        .find(['/', '\\'])
        .map_or(pattern.len(), |i| after + i);
    let segment = &pattern[segment_start..segment_end];
    let name_pattern = segment
        .split(token_str.as_str())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("(.+)");
    let Ok(name_re) = Regex::new(&format!("^{name_pattern}$")) else {
        return Ok(None);
    };

    Ok(list_all(repository, root)?.map(|names| {
        names
            .iter()
            .filter_map(|name| name_re.captures(name))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }))
}

/// Values of `token` reachable from `pattern` given `known` token values.
///
/// Tokens standing before `token` and absent from `known` are enumerated
/// recursively.
///
/// # Errors
///
/// Returns an error if the pattern is malformed or a listing fails.
pub fn resolve_token_values(
    repository: &dyn Repository,
    pattern: &str,
    token: &str,
    known: &TokenValues,
) -> Result<BTreeSet<String>, ResolveError> {
    let mut values = known.clone();
    values.remove(token);
    let partial = substitute(pattern, &values)?;
    let mut found = BTreeSet::new();

    match first_token(&partial) {
        None => {}
        Some(first) if first == token => {
            let listed = list_token_values(repository, &partial, token).map_err(transfer(&partial))?;
            found.extend(listed.into_iter().flatten().filter(|v| !v.ends_with(PART_SUFFIX)));
        }
        Some(first) => {
            let first = first.to_string();
            let listed = list_token_values(repository, &partial, &first).map_err(transfer(&partial))?;
            for value in listed.into_iter().flatten() {
                if value.ends_with(PART_SUFFIX) {
                    continue;
                }
                let mut next = values.clone();
                next.set(first.clone(), value);
                found.extend(resolve_token_values(repository, pattern, token, &next)?);
            }
        }
    }
    Ok(found)
}

/// Locates the resources of one artifact across a resolver's patterns.
pub struct ResourceLocator<'a> {
    /// Resolver name, used for `working@` revisions.
    pub resolver: &'a str,
    pub repository: &'a Arc<dyn Repository>,
    pub matcher: &'a dyn VersionMatcher,
    /// Probe the literal revision even when it looks dynamic.
    pub always_check_exact: bool,
    /// Used to read the revision of a descriptor whose pattern has no `[revision]`.
    pub parser: Option<&'a dyn DescriptorParser>,
}

impl ResourceLocator<'_> {
    /// Candidates for `artifact`, de-duplicated by revision across patterns.
    ///
    /// `artifact` is expected in its path form (organisation already
    /// rewritten for M2 layouts).
    ///
    /// # Errors
    ///
    /// Returns an error on malformed patterns, repository failures or interruption.
    pub fn locate(
        &self,
        artifact: &Artifact,
        patterns: &[String],
        ctx: &mut ResolveContext,
    ) -> Result<Vec<Candidate>, ResolveError> {
        let dynamic = self.matcher.is_dynamic(&artifact.module.revision);
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for pattern in patterns {
            ctx.check_interrupted()?;
            let mut candidates = Vec::new();
            if !dynamic || self.always_check_exact {
                candidates.extend(self.probe(pattern, artifact, ctx)?);
            }
            if dynamic && candidates.is_empty() {
                candidates = self.find_all(pattern, artifact, ctx)?;
            }
            for candidate in candidates {
                if seen.insert(candidate.revision.clone()) {
                    found.push(candidate);
                }
            }
            if !dynamic && !found.is_empty() {
                break;
            }
        }
        Ok(found)
    }

    /// Probe the fully substituted path.
    fn probe(
        &self,
        pattern: &str,
        artifact: &Artifact,
        ctx: &mut ResolveContext,
    ) -> Result<Option<Candidate>, ResolveError> {
        let path = substitute(pattern, &TokenValues::for_artifact(artifact))?;
        ctx.record_attempt(path.clone());
        let resource = self.repository.resource(&path).map_err(transfer(&path))?;
        if !resource.exists {
            debug!("{}: resource not reachable for {}: {path}", self.resolver, artifact.module);
            return Ok(None);
        }
        if has_token(pattern, tokens::REVISION) {
            return Ok(Some(Candidate::new(
                resource,
                artifact.module.revision.clone(),
                Arc::clone(self.repository),
            )));
        }
        self.unversioned(resource, artifact).map(Some)
    }

    /// Candidate for a pattern without `[revision]`.
    fn unversioned(&self, resource: Resource, artifact: &Artifact) -> Result<Candidate, ResolveError> {
        let working = working_revision(self.resolver);
        let mut candidate = Candidate::new(resource, working.clone(), Arc::clone(self.repository));
        let Some(parser) = self.parser.filter(|_| artifact.is_descriptor()) else {
            return Ok(candidate);
        };

        let temp = tempfile::Builder::new()
            .prefix("trellis-descriptor")
            .tempfile()?;
        self.repository
            .get(&candidate.resource.name, temp.path())
            .map_err(transfer(&candidate.resource.name))?;
        let descriptor = parser.parse(temp.path(), false)?;
        if !descriptor.coordinate.revision.is_empty() {
            candidate.revision.clone_from(&descriptor.coordinate.revision);
        }
        candidate.descriptor = Some(descriptor);
        Ok(candidate)
    }

    /// List every revision matching `pattern`.
    fn find_all(
        &self,
        pattern: &str,
        artifact: &Artifact,
        ctx: &mut ResolveContext,
    ) -> Result<Vec<Candidate>, ResolveError> {
        let mut values = TokenValues::for_artifact(artifact);
        values.remove(tokens::REVISION);
        let partial = substitute(pattern, &values)?;

        if !has_token(&partial, tokens::REVISION) {
            ctx.record_attempt(partial.clone());
            let resource = self.repository.resource(&partial).map_err(transfer(&partial))?;
            return if resource.exists {
                Ok(vec![self.unversioned(resource, artifact)?])
            } else {
                Ok(Vec::new())
            };
        }

        ctx.record_attempt(partial.clone());
        let Some(revisions) = list_token_values(self.repository.as_ref(), &partial, tokens::REVISION)
            .map_err(transfer(&partial))?
        else {
            debug!("{}: unable to list revisions along {partial}", self.resolver);
            return Ok(Vec::new());
        };

        let mut candidates = Vec::with_capacity(revisions.len());
        for revision in revisions {
            if revision.ends_with(PART_SUFFIX) {
                continue;
            }
            ctx.check_interrupted()?;
            let path = substitute_token(&partial, tokens::REVISION, &revision);
            let resource = self.repository.resource(&path).map_err(transfer(&path))?;
            candidates.push(Candidate::new(resource, revision, Arc::clone(self.repository)));
        }
        debug!(
            "{}: found {} candidate revision(s) along {partial}",
            self.resolver,
            candidates.len()
        );
        Ok(candidates)
    }
}
