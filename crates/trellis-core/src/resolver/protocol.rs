//! Resolution of one request by a [`RepositoryResolver`].

use std::cmp::Ordering;
use std::fs;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use trellis_schema::{
    Artifact, Coordinate, DependencyRequest, ModuleDescriptor, ResolvedModule, WORKING_PREFIX,
    working_revision,
};

use super::RepositoryResolver;
use crate::acquire::fetch_verified;
use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::latest::RevisionInfo;
use crate::locator::Candidate;
use crate::namespace::transform_descriptor;
use crate::selector::Selected;

/// Result of the protocol short of hard failures.
enum Lookup {
    Found(ResolvedModule),
    /// The resolver has nothing for the request; the reason is logged.
    Unresolved(String),
}

struct ModuleRevision<'a>(&'a ResolvedModule);

impl RevisionInfo for ModuleRevision<'_> {
    fn revision(&self) -> &str {
        &self.0.id().revision
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.0.published
    }
}

impl RepositoryResolver {
    pub(super) fn resolve(
        &self,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        if let Some(current) = ctx.current_resolved() {
            if self.should_return_resolved(request, current) {
                debug!("{}: returning already resolved {}", self.name, current.id());
                return Ok(Some(current.clone()));
            }
        }

        match self.lookup(request, &mut ctx)? {
            Lookup::Found(module) => Ok(Some(self.check_latest(module, &ctx))),
            Lookup::Unresolved(reason) => {
                debug!("{}: {reason}", self.name);
                Ok(ctx.current_resolved().cloned())
            }
        }
    }

    /// Whether a module found by an earlier resolver stands without asking this one.
    fn should_return_resolved(&self, request: &DependencyRequest, current: &ResolvedModule) -> bool {
        let dynamic = self.env.matcher.is_dynamic(&request.coordinate.revision);
        (current.force || (!dynamic && !current.is_default())) && !request.force
    }

    fn is_changing(&self, request: &DependencyRequest) -> bool {
        request.changing
            || self
                .changing_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(&request.coordinate.revision))
    }

    fn lookup(&self, request: &DependencyRequest, ctx: &mut ResolveContext) -> Result<Lookup, ResolveError> {
        let system = &request.coordinate;
        let local_request = request.with_coordinate(self.from_system().transform(system));

        if let Some((_, workspace)) = system.revision.split_once('@') {
            if workspace != self.env.workspace_name {
                return Ok(Lookup::Unresolved(format!("unhandled revision => {}", system.revision)));
            }
        }
        let dynamic = self.env.matcher.is_dynamic(&system.revision);
        if dynamic && !self.dynamic_revisions {
            return Err(ResolveError::DynamicRevisionUnsupported {
                resolver: self.name.clone(),
                coordinate: system.clone(),
            });
        }
        let changing = self.is_changing(request);

        if !dynamic && !self.check_modified && !changing {
            if let Some(cached) = self.find_module_in_cache(system, ctx)? {
                debug!("{}: revision in cache: {system}", self.name);
                return Ok(Lookup::Found(cached));
            }
        }

        ctx.check_interrupted()?;
        let descriptor_ref = self.find_descriptor_ref(&local_request, dynamic, changing, ctx)?;
        ctx.check_interrupted()?;

        let (mut module, candidate) = match descriptor_ref {
            None if !self.allow_missing_descriptor => {
                return Ok(Lookup::Unresolved(format!("no descriptor found for {system}")));
            }
            None => match self.default_module(&local_request, dynamic, changing, ctx)? {
                Some(found) => found,
                None => {
                    return Ok(Lookup::Unresolved(format!(
                        "no descriptor nor artifact found for {system}"
                    )));
                }
            },
            Some(Selected { candidate, module }) => {
                let parsed = match module {
                    Some(module) => module,
                    None => match self.parse(&candidate, &local_request, changing, ctx)? {
                        Some(module) => module,
                        None => {
                            return Ok(Lookup::Unresolved(format!(
                                "impossible to get descriptor {}",
                                candidate.resource.name
                            )));
                        }
                    },
                };
                if !parsed.downloaded && parsed.local_descriptor.is_some() {
                    return Ok(Lookup::Found(parsed));
                }
                (self.checked_module(parsed, system, &local_request.coordinate, &candidate)?, candidate)
            }
        };

        if let Some(reason) = self.resolve_revision(&mut module.descriptor, system, &candidate, dynamic) {
            return Ok(Lookup::Unresolved(reason));
        }
        if let Some(as_of) = request.as_of {
            let published = match module.descriptor.publication {
                Some(date) => Some(date),
                None => self
                    .find_first_artifact_ref(&module.descriptor, &local_request, ctx)?
                    .and_then(|c| c.resource.last_modified),
            };
            match published {
                None => {
                    return Ok(Lookup::Unresolved(format!(
                        "impossible to guess publication date: artifact missing for {system}"
                    )));
                }
                Some(date) if date > as_of => {
                    return Ok(Lookup::Unresolved(format!(
                        "unacceptable publication date => was={date} required={as_of}"
                    )));
                }
                Some(date) => module.published = Some(date),
            }
        }

        let path = self
            .env
            .cache
            .cache_descriptor(&module, candidate.resource.last_modified)?;
        module.local_descriptor = Some(path);
        info!("{}: resolved {system} to {}", self.name, module.id());
        Ok(Lookup::Found(module))
    }

    /// Cached module for a static coordinate, produced by this resolver.
    fn find_module_in_cache(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let Some(module) = self.env.cache.find_module_in_cache(coordinate, Some(&self.name))? else {
            return Ok(None);
        };
        if module.is_default() {
            debug!("{}: cached {coordinate} is a default one, looking for a better one", self.name);
            return Ok(None);
        }
        if ctx.is_blacklisted(module.id()) {
            debug!("{}: found {coordinate} in cache, but it is blacklisted", self.name);
            return Ok(None);
        }
        Ok(Some(module))
    }

    /// Locate and select the descriptor resource.
    fn find_descriptor_ref(
        &self,
        request: &DependencyRequest,
        dynamic: bool,
        changing: bool,
        ctx: &mut ResolveContext,
    ) -> Result<Option<Selected>, ResolveError> {
        if self.descriptor_patterns.is_empty() {
            return Ok(None);
        }
        let artifact = self.path_form(&Artifact::descriptor(request.coordinate.clone()));
        let mut candidates = self
            .locator(true)
            .locate(&artifact, &self.descriptor_patterns, ctx)?;
        if !dynamic {
            return Ok((!candidates.is_empty()).then(|| Selected {
                candidate: candidates.swap_remove(0),
                module: None,
            }));
        }
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut fetch = |c: &Candidate, ctx: &mut ResolveContext| self.parse(c, request, changing, ctx);
        self.selector().select(request, candidates, &mut fetch, ctx)
    }

    /// Synthesized module for a revision published without descriptor.
    fn default_module(
        &self,
        request: &DependencyRequest,
        dynamic: bool,
        changing: bool,
        ctx: &mut ResolveContext,
    ) -> Result<Option<(ResolvedModule, Candidate)>, ResolveError> {
        let mut descriptor = ModuleDescriptor::default_for(request.coordinate.clone());
        let Some(artifact_ref) = self.find_first_artifact_ref(&descriptor, request, ctx)? else {
            return Ok(None);
        };
        ctx.check_interrupted()?;
        debug!("{}: no descriptor found for {}, using default data", self.name, request.coordinate);
        if dynamic {
            descriptor = descriptor.with_revision(&artifact_ref.revision);
        }
        let descriptor = transform_descriptor(self.to_system(), &descriptor);

        if changing {
            self.drop_outdated_artifact(&descriptor, &artifact_ref)?;
        }
        let mut module = ResolvedModule::new(descriptor, &self.name);
        module.published = artifact_ref.resource.last_modified;
        Ok(Some((module, artifact_ref)))
    }

    /// For a changing module without descriptor, drop the cached artifact
    /// when the repository holds a newer one.
    fn drop_outdated_artifact(&self, descriptor: &ModuleDescriptor, artifact_ref: &Candidate) -> Result<(), ResolveError> {
        let Some(artifact) = descriptor.all_artifacts().into_iter().next() else {
            return Ok(());
        };
        let cache = &self.env.cache;
        let origin = cache.saved_artifact_origin(&artifact)?;
        let file = cache.archive_file(&artifact, origin.as_ref(), false)?;
        let cached_at = fs::metadata(&file)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        if let (Some(cached_at), Some(remote)) = (cached_at, artifact_ref.resource.last_modified) {
            if remote > cached_at {
                debug!("{} has changed: deleting {}", descriptor.coordinate, file.display());
                fs::remove_file(&file)?;
                cache.remove_saved_artifact_origin(&artifact)?;
            }
        }
        Ok(())
    }

    /// First artifact of `descriptor` found in the repository.
    fn find_first_artifact_ref(
        &self,
        descriptor: &ModuleDescriptor,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<Candidate>, ResolveError> {
        for conf in &descriptor.configurations {
            for artifact in descriptor.artifacts_for(conf) {
                if let Some(found) = self.find_artifact_ref(&artifact, request, ctx)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Descriptor of `candidate`, from this resolution, the cache or the repository.
    ///
    /// A module coming from the cache or from a sibling resolution has
    /// `downloaded` unset and a local descriptor.
    fn parse(
        &self,
        candidate: &Candidate,
        request: &DependencyRequest,
        changing: bool,
        ctx: &mut ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let dynamic = self.env.matcher.is_dynamic(&request.coordinate.revision);
        let resolved = self.to_system().transform(&candidate.coordinate(&request.coordinate));

        if dynamic {
            if let Some(existing) = ctx.resolved(&resolved) {
                if existing.is_default() {
                    debug!("{}: {resolved} already resolved but with a default descriptor", self.name);
                } else {
                    debug!("{}: revision already resolved: {resolved}", self.name);
                    let mut module = existing.clone();
                    module.searched = true;
                    return Ok(Some(module));
                }
            }
        }

        let mut cached_publication = None;
        if let Some(entry) = self.env.cache.cached_entry(&resolved)? {
            let fresh = match (candidate.resource.last_modified, entry.resource_last_modified) {
                (Some(remote), Some(cached)) => remote <= cached,
                (None, _) => true,
                (Some(_), None) => false,
            };
            let mut module = entry.into_module(self.env.cache.descriptor_path(&resolved)?);
            module.searched = true;
            if module.is_default() && module.resolver != self.name {
                debug!("{}: cached {resolved} is a default one, looking for a better one", self.name);
            } else if !self.check_modified && !changing {
                return Ok(Some(module));
            } else if !module.is_default() && fresh {
                debug!("{}: revision in cache (not updated): {resolved}", self.name);
                return Ok(Some(module));
            } else {
                debug!("{}: revision in cache is not up to date: {resolved}", self.name);
                if changing {
                    cached_publication = Some(module.published);
                }
            }
        }

        let descriptor = match &candidate.descriptor {
            Some(descriptor) => descriptor.clone(),
            None => {
                let Some(descriptor) = self.download_descriptor(candidate, ctx)? else {
                    return Ok(None);
                };
                descriptor
            }
        };
        let published = descriptor.publication.or(candidate.resource.last_modified);

        match cached_publication {
            Some(previous) if previous != published => {
                info!("{resolved} has changed: deleting old artifacts");
                self.env.cache.delete_cached_artifacts(&resolved)?;
            }
            Some(_) => debug!("{resolved} is changing, but has not changed: trusting cached artifacts"),
            None => {}
        }

        let mut module = ResolvedModule::new(descriptor, &self.name);
        module.downloaded = true;
        module.published = published;
        Ok(Some(module))
    }

    /// Transfer and parse a descriptor. Transfer problems yield `None`.
    fn download_descriptor(
        &self,
        candidate: &Candidate,
        ctx: &ResolveContext,
    ) -> Result<Option<ModuleDescriptor>, ResolveError> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("descriptor.json");
        match fetch_verified(
            candidate.repository.as_ref(),
            &candidate.resource.name,
            &path,
            &self.checksums,
            ctx,
        ) {
            Ok(_) => {}
            Err(e) if e.is_interrupted() => return Err(e),
            Err(e) => {
                warn!("problem while downloading module descriptor {}: {e}", candidate.resource.name);
                return Ok(None);
            }
        }
        Ok(Some(self.env.parser.parse(&path, ctx.validate())?))
    }

    /// Module in system namespace after the consistency checks.
    fn checked_module(
        &self,
        parsed: ResolvedModule,
        system: &Coordinate,
        local: &Coordinate,
        candidate: &Candidate,
    ) -> Result<ResolvedModule, ResolveError> {
        let local_descriptor = parsed.descriptor.clone();
        let mut descriptor = transform_descriptor(self.to_system(), &parsed.descriptor);
        if self.check_consistency {
            self.check_descriptor_consistency(system, &descriptor, candidate)?;
            if !self.to_system().is_identity() {
                self.check_descriptor_consistency(local, &local_descriptor, candidate)?;
            }
        } else {
            descriptor.coordinate = self.reference_coordinate(candidate, system, &descriptor);
        }
        Ok(ResolvedModule {
            descriptor,
            ..parsed
        })
    }

    fn check_descriptor_consistency(
        &self,
        expected: &Coordinate,
        descriptor: &ModuleDescriptor,
        candidate: &Candidate,
    ) -> Result<(), ResolveError> {
        let found = &descriptor.coordinate;
        let mut problems = Vec::new();
        if expected.organisation != found.organisation {
            problems.push(format!(
                "bad organisation: expected='{}' found='{}'",
                expected.organisation, found.organisation
            ));
        }
        if expected.module != found.module {
            problems.push(format!(
                "bad module name: expected='{}' found='{}'",
                expected.module, found.module
            ));
        }
        if let Some(branch) = &expected.branch {
            if found.branch.as_ref() != Some(branch) {
                problems.push(format!(
                    "bad branch name: expected='{branch}' found='{}'",
                    found.branch.as_deref().unwrap_or_default()
                ));
            }
        }
        let revision = &candidate.revision;
        if !revision.is_empty() && !revision.starts_with(WORKING_PREFIX) && !self.accepts(revision, descriptor) {
            problems.push(format!("bad revision: expected='{revision}' found='{}'", found.revision));
        }
        if !self.env.statuses.is_known(&descriptor.status) {
            problems.push(format!("bad status: '{}'", descriptor.status));
        }
        for (key, value) in &expected.extra {
            if found.extra.get(key) != Some(value) {
                problems.push(format!(
                    "bad {key}: expected='{value}' found='{}'",
                    found.extra.get(key).map_or("", String::as_str)
                ));
            }
        }

        if problems.is_empty() {
            return Ok(());
        }
        warn!("{}: inconsistent descriptor {}: {}", self.name, candidate.resource.name, problems.join("; "));
        Err(ResolveError::InconsistentMetadata {
            location: candidate.resource.name.clone(),
            problems,
        })
    }

    /// Coordinate trusted from the request and the resource when consistency is not checked.
    fn reference_coordinate(&self, candidate: &Candidate, asked: &Coordinate, descriptor: &ModuleDescriptor) -> Coordinate {
        let revision = if !candidate.revision.is_empty() {
            candidate.revision.clone()
        } else if self.env.matcher.is_dynamic(&asked.revision) && descriptor.coordinate.revision.is_empty() {
            working_revision(&self.name)
        } else {
            asked.revision.clone()
        };
        let mut coordinate = asked.with_revision(revision);
        for (key, value) in &descriptor.coordinate.extra {
            coordinate.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
        coordinate
    }

    /// Whether the configured matcher accepts `descriptor` for `asked`.
    fn accepts(&self, asked: &str, descriptor: &ModuleDescriptor) -> bool {
        let found = &descriptor.coordinate.revision;
        if self.env.matcher.need_descriptor(asked, found) {
            self.env.matcher.accept_descriptor(asked, descriptor)
        } else {
            self.env.matcher.accept(asked, found)
        }
    }

    /// Give the descriptor a concrete revision and check it is acceptable.
    ///
    /// Returns the reason the module is unacceptable, if it is.
    fn resolve_revision(
        &self,
        descriptor: &mut ModuleDescriptor,
        asked: &Coordinate,
        candidate: &Candidate,
        dynamic: bool,
    ) -> Option<String> {
        let current = &descriptor.coordinate.revision;
        if current.is_empty() || current.starts_with(WORKING_PREFIX) {
            let revision = if !dynamic {
                asked.revision.clone()
            } else if candidate.revision.is_empty() {
                working_revision(&self.name)
            } else {
                candidate.revision.clone()
            };
            descriptor.coordinate.revision = revision;
        }
        if dynamic {
            debug!("{}: [{}] {}", self.name, descriptor.coordinate.revision, asked.module_id());
        }
        (!self.accepts(&asked.revision, descriptor)).then(|| {
            format!(
                "unacceptable revision => was={} required={}",
                descriptor.coordinate.revision, asked.revision
            )
        })
    }

    /// Keep the more recent of `found` and the module accumulated so far.
    fn check_latest(&self, found: ResolvedModule, ctx: &ResolveContext) -> ResolvedModule {
        let Some(previous) = ctx.current_resolved() else {
            return found;
        };
        let newer = self
            .env
            .strategy
            .compare(&ModuleRevision(&found), &ModuleRevision(previous))
            == Ordering::Greater;
        if newer {
            debug!("{}: {} kept as younger", self.name, found.id());
            found
        } else if !found.is_default() && previous.is_default() {
            debug!("{}: {} kept as better (not default)", self.name, found.id());
            found
        } else {
            debug!("{}: {} discarded as older", self.name, found.id());
            previous.clone()
        }
    }
}
