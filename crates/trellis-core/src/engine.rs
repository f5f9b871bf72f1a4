//! High level operations over frozen [`Settings`].

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use trellis_schema::{Artifact, Coordinate, DependencyRequest, DownloadReport, ResolvedModule};

use crate::acquire::DownloadOptions;
use crate::conflict::ConflictManager;
use crate::context::{Interrupt, ResolveContext};
use crate::error::ResolveError;
use crate::reporter::{NullReporter, Reporter};
use crate::resolver::DependencyResolver;
use crate::settings::Settings;

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Resolver to use instead of the default one.
    pub resolver: Option<String>,
    pub interrupt: Option<Interrupt>,
    pub conflict_manager: Option<Arc<dyn ConflictManager>>,
}

/// Outcome of [`Engine::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    /// The module found for the requested coordinate.
    pub root: Option<ResolvedModule>,
    /// Transitive dependencies found, in resolution order.
    pub dependencies: Vec<ResolvedModule>,
    /// Requests no resolver could satisfy.
    pub unresolved: Vec<DependencyRequest>,
    /// Locations tried for the unresolved requests.
    pub failure_report: Vec<String>,
}

impl ResolveReport {
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.unresolved.is_empty()
    }
}

pub struct Engine {
    settings: Settings,
    reporter: Arc<dyn Reporter>,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn resolver(&self, name: Option<&str>) -> Result<Arc<dyn DependencyResolver>, ResolveError> {
        match name {
            Some(name) => self
                .settings
                .resolver(name)
                .ok_or_else(|| ResolveError::Configuration(format!("unknown resolver '{name}'"))),
            None => self
                .settings
                .default_resolver()
                .ok_or_else(|| ResolveError::Configuration("no resolver configured".to_string())),
        }
    }

    fn context(&self, options: &ResolveOptions) -> ResolveContext {
        let mut ctx = ResolveContext::new().with_validate(self.settings.validate());
        if let Some(interrupt) = &options.interrupt {
            ctx = ctx.with_interrupt(interrupt.clone());
        }
        if let Some(manager) = &options.conflict_manager {
            ctx = ctx.with_conflict_manager(Arc::clone(manager));
        }
        ctx
    }

    /// Resolve `request`, then its dependencies when it is transitive.
    ///
    /// Dependencies are resolved by the same resolver through the same
    /// context, each coordinate once.
    ///
    /// # Errors
    ///
    /// Returns hard failures of the resolver; unresolved requests are
    /// listed in the report instead.
    pub fn resolve(&self, request: &DependencyRequest, options: &ResolveOptions) -> Result<ResolveReport, ResolveError> {
        let resolver = self.resolver(options.resolver.as_deref())?;
        let mut ctx = self.context(options);
        let mut report = ResolveReport::default();

        let found = self.resolve_one(resolver.as_ref(), request, &mut ctx, &mut report)?;
        report.root.clone_from(&found);
        let Some(root) = found else {
            return Ok(report);
        };
        if !request.transitive {
            return Ok(report);
        }

        let mut seen: HashSet<Coordinate> = HashSet::from([request.coordinate.clone(), root.id().clone()]);
        let mut queue: VecDeque<DependencyRequest> = root
            .descriptor
            .dependencies
            .iter()
            .map(|d| d.to_request())
            .collect();
        while let Some(dependency) = queue.pop_front() {
            if !seen.insert(dependency.coordinate.clone()) {
                continue;
            }
            ctx.check_interrupted()?;
            let Some(module) = self.resolve_one(resolver.as_ref(), &dependency, &mut ctx, &mut report)? else {
                continue;
            };
            seen.insert(module.id().clone());
            if dependency.transitive {
                queue.extend(module.descriptor.dependencies.iter().map(|d| d.to_request()));
            }
            report.dependencies.push(module);
        }
        Ok(report)
    }

    fn resolve_one(
        &self,
        resolver: &dyn DependencyResolver,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
        report: &mut ResolveReport,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        self.reporter.resolving(request, resolver.name());
        ctx.clear_attempts();
        ctx.set_current_resolved(None);
        let found = resolver.get_dependency(request, ctx)?;
        ctx.set_current_resolved(None);

        match found {
            Some(module) => {
                info!("resolved {} to {} with {}", request.coordinate, module.id(), module.resolver);
                self.reporter.resolved(request, module.id(), &module.resolver);
                ctx.mark_resolved(module.clone());
                Ok(Some(module))
            }
            None => {
                let attempts = ctx.failure_report();
                warn!("module not found: {}", request.coordinate);
                for line in &attempts {
                    warn!("{line}");
                }
                self.reporter.unresolved(request, &attempts);
                report.failure_report.extend(attempts);
                report.unresolved.push(request.clone());
                Ok(None)
            }
        }
    }

    /// Download the artifacts of `module` in `confs` (every artifact when
    /// `confs` is empty) through its artifact resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact resolver is unknown or the download
    /// is interrupted.
    pub fn download(
        &self,
        module: &ResolvedModule,
        confs: &[String],
        options: &ResolveOptions,
    ) -> Result<DownloadReport, ResolveError> {
        let resolver = self.resolver(Some(&module.artifact_resolver))?;
        let artifacts = artifacts_in(module, confs);
        debug!("downloading {} artifacts of {} with {}", artifacts.len(), module.id(), resolver.name());
        for artifact in &artifacts {
            self.reporter.downloading(artifact);
        }

        let mut ctx = self.context(options);
        let download = DownloadOptions {
            use_origin: self.settings.use_origin(),
        };
        let report = resolver.download(&artifacts, download, &mut ctx)?;
        for outcome in &report.artifacts {
            self.reporter.downloaded(outcome);
        }
        Ok(report)
    }

    /// Publish `artifacts` of `module` with `resolver` inside one transaction.
    ///
    /// Returns the destinations, in order.
    ///
    /// # Errors
    ///
    /// Returns the first publish error, after aborting the transaction.
    pub fn publish(
        &self,
        resolver: &str,
        module: &Coordinate,
        artifacts: &[(Artifact, PathBuf)],
        overwrite: bool,
    ) -> Result<Vec<String>, ResolveError> {
        let resolver = self.resolver(Some(resolver))?;
        resolver.begin_publish_transaction(module, overwrite)?;

        let mut destinations = Vec::with_capacity(artifacts.len());
        for (artifact, source) in artifacts {
            match resolver.publish(artifact, source, overwrite) {
                Ok(destination) => {
                    self.reporter.published(artifact, &destination);
                    destinations.push(destination);
                }
                Err(e) => {
                    match resolver.abort_publish_transaction() {
                        Ok(()) => self.reporter.warning(&format!("publication of {module} aborted: {e}")),
                        Err(abort) => {
                            warn!("failed to abort publication of {module}: {abort}");
                            self.reporter
                                .warning(&format!("publication of {module} failed and could not be aborted: {abort}"));
                        }
                    }
                    return Err(e);
                }
            }
        }
        resolver.commit_publish_transaction()?;
        info!("published {module} with {}", resolver.name());
        self.reporter
            .info(&format!("published {module} with {} ({} artifacts)", resolver.name(), destinations.len()));
        Ok(destinations)
    }
}

/// Artifacts of `module` in `confs`, each once.
fn artifacts_in(module: &ResolvedModule, confs: &[String]) -> Vec<Artifact> {
    if confs.is_empty() {
        return module.descriptor.all_artifacts();
    }
    let mut artifacts: Vec<Artifact> = Vec::new();
    for conf in confs {
        for artifact in module.descriptor.artifacts_for(conf) {
            if !artifacts.contains(&artifact) {
                artifacts.push(artifact);
            }
        }
    }
    artifacts
}
