//! Ordered fallback over member resolvers.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use trellis_schema::{
    Artifact, ArtifactDownloadReport, ArtifactOrigin, Coordinate, DependencyRequest, DownloadReport,
    ResolvedModule,
};

use super::{DependencyResolver, ResolverEnv, ResolverLookup, members};
use crate::acquire::DownloadOptions;
use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::pattern::TokenValues;
use crate::version::VersionMatcher;

#[derive(Debug, Clone)]
pub struct ChainResolverBuilder {
    name: String,
    resolvers: Vec<String>,
    return_first: bool,
    dual: bool,
}

impl ChainResolverBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolvers: Vec::new(),
            return_first: false,
            dual: false,
        }
    }

    /// Append a member, consulted after those already added.
    pub fn resolver(mut self, name: impl Into<String>) -> Self {
        self.resolvers.push(name.into());
        self
    }

    /// Stop at the first member that finds something.
    pub fn return_first(mut self, return_first: bool) -> Self {
        self.return_first = return_first;
        self
    }

    /// Serve the artifacts of found modules through the chain.
    pub fn dual(mut self, dual: bool) -> Self {
        self.dual = dual;
        self
    }

    /// Names of the members, for ordering finalization.
    pub fn member_names(&self) -> &[String] {
        &self.resolvers
    }

    /// # Errors
    ///
    /// Returns [`ResolveError::Configuration`] when a member is unknown.
    pub fn finalize(self, env: &ResolverEnv, lookup: &dyn ResolverLookup) -> Result<ChainResolver, ResolveError> {
        let members = members(&self.name, &self.resolvers, lookup)?;
        Ok(ChainResolver {
            name: self.name,
            members,
            return_first: self.return_first,
            dual: self.dual,
            matcher: Arc::clone(&env.matcher),
        })
    }
}

#[derive(Debug)]
pub struct ChainResolver {
    name: String,
    members: Vec<Arc<dyn DependencyResolver>>,
    return_first: bool,
    dual: bool,
    matcher: Arc<dyn VersionMatcher>,
}

impl ChainResolver {
    pub fn builder(name: impl Into<String>) -> ChainResolverBuilder {
        ChainResolverBuilder::new(name)
    }

    pub fn members(&self) -> &[Arc<dyn DependencyResolver>] {
        &self.members
    }

    fn first(&self) -> Result<&Arc<dyn DependencyResolver>, ResolveError> {
        self.members
            .first()
            .ok_or_else(|| ResolveError::IllegalState(format!("{}: no resolver in chain", self.name)))
    }

    /// Whether `module` answers a static request without asking further members.
    fn settles(&self, request: &DependencyRequest, module: Option<&ResolvedModule>) -> bool {
        module.is_some_and(|m| !m.is_default())
            && !request.force
            && !self.matcher.is_dynamic(&request.coordinate.revision)
    }

    fn attributed(&self, module: ResolvedModule) -> ResolvedModule {
        if self.dual {
            ResolvedModule {
                resolver: self.name.clone(),
                artifact_resolver: self.name.clone(),
                ..module
            }
        } else {
            module
        }
    }
}

impl DependencyResolver for ChainResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_dependency(
        &self,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        let incoming = ctx.current_resolved().cloned();
        let mut resolved = incoming.clone();
        let mut errors = Vec::new();
        let mut interrupted = None;

        for member in &self.members {
            if self.settles(request, resolved.as_ref()) {
                debug!("{}: {} already resolved, skipping {}", self.name, request.coordinate, member.name());
                break;
            }
            let previous = resolved.clone();
            ctx.set_current_resolved(previous.clone());
            let outcome = member.get_dependency(request, &mut ctx);
            if let Err(e) = ctx.check_interrupted() {
                interrupted = Some(e);
                break;
            }
            match outcome {
                Ok(found) => resolved = found,
                Err(e) if e.is_interrupted() => {
                    interrupted = Some(e);
                    break;
                }
                Err(e) => {
                    warn!("{}: {} failed on {}: {e}", self.name, member.name(), request.coordinate);
                    errors.push(e);
                    continue;
                }
            }
            if self.return_first && resolved.is_some() && resolved != previous {
                if let Some(module) = resolved.as_mut() {
                    debug!("{}: returning first found {}", self.name, module.id());
                    module.force = true;
                }
                break;
            }
        }
        // Restored on every exit, interrupted or not
        ctx.set_current_resolved(incoming.clone());
        if let Some(e) = interrupted {
            return Err(e);
        }

        if resolved.is_none() {
            if let Some(error) = ResolveError::merge(&request.coordinate, errors) {
                return Err(error);
            }
            return Ok(None);
        }
        if resolved == incoming {
            return Ok(resolved);
        }
        Ok(resolved.map(|module| self.attributed(module)))
    }

    fn download(
        &self,
        artifacts: &[Artifact],
        options: DownloadOptions,
        ctx: &mut ResolveContext,
    ) -> Result<DownloadReport, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        let mut report = DownloadReport::default();
        let mut pending = artifacts.to_vec();
        for member in &self.members {
            if pending.is_empty() {
                break;
            }
            let partial = member.download(&pending, options, &mut ctx)?;
            for outcome in partial.artifacts {
                report.upsert(outcome);
            }
            pending.retain(|a| report.report_for(a).is_none_or(|r| !r.is_ok()));
        }
        for artifact in pending {
            if report.report_for(&artifact).is_none() {
                report.push(ArtifactDownloadReport::failed(artifact, trellis_schema::MISSING_ARTIFACT));
            }
        }
        Ok(report)
    }

    fn locate(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<Option<ArtifactOrigin>, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        for member in &self.members {
            if let Some(origin) = member.locate(artifact, &mut ctx)? {
                return Ok(Some(origin));
            }
        }
        Ok(None)
    }

    fn exists(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<bool, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        for member in &self.members {
            if member.exists(artifact, &mut ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<String, ResolveError> {
        self.first()?.publish(artifact, source, overwrite)
    }

    fn begin_publish_transaction(&self, module: &Coordinate, overwrite: bool) -> Result<(), ResolveError> {
        self.first()?.begin_publish_transaction(module, overwrite)
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolveError> {
        self.first()?.commit_publish_transaction()
    }

    fn abort_publish_transaction(&self) -> Result<(), ResolveError> {
        self.first()?.abort_publish_transaction()
    }

    fn list_tokens(&self, token: &str, known: &TokenValues) -> Result<BTreeSet<String>, ResolveError> {
        let mut all = BTreeSet::new();
        for member in &self.members {
            all.extend(member.list_tokens(token, known)?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Stub, env};
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn chain(builder: ChainResolverBuilder, stubs: Vec<Arc<Stub>>) -> ChainResolver {
        let dir = TempDir::new().unwrap();
        let registry: BTreeMap<String, Arc<dyn DependencyResolver>> = stubs
            .into_iter()
            .map(|s| (s.name.clone(), s as Arc<dyn DependencyResolver>))
            .collect();
        builder.finalize(&env(dir.path()), &registry).unwrap()
    }

    fn request() -> DependencyRequest {
        DependencyRequest::new(Coordinate::new("acme", "lib", "1.0"))
    }

    fn coordinate() -> Coordinate {
        Coordinate::new("acme", "lib", "1.0")
    }

    #[test]
    fn test_second_member_found() {
        let a = Arc::new(Stub::named("a"));
        let b = Arc::new(Stub::serving("b", coordinate()));
        let plain = chain(
            ChainResolver::builder("main").resolver("a").resolver("b"),
            vec![Arc::clone(&a), Arc::clone(&b)],
        );
        let module = plain.get_dependency(&request(), &mut ResolveContext::new()).unwrap().unwrap();
        assert_eq!(module.resolver, "b");
        assert_eq!(module.artifact_resolver, "b");
        assert_eq!((a.calls(), b.calls()), (1, 1));

        let dual = chain(
            ChainResolver::builder("main").resolver("a").resolver("b").dual(true),
            vec![a, b],
        );
        let module = dual.get_dependency(&request(), &mut ResolveContext::new()).unwrap().unwrap();
        assert_eq!(module.resolver, "main");
        assert_eq!(module.artifact_resolver, "main");
    }

    #[test]
    fn test_static_found_module_skips_later_members() {
        let a = Arc::new(Stub::serving("a", coordinate()));
        let b = Arc::new(Stub::serving("b", coordinate()));
        let resolver = chain(
            ChainResolver::builder("main").resolver("a").resolver("b"),
            vec![Arc::clone(&a), Arc::clone(&b)],
        );
        let module = resolver.get_dependency(&request(), &mut ResolveContext::new()).unwrap().unwrap();
        assert_eq!(module.resolver, "a");
        assert_eq!(b.calls(), 0);

        resolver
            .get_dependency(&request().force(true), &mut ResolveContext::new())
            .unwrap();
        assert_eq!(b.calls(), 1);
    }

    #[test]
    fn test_return_first_marks_force() {
        let a = Arc::new(Stub::serving("a", coordinate().with_revision("1.5")));
        let b = Arc::new(Stub::serving("b", coordinate().with_revision("2.0")));
        let resolver = chain(
            ChainResolver::builder("main").resolver("a").resolver("b").return_first(true),
            vec![a, Arc::clone(&b)],
        );
        let dynamic = DependencyRequest::new(coordinate().with_revision("latest.integration"));
        let module = resolver.get_dependency(&dynamic, &mut ResolveContext::new()).unwrap().unwrap();
        assert!(module.force);
        assert_eq!(module.id().revision, "1.5");
        assert_eq!(b.calls(), 0);
    }

    #[test]
    fn test_member_errors_are_collected() {
        let single = chain(
            ChainResolver::builder("main").resolver("bad").resolver("empty"),
            vec![
                Arc::new(Stub::failing("bad", || ResolveError::IllegalState("broken".into()))),
                Arc::new(Stub::named("empty")),
            ],
        );
        let err = single.get_dependency(&request(), &mut ResolveContext::new()).unwrap_err();
        assert!(matches!(err, ResolveError::IllegalState(_)));

        let several = chain(
            ChainResolver::builder("main").resolver("x").resolver("y"),
            vec![
                Arc::new(Stub::failing("x", || ResolveError::IllegalState("first".into()))),
                Arc::new(Stub::failing("y", || ResolveError::IllegalState("second".into()))),
            ],
        );
        let err = several.get_dependency(&request(), &mut ResolveContext::new()).unwrap_err();
        match err {
            ResolveError::Aggregate { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other}"),
        }

        let recovered = chain(
            ChainResolver::builder("main").resolver("bad").resolver("good"),
            vec![
                Arc::new(Stub::failing("bad", || ResolveError::IllegalState("broken".into()))),
                Arc::new(Stub::serving("good", coordinate())),
            ],
        );
        let module = recovered.get_dependency(&request(), &mut ResolveContext::new()).unwrap().unwrap();
        assert_eq!(module.resolver, "good");
    }

    #[test]
    fn test_interrupt_ends_chain() {
        let b = Arc::new(Stub::serving("b", coordinate()));
        let resolver = chain(
            ChainResolver::builder("main").resolver("a").resolver("b"),
            vec![Arc::new(Stub::failing("a", || ResolveError::Interrupted)), Arc::clone(&b)],
        );
        let err = resolver.get_dependency(&request(), &mut ResolveContext::new()).unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(b.calls(), 0);
    }

    #[test]
    fn test_interrupt_restores_accumulator() {
        let resolver = chain(
            ChainResolver::builder("main").resolver("a").resolver("b"),
            vec![
                Arc::new(Stub::serving("a", coordinate())),
                Arc::new(Stub::failing("b", || ResolveError::Interrupted)),
            ],
        );
        let dynamic = DependencyRequest::new(Coordinate::new("acme", "lib", "latest.integration"));

        let mut ctx = ResolveContext::new();
        let err = resolver.get_dependency(&dynamic, &mut ctx).unwrap_err();
        assert!(err.is_interrupted());
        assert!(ctx.current_resolved().is_none());

        let earlier = Stub::serving("earlier", Coordinate::new("acme", "lib", "0.9")).module;
        let mut ctx = ResolveContext::new();
        ctx.set_current_resolved(earlier.clone());
        resolver.get_dependency(&dynamic, &mut ctx).unwrap_err();
        assert_eq!(ctx.current_resolved(), earlier.as_ref());
    }

    #[test]
    fn test_download_falls_through_members() {
        let a = Arc::new(Stub::named("a"));
        let b = Arc::new(Stub::serving("b", coordinate()));
        let resolver = chain(
            ChainResolver::builder("main").resolver("a").resolver("b"),
            vec![Arc::clone(&a), Arc::clone(&b)],
        );
        let jar = Artifact::new(coordinate(), "lib", "jar", "jar");
        let report = resolver
            .download(std::slice::from_ref(&jar), DownloadOptions::default(), &mut ResolveContext::new())
            .unwrap();
        assert!(!report.has_failures());
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(a.log(), vec!["download lib"]);
        assert_eq!(b.log(), vec!["download lib"]);

        let origin = resolver.locate(&jar, &mut ResolveContext::new()).unwrap().unwrap();
        assert_eq!(origin.location, "b/lib");
    }

    #[test]
    fn test_publish_goes_to_first_and_lists_merge() {
        let a = Arc::new(Stub::named("a"));
        let b = Arc::new(Stub::named("b"));
        let resolver = chain(
            ChainResolver::builder("main").resolver("a").resolver("b"),
            vec![Arc::clone(&a), Arc::clone(&b)],
        );
        resolver.begin_publish_transaction(&coordinate(), false).unwrap();
        let jar = Artifact::new(coordinate(), "lib", "jar", "jar");
        assert_eq!(resolver.publish(&jar, Path::new("lib.jar"), false).unwrap(), "a/lib");
        resolver.commit_publish_transaction().unwrap();
        assert_eq!(a.log(), vec!["begin acme#lib;1.0", "publish lib", "commit"]);
        assert!(b.log().is_empty());

        let orgs = resolver.list_organisations().unwrap();
        assert_eq!(orgs.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_member_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let registry: BTreeMap<String, Arc<dyn DependencyResolver>> = BTreeMap::new();
        let err = ChainResolver::builder("main")
            .resolver("ghost")
            .finalize(&env(dir.path()), &registry)
            .unwrap_err();
        assert_eq!(err.to_string(), "configuration error: main: unknown resolver 'ghost'");
    }
}
