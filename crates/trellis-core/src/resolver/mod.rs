//! Dependency resolvers: the pattern based core and its compositions.
//!
//! Every resolver is frozen at construction. Settings accumulate in a
//! builder, and `finalize` turns the builder into an immutable runtime
//! resolver once the shared [`ResolverEnv`] is known.

mod chain;
mod dual;
mod protocol;
mod repository;
mod transaction;

pub use chain::{ChainResolver, ChainResolverBuilder};
pub use dual::{DualResolver, DualResolverBuilder};
pub use repository::{RepositoryResolver, RepositoryResolverBuilder, Transactional};

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use trellis_schema::{
    Artifact, ArtifactOrigin, ChecksumAlgorithm, Coordinate, DependencyRequest, DownloadReport,
    ResolvedModule, StatusSet,
};

use crate::acquire::DownloadOptions;
use crate::cache::RepositoryCache;
use crate::context::ResolveContext;
use crate::descriptor::DescriptorParser;
use crate::error::ResolveError;
use crate::latest::LatestStrategy;
use crate::pattern::{TokenValues, tokens};
use crate::version::VersionMatcher;

/// Collaborators and defaults shared by every resolver of a settings instance.
#[derive(Debug, Clone)]
pub struct ResolverEnv {
    pub cache: Arc<RepositoryCache>,
    pub matcher: Arc<dyn VersionMatcher>,
    pub strategy: Arc<dyn LatestStrategy>,
    pub parser: Arc<dyn DescriptorParser>,
    pub statuses: StatusSet,
    /// Identity matched against `rev@<workspace>` revisions.
    pub workspace_name: String,
    pub checksums: Vec<ChecksumAlgorithm>,
    pub check_modified: bool,
    pub changing_pattern: Option<Regex>,
}

/// A source of module metadata and artifacts.
///
/// `get_dependency` returns the best module known so far: the module it
/// found, or the one accumulated by an enclosing chain
/// ([`ResolveContext::current_resolved`]) when it found nothing better.
pub trait DependencyResolver: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Resolve one request.
    ///
    /// # Errors
    ///
    /// Not found is `Ok`. Errors are hard failures such as inconsistent
    /// metadata, an unsolvable conflict or an interruption.
    fn get_dependency(
        &self,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError>;

    /// Acquire `artifacts` into the cache, one report per artifact.
    ///
    /// # Errors
    ///
    /// Only [`ResolveError::Interrupted`]; per artifact failures are reported.
    fn download(
        &self,
        artifacts: &[Artifact],
        options: DownloadOptions,
        ctx: &mut ResolveContext,
    ) -> Result<DownloadReport, ResolveError>;

    /// Origin of the resource `artifact` would be downloaded from.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository cannot be queried.
    fn locate(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<Option<ArtifactOrigin>, ResolveError>;

    /// # Errors
    ///
    /// Returns an error when the repository cannot be queried.
    fn exists(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<bool, ResolveError> {
        Ok(self.locate(artifact, ctx)?.is_some())
    }

    /// Publish `source` as `artifact`. Returns the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination exists and `overwrite` is unset,
    /// or if the transfer fails.
    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<String, ResolveError>;

    /// # Errors
    ///
    /// Returns [`ResolveError::TransactionMisuse`] if a transaction is open,
    /// or [`ResolveError::UnsupportedTransaction`] when transactions are required.
    fn begin_publish_transaction(&self, _module: &Coordinate, _overwrite: bool) -> Result<(), ResolveError> {
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ResolveError::TransactionMisuse`] without an open transaction.
    fn commit_publish_transaction(&self) -> Result<(), ResolveError> {
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the staging area cannot be removed.
    fn abort_publish_transaction(&self) -> Result<(), ResolveError> {
        Ok(())
    }

    /// Values of `token` given the `known` values of other tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if a listing fails.
    fn list_tokens(&self, token: &str, known: &TokenValues) -> Result<BTreeSet<String>, ResolveError>;

    /// # Errors
    ///
    /// Returns an error if a listing fails.
    fn list_organisations(&self) -> Result<BTreeSet<String>, ResolveError> {
        self.list_tokens(tokens::ORGANISATION, &TokenValues::new())
    }

    /// # Errors
    ///
    /// Returns an error if a listing fails.
    fn list_modules(&self, organisation: &str) -> Result<BTreeSet<String>, ResolveError> {
        let mut known = TokenValues::new();
        known.set(tokens::ORGANISATION, organisation);
        self.list_tokens(tokens::MODULE, &known)
    }

    /// # Errors
    ///
    /// Returns an error if a listing fails.
    fn list_revisions(&self, organisation: &str, module: &str) -> Result<BTreeSet<String>, ResolveError> {
        let mut known = TokenValues::new();
        known.set(tokens::ORGANISATION, organisation).set(tokens::MODULE, module);
        self.list_tokens(tokens::REVISION, &known)
    }
}

/// Name lookup used when compositions are finalized.
pub trait ResolverLookup {
    fn lookup(&self, name: &str) -> Option<Arc<dyn DependencyResolver>>;
}

impl ResolverLookup for std::collections::BTreeMap<String, Arc<dyn DependencyResolver>> {
    fn lookup(&self, name: &str) -> Option<Arc<dyn DependencyResolver>> {
        self.get(name).cloned()
    }
}

/// Members named by a composition, in order.
fn members(
    owner: &str,
    names: &[String],
    lookup: &dyn ResolverLookup,
) -> Result<Vec<Arc<dyn DependencyResolver>>, ResolveError> {
    names
        .iter()
        .map(|name| {
            lookup.lookup(name).ok_or_else(|| {
                ResolveError::Configuration(format!("{owner}: unknown resolver '{name}'"))
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by resolver tests.

    use super::*;
    use crate::descriptor::JsonDescriptorParser;
    use crate::latest::LatestRevisionStrategy;
    use crate::version::ChainVersionMatcher;

    pub(crate) fn env(cache_root: &Path) -> ResolverEnv {
        let strategy: Arc<dyn LatestStrategy> = Arc::new(LatestRevisionStrategy::default());
        ResolverEnv {
            cache: Arc::new(RepositoryCache::new(cache_root)),
            matcher: Arc::new(ChainVersionMatcher::standard(StatusSet::default(), Arc::clone(&strategy))),
            strategy,
            parser: Arc::new(JsonDescriptorParser),
            statuses: StatusSet::default(),
            workspace_name: "ws".to_string(),
            checksums: vec![ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5],
            check_modified: false,
            changing_pattern: None,
        }
    }

    /// Resolver answering from a fixed module and recording what it is asked.
    #[derive(Debug, Default)]
    pub(crate) struct Stub {
        pub(crate) name: String,
        pub(crate) module: Option<ResolvedModule>,
        pub(crate) fail: Option<fn() -> ResolveError>,
        pub(crate) calls: std::sync::atomic::AtomicUsize,
        pub(crate) log: std::sync::Mutex<Vec<String>>,
    }

    impl Stub {
        pub(crate) fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }

        pub(crate) fn serving(name: &str, coordinate: Coordinate) -> Self {
            let descriptor = trellis_schema::ModuleDescriptor::new(coordinate, "release");
            Self {
                module: Some(ResolvedModule::new(descriptor, name)),
                ..Self::named(name)
            }
        }

        pub(crate) fn failing(name: &str, fail: fn() -> ResolveError) -> Self {
            Self {
                fail: Some(fail),
                ..Self::named(name)
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }

        pub(crate) fn log(&self) -> Vec<String> {
            self.log.lock().map(|l| l.clone()).unwrap_or_default()
        }

        fn record(&self, entry: String) {
            if let Ok(mut log) = self.log.lock() {
                log.push(entry);
            }
        }
    }

    impl DependencyResolver for Stub {
        fn name(&self) -> &str {
            &self.name
        }

        fn get_dependency(
            &self,
            _request: &DependencyRequest,
            ctx: &mut ResolveContext,
        ) -> Result<Option<ResolvedModule>, ResolveError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            Ok(self.module.clone().or_else(|| ctx.current_resolved().cloned()))
        }

        fn download(
            &self,
            artifacts: &[Artifact],
            _options: DownloadOptions,
            _ctx: &mut ResolveContext,
        ) -> Result<DownloadReport, ResolveError> {
            let mut report = DownloadReport::default();
            for artifact in artifacts {
                self.record(format!("download {}", artifact.name));
                let mut outcome = trellis_schema::ArtifactDownloadReport::new(artifact.clone());
                if self.module.is_some() {
                    outcome.status = trellis_schema::DownloadStatus::Successful;
                    outcome.origin = Some(ArtifactOrigin::remote(format!("{}/{}", self.name, artifact.name)));
                } else {
                    outcome.details = Some(trellis_schema::MISSING_ARTIFACT.to_string());
                }
                report.push(outcome);
            }
            Ok(report)
        }

        fn locate(&self, artifact: &Artifact, _ctx: &mut ResolveContext) -> Result<Option<ArtifactOrigin>, ResolveError> {
            Ok(self
                .module
                .as_ref()
                .map(|_| ArtifactOrigin::remote(format!("{}/{}", self.name, artifact.name))))
        }

        fn publish(&self, artifact: &Artifact, _source: &Path, _overwrite: bool) -> Result<String, ResolveError> {
            self.record(format!("publish {}", artifact.name));
            Ok(format!("{}/{}", self.name, artifact.name))
        }

        fn begin_publish_transaction(&self, module: &Coordinate, _overwrite: bool) -> Result<(), ResolveError> {
            self.record(format!("begin {module}"));
            Ok(())
        }

        fn commit_publish_transaction(&self) -> Result<(), ResolveError> {
            self.record("commit".to_string());
            Ok(())
        }

        fn abort_publish_transaction(&self) -> Result<(), ResolveError> {
            self.record("abort".to_string());
            Ok(())
        }

        fn list_tokens(&self, _token: &str, _known: &TokenValues) -> Result<BTreeSet<String>, ResolveError> {
            Ok(BTreeSet::from([self.name.clone()]))
        }
    }
}
