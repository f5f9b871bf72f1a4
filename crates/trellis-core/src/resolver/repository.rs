//! Pattern based resolver over a [`Repository`].
//!
//! One implementation serves every repository kind: the filesystem and
//! URL flavours differ only by the injected [`Repository`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};
use trellis_schema::{
    Artifact, ArtifactOrigin, ChecksumAlgorithm, Coordinate, DESCRIPTOR_EXT, DESCRIPTOR_NAME,
    DESCRIPTOR_TYPE, DependencyRequest, DownloadReport, DownloadStatus, MISSING_ARTIFACT,
    ResolvedModule,
};

use super::transaction::{OpenTransaction, TransactionLayout};
use super::{DependencyResolver, ResolverEnv};
use crate::acquire::DownloadOptions;
use crate::checksum;
use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::locator::{Candidate, ResourceLocator, resolve_token_values};
use crate::namespace::{CoordinateTransform, Identity, M2Layout, Namespace, transform_artifact};
use crate::pattern::{TokenValues, has_token, substitute, tokens};
use crate::repository::Repository;
use crate::selector::CandidateSelector;

/// Whether publication goes through a staging directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Transactional {
    /// Use transactions when the layout allows it, publish directly otherwise.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Fail publication when transactions are not possible.
    #[serde(rename = "true")]
    Required,
    #[serde(rename = "false")]
    Disabled,
}

/// Names never offered as revisions or listing results.
const DEFAULT_IGNORED: &[&str] = &["CVS", ".svn", ".git"];

/// Accumulates the settings of a [`RepositoryResolver`].
#[derive(Debug, Clone)]
pub struct RepositoryResolverBuilder {
    name: String,
    repository: Option<Arc<dyn Repository>>,
    descriptor_patterns: Vec<String>,
    artifact_patterns: Vec<String>,
    m2_compatible: bool,
    allow_missing_descriptor: bool,
    check_modified: Option<bool>,
    changing_pattern: Option<String>,
    checksums: Option<String>,
    check_consistency: bool,
    always_check_exact: bool,
    dynamic_revisions: bool,
    transactional: Transactional,
    namespace: Option<Arc<Namespace>>,
    ignored: Vec<String>,
}

impl RepositoryResolverBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: None,
            descriptor_patterns: Vec::new(),
            artifact_patterns: Vec::new(),
            m2_compatible: false,
            allow_missing_descriptor: true,
            check_modified: None,
            changing_pattern: None,
            checksums: None,
            check_consistency: true,
            always_check_exact: false,
            dynamic_revisions: true,
            transactional: Transactional::Auto,
            namespace: None,
            ignored: DEFAULT_IGNORED.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn descriptor_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.descriptor_patterns.push(pattern.into());
        self
    }

    pub fn artifact_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.artifact_patterns.push(pattern.into());
        self
    }

    pub fn m2_compatible(mut self, m2: bool) -> Self {
        self.m2_compatible = m2;
        self
    }

    pub fn allow_missing_descriptor(mut self, allow: bool) -> Self {
        self.allow_missing_descriptor = allow;
        self
    }

    /// Overrides the settings-wide value.
    pub fn check_modified(mut self, check: bool) -> Self {
        self.check_modified = Some(check);
        self
    }

    /// Overrides the settings-wide value.
    pub fn changing_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.changing_pattern = Some(pattern.into());
        self
    }

    /// Comma separated algorithm list, overriding the settings-wide value.
    pub fn checksums(mut self, list: impl Into<String>) -> Self {
        self.checksums = Some(list.into());
        self
    }

    pub fn check_consistency(mut self, check: bool) -> Self {
        self.check_consistency = check;
        self
    }

    pub fn always_check_exact(mut self, check: bool) -> Self {
        self.always_check_exact = check;
        self
    }

    pub fn dynamic_revisions(mut self, accept: bool) -> Self {
        self.dynamic_revisions = accept;
        self
    }

    pub fn transactional(mut self, mode: Transactional) -> Self {
        self.transactional = mode;
        self
    }

    pub fn namespace(mut self, namespace: Arc<Namespace>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored.push(name.into());
        self
    }

    /// Freeze the builder against the shared environment.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Configuration`] when no repository or pattern
    /// is set, or when the checksum list or changing pattern is invalid.
    pub fn finalize(self, env: &ResolverEnv) -> Result<RepositoryResolver, ResolveError> {
        let config = |msg: String| ResolveError::Configuration(format!("{}: {msg}", self.name));
        let repository = self
            .repository
            .clone()
            .ok_or_else(|| config("no repository configured".to_string()))?;
        if self.descriptor_patterns.is_empty() && self.artifact_patterns.is_empty() {
            return Err(config("no pattern configured".to_string()));
        }
        let checksums = match &self.checksums {
            Some(list) => ChecksumAlgorithm::parse_list(list).map_err(|e| config(e.to_string()))?,
            None => env.checksums.clone(),
        };
        let changing_pattern = match &self.changing_pattern {
            Some(pattern) => {
                Some(Regex::new(&format!("^(?:{pattern})$")).map_err(|e| config(e.to_string()))?)
            }
            None => env.changing_pattern.clone(),
        };

        let layout = if repository.supports_transactions() {
            TransactionLayout::detect(self.descriptor_patterns.first(), self.artifact_patterns.first())
        } else {
            Err(format!("{} repositories cannot rename", repository.name()))
        };
        if let Err(reason) = &layout {
            debug!("{}: transactions unavailable: {reason}", self.name);
        }

        Ok(RepositoryResolver {
            check_modified: self.check_modified.unwrap_or(env.check_modified),
            name: self.name,
            repository,
            descriptor_patterns: self.descriptor_patterns,
            artifact_patterns: self.artifact_patterns,
            m2_compatible: self.m2_compatible,
            allow_missing_descriptor: self.allow_missing_descriptor,
            changing_pattern,
            checksums,
            check_consistency: self.check_consistency,
            always_check_exact: self.always_check_exact,
            dynamic_revisions: self.dynamic_revisions,
            namespace: self.namespace,
            ignored: self.ignored,
            env: env.clone(),
            transactional: self.transactional,
            layout,
            transaction: Mutex::new(TransactionState::Idle),
        })
    }
}

#[derive(Debug)]
enum TransactionState {
    Idle,
    Open(OpenTransaction),
    /// `begin` fell back to direct publication.
    Declined,
}

/// Resolver locating descriptors and artifacts through patterns.
#[derive(Debug)]
pub struct RepositoryResolver {
    pub(super) name: String,
    pub(super) repository: Arc<dyn Repository>,
    pub(super) descriptor_patterns: Vec<String>,
    pub(super) artifact_patterns: Vec<String>,
    pub(super) m2_compatible: bool,
    pub(super) allow_missing_descriptor: bool,
    pub(super) check_modified: bool,
    pub(super) changing_pattern: Option<Regex>,
    pub(super) checksums: Vec<ChecksumAlgorithm>,
    pub(super) check_consistency: bool,
    pub(super) always_check_exact: bool,
    pub(super) dynamic_revisions: bool,
    pub(super) namespace: Option<Arc<Namespace>>,
    pub(super) ignored: Vec<String>,
    pub(super) env: ResolverEnv,
    transactional: Transactional,
    layout: Result<TransactionLayout, String>,
    transaction: Mutex<TransactionState>,
}

impl RepositoryResolver {
    pub fn builder(name: impl Into<String>) -> RepositoryResolverBuilder {
        RepositoryResolverBuilder::new(name)
    }

    pub(super) fn from_system(&self) -> &dyn CoordinateTransform {
        match self.namespace.as_deref() {
            Some(namespace) => namespace.from_system(),
            None => &Identity,
        }
    }

    pub(super) fn to_system(&self) -> &dyn CoordinateTransform {
        match self.namespace.as_deref() {
            Some(namespace) => namespace.to_system(),
            None => &Identity,
        }
    }

    /// `artifact` as substituted into patterns.
    pub(super) fn path_form(&self, artifact: &Artifact) -> Artifact {
        if self.m2_compatible {
            transform_artifact(&M2Layout, artifact)
        } else {
            artifact.clone()
        }
    }

    pub(super) fn locator(&self, with_parser: bool) -> ResourceLocator<'_> {
        ResourceLocator {
            resolver: &self.name,
            repository: &self.repository,
            matcher: self.env.matcher.as_ref(),
            always_check_exact: self.always_check_exact,
            parser: with_parser.then_some(self.env.parser.as_ref()),
        }
    }

    pub(super) fn selector(&self) -> CandidateSelector<'_> {
        CandidateSelector {
            resolver: &self.name,
            strategy: self.env.strategy.as_ref(),
            matcher: self.env.matcher.as_ref(),
            ignored: &self.ignored,
        }
    }

    /// Best resource for an artifact given in the resolver's namespace.
    pub(super) fn find_artifact_ref(
        &self,
        artifact: &Artifact,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<Candidate>, ResolveError> {
        let candidates = self
            .locator(false)
            .locate(&self.path_form(artifact), &self.artifact_patterns, ctx)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut no_descriptor = |_: &Candidate, _: &mut ResolveContext| Ok(None);
        let request = request.with_coordinate(artifact.module.clone());
        Ok(self
            .selector()
            .select(&request, candidates, &mut no_descriptor, ctx)?
            .map(|selected| selected.candidate))
    }

    /// Locate an artifact given in system namespace.
    fn locate_system(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<Option<Candidate>, ResolveError> {
        let local = transform_artifact(self.from_system(), artifact);
        let request = DependencyRequest::new(local.module.clone());
        self.find_artifact_ref(&local, &request, ctx)
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.transaction.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Layout to use for transactions, or `None` to publish directly.
    fn transaction_layout(&self) -> Result<Option<&TransactionLayout>, ResolveError> {
        if self.transactional == Transactional::Disabled {
            return Ok(None);
        }
        match &self.layout {
            Ok(layout) => Ok(Some(layout)),
            Err(reason) => self.unsupported_transaction(reason).map(|()| None),
        }
    }

    fn unsupported_transaction(&self, reason: &str) -> Result<(), ResolveError> {
        if self.transactional == Transactional::Required {
            return Err(ResolveError::UnsupportedTransaction {
                resolver: self.name.clone(),
                reason: reason.to_string(),
            });
        }
        debug!("{} does not support transaction. {reason}", self.name);
        Ok(())
    }

    fn destination(&self, pattern: &str, artifact: &Artifact) -> Result<String, ResolveError> {
        let values = TokenValues::for_artifact(&self.path_form(artifact));
        if let TransactionState::Open(_) = &*self.lock() {
            if let Ok(layout) = &self.layout {
                let staged = layout.staged_pattern(pattern).ok_or_else(|| {
                    ResolveError::Configuration(format!(
                        "unsupported pattern for publish destination pattern: {pattern}"
                    ))
                })?;
                return Ok(substitute(staged, &values)?);
            }
        }
        Ok(substitute(pattern, &values)?)
    }

    fn put_checksum(
        &self,
        artifact: &Artifact,
        source: &Path,
        destination: &str,
        overwrite: bool,
        algorithm: ChecksumAlgorithm,
    ) -> Result<(), ResolveError> {
        let digest = checksum::compute(source, algorithm)?;
        let temp = tempfile::Builder::new().prefix("trellis-checksum").tempfile()?;
        std::fs::write(temp.path(), digest)?;
        let mut side = artifact.clone();
        side.kind = algorithm.name().to_string();
        side.ext = format!("{}.{}", artifact.ext, algorithm.name());
        self.repository
            .put(&side, temp.path(), &format!("{destination}.{}", algorithm.name()), overwrite)?;
        Ok(())
    }
}

impl DependencyResolver for RepositoryResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_dependency(
        &self,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        self.resolve(request, ctx)
    }

    fn download(
        &self,
        artifacts: &[Artifact],
        options: DownloadOptions,
        ctx: &mut ResolveContext,
    ) -> Result<DownloadReport, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        let mut report = DownloadReport::default();
        for artifact in artifacts {
            ctx.set_current_artifact(Some(artifact.clone()));
            let mut locate = |a: &Artifact, c: &mut ResolveContext| self.locate_system(a, c);
            let outcome = self
                .env
                .cache
                .download(artifact, &mut locate, &self.checksums, options, &mut ctx)?;
            match outcome.status {
                DownloadStatus::Failed if outcome.details.as_deref() != Some(MISSING_ARTIFACT) => {
                    warn!("{}: {outcome}", self.name);
                }
                DownloadStatus::Successful => info!("{}: {outcome}", self.name),
                _ => debug!("{}: {outcome}", self.name),
            }
            report.push(outcome);
            ctx.check_interrupted()?;
        }
        ctx.set_current_artifact(None);
        Ok(report)
    }

    fn locate(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<Option<ArtifactOrigin>, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        Ok(self.locate_system(artifact, &mut ctx)?.map(|candidate| {
            if candidate.resource.local {
                ArtifactOrigin::local(candidate.resource.name)
            } else {
                ArtifactOrigin::remote(candidate.resource.name)
            }
        }))
    }

    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<String, ResolveError> {
        let pattern = match (artifact.is_descriptor(), self.descriptor_patterns.first()) {
            (true, Some(pattern)) => pattern,
            _ => self.artifact_patterns.first().ok_or_else(|| {
                ResolveError::IllegalState(format!(
                    "impossible to publish {artifact} using {}: no artifact pattern defined",
                    self.name
                ))
            })?,
        };
        let destination = self.destination(pattern, artifact)?;
        self.repository.put(artifact, source, &destination, overwrite)?;
        for &algorithm in &self.checksums {
            self.put_checksum(artifact, source, &destination, overwrite, algorithm)?;
        }
        info!("{}: published {} to {destination}", self.name, artifact.name);
        Ok(destination)
    }

    fn begin_publish_transaction(&self, module: &Coordinate, overwrite: bool) -> Result<(), ResolveError> {
        let Some(layout) = self.transaction_layout()? else {
            return Ok(());
        };
        let mut state = self.lock();
        if matches!(*state, TransactionState::Open(_)) {
            return Err(ResolveError::TransactionMisuse(
                "a transaction is already started and not closed!".to_string(),
            ));
        }
        if overwrite {
            self.unsupported_transaction("overwrite transaction not supported yet")?;
            *state = TransactionState::Declined;
            return Ok(());
        }

        let module = if self.m2_compatible {
            M2Layout.transform(module)
        } else {
            module.clone()
        };
        let (staging, destination) = layout.directories(&module)?;
        if self.repository.exists(&destination)? {
            self.unsupported_transaction(&format!(
                "transaction destination directory already exists: {destination}"
            ))?;
            *state = TransactionState::Declined;
            return Ok(());
        }
        debug!("{}: starting transaction, publishing into {staging} until commit to {destination}", self.name);
        *state = TransactionState::Open(OpenTransaction { staging, destination });
        Ok(())
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolveError> {
        if self.transaction_layout()?.is_none() {
            return Ok(());
        }
        let open = match std::mem::replace(&mut *self.lock(), TransactionState::Idle) {
            TransactionState::Open(open) => open,
            TransactionState::Declined => return Ok(()),
            TransactionState::Idle => {
                return Err(ResolveError::TransactionMisuse("no current transaction!".to_string()));
            }
        };
        let OpenTransaction { staging, destination } = open;
        if self.repository.exists(&destination)? {
            return Err(ResolveError::IllegalState(format!(
                "impossible to commit transaction: transaction destination directory already exists: {destination}\n\
                 possible cause: usage of identifying tokens after the revision token"
            )));
        }
        if let Err(e) = self.repository.rename(&staging, &destination) {
            let message = match self.repository.delete(&staging) {
                Ok(()) => format!("publish transaction commit error for {destination}: rolled back"),
                Err(_) => format!(
                    "publish transaction commit error for {destination}: rollback impossible either, please remove {staging} manually"
                ),
            };
            return Err(ResolveError::IllegalState(format!("{message}: {e}")));
        }
        info!("{}: publish committed: moved {staging} to {destination}", self.name);
        Ok(())
    }

    fn abort_publish_transaction(&self) -> Result<(), ResolveError> {
        if self.transaction_layout()?.is_none() {
            return Ok(());
        }
        match std::mem::replace(&mut *self.lock(), TransactionState::Idle) {
            TransactionState::Open(open) => {
                self.repository.delete(&open.staging)?;
                info!("{}: publish aborted: deleted {}", self.name, open.staging);
            }
            TransactionState::Declined => {}
            TransactionState::Idle => {
                return Err(ResolveError::TransactionMisuse("no current transaction!".to_string()));
            }
        }
        Ok(())
    }

    fn list_tokens(&self, token: &str, known: &TokenValues) -> Result<BTreeSet<String>, ResolveError> {
        let mut values = known.clone();
        let organisation = known
            .get(tokens::ORGANISATION)
            .or_else(|| known.get(tokens::ORGANIZATION))
            .map(|org| if self.m2_compatible { org.replace('.', "/") } else { org.to_string() });
        if let Some(org) = organisation {
            values
                .set(tokens::ORGANISATION, org.clone())
                .set(tokens::ORGANIZATION, org.clone())
                .set(tokens::ORG_PATH, org.replace('.', "/"));
        }

        let mut found = BTreeSet::new();
        let repository = self.repository.as_ref();
        for pattern in self.descriptor_patterns.iter().filter(|p| has_token(p, token)) {
            let mut values = values.clone();
            values
                .set(tokens::ARTIFACT, DESCRIPTOR_NAME)
                .set(tokens::TYPE, DESCRIPTOR_TYPE)
                .set(tokens::EXT, DESCRIPTOR_EXT);
            found.extend(resolve_token_values(repository, pattern, token, &values)?);
        }
        for pattern in self.artifact_patterns.iter().filter(|p| has_token(p, token)) {
            let mut values = values.clone();
            if values.get(tokens::ARTIFACT).is_none() {
                if let Some(module) = values.get(tokens::MODULE).map(str::to_string) {
                    values.set(tokens::ARTIFACT, module);
                }
            }
            found.extend(resolve_token_values(repository, pattern, token, &values)?);
        }
        found.retain(|value| !self.ignored.contains(value));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::env;
    use super::*;
    use crate::repository::FileRepository;
    use std::fs;
    use tempfile::TempDir;

    fn resolver(dir: &Path, mode: Transactional) -> RepositoryResolver {
        let root = dir.join("repo").display().to_string();
        RepositoryResolver::builder("local")
            .repository(Arc::new(FileRepository::new()))
            .descriptor_pattern(format!("{root}/[organisation]/[module]/[revision]/module.json"))
            .artifact_pattern(format!("{root}/[organisation]/[module]/[revision]/[artifact].[ext]"))
            .transactional(mode)
            .finalize(&env(&dir.join("cache")))
            .unwrap()
    }

    fn source(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("lib.jar");
        fs::write(&path, b"jar bytes").unwrap();
        path
    }

    fn jar() -> Artifact {
        Artifact::new(Coordinate::new("acme", "lib", "1.0"), "lib", "jar", "jar")
    }

    #[test]
    fn test_publish_writes_checksums() {
        let dir = TempDir::new().unwrap();
        let r = resolver(dir.path(), Transactional::Disabled);
        let dest = r.publish(&jar(), &source(dir.path()), false).unwrap();
        assert!(dest.ends_with("repo/acme/lib/1.0/lib.jar"));
        let sha1 = fs::read_to_string(format!("{dest}.sha1")).unwrap();
        assert_eq!(sha1.len(), 40);
        assert!(Path::new(&format!("{dest}.md5")).is_file());

        let err = r.publish(&jar(), &source(dir.path()), false).unwrap_err();
        assert!(matches!(err, ResolveError::Repository(_)));
    }

    #[test]
    fn test_transaction_abort_leaves_tree_untouched() {
        let dir = TempDir::new().unwrap();
        let r = resolver(dir.path(), Transactional::Required);
        let module = Coordinate::new("acme", "lib", "1.0");

        r.begin_publish_transaction(&module, false).unwrap();
        let staged = r.publish(&jar(), &source(dir.path()), false).unwrap();
        assert!(staged.contains("/1.0.part/"));
        assert!(Path::new(&staged).is_file());
        r.abort_publish_transaction().unwrap();

        let module_dir = dir.path().join("repo/acme/lib");
        assert!(!module_dir.join("1.0.part").exists());
        assert!(!module_dir.join("1.0").exists());
    }

    #[test]
    fn test_transaction_commit_moves_staging() {
        let dir = TempDir::new().unwrap();
        let r = resolver(dir.path(), Transactional::Auto);
        let module = Coordinate::new("acme", "lib", "1.0");

        r.begin_publish_transaction(&module, false).unwrap();
        let err = r.begin_publish_transaction(&module, false).unwrap_err();
        assert_eq!(err.to_string(), "a transaction is already started and not closed!");

        r.publish(&jar(), &source(dir.path()), false).unwrap();
        r.commit_publish_transaction().unwrap();
        assert!(dir.path().join("repo/acme/lib/1.0/lib.jar").is_file());
        assert!(dir.path().join("repo/acme/lib/1.0/lib.jar.sha1").is_file());
        assert!(!dir.path().join("repo/acme/lib/1.0.part").exists());

        let err = r.commit_publish_transaction().unwrap_err();
        assert_eq!(err.to_string(), "no current transaction!");
    }

    #[test]
    fn test_abort_without_begin_is_misuse() {
        let dir = TempDir::new().unwrap();
        let r = resolver(dir.path(), Transactional::Auto);
        let err = r.abort_publish_transaction().unwrap_err();
        assert!(matches!(err, ResolveError::TransactionMisuse(_)));
        assert_eq!(err.to_string(), "no current transaction!");

        // A closed transaction cannot be aborted a second time
        r.begin_publish_transaction(&Coordinate::new("acme", "lib", "1.0"), false)
            .unwrap();
        r.abort_publish_transaction().unwrap();
        assert!(matches!(
            r.abort_publish_transaction(),
            Err(ResolveError::TransactionMisuse(_))
        ));
        assert!(!dir.path().join("repo/acme/lib/1.0.part").exists());
    }

    #[test]
    fn test_transaction_unsupported_layouts() {
        let dir = TempDir::new().unwrap();
        let flat = |mode| {
            RepositoryResolver::builder("flat")
                .repository(Arc::new(FileRepository::new()))
                .artifact_pattern(format!("{}/[module]-[revision].[ext]", dir.path().display()))
                .transactional(mode)
                .finalize(&env(&dir.path().join("cache")))
                .unwrap()
        };
        let module = Coordinate::new("acme", "lib", "1.0");
        let err = flat(Transactional::Required)
            .begin_publish_transaction(&module, false)
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedTransaction { .. }));

        let auto = flat(Transactional::Auto);
        auto.begin_publish_transaction(&module, false).unwrap();
        auto.publish(&jar(), &source(dir.path()), false).unwrap();
        auto.commit_publish_transaction().unwrap();
        assert!(dir.path().join("lib-1.0.jar").is_file());
    }

    #[test]
    fn test_overwrite_declines_transaction_in_auto_mode() {
        let dir = TempDir::new().unwrap();
        let r = resolver(dir.path(), Transactional::Auto);
        let module = Coordinate::new("acme", "lib", "1.0");
        r.begin_publish_transaction(&module, true).unwrap();
        let dest = r.publish(&jar(), &source(dir.path()), true).unwrap();
        assert!(!dest.contains(".part"));
        r.commit_publish_transaction().unwrap();
    }

    #[test]
    fn test_list_tokens() {
        let dir = TempDir::new().unwrap();
        let r = resolver(dir.path(), Transactional::Auto);
        for (org, module, rev) in [("acme", "lib", "1.0"), ("acme", "lib", "2.0"), ("acme", "app", "1.0"), ("other", "x", "3")] {
            let path = dir.path().join(format!("repo/{org}/{module}/{rev}/{module}.jar"));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }
        fs::create_dir_all(dir.path().join("repo/acme/lib/3.0.part")).unwrap();

        let orgs: Vec<_> = r.list_organisations().unwrap().into_iter().collect();
        assert_eq!(orgs, vec!["acme", "other"]);
        let modules: Vec<_> = r.list_modules("acme").unwrap().into_iter().collect();
        assert_eq!(modules, vec!["app", "lib"]);
        let revisions: Vec<_> = r.list_revisions("acme", "lib").unwrap().into_iter().collect();
        assert_eq!(revisions, vec!["1.0", "2.0"]);
    }

    #[test]
    fn test_finalize_requires_repository_and_patterns() {
        let dir = TempDir::new().unwrap();
        let env = env(dir.path());
        let err = RepositoryResolver::builder("r").artifact_pattern("x").finalize(&env).unwrap_err();
        assert!(err.to_string().contains("no repository"));
        let err = RepositoryResolver::builder("r")
            .repository(Arc::new(FileRepository::new()))
            .finalize(&env)
            .unwrap_err();
        assert!(err.to_string().contains("no pattern"));
        let err = RepositoryResolver::builder("r")
            .repository(Arc::new(FileRepository::new()))
            .artifact_pattern("x")
            .checksums("sha1,crc32")
            .finalize(&env)
            .unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));
    }
}
