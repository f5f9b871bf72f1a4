//! Settings file parsing and resolver construction.
//!
//! A settings file is plain TOML:
//!
//! ```toml
//! default_resolver = "main"
//! checksums = "sha1,md5"
//!
//! [cache]
//! dir = "/var/cache/trellis"
//!
//! [[resolvers]]
//! name = "local"
//! kind = "filesystem"
//! ivy_patterns = ["${settings.dir}/repo/[organisation]/[module]/[revision]/module.json"]
//! artifact_patterns = ["${settings.dir}/repo/[organisation]/[module]/[revision]/[artifact].[ext]"]
//!
//! [[resolvers]]
//! name = "main"
//! kind = "chain"
//! resolvers = ["local"]
//! ```
//!
//! Loading happens in two steps. The file is deserialized into
//! [`SettingsFile`], which callers may still adjust, then [`Settings::build`]
//! finalizes every resolver against the shared environment. Compositions are
//! finalized after their members.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use trellis_schema::{ChecksumAlgorithm, StatusSet};

use crate::cache::RepositoryCache;
use crate::descriptor::JsonDescriptorParser;
use crate::error::ResolveError;
use crate::latest;
use crate::namespace::{Namespace, Rule, RuleSet, RuleSpec};
use crate::paths;
use crate::repository::{FileRepository, Repository};
use crate::resolver::{
    ChainResolver, DependencyResolver, DualResolver, RepositoryResolver, ResolverEnv, Transactional,
};
use crate::version::ChainVersionMatcher;

/// Placeholder replaced by the directory holding the settings file.
pub const SETTINGS_DIR_VAR: &str = "${settings.dir}";

const DEFAULT_CHECKSUMS: &str = "sha1,md5";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("unknown latest strategy '{0}'")]
    UnknownStrategy(String),

    #[error("resolver '{0}' is declared twice")]
    DuplicateResolver(String),

    #[error("resolver '{resolver}' uses unknown namespace '{namespace}'")]
    UnknownNamespace { resolver: String, namespace: String },

    #[error("resolver '{0}' is part of a cycle")]
    Cycle(String),

    #[error("unknown default resolver '{0}'")]
    UnknownDefault(String),

    #[error("no cache directory: set cache.dir or TRELLIS_HOME")]
    NoCacheDir,

    #[error(transparent)]
    Resolver(#[from] ResolveError),
}

fn invalid(field: impl Into<String>, message: impl ToString) -> SettingsError {
    SettingsError::Invalid {
        field: field.into(),
        message: message.to_string(),
    }
}

/// Deserialized settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub cache: CacheConfig,
    /// Comma separated checksum algorithms, `sha1,md5` when absent.
    pub checksums: Option<String>,
    pub check_modified: bool,
    /// Revisions fully matching this regex are treated as changing.
    pub changing_pattern: Option<String>,
    pub default_resolver: Option<String>,
    pub latest_strategy: Option<String>,
    /// Defaults to the host name.
    pub workspace_name: Option<String>,
    pub validate: Option<bool>,
    /// Known statuses, most mature first.
    pub statuses: Option<Vec<String>>,
    pub resolvers: Vec<ResolverConfig>,
    pub namespaces: Vec<NamespaceConfig>,
    /// Directory substituted for `${settings.dir}`; set by [`SettingsFile::load`].
    #[serde(skip)]
    pub settings_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
    /// Record local artifacts in place instead of copying them.
    pub use_origin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    Filesystem,
    Url,
    Chain,
    Dual,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    pub name: String,
    pub kind: ResolverKind,
    #[serde(default)]
    pub ivy_patterns: Vec<String>,
    #[serde(default)]
    pub artifact_patterns: Vec<String>,
    #[serde(default)]
    pub m2_compatible: bool,
    pub allow_missing_descriptor: Option<bool>,
    pub check_modified: Option<bool>,
    pub changing_pattern: Option<String>,
    pub checksums: Option<String>,
    pub check_consistency: Option<bool>,
    #[serde(default)]
    pub always_check_exact_revision: bool,
    #[serde(default)]
    pub transactional: Transactional,
    pub dynamic_revisions: Option<bool>,
    /// Whether filesystem resources count as local for use-origin downloads.
    pub local: Option<bool>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub return_first: bool,
    #[serde(default)]
    pub dual: bool,
    /// Chain members in order, or the metadata and artifact resolvers of a dual.
    #[serde(default)]
    pub resolvers: Vec<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub connect_ms: Option<u64>,
    pub read_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    pub name: String,
    #[serde(default)]
    pub from_system: Vec<RuleSpec>,
    #[serde(default)]
    pub to_system: Vec<RuleSpec>,
}

impl SettingsFile {
    /// Read and parse a settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings TOML.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::parse(&content)?;
        file.settings_dir = path.parent().map(Path::to_path_buf);
        Ok(file)
    }

    /// # Errors
    ///
    /// Returns [`SettingsError::Toml`] for invalid content.
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    fn expand(&self, pattern: &str) -> String {
        match &self.settings_dir {
            Some(dir) => pattern.replace(SETTINGS_DIR_VAR, &dir.display().to_string()),
            None => pattern.to_string(),
        }
    }
}

/// Frozen settings: the environment and every finalized resolver.
#[derive(Debug)]
pub struct Settings {
    env: ResolverEnv,
    resolvers: BTreeMap<String, Arc<dyn DependencyResolver>>,
    declared: Vec<String>,
    default_resolver: Option<String>,
    use_origin: bool,
    validate: bool,
}

impl Settings {
    /// Settings without resolvers, for programmatic registration.
    pub fn new(env: ResolverEnv) -> Self {
        Self {
            env,
            resolvers: BTreeMap::new(),
            declared: Vec::new(),
            default_resolver: None,
            use_origin: false,
            validate: true,
        }
    }

    /// Load a settings file and build it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or describes invalid resolvers.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        Self::build(SettingsFile::load(path)?)
    }

    /// Finalize every resolver of `file`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid global values, unknown or cyclic
    /// resolver references, and resolver configuration errors.
    pub fn build(file: SettingsFile) -> Result<Self, SettingsError> {
        let env = environment(&file)?;

        let mut namespaces = HashMap::new();
        for ns in &file.namespaces {
            namespaces.insert(ns.name.clone(), Arc::new(compile_namespace(ns)?));
        }

        let mut configs = BTreeMap::new();
        let mut declared = Vec::new();
        for config in &file.resolvers {
            if configs.insert(config.name.as_str(), config).is_some() {
                return Err(SettingsError::DuplicateResolver(config.name.clone()));
            }
            declared.push(config.name.clone());
        }

        let mut builder = Builder {
            file: &file,
            env: &env,
            configs: &configs,
            namespaces: &namespaces,
            built: BTreeMap::new(),
            visiting: Vec::new(),
        };
        for name in &declared {
            builder.build(name)?;
        }
        let resolvers = builder.built;

        if let Some(name) = &file.default_resolver {
            if !resolvers.contains_key(name) {
                return Err(SettingsError::UnknownDefault(name.clone()));
            }
        }
        debug!("settings built with {} resolvers", resolvers.len());

        Ok(Self {
            env,
            resolvers,
            declared,
            default_resolver: file.default_resolver.clone(),
            use_origin: file.cache.use_origin,
            validate: file.validate.unwrap_or(true),
        })
    }

    /// Register a resolver finalized by the caller.
    pub fn add_resolver(&mut self, resolver: Arc<dyn DependencyResolver>) {
        let name = resolver.name().to_string();
        if self.resolvers.insert(name.clone(), resolver).is_none() {
            self.declared.push(name);
        }
    }

    pub fn set_default_resolver(&mut self, name: impl Into<String>) {
        self.default_resolver = Some(name.into());
    }

    pub fn set_use_origin(&mut self, use_origin: bool) {
        self.use_origin = use_origin;
    }

    pub fn env(&self) -> &ResolverEnv {
        &self.env
    }

    pub fn resolver(&self, name: &str) -> Option<Arc<dyn DependencyResolver>> {
        self.resolvers.get(name).cloned()
    }

    /// The configured default, else the first declared resolver.
    pub fn default_resolver(&self) -> Option<Arc<dyn DependencyResolver>> {
        self.default_resolver
            .as_ref()
            .or_else(|| self.declared.first())
            .and_then(|name| self.resolver(name))
    }

    /// Resolver names in declaration order.
    pub fn resolver_names(&self) -> &[String] {
        &self.declared
    }

    pub fn registry(&self) -> &BTreeMap<String, Arc<dyn DependencyResolver>> {
        &self.resolvers
    }

    pub fn use_origin(&self) -> bool {
        self.use_origin
    }

    pub fn validate(&self) -> bool {
        self.validate
    }
}

fn environment(file: &SettingsFile) -> Result<ResolverEnv, SettingsError> {
    let cache_dir = match &file.cache.dir {
        Some(dir) => PathBuf::from(file.expand(&dir.display().to_string())),
        None => paths::default_cache_dir().ok_or(SettingsError::NoCacheDir)?,
    };
    let strategy_name = file.latest_strategy.as_deref().unwrap_or("latest-revision");
    let strategy =
        latest::by_name(strategy_name).ok_or_else(|| SettingsError::UnknownStrategy(strategy_name.to_string()))?;
    let statuses = file
        .statuses
        .clone()
        .map_or_else(StatusSet::default, StatusSet::new);
    let checksums = ChecksumAlgorithm::parse_list(file.checksums.as_deref().unwrap_or(DEFAULT_CHECKSUMS))
        .map_err(|e| invalid("checksums", e))?;
    let changing_pattern = file
        .changing_pattern
        .as_deref()
        .map(|p| Regex::new(&format!("^(?:{p})$")))
        .transpose()
        .map_err(|e| invalid("changing_pattern", e))?;

    Ok(ResolverEnv {
        cache: Arc::new(RepositoryCache::new(cache_dir)),
        matcher: Arc::new(ChainVersionMatcher::standard(statuses.clone(), Arc::clone(&strategy))),
        strategy,
        parser: Arc::new(JsonDescriptorParser),
        statuses,
        workspace_name: file
            .workspace_name
            .clone()
            .unwrap_or_else(paths::local_workspace_name),
        checksums,
        check_modified: file.check_modified,
        changing_pattern,
    })
}

fn compile_namespace(config: &NamespaceConfig) -> Result<Namespace, SettingsError> {
    let compile = |specs: &[RuleSpec]| -> Result<RuleSet, SettingsError> {
        specs
            .iter()
            .map(|spec| Rule::compile(spec).map_err(|e| invalid(format!("namespace {}", config.name), e)))
            .collect::<Result<Vec<_>, _>>()
            .map(RuleSet::new)
    };
    Ok(Namespace::new(
        config.name.clone(),
        compile(&config.from_system)?,
        compile(&config.to_system)?,
    ))
}

/// Depth-first finalization, members before compositions.
struct Builder<'a> {
    file: &'a SettingsFile,
    env: &'a ResolverEnv,
    configs: &'a BTreeMap<&'a str, &'a ResolverConfig>,
    namespaces: &'a HashMap<String, Arc<Namespace>>,
    built: BTreeMap<String, Arc<dyn DependencyResolver>>,
    visiting: Vec<String>,
}

impl Builder<'_> {
    fn build(&mut self, name: &str) -> Result<(), SettingsError> {
        if self.built.contains_key(name) {
            return Ok(());
        }
        // Unknown members are reported by the composition's finalize
        let Some(config) = self.configs.get(name).copied() else {
            return Ok(());
        };
        if self.visiting.iter().any(|v| v == name) {
            return Err(SettingsError::Cycle(name.to_string()));
        }
        self.visiting.push(name.to_string());
        for member in &config.resolvers {
            self.build(member)?;
        }
        self.visiting.pop();

        let resolver: Arc<dyn DependencyResolver> = match config.kind {
            ResolverKind::Filesystem => {
                let repository = FileRepository::new().with_local(config.local.unwrap_or(true));
                let repository = match &self.file.settings_dir {
                    Some(dir) => repository.with_base_dir(dir),
                    None => repository,
                };
                Arc::new(self.repository_resolver(config, Arc::new(repository))?)
            }
            ResolverKind::Url => Arc::new(self.repository_resolver(config, url_repository(config)?)?),
            ResolverKind::Chain => {
                let mut chain = ChainResolver::builder(&config.name)
                    .return_first(config.return_first)
                    .dual(config.dual);
                for member in &config.resolvers {
                    chain = chain.resolver(member);
                }
                Arc::new(chain.finalize(self.env, &self.built)?)
            }
            ResolverKind::Dual => {
                let mut dual = DualResolver::builder(&config.name)
                    .allow_missing_descriptor(config.allow_missing_descriptor.unwrap_or(true));
                if config.resolvers.len() > 2 {
                    return Err(invalid(
                        format!("resolver {}", config.name),
                        "exactly two resolvers must be added: metadata and artifact",
                    ));
                }
                if let Some(metadata) = config.resolvers.first() {
                    dual = dual.metadata(metadata);
                }
                if let Some(artifact) = config.resolvers.get(1) {
                    dual = dual.artifact(artifact);
                }
                Arc::new(dual.finalize(&self.built)?)
            }
        };
        self.built.insert(config.name.clone(), resolver);
        Ok(())
    }

    fn repository_resolver(
        &self,
        config: &ResolverConfig,
        repository: Arc<dyn Repository>,
    ) -> Result<RepositoryResolver, SettingsError> {
        let mut builder = RepositoryResolver::builder(&config.name)
            .repository(repository)
            .m2_compatible(config.m2_compatible)
            .always_check_exact(config.always_check_exact_revision)
            .transactional(config.transactional);
        for pattern in &config.ivy_patterns {
            builder = builder.descriptor_pattern(self.file.expand(pattern));
        }
        for pattern in &config.artifact_patterns {
            builder = builder.artifact_pattern(self.file.expand(pattern));
        }
        if let Some(allow) = config.allow_missing_descriptor {
            builder = builder.allow_missing_descriptor(allow);
        }
        if let Some(check) = config.check_modified {
            builder = builder.check_modified(check);
        }
        if let Some(pattern) = &config.changing_pattern {
            builder = builder.changing_pattern(pattern);
        }
        if let Some(list) = &config.checksums {
            builder = builder.checksums(list);
        }
        if let Some(check) = config.check_consistency {
            builder = builder.check_consistency(check);
        }
        if let Some(accept) = config.dynamic_revisions {
            builder = builder.dynamic_revisions(accept);
        }
        if let Some(name) = &config.namespace {
            let namespace = self.namespaces.get(name).ok_or_else(|| SettingsError::UnknownNamespace {
                resolver: config.name.clone(),
                namespace: name.clone(),
            })?;
            builder = builder.namespace(Arc::clone(namespace));
        }
        Ok(builder.finalize(self.env)?)
    }
}

#[cfg(feature = "network")]
fn url_repository(config: &ResolverConfig) -> Result<Arc<dyn Repository>, SettingsError> {
    use std::time::Duration;

    let repository = crate::repository::UrlRepository::with_timeouts(
        config.timeouts.connect_ms.map(Duration::from_millis),
        config.timeouts.read_ms.map(Duration::from_millis),
    )
    .map_err(ResolveError::from)?;
    Ok(Arc::new(repository))
}

#[cfg(not(feature = "network"))]
fn url_repository(config: &ResolverConfig) -> Result<Arc<dyn Repository>, SettingsError> {
    Err(invalid(
        format!("resolver {}", config.name),
        "url resolvers need the network feature",
    ))
}
