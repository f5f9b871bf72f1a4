//! On-disk repository cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! <org>/<module>[/<branch>]/descriptor-<rev>.json   resolved descriptor + provenance
//! <org>/<module>[/<branch>]/data-<rev>.json         artifact origins
//! <org>/<module>[/<branch>]/<type>s/<artifact>-<rev>[-<classifier>].<ext>
//! ```
//!
//! Every write goes through a temp file and a rename, so a file present
//! at its final path is always complete.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use trellis_schema::{Artifact, ArtifactOrigin, Coordinate, ModuleDescriptor, ResolvedModule};
use walkdir::WalkDir;

use crate::fsutil::atomic_write;
use crate::locator::PART_SUFFIX;
use crate::pattern::{PatternError, TokenValues, substitute};

pub const ARTIFACT_PATTERN: &str =
    "[organisation]/[module](/[branch])/[type]s/[artifact]-[revision](-[classifier]).[ext]";
pub const DESCRIPTOR_PATTERN: &str = "[organisation]/[module](/[branch])/descriptor-[revision].json";
pub const DATA_PATTERN: &str = "[organisation]/[module](/[branch])/data-[revision].json";
const MODULE_DIR_PATTERN: &str = "[organisation]/[module](/[branch])";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache entry {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("invalid cache layout: {0}")]
    Layout(#[from] PatternError),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Cached descriptor with the provenance of its resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub resolver: String,
    pub artifact_resolver: String,
    /// Last-modified of the repository resource the descriptor came from.
    #[serde(default)]
    pub resource_last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    pub descriptor: ModuleDescriptor,
}

impl CacheEntry {
    /// Module read back from the cache, materialized at `local`.
    pub fn into_module(self, local: PathBuf) -> ResolvedModule {
        ResolvedModule {
            descriptor: self.descriptor,
            resolver: self.resolver,
            artifact_resolver: self.artifact_resolver,
            searched: false,
            downloaded: false,
            force: false,
            local_descriptor: Some(local),
            published: self.published,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModuleData {
    #[serde(default)]
    origins: BTreeMap<String, ArtifactOrigin>,
}

#[derive(Debug, Clone)]
pub struct RepositoryCache {
    root: PathBuf,
}

impl RepositoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, pattern: &str, values: &TokenValues) -> Result<PathBuf, CacheError> {
        Ok(self.root.join(substitute(pattern, values)?))
    }

    pub fn descriptor_path(&self, coordinate: &Coordinate) -> Result<PathBuf, CacheError> {
        self.path_for(DESCRIPTOR_PATTERN, &TokenValues::for_module(coordinate))
    }

    fn data_path(&self, coordinate: &Coordinate) -> Result<PathBuf, CacheError> {
        self.path_for(DATA_PATTERN, &TokenValues::for_module(coordinate))
    }

    /// Deterministic cache path of `artifact`, relative to nothing.
    pub fn archive_path(&self, artifact: &Artifact) -> Result<PathBuf, CacheError> {
        self.path_for(ARTIFACT_PATTERN, &TokenValues::for_artifact(artifact))
    }

    /// File holding `artifact`: the origin itself when it is local and
    /// `use_origin` is set, the cache archive otherwise.
    pub fn archive_file(
        &self,
        artifact: &Artifact,
        origin: Option<&ArtifactOrigin>,
        use_origin: bool,
    ) -> Result<PathBuf, CacheError> {
        match origin {
            Some(origin) if use_origin && origin.is_local => {
                let location = origin.location.strip_prefix("file:").unwrap_or(&origin.location);
                Ok(PathBuf::from(location))
            }
            _ => self.archive_path(artifact),
        }
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, CacheError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
        let content = serde_json::to_vec_pretty(value).map_err(|e| CacheError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        atomic_write(path, &content).map_err(|e| CacheError::io(path, e))
    }

    /// Raw cache entry for a resolved coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be read.
    pub fn entry(&self, coordinate: &Coordinate) -> Result<Option<CacheEntry>, CacheError> {
        Self::read_json(&self.descriptor_path(coordinate)?)
    }

    /// Cache entry for `coordinate`. A corrupt entry is logged and treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn cached_entry(&self, coordinate: &Coordinate) -> Result<Option<CacheEntry>, CacheError> {
        match self.entry(coordinate) {
            Err(CacheError::Corrupt { path, message }) => {
                warn!("ignoring corrupt cache entry {path}: {message}");
                Ok(None)
            }
            other => other,
        }
    }

    /// Cached module for `coordinate`, optionally only if `resolver` produced it.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn find_module_in_cache(
        &self,
        coordinate: &Coordinate,
        resolver: Option<&str>,
    ) -> Result<Option<ResolvedModule>, CacheError> {
        let Some(entry) = self.cached_entry(coordinate)? else {
            return Ok(None);
        };
        if let Some(expected) = resolver {
            if entry.resolver != expected {
                debug!(
                    "{coordinate} found in cache but resolved by {}, not {expected}",
                    entry.resolver
                );
                return Ok(None);
            }
        }
        Ok(Some(entry.into_module(self.descriptor_path(coordinate)?)))
    }

    /// Persist `module` under its resolved coordinate. Returns the entry path.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    pub fn cache_descriptor(
        &self,
        module: &ResolvedModule,
        resource_last_modified: Option<DateTime<Utc>>,
    ) -> Result<PathBuf, CacheError> {
        let path = self.descriptor_path(module.id())?;
        let entry = CacheEntry {
            resolver: module.resolver.clone(),
            artifact_resolver: module.artifact_resolver.clone(),
            resource_last_modified,
            published: module.published,
            descriptor: module.descriptor.clone(),
        };
        Self::write_json(&path, &entry)?;
        debug!("cached descriptor of {} in {}", module.id(), path.display());
        Ok(path)
    }

    /// Origin recorded for `artifact`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the data file exists but cannot be read.
    pub fn saved_artifact_origin(&self, artifact: &Artifact) -> Result<Option<ArtifactOrigin>, CacheError> {
        let data: Option<ModuleData> = Self::read_json(&self.data_path(&artifact.module)?)?;
        Ok(data.and_then(|mut d| d.origins.remove(&artifact.key())))
    }

    /// # Errors
    ///
    /// Returns an error if the data file cannot be read or written.
    pub fn save_artifact_origin(&self, artifact: &Artifact, origin: &ArtifactOrigin) -> Result<(), CacheError> {
        let path = self.data_path(&artifact.module)?;
        let mut data: ModuleData = Self::read_json(&path)?.unwrap_or_default();
        data.origins.insert(artifact.key(), origin.clone());
        Self::write_json(&path, &data)
    }

    /// # Errors
    ///
    /// Returns an error if the data file cannot be read or written.
    pub fn remove_saved_artifact_origin(&self, artifact: &Artifact) -> Result<(), CacheError> {
        let path = self.data_path(&artifact.module)?;
        let Some(mut data) = Self::read_json::<ModuleData>(&path)? else {
            return Ok(());
        };
        if data.origins.remove(&artifact.key()).is_some() {
            Self::write_json(&path, &data)?;
        }
        Ok(())
    }

    /// Delete the cached artifacts of `coordinate` and their origins.
    ///
    /// Artifacts are taken from the cached descriptor. Leftover `.part`
    /// files of the revision are removed too.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be deleted.
    pub fn delete_cached_artifacts(&self, coordinate: &Coordinate) -> Result<usize, CacheError> {
        let mut deleted = 0;
        if let Some(entry) = self.entry(coordinate)? {
            for artifact in entry.descriptor.all_artifacts() {
                let origin = self.saved_artifact_origin(&artifact)?;
                self.remove_saved_artifact_origin(&artifact)?;
                // Files read in place from a local origin are not ours to delete
                let path = self.archive_path(&artifact)?;
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                    deleted += 1;
                }
                debug!("dropped cached {artifact} (origin {origin:?})");
            }
        }

        let module_dir = self.path_for(MODULE_DIR_PATTERN, &TokenValues::for_module(coordinate))?;
        let marker = format!("-{}", coordinate.revision);
        for entry in WalkDir::new(&module_dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
        {
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_file() && name.ends_with(PART_SUFFIX) && name.contains(&marker) {
                fs::remove_file(entry.path()).map_err(|e| CacheError::io(entry.path(), e))?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trellis_schema::DeclaredArtifact;

    fn module() -> ResolvedModule {
        let mut md = ModuleDescriptor::new(Coordinate::new("acme", "lib", "1.0"), "release");
        md.artifacts.push(DeclaredArtifact::new("lib", "jar", "jar"));
        ResolvedModule::new(md, "local")
    }

    #[test]
    fn test_layout() {
        let cache = RepositoryCache::new("/cache");
        let artifact = Artifact::new(Coordinate::new("acme", "lib", "1.0"), "lib", "jar", "jar")
            .with_classifier("sources");
        assert_eq!(
            cache.archive_path(&artifact).unwrap(),
            PathBuf::from("/cache/acme/lib/jars/lib-1.0-sources.jar")
        );
        let branched = Coordinate::new("acme", "lib", "1.0").with_branch("trunk");
        assert_eq!(
            cache.descriptor_path(&branched).unwrap(),
            PathBuf::from("/cache/acme/lib/trunk/descriptor-1.0.json")
        );
    }

    #[test]
    fn test_find_module_filters_by_resolver() {
        let dir = TempDir::new().unwrap();
        let cache = RepositoryCache::new(dir.path());
        let module = module();
        cache.cache_descriptor(&module, None).unwrap();

        let found = cache
            .find_module_in_cache(module.id(), Some("local"))
            .unwrap()
            .unwrap();
        assert_eq!(found.descriptor, module.descriptor);
        assert!(!found.searched);
        assert!(found.local_descriptor.is_some());

        assert!(cache.find_module_in_cache(module.id(), Some("remote")).unwrap().is_none());
        assert!(cache.find_module_in_cache(module.id(), None).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = RepositoryCache::new(dir.path());
        let coordinate = Coordinate::new("acme", "lib", "1.0");
        let path = cache.descriptor_path(&coordinate).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ truncated").unwrap();
        assert!(cache.find_module_in_cache(&coordinate, None).unwrap().is_none());
    }

    #[test]
    fn test_origins_and_delete() {
        let dir = TempDir::new().unwrap();
        let cache = RepositoryCache::new(dir.path());
        let module = module();
        cache.cache_descriptor(&module, None).unwrap();

        let artifact = &module.descriptor.all_artifacts()[0];
        let archive = cache.archive_path(artifact).unwrap();
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, b"jar").unwrap();
        fs::write(archive.with_file_name("lib-1.0.jar.part"), b"ja").unwrap();
        cache
            .save_artifact_origin(artifact, &ArtifactOrigin::remote("http://repo/lib-1.0.jar"))
            .unwrap();
        assert_eq!(
            cache.saved_artifact_origin(artifact).unwrap(),
            Some(ArtifactOrigin::remote("http://repo/lib-1.0.jar"))
        );

        assert_eq!(cache.delete_cached_artifacts(module.id()).unwrap(), 2);
        assert!(!archive.exists());
        assert_eq!(cache.saved_artifact_origin(artifact).unwrap(), None);
    }

    #[test]
    fn test_archive_file_uses_local_origin() {
        let cache = RepositoryCache::new("/cache");
        let artifact = Artifact::new(Coordinate::new("acme", "lib", "1.0"), "lib", "jar", "jar");
        let origin = ArtifactOrigin::local("/repo/acme/lib-1.0.jar");
        assert_eq!(
            cache.archive_file(&artifact, Some(&origin), true).unwrap(),
            PathBuf::from("/repo/acme/lib-1.0.jar")
        );
        assert_eq!(
            cache.archive_file(&artifact, Some(&origin), false).unwrap(),
            PathBuf::from("/cache/acme/lib/jars/lib-1.0.jar")
        );
    }
}
