//! Checksummed, crash-safe artifact acquisition into the cache.
//!
//! Bytes land in a part file private to one transfer, are verified against
//! the first checksum side-file found, and only then renamed onto `<dest>`.
//! An interrupted or failed transfer never leaves a file at the destination.

use std::fs;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};
use trellis_schema::{
    Artifact, ArtifactDownloadReport, ArtifactOrigin, Checksum, ChecksumAlgorithm, DownloadStatus,
    MISSING_ARTIFACT,
};

use crate::cache::RepositoryCache;
use crate::checksum;
use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::fsutil::staging_file;
use crate::locator::{Candidate, PART_SUFFIX};
use crate::repository::{self, Repository, RepositoryError};

/// Caller-level download switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Read local artifacts in place instead of copying them into the cache.
    pub use_origin: bool,
}

/// Locates the resource of one artifact.
pub type ArtifactLocate<'f> =
    dyn FnMut(&Artifact, &mut ResolveContext) -> Result<Option<Candidate>, ResolveError> + 'f;

fn transfer(location: &str, source: RepositoryError) -> ResolveError {
    ResolveError::Transfer {
        location: location.to_string(),
        source,
    }
}

/// Verify `file` against the first `<location>.<alg>` side-file that exists.
///
/// Returns the algorithm used, or `None` when no side-file was found.
fn check_side_files(
    repository: &dyn Repository,
    location: &str,
    file: &Path,
    algorithms: &[ChecksumAlgorithm],
) -> Result<Option<ChecksumAlgorithm>, ResolveError> {
    for &algorithm in algorithms {
        let side = format!("{location}.{}", algorithm.name());
        if !repository.exists(&side).map_err(|e| transfer(&side, e))? {
            continue;
        }
        let temp = tempfile::Builder::new().prefix("trellis-checksum").tempfile()?;
        repository.get(&side, temp.path()).map_err(|e| transfer(&side, e))?;
        let content = fs::read_to_string(temp.path())?;
        match Checksum::from_side_file(algorithm, &content) {
            Ok(expected) => checksum::verify(file, &expected)?,
            Err(e) => {
                return Err(ResolveError::ChecksumMismatch {
                    algorithm,
                    expected: format!("<{e}>"),
                    computed: checksum::compute(file, algorithm)?,
                });
            }
        }
        debug!("{algorithm} OK for {location}");
        return Ok(Some(algorithm));
    }
    Ok(None)
}

/// Transfer `location` to `dest` through a `.part` file, verifying checksums.
///
/// Every call stages into its own uniquely named part file beside `dest`, so
/// concurrent acquisitions of one artifact never share bytes. The last
/// complete transfer wins the final rename.
///
/// # Errors
///
/// Returns [`ResolveError::ChecksumMismatch`] (nothing is left at `dest`),
/// [`ResolveError::Interrupted`] when interrupted before the final rename,
/// [`ResolveError::IllegalState`] when the rename fails, or a transfer error.
pub fn fetch_verified(
    repository: &dyn Repository,
    location: &str,
    dest: &Path,
    algorithms: &[ChecksumAlgorithm],
    ctx: &ResolveContext,
) -> Result<u64, ResolveError> {
    // Dropped on every early return, which removes the part file
    let part = staging_file(dest, PART_SUFFIX)?;

    repository
        .get(location, part.path())
        .map_err(|e| transfer(location, e))?;
    check_side_files(repository, location, part.path(), algorithms)?;
    ctx.check_interrupted()?;

    let staged = part.path().to_path_buf();
    part.persist(dest).map_err(|e| {
        ResolveError::IllegalState(format!(
            "impossible to move part file to definitive one: {} -> {}: {}",
            staged.display(),
            dest.display(),
            e.error
        ))
    })?;
    Ok(fs::metadata(dest).map(|m| m.len()).unwrap_or(0))
}

fn is_same_file(location: &str, archive: &Path) -> bool {
    let path = Path::new(repository::file_path(location));
    match (path.canonicalize(), archive.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => path == archive,
    }
}

impl RepositoryCache {
    /// Acquire `artifact` into the cache.
    ///
    /// Already cached artifacts are a no-op without locating anything. When
    /// `locate` finds nothing, an explicit URL on the artifact is tried.
    /// Transfer and checksum problems produce a failed report.
    ///
    /// # Errors
    ///
    /// Only [`ResolveError::Interrupted`]; every other failure is reported.
    pub fn download(
        &self,
        artifact: &Artifact,
        locate: &mut ArtifactLocate<'_>,
        checksums: &[ChecksumAlgorithm],
        options: DownloadOptions,
        ctx: &mut ResolveContext,
    ) -> Result<ArtifactDownloadReport, ResolveError> {
        let start = Instant::now();
        let mut report = ArtifactDownloadReport::new(artifact.clone());
        match self.acquire(artifact, locate, checksums, options, ctx, &mut report) {
            Ok(()) => {}
            Err(e) if e.is_interrupted() => return Err(e),
            Err(e) => {
                warn!("download of {artifact} failed: {e}");
                report.status = DownloadStatus::Failed;
                report.details = Some(e.to_string());
            }
        }
        report.elapsed = start.elapsed();
        ctx.check_interrupted()?;
        Ok(report)
    }

    fn acquire(
        &self,
        artifact: &Artifact,
        locate: &mut ArtifactLocate<'_>,
        checksums: &[ChecksumAlgorithm],
        options: DownloadOptions,
        ctx: &mut ResolveContext,
        report: &mut ArtifactDownloadReport,
    ) -> Result<(), ResolveError> {
        let saved = self.saved_artifact_origin(artifact)?;
        let archive = self.archive_file(artifact, saved.as_ref(), options.use_origin)?;
        if archive.is_file() {
            debug!("{artifact} already in cache: {}", archive.display());
            report.status = DownloadStatus::NoOp;
            report.size = fs::metadata(&archive).map(|m| m.len()).unwrap_or(0);
            report.origin = saved;
            report.local_file = Some(archive);
            return Ok(());
        }

        let mut located = locate(artifact, ctx)?;
        if located.is_none() {
            located = locate_url(artifact, ctx)?;
        }
        let Some(candidate) = located else {
            report.status = DownloadStatus::Failed;
            report.details = Some(MISSING_ARTIFACT.to_string());
            return Ok(());
        };

        let resource = &candidate.resource;
        let origin = if resource.local {
            ArtifactOrigin::local(resource.name.clone())
        } else {
            ArtifactOrigin::remote(resource.name.clone())
        };

        if options.use_origin && resource.local {
            self.save_artifact_origin(artifact, &origin)?;
            let file = self.archive_file(artifact, Some(&origin), true)?;
            report.status = DownloadStatus::NoOp;
            report.size = resource.content_length;
            report.origin = Some(origin);
            report.local_file = Some(file);
            return Ok(());
        }

        let archive = self.archive_path(artifact)?;
        if resource.local && is_same_file(&resource.name, &archive) {
            return Err(ResolveError::IllegalState(format!(
                "pointing a repository to the cache is forbidden: {}",
                resource.name
            )));
        }

        report.size = fetch_verified(
            candidate.repository.as_ref(),
            &resource.name,
            &archive,
            checksums,
            ctx,
        )?;
        self.save_artifact_origin(artifact, &origin)?;
        info!("downloaded {artifact} from {}", resource.name);
        report.status = DownloadStatus::Successful;
        report.origin = Some(origin);
        report.local_file = Some(archive);
        Ok(())
    }
}

/// Candidate for the explicit URL an artifact may carry.
fn locate_url(artifact: &Artifact, ctx: &mut ResolveContext) -> Result<Option<Candidate>, ResolveError> {
    let Some(url) = artifact.url.as_deref() else {
        return Ok(None);
    };
    let Some(repository) = repository::for_location(url) else {
        debug!("no repository can serve {url}");
        return Ok(None);
    };
    ctx.record_attempt(url);
    let resource = repository.resource(url).map_err(|e| transfer(url, e))?;
    if !resource.exists {
        return Ok(None);
    }
    let revision = artifact.module.revision.clone();
    Ok(Some(Candidate::new(resource, revision, repository)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::compute;
    use crate::repository::{FileRepository, Resource};
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;
    use trellis_schema::Coordinate;

    struct Fixture {
        _dir: TempDir,
        repo_dir: std::path::PathBuf,
        cache: RepositoryCache,
        repo: Arc<dyn Repository>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let repo_dir = dir.path().join("repo");
        fs::create_dir_all(&repo_dir).unwrap();
        fs::write(repo_dir.join("lib-1.0.jar"), b"payload").unwrap();
        Fixture {
            cache: RepositoryCache::new(dir.path().join("cache")),
            repo: Arc::new(FileRepository::new().with_local(false)),
            repo_dir,
            _dir: dir,
        }
    }

    fn leftover_parts(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| name.ends_with(PART_SUFFIX))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Writes its payload in three chunks with a pause between each.
    #[derive(Debug)]
    struct Slow {
        chunks: [&'static str; 3],
        pause: Duration,
    }

    impl Repository for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn resource(&self, path: &str) -> Result<Resource, RepositoryError> {
            let mut resource = Resource::missing(path, false);
            resource.exists = true;
            resource.content_length = 12;
            Ok(resource)
        }

        fn get(&self, _path: &str, destination: &Path) -> Result<(), RepositoryError> {
            let mut file = fs::File::create(destination).map_err(|e| RepositoryError::io("create", destination, e))?;
            for chunk in self.chunks {
                file.write_all(chunk.as_bytes())
                    .map_err(|e| RepositoryError::io("write", destination, e))?;
                file.flush().map_err(|e| RepositoryError::io("write", destination, e))?;
                thread::sleep(self.pause);
            }
            Ok(())
        }

        fn put(&self, _: &Artifact, _: &Path, _: &str, _: bool) -> Result<(), RepositoryError> {
            unreachable!()
        }

        fn list(&self, _parent: &str) -> Result<Option<Vec<String>>, RepositoryError> {
            Ok(None)
        }

        fn exists(&self, _path: &str) -> Result<bool, RepositoryError> {
            Ok(false)
        }
    }

    fn jar() -> Artifact {
        Artifact::new(Coordinate::new("acme", "lib", "1.0"), "lib", "jar", "jar")
    }

    fn locator(
        repo: &Arc<dyn Repository>,
        location: std::path::PathBuf,
    ) -> impl FnMut(&Artifact, &mut ResolveContext) -> Result<Option<Candidate>, ResolveError> + '_ {
        move |artifact, _| {
            let name = location.display().to_string();
            let resource = repo.resource(&name).map_err(ResolveError::from)?;
            Ok(resource
                .exists
                .then(|| Candidate::new(resource, artifact.module.revision.clone(), Arc::clone(repo))))
        }
    }

    #[test]
    fn test_download_then_noop() {
        let fx = fixture();
        let sha1 = compute(&fx.repo_dir.join("lib-1.0.jar"), ChecksumAlgorithm::Sha1).unwrap();
        fs::write(fx.repo_dir.join("lib-1.0.jar.sha1"), format!("{sha1}  lib-1.0.jar\n")).unwrap();

        let mut locate = locator(&fx.repo, fx.repo_dir.join("lib-1.0.jar"));
        let mut ctx = ResolveContext::new();
        let algorithms = [ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5];
        let report = fx
            .cache
            .download(&jar(), &mut locate, &algorithms, DownloadOptions::default(), &mut ctx)
            .unwrap();
        assert_eq!(report.status, DownloadStatus::Successful);
        assert_eq!(report.size, 7);
        let local = report.local_file.clone().unwrap();
        assert_eq!(fs::read(&local).unwrap(), b"payload");
        assert!(leftover_parts(local.parent().unwrap()).is_empty());

        let mut never = |_: &Artifact, _: &mut ResolveContext| -> Result<Option<Candidate>, ResolveError> {
            panic!("cached artifact must not be located")
        };
        let again = fx
            .cache
            .download(&jar(), &mut never, &algorithms, DownloadOptions::default(), &mut ctx)
            .unwrap();
        assert_eq!(again.status, DownloadStatus::NoOp);
        assert_eq!(again.origin, report.origin);
    }

    #[test]
    fn test_checksum_mismatch_leaves_nothing() {
        let fx = fixture();
        fs::write(
            fx.repo_dir.join("lib-1.0.jar.md5"),
            "00000000000000000000000000000000",
        )
        .unwrap();
        let mut locate = locator(&fx.repo, fx.repo_dir.join("lib-1.0.jar"));
        let report = fx
            .cache
            .download(
                &jar(),
                &mut locate,
                &[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5],
                DownloadOptions::default(),
                &mut ResolveContext::new(),
            )
            .unwrap();
        assert_eq!(report.status, DownloadStatus::Failed);
        assert!(report.details.unwrap().starts_with("invalid md5: expected=0000"));
        let archive = fx.cache.archive_path(&jar()).unwrap();
        assert!(!archive.exists());
        assert!(leftover_parts(archive.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_missing_artifact_and_url_fallback() {
        let fx = fixture();
        let mut nothing =
            |_: &Artifact, _: &mut ResolveContext| -> Result<Option<Candidate>, ResolveError> { Ok(None) };
        let report = fx
            .cache
            .download(&jar(), &mut nothing, &[], DownloadOptions::default(), &mut ResolveContext::new())
            .unwrap();
        assert_eq!(report.status, DownloadStatus::Failed);
        assert_eq!(report.details.as_deref(), Some(MISSING_ARTIFACT));

        let url = format!("file:{}", fx.repo_dir.join("lib-1.0.jar").display());
        let report = fx
            .cache
            .download(&jar().with_url(url), &mut nothing, &[], DownloadOptions::default(), &mut ResolveContext::new())
            .unwrap();
        assert_eq!(report.status, DownloadStatus::Successful);
    }

    #[test]
    fn test_use_origin_records_without_copy() {
        let fx = fixture();
        let local: Arc<dyn Repository> = Arc::new(FileRepository::new());
        let mut locate = locator(&local, fx.repo_dir.join("lib-1.0.jar"));
        let options = DownloadOptions { use_origin: true };
        let report = fx
            .cache
            .download(&jar(), &mut locate, &[], options, &mut ResolveContext::new())
            .unwrap();
        assert_eq!(report.status, DownloadStatus::NoOp);
        assert_eq!(report.local_file, Some(fx.repo_dir.join("lib-1.0.jar")));
        assert!(!fx.cache.archive_path(&jar()).unwrap().exists());
        assert!(fx.cache.saved_artifact_origin(&jar()).unwrap().unwrap().is_local);
    }

    #[test]
    fn test_cache_as_repository_is_forbidden() {
        let fx = fixture();
        let archive = fx.cache.archive_path(&jar()).unwrap();
        let local: Arc<dyn Repository> = Arc::new(FileRepository::new());
        let mut into_cache = |_: &Artifact, _: &mut ResolveContext| {
            let mut resource = crate::repository::Resource::missing(archive.display().to_string(), true);
            resource.exists = true;
            Ok(Some(Candidate::new(resource, "1.0", Arc::clone(&local))))
        };
        let report = fx
            .cache
            .download(&jar(), &mut into_cache, &[], DownloadOptions::default(), &mut ResolveContext::new())
            .unwrap();
        assert_eq!(report.status, DownloadStatus::Failed);
        assert!(report.details.unwrap().contains("pointing a repository to the cache is forbidden"));
    }

    #[test]
    fn test_concurrent_downloads_commit_complete_file() {
        let dir = TempDir::new().unwrap();
        let cache = RepositoryCache::new(dir.path().join("cache"));
        let first: Arc<dyn Repository> = Arc::new(Slow {
            chunks: ["AAAA", "AAAA", "AAAA"],
            pause: Duration::from_millis(100),
        });
        let second: Arc<dyn Repository> = Arc::new(Slow {
            chunks: ["BBBB", "BBBB", "BBBB"],
            pause: Duration::from_millis(100),
        });

        let reports = thread::scope(|scope| {
            let spawn = |repo: Arc<dyn Repository>, delay: u64| {
                let cache = &cache;
                scope.spawn(move || {
                    thread::sleep(Duration::from_millis(delay));
                    let mut locate = |artifact: &Artifact,
                                      _: &mut ResolveContext|
                     -> Result<Option<Candidate>, ResolveError> {
                        let resource = repo.resource("lib-1.0.jar").map_err(ResolveError::from)?;
                        Ok(Some(Candidate::new(resource, artifact.module.revision.clone(), Arc::clone(&repo))))
                    };
                    cache
                        .download(&jar(), &mut locate, &[], DownloadOptions::default(), &mut ResolveContext::new())
                        .unwrap()
                })
            };
            let a = spawn(first, 0);
            let b = spawn(second, 150);
            [a.join().unwrap(), b.join().unwrap()]
        });

        for report in &reports {
            assert_ne!(report.status, DownloadStatus::Failed, "{:?}", report.details);
        }
        let archive = cache.archive_path(&jar()).unwrap();
        let content = fs::read_to_string(&archive).unwrap();
        assert!(content == "AAAAAAAAAAAA" || content == "BBBBBBBBBBBB", "{content:?}");
        assert!(leftover_parts(archive.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_failed_rename_reports_failure_and_cleans_up() {
        let fx = fixture();
        let archive = fx.cache.archive_path(&jar()).unwrap();
        // A non-empty directory at the destination makes the final rename fail
        fs::create_dir_all(archive.join("blocker")).unwrap();

        let mut locate = locator(&fx.repo, fx.repo_dir.join("lib-1.0.jar"));
        let report = fx
            .cache
            .download(&jar(), &mut locate, &[], DownloadOptions::default(), &mut ResolveContext::new())
            .unwrap();
        assert_eq!(report.status, DownloadStatus::Failed);
        assert!(
            report
                .details
                .unwrap()
                .starts_with("impossible to move part file to definitive one")
        );
        assert!(!archive.is_file());
        assert!(report.local_file.is_none());
        assert!(fx.cache.saved_artifact_origin(&jar()).unwrap().is_none());
        assert!(leftover_parts(archive.parent().unwrap()).is_empty());
    }
}
