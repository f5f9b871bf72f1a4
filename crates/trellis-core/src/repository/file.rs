use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use trellis_schema::Artifact;

use super::{Repository, RepositoryError, Resource, file_path};
use crate::fsutil::staging_file;

/// Repository on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileRepository {
    base_dir: Option<PathBuf>,
    local: bool,
}

impl Default for FileRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRepository {
    pub fn new() -> Self {
        Self {
            base_dir: None,
            local: true,
        }
    }

    /// Resolve relative locations against `base_dir`.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Treat resources as remote, so they are copied into the cache even in use-origin mode.
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    fn path(&self, location: &str) -> PathBuf {
        let path = Path::new(file_path(location));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), RepositoryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RepositoryError::io("create", parent, e))?;
    }
    Ok(())
}

impl Repository for FileRepository {
    fn name(&self) -> &str {
        "file"
    }

    fn resource(&self, location: &str) -> Result<Resource, RepositoryError> {
        let path = self.path(location);
        let name = path.display().to_string();
        match fs::metadata(&path) {
            Ok(meta) => Ok(Resource {
                name,
                exists: true,
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                content_length: meta.len(),
                local: self.local,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Resource::missing(name, self.local))
            }
            Err(e) => Err(RepositoryError::io("stat", &path, e)),
        }
    }

    fn get(&self, location: &str, destination: &Path) -> Result<(), RepositoryError> {
        let source = self.path(location);
        if !source.is_file() {
            return Err(RepositoryError::NotFound(source.display().to_string()));
        }
        ensure_parent(destination)?;
        fs::copy(&source, destination).map_err(|e| RepositoryError::io("copy", &source, e))?;
        Ok(())
    }

    fn put(
        &self,
        artifact: &Artifact,
        source: &Path,
        destination: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError> {
        let dest = self.path(destination);
        if dest.exists() && !overwrite {
            return Err(RepositoryError::AlreadyExists(dest.display().to_string()));
        }
        ensure_parent(&dest)?;

        // Copy beside the destination, then rename so readers never see a partial file
        let tmp = staging_file(&dest, ".tmp").map_err(|e| RepositoryError::io("create", &dest, e))?;
        fs::copy(source, tmp.path()).map_err(|e| RepositoryError::io("copy", source, e))?;
        tmp.persist(&dest)
            .map_err(|e| RepositoryError::io("rename", &dest, e.error))?;
        debug!("put {} to {}", artifact, dest.display());
        Ok(())
    }

    fn list(&self, parent: &str) -> Result<Option<Vec<String>>, RepositoryError> {
        let dir = self.path(parent);
        if !dir.is_dir() {
            return Ok(None);
        }
        let entries = fs::read_dir(&dir).map_err(|e| RepositoryError::io("list", &dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RepositoryError::io("list", &dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(Some(names))
    }

    fn delete(&self, location: &str) -> Result<(), RepositoryError> {
        let path = self.path(location);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else if path.exists() {
            fs::remove_file(&path)
        } else {
            Ok(())
        };
        result.map_err(|e| RepositoryError::io("delete", &path, e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), RepositoryError> {
        let from = self.path(from);
        let to = self.path(to);
        ensure_parent(&to)?;
        fs::rename(&from, &to).map_err(|e| RepositoryError::io("rename", &from, e))
    }

    fn supports_transactions(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trellis_schema::Coordinate;

    fn jar() -> Artifact {
        Artifact::new(Coordinate::new("acme", "lib", "1.0"), "lib", "jar", "jar")
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new();
        let src = dir.path().join("src.jar");
        fs::write(&src, b"payload").unwrap();

        let dest = dir.path().join("repo/acme/lib/1.0/lib.jar");
        let dest_str = dest.to_str().unwrap();
        repo.put(&jar(), &src, dest_str, false).unwrap();

        let res = repo.resource(dest_str).unwrap();
        assert!(res.exists);
        assert_eq!(res.content_length, 7);
        assert!(res.last_modified.is_some());

        let copy = dir.path().join("out/lib.jar");
        repo.get(dest_str, &copy).unwrap();
        assert_eq!(fs::read(copy).unwrap(), b"payload");
    }

    #[test]
    fn test_put_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new().with_base_dir(dir.path());
        let src = dir.path().join("src.jar");
        fs::write(&src, b"v1").unwrap();
        repo.put(&jar(), &src, "repo/lib.jar", false).unwrap();

        let err = repo.put(&jar(), &src, "repo/lib.jar", false).unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(_)));
        fs::write(&src, b"v2").unwrap();
        repo.put(&jar(), &src, "repo/lib.jar", true).unwrap();
        assert_eq!(fs::read(dir.path().join("repo/lib.jar")).unwrap(), b"v2");
    }

    #[test]
    fn test_list_missing_parent_is_none() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new().with_base_dir(dir.path());
        assert_eq!(repo.list("nope").unwrap(), None);

        fs::create_dir_all(dir.path().join("acme/lib/1.0")).unwrap();
        fs::create_dir_all(dir.path().join("acme/lib/1.1")).unwrap();
        assert_eq!(
            repo.list("acme/lib").unwrap(),
            Some(vec!["1.0".to_string(), "1.1".to_string()])
        );
    }
}
