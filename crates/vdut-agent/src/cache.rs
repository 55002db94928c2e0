//! Host-local artifact cache
//!
//! Artifacts are keyed by version string and downloaded at most once. The
//! cache is append-only and safe to reuse across sequential runs; concurrent
//! writers are not coordinated.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use vdut_core::AgentError;

/// Produces an artifact for a key at a destination path
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Write the artifact for `key` to `dest`
    async fn fetch(&self, key: &str, dest: &Path) -> Result<(), AgentError>;
}

/// Resolves a key to a local file, fetching it on first use
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn get_or_fetch(&self, key: &str) -> Result<PathBuf, AgentError>;
}

/// Cache stored as `<dir>/<key>/<file_name>`
pub struct DirCache<F> {
    dir: PathBuf,
    file_name: String,
    fetcher: F,
}

impl<F: ArtifactFetcher> DirCache<F> {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>, fetcher: F) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            fetcher,
        }
    }

    /// Path an entry for `key` lives at, whether or not it exists yet
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, AgentError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(AgentError::Cache(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid cache key '{}'", key),
            )));
        }
        Ok(self.dir.join(key).join(&self.file_name))
    }
}

#[async_trait]
impl<F: ArtifactFetcher> ArtifactCache for DirCache<F> {
    async fn get_or_fetch(&self, key: &str) -> Result<PathBuf, AgentError> {
        let path = self.entry_path(key)?;
        if tokio::fs::try_exists(&path).await? {
            tracing::debug!("Cache hit for {} at {}", key, path.display());
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!("Fetching {} into {}", key, path.display());
        let partial = path.with_extension("partial");
        if let Err(e) = self.fetcher.fetch(key, &partial).await {
            if let Err(rm) = tokio::fs::remove_file(&partial).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", partial.display(), rm);
                }
            }
            return Err(e);
        }

        set_executable(&partial).await?;
        tokio::fs::rename(&partial, &path).await?;
        Ok(path)
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct Counting {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ArtifactFetcher for Counting {
        async fn fetch(&self, key: &str, dest: &Path) -> Result<(), AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, format!("binary {}", key)).await?;
            if self.fail {
                return Err(AgentError::Download("connection reset".to_string()));
            }
            Ok(())
        }
    }

    fn cache(dir: &TempDir, fail: bool) -> DirCache<Counting> {
        DirCache::new(
            dir.path(),
            "alloy",
            Counting {
                calls: AtomicU32::new(0),
                fail,
            },
        )
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);

        let first = cache.get_or_fetch("v1.5.1").await.unwrap();
        let second = cache.get_or_fetch("v1.5.1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("v1.5.1").join("alloy"));
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "binary v1.5.1");

        cache.get_or_fetch("v1.6.0").await.unwrap();
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_entry_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = cache(&dir, false).get_or_fetch("v1.5.1").await.unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, true);

        assert!(matches!(
            cache.get_or_fetch("v1.5.1").await,
            Err(AgentError::Download(_))
        ));
        let entry_dir = dir.path().join("v1.5.1");
        assert_eq!(std::fs::read_dir(entry_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_key_cannot_escape_cache_dir() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);
        assert!(cache.entry_path("../etc").is_err());
        assert!(cache.entry_path("..").is_err());
        assert!(cache.entry_path("").is_err());
    }
}
