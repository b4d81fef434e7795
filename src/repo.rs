//! Repository root discovery
//!
//! Annotation runs on every buffer change, so root lookups are cached for a
//! short TTL. Negative results are cached too, since files outside any
//! repository are looked up just as often.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Default root cache TTL (5s)
pub const DEFAULT_ROOT_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedRoot {
    root: Option<PathBuf>,
    found_at: Instant,
}

impl CachedRoot {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.found_at.elapsed() > ttl
    }
}

/// Nearest ancestor containing `.git`, cached per starting directory
#[derive(Debug, Clone)]
pub struct GitRootCache {
    cache: Arc<RwLock<HashMap<PathBuf, CachedRoot>>>,
    ttl: Duration,
}

impl GitRootCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_ROOT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Repository root for `dir`, if any
    #[instrument(skip(self))]
    pub async fn find(&self, dir: &Path) -> Option<PathBuf> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(dir) {
                if !cached.is_stale(self.ttl) {
                    debug!("Root cache hit for {}", dir.display());
                    return cached.root.clone();
                }
            }
        }

        let root = find_git_root(dir);
        debug!("Root cache miss for {}: {:?}", dir.display(), root);

        let mut cache = self.cache.write().await;
        cache.insert(
            dir.to_path_buf(),
            CachedRoot {
                root: root.clone(),
                found_at: Instant::now(),
            },
        );
        root
    }

    pub async fn invalidate(&self, dir: &Path) {
        let mut cache = self.cache.write().await;
        cache.remove(dir);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }
}

impl Default for GitRootCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk up from `dir` to the first directory holding `.git`
///
/// `.git` may be a file, as in linked worktrees and submodules.
pub fn find_git_root(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .find(|candidate| candidate.join(".git").exists())
        .map(Path::to_path_buf)
}

/// `file` relative to `root` with forward slashes, as git revisions expect
pub fn relative_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_with_subdir() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        (dir, nested)
    }

    #[test]
    fn test_find_git_root() {
        let (dir, nested) = repo_with_subdir();
        assert_eq!(find_git_root(&nested), Some(dir.path().to_path_buf()));
        assert_eq!(find_git_root(dir.path()), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_git_file_counts_as_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".git"), "gitdir: /elsewhere\n").unwrap();
        assert_eq!(find_git_root(dir.path()), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/repo");
        assert_eq!(
            relative_path(root, Path::new("/work/repo/src/main.rs")),
            Some("src/main.rs".to_string())
        );
        assert_eq!(relative_path(root, Path::new("/other/file.rs")), None);
        assert_eq!(relative_path(root, root), None);
    }

    #[tokio::test]
    async fn test_cache_serves_stale_view_within_ttl() {
        let (dir, nested) = repo_with_subdir();
        let cache = GitRootCache::with_ttl(Duration::from_secs(60));

        assert_eq!(cache.find(&nested).await, Some(dir.path().to_path_buf()));

        std::fs::remove_dir(dir.path().join(".git")).unwrap();
        assert_eq!(cache.find(&nested).await, Some(dir.path().to_path_buf()));

        cache.invalidate(&nested).await;
        assert_ne!(cache.find(&nested).await, Some(dir.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_negative_result_cached() {
        let (dir, nested) = repo_with_subdir();
        std::fs::remove_dir(dir.path().join(".git")).unwrap();
        let cache = GitRootCache::with_ttl(Duration::from_secs(60));

        let before = cache.find(&nested).await;
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert_eq!(cache.find(&nested).await, before);

        cache.clear().await;
        assert_eq!(cache.find(&nested).await, Some(dir.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refreshes() {
        let (dir, nested) = repo_with_subdir();
        let cache = GitRootCache::with_ttl(Duration::ZERO);

        assert_eq!(cache.find(&nested).await, Some(dir.path().to_path_buf()));
        std::fs::remove_dir(dir.path().join(".git")).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_ne!(cache.find(&nested).await, Some(dir.path().to_path_buf()));
    }
}
