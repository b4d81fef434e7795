//! Per-file annotation cache
//!
//! Editors re-request annotations on every modification, and most of those
//! produce the same diff as last time. Diff text is hashed with xxh3 so an
//! unchanged diff skips the parser.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, instrument};
use xxhash_rust::xxh3::xxh3_64;

use crate::diff::{LineClassification, annotate};
use crate::error::DiffError;

/// Classifications for one diff text
#[derive(Debug, Clone)]
pub struct CachedAnnotations {
    /// Hash of the diff text the changes came from
    pub hash: u64,
    pub changes: Arc<Vec<LineClassification>>,
    pub computed_at: Instant,
}

impl CachedAnnotations {
    pub fn new(diff: &str, changes: Vec<LineClassification>) -> Self {
        Self {
            hash: xxh3_64(diff.as_bytes()),
            changes: Arc::new(changes),
            computed_at: Instant::now(),
        }
    }

    pub fn matches(&self, diff: &str) -> bool {
        self.hash == xxh3_64(diff.as_bytes())
    }
}

/// Cache of file path -> last classifications
#[derive(Debug, Clone, Default)]
pub struct AnnotationCache {
    cache: Arc<RwLock<HashMap<PathBuf, CachedAnnotations>>>,
}

impl AnnotationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `diff` for `path`, reusing the previous result if the diff is unchanged
    ///
    /// Parse errors are returned and not cached.
    #[instrument(skip(self, diff))]
    pub async fn classify(
        &self,
        path: &Path,
        diff: &str,
    ) -> Result<Arc<Vec<LineClassification>>, DiffError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(path) {
                if cached.matches(diff) {
                    debug!("Annotation cache hit for {}", path.display());
                    return Ok(Arc::clone(&cached.changes));
                }
            }
        }

        debug!("Annotation cache miss for {}, parsing", path.display());
        let entry = CachedAnnotations::new(diff, annotate::parse(diff)?);
        let changes = Arc::clone(&entry.changes);

        let mut cache = self.cache.write().await;
        cache.insert(path.to_path_buf(), entry);
        Ok(changes)
    }

    /// Last classifications for `path`, whatever diff they came from
    pub async fn get(&self, path: &Path) -> Option<CachedAnnotations> {
        let cache = self.cache.read().await;
        cache.get(path).cloned()
    }

    pub async fn invalidate(&self, path: &Path) {
        let mut cache = self.cache.write().await;
        cache.remove(path);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}
