//! Live change annotations for an editor buffer
//!
//! Compares unsaved buffer contents with the file at `HEAD`:
//! 1. `git show HEAD:<path>` into a scratch file
//! 2. buffer bytes into a second scratch file
//! 3. `git diff --no-index` of the two, parsed into line classifications
//!
//! Both git steps go through the shared `CommandRunner`, so they queue
//! behind any other git command and retry on a locked index.

mod cache;

pub use cache::*;

use std::path::{Path, PathBuf};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::diff::LineClassification;
use crate::error::DiffError;
use crate::repo::{GitRootCache, relative_path};
use crate::runner::{
    CommandResolver, CommandRunner, DEFAULT_MAX_RETRIES, FallbackEncoding, Invocation, Outcome,
    StdoutSink,
};

/// What an annotation request delivers
pub type Annotations = Result<Vec<LineClassification>, DiffError>;

/// Computes annotations for buffers of files inside git repositories
#[derive(Clone)]
pub struct Annotator {
    runner: CommandRunner,
    roots: GitRootCache,
    cache: AnnotationCache,
    resolver: CommandResolver,
    max_retries: u32,
    fallback_encoding: Option<FallbackEncoding>,
}

impl Annotator {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            roots: GitRootCache::new(),
            cache: AnnotationCache::new(),
            resolver: CommandResolver::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            fallback_encoding: None,
        }
    }

    pub fn from_config(runner: CommandRunner, config: &Config) -> Self {
        Self {
            runner,
            roots: GitRootCache::with_ttl(config.root_cache_ttl()),
            cache: AnnotationCache::new(),
            resolver: CommandResolver::from_config(config),
            max_retries: config.max_retries,
            fallback_encoding: config.fallback(),
        }
    }

    pub fn with_roots(mut self, roots: GitRootCache) -> Self {
        self.roots = roots;
        self
    }

    pub fn cache(&self) -> &AnnotationCache {
        &self.cache
    }

    /// Annotate `buffer` as the current contents of `file`
    ///
    /// `handler` runs once on the main context with the result. It does not
    /// run if the request is abandoned, which happens when the repository
    /// directory disappears or git cannot be spawned.
    pub fn annotate<F>(
        &self,
        file: impl Into<PathBuf>,
        buffer: impl Into<Vec<u8>>,
        handler: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Annotations) + Send + 'static,
    {
        let this = self.clone();
        let file = file.into();
        let buffer = buffer.into();

        tokio::spawn(async move {
            let Some(result) = this.compute(&file, buffer).await else {
                debug!("Annotation of {} abandoned", file.display());
                return;
            };
            // Failure is already logged by `post`
            let _ = this.runner.main_context().post(move || handler(result));
        })
    }

    #[instrument(skip(self, file, buffer), fields(file = %file.display()))]
    async fn compute(&self, file: &Path, buffer: Vec<u8>) -> Option<Annotations> {
        let dir = file.parent().unwrap_or(Path::new("."));
        let Some(root) = self.roots.find(dir).await else {
            return Some(Err(DiffError::NotInRepository(file.to_path_buf())));
        };
        let Some(relative) = relative_path(&root, file) else {
            return Some(Err(DiffError::NotInRepository(file.to_path_buf())));
        };

        let scratch = match Scratch::create(&buffer).await {
            Ok(scratch) => scratch,
            Err(e) => return Some(Err(DiffError::Scratch(e.to_string()))),
        };

        let show = self
            .git(["show".to_string(), format!("HEAD:{}", relative)], &root)
            .with_stdout(StdoutSink::File(scratch.head.clone()))
            // Exit 128 here means "not in HEAD", not a locked index
            .with_max_retries(1);
        match self.run(show).await? {
            Outcome::Completed(execution) if !execution.success() => {
                // Not in HEAD yet; every line counts as inserted
                debug!("{} is not in HEAD", relative);
                if let Err(e) = tokio::fs::write(&scratch.head, b"").await {
                    return Some(Err(DiffError::Scratch(e.to_string())));
                }
            }
            Outcome::Completed(_) => {}
            Outcome::Failed(message) => return Some(Err(DiffError::GitError(message))),
        }

        let diff = self.git(
            [
                "diff".to_string(),
                "--no-color".to_string(),
                "-u".to_string(),
                "--no-index".to_string(),
                "--".to_string(),
                scratch.head.display().to_string(),
                scratch.buffer.display().to_string(),
            ],
            &root,
        );
        let text = match self.run(diff).await? {
            Outcome::Completed(execution) => execution.output,
            Outcome::Failed(message) => return Some(Err(DiffError::GitError(message))),
        };

        let result = self
            .cache
            .classify(file, &text)
            .await
            .map(|changes| changes.as_ref().clone());
        if let Err(e) = &result {
            warn!("Failed to annotate {}: {}", file.display(), e);
        }
        Some(result)
    }

    fn git<I>(&self, args: I, root: &Path) -> Invocation
    where
        I: IntoIterator<Item = String>,
    {
        let argv = self.resolver.resolve(Invocation::git(args).argv);
        Invocation::new(argv)
            .with_working_dir(root)
            .with_max_retries(self.max_retries)
            .with_fallback_encoding(self.fallback_encoding)
    }

    /// Run one step and wait for its outcome to reach the main context
    ///
    /// `None` when the runner abandoned the invocation.
    async fn run(&self, invocation: Invocation) -> Option<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.runner.execute(invocation, move |outcome, ()| {
            let _ = tx.send(outcome);
        });
        rx.await.ok()
    }
}

/// Scratch files for one annotation, removed on drop
struct Scratch {
    _dir: tempfile::TempDir,
    head: PathBuf,
    buffer: PathBuf,
}

impl Scratch {
    async fn create(buffer: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("git-pipeline-").tempdir()?;
        let head = dir.path().join("head");
        let buffer_path = dir.path().join("buffer");
        tokio::fs::write(&buffer_path, buffer).await?;

        Ok(Self {
            _dir: dir,
            head,
            buffer: buffer_path,
        })
    }
}
