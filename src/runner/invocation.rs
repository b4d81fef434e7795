//! Invocation requests consumed by the command runner

use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

use super::FallbackEncoding;

/// Default number of attempts while git reports a locked index
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Unique identifier for a single invocation, used in log spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Create a new random invocation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use first 8 chars for display
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Where the child's stdout (and merged stderr) goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdoutSink {
    /// Captured in memory and delivered as text
    #[default]
    Capture,
    /// Written to a file; the delivered text is empty
    File(PathBuf),
}

/// A single request to run an external process to completion
///
/// `C` is a caller-defined context value handed back to the completion
/// handler untouched.
#[derive(Debug, Clone)]
pub struct Invocation<C = ()> {
    pub id: InvocationId,
    pub argv: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub stdout: StdoutSink,
    pub max_retries: u32,
    pub fallback_encoding: Option<FallbackEncoding>,
    /// Deliver empty text when the final attempt exits nonzero
    pub suppress_output_on_error: bool,
    /// Strip empty arguments before spawning
    pub filter_empty_args: bool,
    pub context: C,
}

impl Invocation<()> {
    /// Create an invocation from a full argument vector
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: InvocationId::new(),
            argv: argv.into_iter().map(Into::into).collect(),
            working_dir: None,
            stdin: None,
            stdout: StdoutSink::Capture,
            max_retries: DEFAULT_MAX_RETRIES,
            fallback_encoding: None,
            suppress_output_on_error: false,
            filter_empty_args: true,
            context: (),
        }
    }

    /// Create a `git` invocation from its arguments
    pub fn git<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(std::iter::once("git".to_string()).chain(args.into_iter().map(Into::into)))
    }
}

impl<C> Invocation<C> {
    /// Attach a typed context value, replacing the current one
    pub fn with_context<D>(self, context: D) -> Invocation<D> {
        Invocation {
            id: self.id,
            argv: self.argv,
            working_dir: self.working_dir,
            stdin: self.stdin,
            stdout: self.stdout,
            max_retries: self.max_retries,
            fallback_encoding: self.fallback_encoding,
            suppress_output_on_error: self.suppress_output_on_error,
            filter_empty_args: self.filter_empty_args,
            context,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_stdout(mut self, sink: StdoutSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_fallback_encoding(mut self, encoding: Option<FallbackEncoding>) -> Self {
        self.fallback_encoding = encoding;
        self
    }

    pub fn suppress_output_on_error(mut self) -> Self {
        self.suppress_output_on_error = true;
        self
    }

    /// Spawn the argument vector exactly as given, empty entries included
    pub fn keep_empty_args(mut self) -> Self {
        self.filter_empty_args = false;
        self
    }

    /// The argument vector the runner will actually spawn
    pub fn spawn_argv(&self) -> Vec<String> {
        if self.filter_empty_args {
            filter_empty_args(&self.argv)
        } else {
            self.argv.clone()
        }
    }

    /// Space-joined command line for status messages and logs
    pub fn display_command(&self) -> String {
        self.spawn_argv().join(" ")
    }
}

/// Drop empty-string arguments, keeping the rest in order
///
/// Callers build argument vectors with conditional `""` placeholders
/// (`["git", "log", if follow { "--follow" } else { "" }]`).
pub fn filter_empty_args(argv: &[String]) -> Vec<String> {
    argv.iter().filter(|arg| !arg.is_empty()).cloned().collect()
}
