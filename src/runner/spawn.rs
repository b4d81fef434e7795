//! Child process spawning
//!
//! One `Spawn::run` call is one attempt: spawn, feed stdin, drain the merged
//! stdout/stderr pipe, wait for exit. Retry policy lives in the executor.

use std::io::{self, Read};
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

use super::StdoutSink;

/// Parameters for a single spawn attempt
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub argv: &'a [String],
    pub working_dir: Option<&'a Path>,
    pub stdin: Option<&'a [u8]>,
    pub stdout: &'a StdoutSink,
}

/// Raw result of one attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// Merged stdout and stderr, in emission order
    pub bytes: Vec<u8>,
    /// Exit code; `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
}

/// Process spawning seam
///
/// `SystemSpawner` is the production implementation; tests substitute
/// scripted spawners to exercise retry and delivery paths.
#[async_trait]
pub trait Spawn: Send + Sync {
    async fn run(&self, request: SpawnRequest<'_>) -> io::Result<RawOutput>;
}

/// Spawns real OS processes with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemSpawner {
    /// Variables set on top of the inherited environment
    env: Vec<(String, String)>,
}

impl SystemSpawner {
    /// Create a spawner that inherits the current environment
    pub fn new() -> Self {
        let env = home_override(|key| std::env::var(key).ok())
            .into_iter()
            .collect();
        Self { env }
    }

    fn command(&self, request: &SpawnRequest<'_>) -> io::Result<Command> {
        let (program, args) = request.argv.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector")
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args).envs(self.env.iter().map(|(k, v)| (k, v)));

        if let Some(dir) = request.working_dir {
            cmd.current_dir(dir);
        }

        if request.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW: keep console windows from flashing up
            cmd.creation_flags(0x0800_0000);
        }

        Ok(cmd)
    }
}

#[async_trait]
impl Spawn for SystemSpawner {
    async fn run(&self, request: SpawnRequest<'_>) -> io::Result<RawOutput> {
        let mut cmd = self.command(&request)?;

        match request.stdout {
            StdoutSink::Capture => {
                // Both streams share one pipe so output keeps its interleaving
                let (mut reader, writer) = io::pipe()?;
                cmd.stdout(writer.try_clone()?).stderr(writer);

                let mut child = cmd.spawn()?;
                // The command still owns the write ends; the reader only sees
                // EOF once they are closed
                drop(cmd);

                let drain = tokio::task::spawn_blocking(move || {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf).map(|_| buf)
                });

                feed_stdin(&mut child, request.stdin).await?;
                let status = child.wait().await?;
                let bytes = drain.await.map_err(io::Error::other)??;

                debug!("Child exited with {:?}, {} bytes", status.code(), bytes.len());
                Ok(RawOutput {
                    bytes,
                    exit_code: status.code(),
                })
            }
            StdoutSink::File(path) => {
                // Only the spawn itself may report NotFound; that kind means
                // a missing executable to the runner
                let file = std::fs::File::create(path).map_err(|e| {
                    io::Error::other(format!("cannot open {}: {}", path.display(), e))
                })?;
                cmd.stdout(file.try_clone()?).stderr(file);

                let mut child = cmd.spawn()?;
                drop(cmd);

                feed_stdin(&mut child, request.stdin).await?;
                let status = child.wait().await?;

                debug!("Child exited with {:?}, output in {:?}", status.code(), path);
                Ok(RawOutput {
                    bytes: Vec::new(),
                    exit_code: status.code(),
                })
            }
        }
    }
}

/// Write the stdin payload and close the pipe
async fn feed_stdin(child: &mut Child, payload: Option<&[u8]>) -> io::Result<()> {
    let (Some(mut stdin), Some(payload)) = (child.stdin.take(), payload) else {
        return Ok(());
    };

    match stdin.write_all(payload).await {
        // The child may exit without reading all of its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Child closed stdin early");
            Ok(())
        }
        other => other,
    }
}

/// HOME override for the child environment
///
/// Git on Windows looks for its global config under `HOME`, which is often
/// unset there; `USERPROFILE` stands in for it.
pub fn home_override(lookup: impl Fn(&str) -> Option<String>) -> Option<(String, String)> {
    if lookup("HOME").is_some() {
        return None;
    }
    lookup("USERPROFILE").map(|profile| ("HOME".to_string(), profile))
}
