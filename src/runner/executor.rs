//! Serialized async command executor
//!
//! Runs invocations on worker tasks with:
//! - One process at a time across the whole runner (git's index is single-writer)
//! - Bounded retries while git exits with the "index locked" code
//! - UTF-8 decoding with a per-invocation fallback encoding
//! - Exactly-once delivery of the outcome on the main context

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{Invocation, MainContext, RawOutput, Spawn, SpawnRequest, SystemSpawner, decode_output};
use crate::error::RunnerError;

/// Exit code git uses when it cannot take `index.lock`
pub const INDEX_LOCKED_EXIT_CODE: i32 = 128;

/// Default pause between locked-index retries
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Receives configuration problems (missing executables) for the user
pub type AlertHandler = Arc<dyn Fn(String) + Send + Sync>;

/// A process that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Decoded merged stdout/stderr of the last attempt
    pub output: String,
    /// Exit code of the last attempt; `None` if it was killed by a signal
    pub exit_code: Option<i32>,
    /// Number of spawn attempts made
    pub attempts: u32,
}

impl Execution {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Every attempt hit a locked index
    pub fn index_locked(&self) -> bool {
        self.exit_code == Some(INDEX_LOCKED_EXIT_CODE)
    }
}

/// What the completion handler receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The process ran; the caller decides whether the exit code is a failure
    Completed(Execution),
    /// The process could not be run at all
    Failed(String),
}

impl Outcome {
    /// Text to show the user: the output, or the error message
    pub fn text(&self) -> &str {
        match self {
            Outcome::Completed(execution) => &execution.output,
            Outcome::Failed(message) => message,
        }
    }

    pub fn execution(&self) -> Option<&Execution> {
        match self {
            Outcome::Completed(execution) => Some(execution),
            Outcome::Failed(_) => None,
        }
    }
}

struct Shared {
    spawner: Arc<dyn Spawn>,
    main: MainContext,
    /// Held for the whole retry loop of one invocation
    lock: Mutex<()>,
    active: AtomicUsize,
    retry_delay: Duration,
    alert: AlertHandler,
    warned_missing: AtomicBool,
}

/// Async command runner
///
/// Cheap to clone; all clones share the lock and the busy counter. Construct
/// one per host process and hand it to every caller.
#[derive(Clone)]
pub struct CommandRunner {
    shared: Arc<Shared>,
}

/// Builder for `CommandRunner`
pub struct CommandRunnerBuilder {
    spawner: Option<Arc<dyn Spawn>>,
    retry_delay: Duration,
    alert: Option<AlertHandler>,
}

impl CommandRunnerBuilder {
    /// Use a custom spawner instead of real processes
    pub fn spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Handler for configuration alerts, run on the main context
    pub fn on_alert<F>(mut self, alert: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.alert = Some(Arc::new(alert));
        self
    }

    pub fn build(self, main: MainContext) -> CommandRunner {
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(SystemSpawner::new()));
        let alert = self
            .alert
            .unwrap_or_else(|| Arc::new(|message: String| error!("{}", message)));

        CommandRunner {
            shared: Arc::new(Shared {
                spawner,
                main,
                lock: Mutex::new(()),
                active: AtomicUsize::new(0),
                retry_delay: self.retry_delay,
                alert,
                warned_missing: AtomicBool::new(false),
            }),
        }
    }
}

impl CommandRunner {
    /// Create a runner spawning real processes with default settings
    pub fn new(main: MainContext) -> Self {
        Self::builder().build(main)
    }

    pub fn builder() -> CommandRunnerBuilder {
        CommandRunnerBuilder {
            spawner: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            alert: None,
        }
    }

    /// Context on which outcomes and alerts are delivered
    pub fn main_context(&self) -> &MainContext {
        &self.shared.main
    }

    /// Whether any invocation is waiting for or holding the lock
    pub fn is_busy(&self) -> bool {
        self.active_commands() != 0
    }

    /// Number of invocations waiting for or holding the lock
    pub fn active_commands(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Run an invocation on a worker task
    ///
    /// Returns immediately. `handler` is called at most once, on the main
    /// context, with the outcome and the invocation's context value. It is
    /// never called when the working directory no longer exists or when the
    /// executable is missing (that goes to the alert handler instead).
    ///
    /// Awaiting the returned handle is optional; it resolves once the
    /// delivery has been queued.
    pub fn execute<C, F>(&self, invocation: Invocation<C>, handler: F) -> JoinHandle<()>
    where
        C: Send + 'static,
        F: FnOnce(Outcome, C) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run(invocation, handler).await })
    }
}

/// Keeps the busy counter accurate on every exit path
struct BusyGuard<'a>(&'a AtomicUsize);

impl<'a> BusyGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    #[instrument(skip_all, fields(id = %invocation.id, command = %invocation.display_command()))]
    async fn run<C, F>(&self, invocation: Invocation<C>, handler: F)
    where
        C: Send + 'static,
        F: FnOnce(Outcome, C) + Send + 'static,
    {
        let argv = invocation.spawn_argv();
        let Invocation {
            working_dir,
            stdin,
            stdout,
            max_retries,
            fallback_encoding,
            suppress_output_on_error,
            context,
            ..
        } = invocation;

        if let Some(dir) = &working_dir {
            if !dir_exists(dir).await {
                debug!("Working directory {:?} no longer exists, abandoning", dir);
                return;
            }
        }

        if argv.is_empty() {
            warn!("Refusing to run an empty command");
            self.deliver(
                handler,
                Outcome::Failed(RunnerError::EmptyCommand.to_string()),
                context,
            );
            return;
        }

        let request = SpawnRequest {
            argv: &argv,
            working_dir: working_dir.as_deref(),
            stdin: stdin.as_deref(),
            stdout: &stdout,
        };

        let result = {
            let _busy = BusyGuard::enter(&self.active);
            let _guard = self.lock.lock().await;
            self.attempts(request, max_retries).await
        };

        match result {
            Ok((raw, attempts)) => {
                let success = raw.exit_code == Some(0);
                let output = if suppress_output_on_error && !success {
                    String::new()
                } else {
                    decode_output(raw.bytes, fallback_encoding)
                };

                debug!(exit_code = ?raw.exit_code, attempts, "Command finished");
                let execution = Execution {
                    output,
                    exit_code: raw.exit_code,
                    attempts,
                };
                self.deliver(handler, Outcome::Completed(execution), context);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Spawning in a directory removed after the check above also
                // reports NotFound
                let vanished = match &working_dir {
                    Some(dir) => !dir_exists(dir).await,
                    None => false,
                };
                if vanished {
                    debug!("Working directory {:?} vanished before spawn, abandoning", working_dir);
                } else {
                    self.alert_missing(&argv[0]);
                }
            }
            Err(e) => {
                let err = RunnerError::SpawnFailed {
                    command: argv[0].clone(),
                    source: e,
                };
                warn!("{}", err);
                let message = if suppress_output_on_error {
                    String::new()
                } else {
                    err.to_string()
                };
                self.deliver(handler, Outcome::Failed(message), context);
            }
        }
    }

    /// Spawn until the exit code is not "index locked" or attempts run out
    async fn attempts(
        &self,
        request: SpawnRequest<'_>,
        max_retries: u32,
    ) -> io::Result<(RawOutput, u32)> {
        let max_attempts = max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                info!("Retrying (attempt {}/{})", attempt, max_attempts);
            }

            let raw = self.spawner.run(request).await?;

            if raw.exit_code == Some(INDEX_LOCKED_EXIT_CODE) && attempt < max_attempts {
                warn!("Index locked, retrying in {:?}", self.retry_delay);
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            return Ok((raw, attempt));
        }
    }

    fn deliver<C, F>(&self, handler: F, outcome: Outcome, context: C)
    where
        C: Send + 'static,
        F: FnOnce(Outcome, C) + Send + 'static,
    {
        // Failure is already logged by `post`
        let _ = self.main.post(move || handler(outcome, context));
    }

    fn alert_missing(&self, binary: &str) {
        let err = RunnerError::ExecutableNotFound {
            binary: binary.to_string(),
        };

        if self.warned_missing.swap(true, Ordering::SeqCst) {
            warn!("{}", err);
            return;
        }

        let message = missing_binary_message(binary, &std::env::var("PATH").unwrap_or_default());
        let alert = Arc::clone(&self.alert);
        let _ = self.main.post(move || alert(message));
    }
}

async fn dir_exists(dir: &Path) -> bool {
    tokio::fs::metadata(dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// User-facing text for a binary that could not be spawned
pub fn missing_binary_message(binary: &str, path: &str) -> String {
    let setting = Path::new(binary)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(binary)
        .replace('-', "_");

    format!(
        "{} binary could not be found in PATH\n\n\
         Consider setting `{}_command` in the git-pipeline configuration\n\n\
         PATH is: {}",
        binary, setting, path
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::runner::{FallbackEncoding, MainLoop, StdoutSink, main_loop};

    /// Replays canned results and records every attempt
    #[derive(Default)]
    struct ScriptedSpawner {
        script: StdMutex<VecDeque<io::Result<RawOutput>>>,
        calls: StdMutex<Vec<Vec<String>>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        hold: Duration,
    }

    impl ScriptedSpawner {
        fn new(script: Vec<io::Result<RawOutput>>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                ..Default::default()
            })
        }

        fn exits(codes: &[i32]) -> Arc<Self> {
            Self::new(codes.iter().map(|&code| Ok(exit(code, "out"))).collect())
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Spawn for ScriptedSpawner {
        async fn run(&self, request: SpawnRequest<'_>) -> io::Result<RawOutput> {
            self.calls.lock().unwrap().push(request.argv.to_vec());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(exit(0, "")))
        }
    }

    fn exit(code: i32, output: &str) -> RawOutput {
        RawOutput {
            bytes: output.as_bytes().to_vec(),
            exit_code: Some(code),
        }
    }

    fn runner(spawner: Arc<ScriptedSpawner>) -> (CommandRunner, MainLoop) {
        let (ctx, main) = main_loop();
        let runner = CommandRunner::builder()
            .spawner(spawner)
            .retry_delay(Duration::from_millis(1))
            .build(ctx);
        (runner, main)
    }

    /// Execute and collect whatever gets delivered on the main context
    async fn execute_collect<C: Send + 'static>(
        runner: &CommandRunner,
        main: &mut MainLoop,
        invocation: Invocation<C>,
    ) -> Vec<(Outcome, C)> {
        let delivered = Arc::new(StdMutex::new(Vec::new()));
        let sink = delivered.clone();
        runner
            .execute(invocation, move |outcome, context| {
                sink.lock().unwrap().push((outcome, context));
            })
            .await
            .unwrap();
        main.run_pending();
        let mut delivered = delivered.lock().unwrap();
        std::mem::take(&mut *delivered)
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_abandoned() {
        let spawner = ScriptedSpawner::exits(&[0]);
        let (runner, mut main) = runner(spawner.clone());

        let invocation = Invocation::git(["status"]).with_working_dir("/no/such/dir/for/git-pipeline");
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert!(delivered.is_empty());
        assert_eq!(spawner.calls(), 0);
        assert_eq!(runner.active_commands(), 0);
    }

    #[tokio::test]
    async fn test_empty_args_stripped_before_spawn() {
        let spawner = ScriptedSpawner::exits(&[0]);
        let (runner, mut main) = runner(spawner.clone());

        let invocation = Invocation::new(["git", "", "status", "--porcelain", ""]);
        execute_collect(&runner, &mut main, invocation).await;

        assert_eq!(
            spawner.calls.lock().unwrap()[0],
            vec!["git", "status", "--porcelain"]
        );
    }

    #[tokio::test]
    async fn test_retries_until_limit_on_locked_index() {
        let spawner = ScriptedSpawner::exits(&[128, 128, 128, 128]);
        let (runner, mut main) = runner(spawner.clone());

        let invocation = Invocation::git(["commit"]).with_max_retries(3);
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert_eq!(spawner.calls(), 3);
        let execution = delivered[0].0.execution().unwrap().clone();
        assert_eq!(execution.attempts, 3);
        assert!(execution.index_locked());
        assert_eq!(execution.output, "out");
    }

    #[tokio::test]
    async fn test_retry_stops_after_unlocked_exit() {
        let spawner = ScriptedSpawner::exits(&[128, 128, 0]);
        let (runner, mut main) = runner(spawner.clone());

        let delivered = execute_collect(&runner, &mut main, Invocation::git(["add", "."])).await;

        assert_eq!(spawner.calls(), 3);
        assert!(delivered[0].0.execution().unwrap().success());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let spawner = ScriptedSpawner::exits(&[1, 0]);
        let (runner, mut main) = runner(spawner.clone());

        let delivered = execute_collect(&runner, &mut main, Invocation::git(["merge"])).await;

        assert_eq!(spawner.calls(), 1);
        assert_eq!(delivered[0].0.execution().unwrap().exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_zero_retries_still_runs_once() {
        let spawner = ScriptedSpawner::exits(&[128]);
        let (runner, mut main) = runner(spawner.clone());

        execute_collect(&runner, &mut main, Invocation::git(["gc"]).with_max_retries(0)).await;
        assert_eq!(spawner.calls(), 1);
    }

    #[tokio::test]
    async fn test_context_passed_through() {
        #[derive(Debug, PartialEq)]
        struct ViewContext {
            view_id: u32,
            title: &'static str,
        }

        let (runner, mut main) = runner(ScriptedSpawner::exits(&[0]));
        let invocation = Invocation::git(["log"]).with_context(ViewContext {
            view_id: 9,
            title: "Git Log",
        });
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert_eq!(
            delivered[0].1,
            ViewContext {
                view_id: 9,
                title: "Git Log"
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_encoding_applied() {
        let spawner = ScriptedSpawner::new(vec![Ok(RawOutput {
            bytes: vec![b'n', 0xE4, b'h'],
            exit_code: Some(0),
        })]);
        let (runner, mut main) = runner(spawner);

        let invocation = Invocation::git(["show"])
            .with_fallback_encoding(FallbackEncoding::from_label("latin1"));
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert_eq!(delivered[0].0.text(), "n\u{e4}h");
    }

    #[tokio::test]
    async fn test_suppress_output_on_error() {
        let spawner = ScriptedSpawner::new(vec![Ok(exit(1, "fatal: bad revision"))]);
        let (runner, mut main) = runner(spawner);

        let invocation = Invocation::git(["rev-parse", "nope"]).suppress_output_on_error();
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert_eq!(delivered[0].0.text(), "");
    }

    #[tokio::test]
    async fn test_missing_executable_alerts_once() {
        let spawner = ScriptedSpawner::new(vec![
            Err(io::Error::from(io::ErrorKind::NotFound)),
            Err(io::Error::from(io::ErrorKind::NotFound)),
        ]);
        let alerts = Arc::new(StdMutex::new(Vec::new()));
        let sink = alerts.clone();
        let (ctx, mut main) = main_loop();
        let runner = CommandRunner::builder()
            .spawner(spawner)
            .on_alert(move |message| sink.lock().unwrap().push(message))
            .build(ctx);

        let first = execute_collect(&runner, &mut main, Invocation::new(["gitk"])).await;
        let second = execute_collect(&runner, &mut main, Invocation::new(["gitk"])).await;

        assert!(first.is_empty());
        assert!(second.is_empty());
        let alerts = alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("gitk binary could not be found"));
        assert!(alerts[0].contains("gitk_command"));
    }

    /// Removes the working directory, then fails the way a spawn there does
    struct VanishingDirSpawner(std::path::PathBuf);

    #[async_trait]
    impl Spawn for VanishingDirSpawner {
        async fn run(&self, _request: SpawnRequest<'_>) -> io::Result<RawOutput> {
            std::fs::remove_dir(&self.0)?;
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[tokio::test]
    async fn test_dir_vanishing_at_spawn_is_not_a_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();

        let alerts = Arc::new(StdMutex::new(Vec::new()));
        let sink = alerts.clone();
        let (ctx, mut main) = main_loop();
        let runner = CommandRunner::builder()
            .spawner(Arc::new(VanishingDirSpawner(work.clone())))
            .on_alert(move |message| sink.lock().unwrap().push(message))
            .build(ctx);

        let invocation = Invocation::git(["status"]).with_working_dir(&work);
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert!(delivered.is_empty());
        assert!(alerts.lock().unwrap().is_empty());
        assert_eq!(runner.active_commands(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unopenable_output_file_delivered_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let alerts = Arc::new(StdMutex::new(Vec::new()));
        let sink = alerts.clone();
        let (ctx, mut main) = main_loop();
        let runner = CommandRunner::builder()
            .on_alert(move |message| sink.lock().unwrap().push(message))
            .build(ctx);

        let invocation = Invocation::new(["sh", "-c", "echo hi"]).with_stdout(StdoutSink::File(
            dir.path().join("no-such-parent").join("out.txt"),
        ));
        let delivered = execute_collect(&runner, &mut main, invocation).await;

        assert_eq!(delivered.len(), 1);
        match &delivered[0].0 {
            Outcome::Failed(message) => {
                assert!(message.contains("Failed to spawn sh"));
                assert!(message.contains("out.txt"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_error_delivered_as_failure() {
        let spawner = ScriptedSpawner::new(vec![Err(io::Error::from(
            io::ErrorKind::PermissionDenied,
        ))]);
        let (runner, mut main) = runner(spawner);

        let delivered = execute_collect(&runner, &mut main, Invocation::git(["status"])).await;

        match &delivered[0].0 {
            Outcome::Failed(message) => assert!(message.contains("Failed to spawn git")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(runner.active_commands(), 0);
    }

    #[tokio::test]
    async fn test_empty_command_fails() {
        let spawner = ScriptedSpawner::exits(&[0]);
        let (runner, mut main) = runner(spawner.clone());

        let delivered = execute_collect(&runner, &mut main, Invocation::new(["", ""])).await;

        assert_eq!(spawner.calls(), 0);
        assert!(matches!(delivered[0].0, Outcome::Failed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_process_at_a_time() {
        let spawner = Arc::new(ScriptedSpawner {
            hold: Duration::from_millis(5),
            ..Default::default()
        });
        let (runner, mut main) = runner(spawner.clone());

        let handles: Vec<_> = (0..8)
            .map(|i| runner.execute(Invocation::git(["status"]).with_context(i), |_, _| {}))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(main.run_pending(), 8);
        assert_eq!(spawner.calls(), 8);
        assert_eq!(spawner.max_running.load(Ordering::SeqCst), 1);
        assert!(!runner.is_busy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_busy_while_running() {
        let spawner = Arc::new(ScriptedSpawner {
            hold: Duration::from_millis(200),
            ..Default::default()
        });
        let (runner, mut main) = runner(spawner);

        let handle = runner.execute(Invocation::git(["fetch"]), |_, _| {});
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runner.is_busy());
        assert_eq!(runner.active_commands(), 1);

        handle.await.unwrap();
        assert!(!runner.is_busy());
        assert_eq!(main.run_pending(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handlers_run_on_main_context() {
        let (runner, mut main) = runner(ScriptedSpawner::exits(&[0, 0, 0]));
        let main_thread = std::thread::current().id();
        let threads = Arc::new(StdMutex::new(Vec::new()));

        for _ in 0..3 {
            let threads = threads.clone();
            runner.execute(Invocation::git(["status"]), move |_, _| {
                threads.lock().unwrap().push(std::thread::current().id());
            });
        }
        drop(runner);

        // Worker tasks hold the only remaining senders; run until they finish
        main.run().await;

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|id| *id == main_thread));
    }

    #[test]
    fn test_missing_binary_message() {
        let message = missing_binary_message("/usr/bin/git-flow", "/usr/bin:/bin");
        assert!(message.starts_with("/usr/bin/git-flow binary could not be found"));
        assert!(message.contains("git_flow_command"));
        assert!(message.ends_with("PATH is: /usr/bin:/bin"));
    }

    proptest! {
        #[test]
        fn prop_attempts_bounded_by_max_retries(locked in 0usize..8, max_retries in 1u32..6) {
            let mut codes = vec![INDEX_LOCKED_EXIT_CODE; locked];
            codes.push(0);
            let spawner = ScriptedSpawner::exits(&codes);
            let (runner, mut main) = runner(spawner.clone());

            let delivered = tokio_test::block_on(execute_collect(
                &runner,
                &mut main,
                Invocation::git(["status"]).with_max_retries(max_retries),
            ));

            let expected = (locked + 1).min(max_retries as usize);
            prop_assert_eq!(spawner.calls(), expected);
            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(delivered[0].0.execution().unwrap().attempts as usize, expected);
        }
    }
}
