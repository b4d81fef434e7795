//! git-pipeline - Async git command pipeline
//!
//! Run with `git-pipeline --help` for usage.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use git_pipeline::{
    APP_NAME, Annotator, Config, VERSION,
    diff::{LineSelection, SelectMode, locate, select_hunks},
    repo::{find_git_root, relative_path},
    runner::{CommandResolver, CommandRunner, Invocation, MainLoop, Outcome, main_loop},
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Async git command pipeline with live diff annotations")]
#[command(long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command through the runner and print its merged output
    Run {
        /// Working directory (default: current directory)
        #[arg(short = 'C', long)]
        dir: Option<PathBuf>,

        /// Forward this process's stdin to the command
        #[arg(long)]
        stdin: bool,

        /// Print nothing when the command fails
        #[arg(short, long)]
        quiet: bool,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        argv: Vec<String>,
    },

    /// Print change markers for a file compared with HEAD
    Annotate {
        /// File inside a git repository
        file: PathBuf,

        /// Read the buffer contents from here instead of the file itself
        #[arg(short, long)]
        buffer: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Stage the hunks of a file that touch the given lines
    Stage {
        /// File inside a git repository
        file: PathBuf,

        /// Line or range (`12` or `12-20`), repeatable
        #[arg(short, long = "lines", required = true)]
        lines: Vec<LineSelection>,

        /// Print the patch instead of applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Map a row of a diff to the file and line it shows
    Locate {
        /// File holding the diff text (`-` for stdin)
        diff: PathBuf,

        /// 0-based row within the diff
        row: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Initialize config file with defaults
        #[arg(long)]
        init: bool,
    },
}

fn setup_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info").add_directive("tokio=warn".parse()?)
    };

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(file).with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

/// Drive the main loop until `rx` resolves
///
/// Returns `None` when the work was abandoned and its sender dropped.
async fn wait_on_main<T>(main: &mut MainLoop, mut rx: oneshot::Receiver<T>) -> Option<T> {
    let result = loop {
        tokio::select! {
            result = &mut rx => break result.ok(),
            open = main.run_one() => {
                if !open {
                    break rx.await.ok();
                }
            }
        }
    };
    // Alerts posted alongside an abandoned invocation
    main.run_pending();
    result
}

/// Host for the runner: owns the main loop that results are delivered on
struct Host {
    config: Config,
    runner: CommandRunner,
    resolver: CommandResolver,
    main: MainLoop,
}

impl Host {
    fn new(config: Config) -> Self {
        let (ctx, main) = main_loop();
        let runner = CommandRunner::builder()
            .retry_delay(config.retry_delay())
            .on_alert(|message| eprintln!("{}", message))
            .build(ctx);
        let resolver = CommandResolver::from_config(&config);

        Self {
            config,
            runner,
            resolver,
            main,
        }
    }

    fn invocation(&self, argv: Vec<String>, dir: &Path) -> Invocation {
        Invocation::new(self.resolver.resolve(argv))
            .with_working_dir(dir)
            .with_max_retries(self.config.max_retries)
            .with_fallback_encoding(self.config.fallback())
    }

    async fn execute(&mut self, invocation: Invocation) -> Option<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.runner.execute(invocation, move |outcome, ()| {
            let _ = tx.send(outcome);
        });
        wait_on_main(&mut self.main, rx).await
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).wrap_err_with(|| format!("Invalid path {}", path.display()))
}

/// Repository root and repository-relative path of `file`
fn locate_in_repo(file: &Path) -> Result<(PathBuf, String)> {
    let dir = file.parent().unwrap_or(Path::new("."));
    let root = find_git_root(dir)
        .ok_or_else(|| eyre!("{} is not inside a git repository", file.display()))?;
    let relative = relative_path(&root, file)
        .ok_or_else(|| eyre!("{} is not a file in {}", file.display(), root.display()))?;
    Ok((root, relative))
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if path == Path::new("-") {
        tokio::io::stdin().read_to_end(&mut bytes).await?;
    } else {
        bytes = tokio::fs::read(path)
            .await
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    }
    Ok(bytes)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre error hooks
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults: {}", e);
        Config::default()
    });

    setup_logging(cli.debug || config.debug, config.log_file.as_deref())?;
    debug!("Starting {} v{}", APP_NAME, VERSION);

    match cli.command {
        Commands::Run {
            dir,
            stdin,
            quiet,
            argv,
        } => {
            let dir = match dir {
                Some(dir) => absolute(&dir)?,
                None => std::env::current_dir()?,
            };

            let mut host = Host::new(config);
            let mut invocation = host.invocation(argv, &dir);
            if stdin {
                invocation = invocation.with_stdin(read_input(Path::new("-")).await?);
            }
            if quiet {
                invocation = invocation.suppress_output_on_error();
            }

            match host.execute(invocation).await {
                Some(Outcome::Completed(execution)) => {
                    print!("{}", execution.output);
                    if execution.attempts > 1 {
                        info!("Finished after {} attempts", execution.attempts);
                    }
                    if !execution.success() {
                        std::process::exit(execution.exit_code.unwrap_or(1));
                    }
                }
                Some(Outcome::Failed(message)) => {
                    return Err(eyre!("{}", message));
                }
                None => std::process::exit(127),
            }
        }

        Commands::Annotate { file, buffer, json } => {
            let file = absolute(&file)?;
            let contents = read_input(buffer.as_deref().unwrap_or(&file)).await?;

            let mut host = Host::new(config);
            let annotator = Annotator::from_config(host.runner.clone(), &host.config);

            let (tx, rx) = oneshot::channel();
            annotator.annotate(&file, contents, move |result| {
                let _ = tx.send(result);
            });

            let Some(result) = wait_on_main(&mut host.main, rx).await else {
                return Err(eyre!("Annotation of {} was abandoned", file.display()));
            };
            let changes = result?;

            if json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
            } else {
                for change in &changes {
                    println!("{:>6} {}", change.line, change.kind);
                }
            }
        }

        Commands::Stage {
            file,
            lines,
            dry_run,
        } => {
            let file = absolute(&file)?;
            let (root, relative) = locate_in_repo(&file)?;
            let mut host = Host::new(config);

            let diff = host.invocation(
                vec![
                    "git".to_string(),
                    "diff".to_string(),
                    "--no-color".to_string(),
                    "-U1".to_string(),
                    "--".to_string(),
                    relative.clone(),
                ],
                &root,
            );
            let text = match host.execute(diff).await {
                Some(Outcome::Completed(execution)) if execution.success() => execution.output,
                Some(Outcome::Completed(execution)) => return Err(eyre!("{}", execution.output)),
                Some(Outcome::Failed(message)) => return Err(eyre!("{}", message)),
                None => return Err(eyre!("git diff was abandoned")),
            };

            let Some(patch) = select_hunks(&text, &lines, SelectMode::AfterFile)? else {
                println!("No changes in the selected lines of {}", relative);
                return Ok(());
            };

            if dry_run {
                print!("{}", patch);
                return Ok(());
            }

            let apply = host
                .invocation(
                    vec![
                        "git".to_string(),
                        "apply".to_string(),
                        "--cached".to_string(),
                        "-".to_string(),
                    ],
                    &root,
                )
                .with_stdin(patch);
            match host.execute(apply).await {
                Some(Outcome::Completed(execution)) if execution.success() => {
                    println!("Staged selected hunks of {}", relative);
                }
                Some(Outcome::Completed(execution)) => return Err(eyre!("{}", execution.output)),
                Some(Outcome::Failed(message)) => return Err(eyre!("{}", message)),
                None => return Err(eyre!("git apply was abandoned")),
            }
        }

        Commands::Locate { diff, row, json } => {
            let bytes = read_input(&diff).await?;
            let text = git_pipeline::runner::decode_output(bytes, config.fallback());
            let location = locate(&text, row)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&location)?);
            } else {
                println!("{}:{}", location.file, location.line);
            }
        }

        Commands::Config { init } => {
            if init {
                match &cli.config {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
                println!(
                    "Configuration initialized at {:?}",
                    cli.config.map_or_else(Config::config_file_path, Ok)?
                );
            } else {
                println!("Configuration:");
                println!("{}", toml::to_string_pretty(&config)?);
                println!("\nConfig file: {:?}", Config::config_file_path()?);
                let git = CommandResolver::from_config(&config).resolve(vec!["git".to_string()]);
                println!("Git: {}", git[0]);
            }
        }
    }

    Ok(())
}
