//! Executable discovery and argv[0] rewriting
//!
//! Editors are often launched from a desktop session whose PATH lacks the
//! directories git installers use, so a few well-known locations are searched
//! after PATH.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;

/// Find an executable named `name` on PATH or in well-known install dirs
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };

    let path_dirs: Vec<PathBuf> = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect())
        .unwrap_or_default();

    search_dirs(&path_dirs, &file_name).or_else(|| search_dirs(&extra_dirs(), &file_name))
}

/// First directory containing an executable `file_name`
pub fn search_dirs(dirs: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file() && is_executable::is_executable(candidate))
}

fn extra_dirs() -> Vec<PathBuf> {
    if cfg!(windows) {
        ["ProgramFiles", "ProgramFiles(x86)"]
            .iter()
            .filter_map(|var| env::var_os(var))
            .map(|root| Path::new(&root).join("Git").join("bin"))
            .collect()
    } else {
        vec![
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/usr/local/git/bin"),
        ]
    }
}

/// Rewrites the program of an argument vector from configuration
#[derive(Debug, Clone, Default)]
pub struct CommandResolver {
    git: Option<String>,
    gitk: Option<String>,
    git_flow: Option<String>,
}

impl CommandResolver {
    /// Build from configuration, discovering unset binaries
    pub fn from_config(config: &Config) -> Self {
        let discover = |name: &str| find_binary(name).map(|path| path.display().to_string());

        Self {
            git: config.git_command.clone().or_else(|| discover("git")),
            gitk: config.gitk_command.clone().or_else(|| discover("gitk")),
            git_flow: config.git_flow_command.clone(),
        }
    }

    /// Build with explicit programs and no discovery
    pub fn new(git: Option<String>, gitk: Option<String>, git_flow: Option<String>) -> Self {
        Self { git, gitk, git_flow }
    }

    /// Apply the configured programs to `argv`
    ///
    /// `git flow <args>` becomes `<git_flow_command> <args>` when a git-flow
    /// binary is configured.
    pub fn resolve(&self, mut argv: Vec<String>) -> Vec<String> {
        let Some(program) = argv.first().cloned() else {
            return argv;
        };

        match program.as_str() {
            "git" => {
                let is_flow = argv.get(1).is_some_and(|arg| arg == "flow");
                match (&self.git_flow, &self.git) {
                    (Some(flow), _) if is_flow => {
                        argv.remove(1);
                        argv[0] = flow.clone();
                    }
                    (_, Some(git)) => argv[0] = git.clone(),
                    _ => {}
                }
            }
            "gitk" => {
                if let Some(gitk) = &self.gitk {
                    argv[0] = gitk.clone();
                }
            }
            _ => {}
        }

        debug!("Resolved program: {}", argv[0]);
        argv
    }
}
