//! Audio playback through platform command-line players
//!
//! Candidates are tried in order until one exits successfully:
//!
//! - Windows: PowerShell `Media.SoundPlayer`
//! - macOS: `afplay`
//! - Linux and others: `paplay`, `aplay`, `mpg123`, `mpg321`

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const PATH_PLACEHOLDER: &str = "{path}";

/// Playback could not be completed
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("No audio player succeeded (tried {}); audio is at {}", .tried.join(", "), .path.display())]
    Exhausted { path: PathBuf, tried: Vec<String> },
}

/// Plays an audio file to completion
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError>;
}

/// Runs an external program and reports whether it exited successfully
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<bool>;
}

/// Runs commands as child processes with their output discarded
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<bool> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }
}

/// One way of playing a file; `{path}` in an argument is replaced by the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PlayerCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn args_for(&self, path: &Path) -> Vec<String> {
        let path = path.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

/// Player candidates for the platform this binary was built for
pub fn platform_candidates() -> Vec<PlayerCommand> {
    if cfg!(target_os = "windows") {
        vec![PlayerCommand::new(
            "powershell",
            &["-c", "(New-Object Media.SoundPlayer '{path}').PlaySync();"],
        )]
    } else if cfg!(target_os = "macos") {
        vec![PlayerCommand::new("afplay", &["{path}"])]
    } else {
        ["paplay", "aplay", "mpg123", "mpg321"]
            .into_iter()
            .map(|program| PlayerCommand::new(program, &["{path}"]))
            .collect()
    }
}

/// Plays audio with the first platform player that works
pub struct SystemPlayer {
    runner: Arc<dyn CommandRunner>,
    candidates: Vec<PlayerCommand>,
}

impl SystemPlayer {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(ProcessRunner), platform_candidates())
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, candidates: Vec<PlayerCommand>) -> Self {
        Self { runner, candidates }
    }
}

impl Default for SystemPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPlayer for SystemPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        if !path.exists() {
            return Err(PlaybackError::MissingFile(path.to_path_buf()));
        }

        let mut tried = Vec::new();
        for candidate in &self.candidates {
            tried.push(candidate.program.clone());
            match self.runner.run(&candidate.program, &candidate.args_for(path)).await {
                Ok(true) => {
                    debug!("Played {} with {}", path.display(), candidate.program);
                    return Ok(());
                }
                Ok(false) => debug!("{} exited with failure, trying next player", candidate.program),
                Err(e) => debug!("{} could not be started: {}", candidate.program, e),
            }
        }

        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Err(PlaybackError::Exhausted { path: absolute, tried })
    }
}
