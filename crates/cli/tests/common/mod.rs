//! Helpers for running the ctr binary in tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Scratch directory holding scripts and config files
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Write a file into the workspace and return its path
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", name))?;
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Result of a ctr invocation
pub struct CommandResult {
    pub output: Output,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.output.status.success()
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    /// Parse stdout as JSON lines and return (mode, filepath) pairs
    pub fn packed(&self) -> Result<Vec<(String, String)>> {
        self.stdout()
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line)
                    .with_context(|| format!("Not a JSON line: {}", line))?;
                Ok((
                    value["mode"].as_str().unwrap_or_default().to_string(),
                    value["filepath"].as_str().unwrap_or_default().to_string(),
                ))
            })
            .collect()
    }
}

/// Run the ctr binary with the given arguments
pub fn ctr(working_dir: &Path, args: &[&str]) -> Result<CommandResult> {
    ctr_with_env(working_dir, args, &[])
}

/// Run the ctr binary with extra environment variables
///
/// `RUST_LOG` is cleared first so tests see the default log level unless
/// they set it.
pub fn ctr_with_env(
    working_dir: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<CommandResult> {
    let output = Command::new(env!("CARGO_BIN_EXE_ctr"))
        .args(args)
        .current_dir(working_dir)
        .env_remove("RUST_LOG")
        .envs(env.iter().copied())
        .output()
        .context("Failed to run ctr")?;
    Ok(CommandResult { output })
}
