//! The capability set every verifier adapter provides.

use crate::result::Outcome;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;
use veriport_core::{Configuration, Instance, ResourceSpec, SearchSpace};

/// Shell script to launch plus the file the tool writes its verdict to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// One command per line. Environment activation lines (`source`, `export`,
    /// `conda activate`, ...) are never wrapped with CPU pinning.
    pub script: String,
    pub result_file: Option<PathBuf>,
}

impl RunCommand {
    pub fn new(lines: &[String], result_file: Option<PathBuf>) -> Self {
        Self {
            script: lines.join("\n"),
            result_file,
        }
    }
}

/// Environment a tool must run inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopedContext {
    WorkingDir(PathBuf),
    Env { key: String, value: String },
    /// `pkill -f` pattern for leftovers of earlier runs. Must be specific
    /// enough not to match processes of concurrently running members.
    StaleProcesses(String),
}

/// Accepted file suffixes for the two artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactExtensions {
    pub network: &'static [&'static str],
    pub property: &'static [&'static str],
}

impl Default for ArtifactExtensions {
    fn default() -> Self {
        Self {
            network: &[".onnx"],
            property: &[".vnnlib"],
        }
    }
}

pub trait VerifierTool: Send + Sync {
    fn name(&self) -> &str;

    fn extensions(&self) -> ArtifactExtensions {
        ArtifactExtensions::default()
    }

    fn search_space(&self) -> SearchSpace;

    fn default_configuration(&self) -> Configuration {
        self.search_space().default_configuration()
    }

    fn resources(&self) -> ResourceSpec;

    /// Build the launch script. `scratch` is a private directory that lives
    /// until the result has been parsed.
    fn run_command(&self, instance: &Instance, config: &Configuration, scratch: &Path)
        -> RunCommand;

    /// Turn captured stdout and the result file contents into a verdict and
    /// an optional counter-example.
    fn parse_result(&self, stdout: &str, result_file: Option<&str>) -> (Outcome, Option<String>);

    fn contexts(&self, _config: &Configuration) -> Vec<ScopedContext> {
        Vec::new()
    }
}

pub type DynVerifierTool = Arc<dyn VerifierTool>;

/// Applies [`ScopedContext`]s to a command and undoes process-level effects
/// when dropped. The exit sweep runs on the current tokio runtime when there
/// is one.
pub struct ContextGuard {
    stale_patterns: Vec<String>,
}

impl ContextGuard {
    pub async fn enter(contexts: Vec<ScopedContext>, command: &mut Command) -> Self {
        let mut stale_patterns = Vec::new();
        for context in contexts {
            match context {
                ScopedContext::WorkingDir(dir) => {
                    command.current_dir(dir);
                }
                ScopedContext::Env { key, value } => {
                    command.env(key, value);
                }
                ScopedContext::StaleProcesses(pattern) => {
                    kill_matching(&pattern).await;
                    stale_patterns.push(pattern);
                }
            }
        }
        Self { stale_patterns }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.stale_patterns.is_empty() {
            return;
        }
        let patterns = std::mem::take(&mut self.stale_patterns);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for pattern in &patterns {
                        kill_matching(pattern).await;
                    }
                });
            }
            Err(_) => {
                for pattern in &patterns {
                    let status = std::process::Command::new("pkill")
                        .args(["-KILL", "-f", pattern])
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .status();
                    log_sweep(pattern, status);
                }
            }
        }
    }
}

async fn kill_matching(pattern: &str) {
    let status = Command::new("pkill")
        .args(["-KILL", "-f", pattern])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    log_sweep(pattern, status);
}

fn log_sweep(pattern: &str, status: std::io::Result<std::process::ExitStatus>) {
    match status {
        Ok(status) => debug!(pattern, matched = status.success(), "stale process sweep"),
        Err(e) => debug!(pattern, error = %e, "pkill unavailable"),
    }
}

/// Single-quote `path` for a POSIX shell.
pub fn shell_quote(value: impl AsRef<str>) -> String {
    format!("'{}'", value.as_ref().replace('\'', r"'\''"))
}

pub fn quote_path(path: &Path) -> String {
    shell_quote(path.to_string_lossy())
}

/// Render a configuration as `--key=value` flags.
pub fn render_flags(config: &Configuration) -> String {
    config
        .values()
        .iter()
        .map(|(key, value)| format!("--{}={}", key, shell_quote(value.to_string())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Verdict from the first line of a result file, counter-example from the rest.
pub fn verdict_from_first_line(text: &str, table: &[(&str, Outcome)]) -> (Outcome, Option<String>) {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default().trim().to_ascii_lowercase();
    match table.iter().find(|(word, _)| first == *word) {
        Some(&(_, outcome)) => {
            let rest = lines.collect::<Vec<_>>().join("\n");
            let counter_example = (outcome == Outcome::Sat && !rest.trim().is_empty())
                .then(|| rest.trim().to_string());
            (outcome, counter_example)
        }
        None => (Outcome::Err, None),
    }
}

/// Verdict from the last stdout line starting with `marker`.
pub fn verdict_from_marker(stdout: &str, marker: &str, table: &[(&str, Outcome)]) -> Outcome {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(marker))
        .map(|verdict| verdict.trim().to_ascii_lowercase())
        .and_then(|verdict| {
            table
                .iter()
                .find(|(word, _)| verdict == *word)
                .map(|&(_, outcome)| outcome)
        })
        .unwrap_or(Outcome::Err)
}
