//! Launching one verifier on one instance.
//!
//! Handles artifact validation, CPU/GPU pinning, timeouts, cancellation and
//! process-group teardown. Tool failures come back as [`Outcome::Err`] /
//! [`Outcome::Timeout`] results; only unusable instances and spawn failures
//! are errors.

use crate::result::{Outcome, VerifierResult};
use crate::tool::{ArtifactExtensions, ContextGuard, VerifierTool};
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use veriport_core::{Configuration, Instance, PortfolioError, ResourceAllocation, Result};

/// Environment variable restricting which GPUs a tool can see.
pub const GPU_VISIBILITY_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Longest stderr excerpt kept in an error result.
const MAX_ERROR_LEN: usize = 4 * 1024;

const ACTIVATION_PREFIXES: &[&str] = &[
    "source ",
    ". ",
    "conda activate",
    "export ",
    "cd ",
    "set ",
    "ulimit ",
    "#",
];

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Wrap commands with `taskset` when the allocation is bound.
    pub pin_cpus: bool,
    pub grace_period: Duration,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            pin_cpus: true,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Cancellation signal for an in-flight verifier run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that is also cancelled whenever `parent` is.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    pub fn request_cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Reject artifacts that are missing or carry the wrong extension.
pub fn validate_instance(extensions: ArtifactExtensions, instance: &Instance) -> Result<()> {
    check_artifact(instance.network(), extensions.network)?;
    check_artifact(instance.property(), extensions.property)
}

fn check_artifact(path: &Path, accepted: &[&str]) -> Result<()> {
    let name = path.to_string_lossy().to_ascii_lowercase();
    if !accepted.iter().any(|ext| name.ends_with(ext)) {
        return Err(PortfolioError::invalid_instance(
            path,
            format!("expected one of {accepted:?}"),
        ));
    }
    if !path.is_file() {
        return Err(PortfolioError::invalid_instance(path, "file does not exist"));
    }
    Ok(())
}

fn is_activation_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || ACTIVATION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Prefix every non-activation line with a `taskset` wrapper for the range.
pub fn pin_script(script: &str, cpu_low: usize, cpu_high: usize) -> String {
    script
        .lines()
        .map(|line| {
            if is_activation_line(line) {
                line.to_string()
            } else {
                format!("taskset --cpu-list {cpu_low}-{cpu_high} {}", line.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

enum ExitReason {
    Completed(std::process::ExitStatus),
    WaitError(std::io::Error),
    Timeout,
    Cancelled,
}

/// Run `tool` with `config` on `instance` until it finishes, times out, or
/// `cancel` fires.
pub async fn run_verifier(
    tool: &dyn VerifierTool,
    config: &Configuration,
    instance: &Instance,
    allocation: Option<ResourceAllocation>,
    options: &ProcessOptions,
    cancel: &CancelHandle,
) -> Result<VerifierResult> {
    validate_instance(tool.extensions(), instance)?;

    if cancel.is_cancelled() {
        return Ok(VerifierResult::cancelled(Duration::ZERO));
    }

    let scratch = tempfile::Builder::new()
        .prefix(&format!("veriport-{}-", tool.name()))
        .tempdir()?;
    let run = tool.run_command(instance, config, scratch.path());

    let mut script = run.script.clone();
    let mut gpu_env = None;
    if let Some(ResourceAllocation::Bound {
        cpu_low,
        cpu_high,
        gpu,
    }) = allocation
    {
        if options.pin_cpus {
            script = pin_script(&script, cpu_low, cpu_high);
        }
        gpu_env = Some(gpu.map(|g| g.to_string()).unwrap_or_default());
    }

    let mut command = Command::new("bash");
    command
        .arg("-c")
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(devices) = &gpu_env {
        command.env(GPU_VISIBILITY_ENV, devices);
    }
    let _contexts = ContextGuard::enter(tool.contexts(config), &mut command).await;

    let timeout = instance.timeout();
    info!(
        tool = tool.name(),
        config = %config,
        instance = %instance,
        timeout_secs = instance.timeout_secs(),
        gpu = gpu_env.as_deref().unwrap_or("-"),
        "launching verifier"
    );

    let start = Instant::now();
    let mut child: AsyncGroupChild = command.group_spawn()?;
    // `id()` is gone once the leader has been reaped.
    let group_id = child.inner().id();
    let stdout_task = tokio::spawn(collect_output(child.inner().stdout.take()));
    let stderr_task = tokio::spawn(collect_output(child.inner().stderr.take()));

    let exit_reason = tokio::select! {
        wait_result = child.wait() => match wait_result {
            Ok(status) => ExitReason::Completed(status),
            Err(e) => ExitReason::WaitError(e),
        },
        _ = tokio::time::sleep(timeout) => ExitReason::Timeout,
        _ = cancel.token().cancelled() => ExitReason::Cancelled,
    };

    match exit_reason {
        ExitReason::Timeout | ExitReason::Cancelled => {
            terminate_process_group(&mut child, options.grace_period).await;
        }
        // Background workers of a finished leader would otherwise keep the
        // pipes open and outlive the run.
        ExitReason::Completed(_) | ExitReason::WaitError(_) => kill_stragglers(group_id),
    }
    let elapsed = start.elapsed();

    let (stdout, stderr) = drain_output(stdout_task, stderr_task, options.grace_period).await;

    let result = match exit_reason {
        ExitReason::Timeout => {
            warn!(tool = tool.name(), instance = %instance, "verifier timed out");
            // Teardown latency is not part of the solve time.
            VerifierResult::timeout(timeout)
        }
        ExitReason::Cancelled => {
            debug!(tool = tool.name(), instance = %instance, "verifier cancelled");
            VerifierResult::cancelled(elapsed)
        }
        ExitReason::WaitError(e) => VerifierResult::error(format!("wait failed: {e}"), elapsed),
        ExitReason::Completed(status) if !status.success() => {
            VerifierResult::error(excerpt(&stderr, status), elapsed)
        }
        ExitReason::Completed(_) => {
            let contents = match &run.result_file {
                Some(path) => tokio::fs::read_to_string(path).await.ok(),
                None => None,
            };
            let (outcome, counter_example) = tool.parse_result(&stdout, contents.as_deref());
            match outcome {
                Outcome::Err => VerifierResult::error("could not parse verifier output", elapsed),
                Outcome::Timeout => VerifierResult::timeout(timeout),
                solved => VerifierResult::new(solved, elapsed).with_counter_example(counter_example),
            }
        }
    };

    info!(
        tool = tool.name(),
        instance = %instance,
        outcome = %result.outcome,
        took_secs = result.took_secs,
        cancelled = result.cancelled,
        "verifier finished"
    );
    Ok(result)
}

fn excerpt(stderr: &str, status: std::process::ExitStatus) -> String {
    let trimmed = stderr.trim();
    let start = trimmed.len().saturating_sub(MAX_ERROR_LEN);
    let start = (start..trimmed.len())
        .find(|&idx| trimmed.is_char_boundary(idx))
        .unwrap_or(trimmed.len());
    let tail = &trimmed[start..];
    if tail.is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {tail}")
    }
}

async fn collect_output<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            warn!("error reading verifier output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Join the output readers, giving up after `limit` if something outside the
/// process group still holds the pipes.
async fn drain_output(
    mut stdout: JoinHandle<String>,
    mut stderr: JoinHandle<String>,
    limit: Duration,
) -> (String, String) {
    let joined = tokio::time::timeout(limit, async {
        let out = (&mut stdout).await.unwrap_or_default();
        let err = (&mut stderr).await.unwrap_or_default();
        (out, err)
    })
    .await;
    match joined {
        Ok(output) => output,
        Err(_) => {
            warn!("verifier output still open after teardown, dropping it");
            stdout.abort();
            stderr.abort();
            (String::new(), String::new())
        }
    }
}

/// SIGKILL whatever is left in the group after its leader exited.
#[cfg(unix)]
fn kill_stragglers(group_id: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = group_id else {
        return;
    };
    match signal::kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "killed leftover verifier processes"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = ?e, "SIGKILL to leftover processes failed"),
    }
}

#[cfg(not(unix))]
fn kill_stragglers(_group_id: Option<u32>) {}

/// SIGTERM the process group, wait `grace`, then SIGKILL and reap.
#[cfg(unix)]
async fn terminate_process_group(child: &mut AsyncGroupChild, grace: Duration) {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.inner().id() else {
        return;
    };
    let pgid = Pid::from_raw(-(pid as i32));

    if let Err(e) = signal::kill(pgid, Signal::SIGTERM) {
        if e != Errno::ESRCH {
            warn!(pid, error = ?e, "SIGTERM to process group failed");
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if child.inner().try_wait().ok().flatten().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if let Err(e) = signal::kill(pgid, Signal::SIGKILL) {
        if e != Errno::ESRCH {
            warn!(pid, error = ?e, "SIGKILL to process group failed");
        }
    }
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &mut AsyncGroupChild, _grace: Duration) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}
