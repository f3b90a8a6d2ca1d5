//! Portfolio runtime entrypoints.

use crate::log::{ResultLog, ResultRow};
use crate::planner::RunPlan;
use crate::shutdown::ShutdownLatch;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};
use veriport_core::{Configuration, Instance, PortfolioError, Result};
use veriport_verifiers::{run_verifier, CancelHandle, ProcessOptions, VerifierResult};

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub process: ProcessOptions,
    /// CSV file receiving one row per (instance, member).
    pub result_log: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MemberResult {
    pub tool: String,
    pub configuration: Configuration,
    pub result: VerifierResult,
}

/// Everything the members reported for one instance.
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub instance: Instance,
    /// In portfolio order.
    pub members: Vec<MemberResult>,
    /// Member whose SAT/UNSAT verdict settled the instance.
    pub winner: Option<usize>,
    /// The winner, or the first member to finish when nobody solved it.
    pub recorded: usize,
    pub wall_secs: f64,
}

impl InstanceReport {
    pub fn recorded(&self) -> &MemberResult {
        &self.members[self.recorded]
    }

    pub fn is_solved(&self) -> bool {
        self.winner.is_some()
    }
}

pub struct PortfolioRunner {
    plan: RunPlan,
    options: RunnerOptions,
    shutdown: ShutdownLatch,
    log: Option<ResultLog>,
}

impl PortfolioRunner {
    pub fn new(plan: RunPlan, options: RunnerOptions) -> Result<Self> {
        if plan.is_empty() {
            return Err(PortfolioError::NotFound("portfolio members".into()));
        }
        let log = options.result_log.as_ref().map(ResultLog::open).transpose()?;
        Ok(Self {
            plan,
            options,
            shutdown: ShutdownLatch::new(),
            log,
        })
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownLatch) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> &ShutdownLatch {
        &self.shutdown
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Run instances one after another. Stops with
    /// [`PortfolioError::Interrupted`] once the shutdown latch fires.
    pub async fn run_all(&mut self, instances: &[Instance]) -> Result<Vec<InstanceReport>> {
        let mut reports = Vec::with_capacity(instances.len());
        for instance in instances {
            reports.push(self.run_instance(instance).await?);
        }
        let solved = reports.iter().filter(|report| report.is_solved()).count();
        info!(instances = reports.len(), solved, "portfolio run finished");
        Ok(reports)
    }

    /// Race every member on `instance`. Returns only after all member tasks
    /// have finished.
    pub async fn run_instance(&mut self, instance: &Instance) -> Result<InstanceReport> {
        if self.shutdown.is_triggered() {
            return Err(PortfolioError::Interrupted);
        }

        let start = Instant::now();
        let solved = Arc::new(AtomicBool::new(false));
        let handles: Arc<Vec<CancelHandle>> = Arc::new(
            self.plan
                .members
                .iter()
                .map(|_| CancelHandle::child_of(self.shutdown.token()))
                .collect(),
        );

        let mut tasks = JoinSet::new();
        for (idx, member) in self.plan.members.iter().enumerate() {
            let tool = Arc::clone(&member.tool);
            let configuration = member.configuration.clone();
            let allocation = member.allocation;
            let instance = instance.clone();
            let options = self.options.process.clone();
            let handles = Arc::clone(&handles);
            let solved = Arc::clone(&solved);

            tasks.spawn(async move {
                let result = match run_verifier(
                    tool.as_ref(),
                    &configuration,
                    &instance,
                    Some(allocation),
                    &options,
                    &handles[idx],
                )
                .await
                {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(tool = tool.name(), instance = %instance, error = %err, "verifier run failed");
                        VerifierResult::error(err.to_string(), Duration::ZERO)
                    }
                };

                let won = result.is_solved()
                    && solved
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok();
                if won {
                    for (other, handle) in handles.iter().enumerate() {
                        if other != idx {
                            handle.request_cancel();
                        }
                    }
                }
                (idx, result, won)
            });
        }

        let mut slots: Vec<Option<VerifierResult>> = vec![None; self.plan.len()];
        let mut first = None;
        let mut winner = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result, won)) => {
                    first.get_or_insert(idx);
                    if won {
                        winner = Some(idx);
                        info!(
                            tool = self.plan.members[idx].tool.name(),
                            instance = %instance,
                            outcome = %result.outcome,
                            took_secs = result.took_secs,
                            "instance solved"
                        );
                    }
                    self.log_row(instance, idx, &result);
                    slots[idx] = Some(result);
                }
                Err(err) => warn!(instance = %instance, error = %err, "verifier task failed"),
            }
        }

        let mut members = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.into_iter().enumerate() {
            let result = match slot {
                Some(result) => result,
                None => {
                    let result = VerifierResult::error("verifier task panicked", Duration::ZERO);
                    self.log_row(instance, idx, &result);
                    first.get_or_insert(idx);
                    result
                }
            };
            let member = &self.plan.members[idx];
            members.push(MemberResult {
                tool: member.tool.name().to_string(),
                configuration: member.configuration.clone(),
                result,
            });
        }

        if self.shutdown.is_triggered() {
            warn!(instance = %instance, "run interrupted");
            return Err(PortfolioError::Interrupted);
        }

        Ok(InstanceReport {
            instance: instance.clone(),
            members,
            winner,
            recorded: winner.or(first).unwrap_or(0),
            wall_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn log_row(&mut self, instance: &Instance, idx: usize, result: &VerifierResult) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        let member = &self.plan.members[idx];
        let row = ResultRow::new(instance, member.tool.name(), &member.configuration, result);
        if let Err(err) = log.append(&row) {
            warn!(path = %log.path().display(), error = %err, "could not append result row");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RunPlanner;
    use std::fs;
    use std::path::Path;
    use veriport_core::{ConfiguredVerifier, Portfolio, ResourceAllocation, ResourcePool, ResourceSpec, SearchSpace};
    use veriport_verifiers::{Outcome, RunCommand, ToolRegistry, VerifierTool};

    /// Runs `body` with `{result}` replaced by the verdict file path.
    struct Scripted {
        name: String,
        body: String,
    }

    impl VerifierTool for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn search_space(&self) -> SearchSpace {
            SearchSpace::new(self.name.clone())
        }

        fn resources(&self) -> ResourceSpec {
            ResourceSpec::new(self.name.clone(), 1, 0)
        }

        fn run_command(&self, _: &Instance, _: &Configuration, scratch: &Path) -> RunCommand {
            let verdict = scratch.join("verdict");
            let body = self.body.replace("{result}", &verdict.to_string_lossy());
            RunCommand::new(&[body], Some(verdict))
        }

        fn parse_result(&self, _stdout: &str, file: Option<&str>) -> (Outcome, Option<String>) {
            match file.map(str::trim) {
                Some("sat") => (Outcome::Sat, None),
                Some("unsat") => (Outcome::Unsat, None),
                Some("timeout") => (Outcome::Timeout, None),
                _ => (Outcome::Err, None),
            }
        }
    }

    fn runner(members: &[(&str, &str)], log: Option<PathBuf>) -> PortfolioRunner {
        let mut registry = ToolRegistry::new();
        let mut portfolio = Portfolio::new();
        for (name, body) in members {
            registry.register(Scripted {
                name: name.to_string(),
                body: body.to_string(),
            });
            portfolio.insert(ConfiguredVerifier::new(
                *name,
                Configuration::empty(*name),
                ResourceAllocation::Counts { cpus: 1, gpus: 0 },
            ));
        }
        let plan = RunPlanner::new(registry)
            .plan(&portfolio, ResourcePool::new(members.len(), 0))
            .unwrap();
        let options = RunnerOptions {
            process: ProcessOptions {
                pin_cpus: false,
                grace_period: Duration::from_secs(1),
            },
            result_log: log,
        };
        PortfolioRunner::new(plan, options).unwrap()
    }

    fn artifacts(dir: &Path, timeout: u64) -> Instance {
        let net = dir.join("net.onnx");
        let prop = dir.join("prop.vnnlib");
        fs::write(&net, b"").unwrap();
        fs::write(&prop, b"").unwrap();
        Instance::new(net, prop, timeout).unwrap()
    }

    #[tokio::test]
    async fn test_first_success_cancels_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let instance = artifacts(dir.path(), 60);
        let mut runner = runner(
            &[
                ("slow-a", "sleep 30; echo unsat > {result}"),
                ("quick", "sleep 0.2; echo sat > {result}"),
                ("slow-b", "sleep 30; echo unsat > {result}"),
            ],
            None,
        );

        let report = runner.run_instance(&instance).await.unwrap();
        assert_eq!(report.winner, Some(1));
        assert_eq!(report.recorded().result.outcome, Outcome::Sat);
        for idx in [0, 2] {
            let result = &report.members[idx].result;
            assert_eq!(result.outcome, Outcome::Timeout);
            assert!(result.cancelled);
        }
        assert!(report.wall_secs < 15.0);
    }

    #[tokio::test]
    async fn test_unsolved_instance_records_first_terminal_result() {
        let dir = tempfile::tempdir().unwrap();
        let instance = artifacts(dir.path(), 1);
        let mut runner = runner(
            &[
                ("sleeper", "sleep 30"),
                ("crasher", "echo broken >&2; exit 2"),
            ],
            None,
        );

        let report = runner.run_instance(&instance).await.unwrap();
        assert!(!report.is_solved());
        assert_eq!(report.recorded, 1);
        assert_eq!(report.members[1].result.outcome, Outcome::Err);
        assert_eq!(report.members[0].result.outcome, Outcome::Timeout);
        assert_eq!(report.members[0].result.took_secs, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_instance_is_contained_as_err_rows() {
        let dir = tempfile::tempdir().unwrap();
        let net = dir.path().join("net.pb");
        let prop = dir.path().join("prop.vnnlib");
        fs::write(&net, b"").unwrap();
        fs::write(&prop, b"").unwrap();
        let instance = Instance::new(net, prop, 5).unwrap();
        let log_path = dir.path().join("results.csv");
        let mut runner = runner(
            &[("a", "echo sat > {result}"), ("b", "echo sat > {result}")],
            Some(log_path.clone()),
        );

        let report = runner.run_instance(&instance).await.unwrap();
        assert!(!report.is_solved());
        assert!(report
            .members
            .iter()
            .all(|m| m.result.outcome == Outcome::Err && m.result.error.is_some()));

        let text = fs::read_to_string(&log_path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().skip(1).all(|line| line.contains(",ERR,ERR,")));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_run() {
        let dir = tempfile::tempdir().unwrap();
        let instance = artifacts(dir.path(), 60);
        let mut runner = runner(&[("sleeper", "sleep 30")], None);
        let latch = runner.shutdown().clone();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            latch.trigger()
        });
        let started = Instant::now();
        let err = runner.run_all(&[instance.clone(), instance]).await.unwrap_err();
        assert!(matches!(err, PortfolioError::Interrupted));
        assert!(trigger.await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let result = PortfolioRunner::new(RunPlan::default(), RunnerOptions::default());
        assert!(matches!(result, Err(PortfolioError::NotFound(_))));
    }
}
