//! Tune and run sessions: wiring the registry, Hydra and the runner together.

use crate::config::{RunConfig, TuneConfig};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use veriport_autotune::TrialOutcome;
use veriport_core::{Configuration, Instance, Portfolio, PortfolioError};
use veriport_optimizer::{
    Evaluator, HydraController, HydraOutcome, Optimizer, RandomSearchOptimizer, ToolCandidate,
};
use veriport_runner::{InstanceReport, PortfolioRunner, RunPlanner, RunnerOptions, ShutdownLatch};
use veriport_verifiers::{run_verifier, CancelHandle, Outcome, ProcessOptions, ToolRegistry};

/// Evaluates trials by launching the real verifier process.
///
/// Blocks on `runtime`, so it must be called from outside that runtime's
/// worker threads.
pub struct ProcessEvaluator {
    registry: ToolRegistry,
    runtime: tokio::runtime::Handle,
    options: ProcessOptions,
    cancel: CancelHandle,
}

impl ProcessEvaluator {
    pub fn new(
        registry: ToolRegistry,
        runtime: tokio::runtime::Handle,
        options: ProcessOptions,
        shutdown: &ShutdownLatch,
    ) -> Self {
        Self {
            registry,
            runtime,
            options,
            cancel: CancelHandle::child_of(shutdown.token()),
        }
    }
}

impl Evaluator for ProcessEvaluator {
    fn evaluate(
        &self,
        tool: &str,
        configuration: &Configuration,
        instance: &Instance,
        _seed: u64,
    ) -> Result<TrialOutcome> {
        let tool = self.registry.get(tool)?;
        let run = run_verifier(
            tool.as_ref(),
            configuration,
            instance,
            None,
            &self.options,
            &self.cancel,
        );
        let result = match self.runtime.block_on(run) {
            Ok(result) => result,
            Err(PortfolioError::InvalidInstance { path, reason }) => {
                warn!(tool = tool.name(), path = %path.display(), %reason, "instance unusable for tool");
                return Ok(TrialOutcome::Infeasible);
            }
            Err(err) => return Err(err.into()),
        };
        if result.cancelled {
            return Err(PortfolioError::Interrupted.into());
        }
        Ok(match result.outcome {
            Outcome::Sat | Outcome::Unsat => TrialOutcome::Solved {
                secs: result.took_secs,
            },
            Outcome::Timeout | Outcome::Err => TrialOutcome::Timeout {
                secs: instance.timeout_secs() as f64,
            },
        })
    }
}

/// Candidate list for Hydra; an empty `names` selects every registered tool.
pub fn tool_candidates(registry: &ToolRegistry, names: &[String]) -> Result<Vec<ToolCandidate>> {
    let names = if names.is_empty() {
        registry.names()
    } else {
        names.to_vec()
    };
    names
        .iter()
        .map(|name| -> Result<ToolCandidate> {
            let tool = registry.get(name)?;
            Ok(ToolCandidate {
                name: tool.name().to_string(),
                space: tool.search_space(),
                default: tool.default_configuration(),
                resources: tool.resources(),
            })
        })
        .collect()
}

/// Build a portfolio with Hydra. Blocks the calling thread; verifier
/// processes run on an internal tokio runtime.
pub fn tune_portfolio(
    config: &TuneConfig,
    registry: ToolRegistry,
    instances: Vec<Instance>,
    shutdown: &ShutdownLatch,
) -> Result<HydraOutcome> {
    if instances.is_empty() {
        bail!("no instances to tune on");
    }
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let candidates = tool_candidates(&registry, &config.tools)?;
    let optimizer: Arc<dyn Optimizer> = Arc::new(RandomSearchOptimizer {
        max_trials: config.max_trials,
        ..RandomSearchOptimizer::default()
    });
    let evaluator = Arc::new(ProcessEvaluator::new(
        registry,
        runtime.handle().clone(),
        ProcessOptions::default(),
        shutdown,
    ));

    let mut hydra = HydraController::new(
        config.hydra.clone(),
        candidates,
        instances,
        config.pool(),
        optimizer,
        evaluator,
    )?;
    Ok(hydra.run()?)
}

/// Race `portfolio` on every instance in order.
pub async fn run_portfolio(
    config: &RunConfig,
    registry: ToolRegistry,
    portfolio: &Portfolio,
    instances: &[Instance],
    shutdown: ShutdownLatch,
) -> Result<Vec<InstanceReport>> {
    let plan = RunPlanner::new(registry).plan(portfolio, config.pool())?;
    info!(members = plan.len(), instances = instances.len(), "starting portfolio run");
    let options = RunnerOptions {
        process: config.process_options(),
        result_log: config.result_log.clone(),
    };
    let mut runner = PortfolioRunner::new(plan, options)?.with_shutdown(shutdown);
    Ok(runner.run_all(instances).await?)
}
