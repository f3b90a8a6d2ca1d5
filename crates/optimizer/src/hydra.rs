//! Hydra: iterative portfolio construction.
//!
//! Each iteration runs a configurator round (pick a tool, tune it, repeat
//! `configs_per_iter` times) followed by an updater round that commits the
//! best incumbents to the portfolio. From the second iteration on, every trial
//! cost is capped by the portfolio's current cost on that instance, so the
//! search rewards configurations that complement the existing members.
//!
//! ```text
//! Idle ─▶ ConfiguratorRound ─▶ UpdaterRound ─┬─▶ ConfiguratorRound ...
//!                                            └─▶ Done
//! ```

use crate::optimizer::{CostFn, OptimizeOutput, OptimizeRequest, Optimizer};
use crate::report::{IncumbentSummary, IterationRecord, StopReason, TuneReport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use veriport_autotune::{
    CostMatrix, Incumbent, IncumbentSet, RunHistory, TrialCost, TrialOutcome, TrialRecord,
    DEFAULT_TIMEOUT_PENALTY,
};
use veriport_core::{
    Configuration, ConfiguredVerifier, Instance, ParamValue, Portfolio, PortfolioError,
    ResourcePool, ResourceSpec, ResourceTracker, Result, SearchSpace, TOOL_PICK_PARAM,
};

/// Runs one tool configuration on one instance.
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        tool: &str,
        configuration: &Configuration,
        instance: &Instance,
        seed: u64,
    ) -> anyhow::Result<TrialOutcome>;
}

/// Loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraSettings {
    pub iterations: usize,
    pub configs_per_iter: usize,
    pub incumbents_added_per_iter: usize,
    /// Optimizer walltime for the tool pick; zero picks uniformly at random.
    pub pick_budget_secs: f64,
    /// Optimizer walltime per tuning round; zero keeps the default config.
    pub tune_budget_secs: f64,
    pub stop_early: bool,
    pub seed: u64,
    pub timeout_penalty: f64,
}

impl Default for HydraSettings {
    fn default() -> Self {
        Self {
            iterations: 3,
            configs_per_iter: 2,
            incumbents_added_per_iter: 1,
            pick_budget_secs: 600.0,
            tune_budget_secs: 3600.0,
            stop_early: true,
            seed: 0,
            timeout_penalty: DEFAULT_TIMEOUT_PENALTY,
        }
    }
}

impl HydraSettings {
    /// Number of members the finished portfolio can hold.
    pub fn portfolio_slots(&self) -> usize {
        self.iterations * self.incumbents_added_per_iter
    }

    fn pick_budget(&self) -> Duration {
        Duration::from_secs_f64(self.pick_budget_secs.max(0.0))
    }

    fn tune_budget(&self) -> Duration {
        Duration::from_secs_f64(self.tune_budget_secs.max(0.0))
    }
}

/// A tool Hydra may put into the portfolio.
#[derive(Debug, Clone)]
pub struct ToolCandidate {
    pub name: String,
    pub space: SearchSpace,
    pub default: Configuration,
    pub resources: ResourceSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydraState {
    Idle,
    ConfiguratorRound { iteration: usize },
    UpdaterRound { iteration: usize },
    Done(StopReason),
}

#[derive(Debug, Clone)]
pub struct HydraOutcome {
    pub portfolio: Portfolio,
    pub cost_matrix: CostMatrix,
    pub report: TuneReport,
}

pub struct HydraController {
    settings: HydraSettings,
    tools: Vec<ToolCandidate>,
    instances: Vec<Instance>,
    optimizer: Arc<dyn Optimizer>,
    evaluator: Arc<dyn Evaluator>,
    tracker: ResourceTracker,
    cost_matrix: CostMatrix,
    portfolio: Portfolio,
    rng: fastrand::Rng,
    state: HydraState,
    previous_total: Option<f64>,
}

impl HydraController {
    pub fn new(
        settings: HydraSettings,
        tools: Vec<ToolCandidate>,
        instances: Vec<Instance>,
        pool: ResourcePool,
        optimizer: Arc<dyn Optimizer>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self> {
        if instances.is_empty() {
            return Err(setup_failure("no instances to tune on"));
        }
        if tools.is_empty() {
            return Err(setup_failure("no candidate tools"));
        }
        let specs = tools.iter().map(|tool| tool.resources.clone()).collect();
        let tracker = ResourceTracker::new(pool, specs, settings.portfolio_slots())?;
        Ok(Self {
            rng: fastrand::Rng::with_seed(settings.seed),
            cost_matrix: CostMatrix::with_penalty(settings.timeout_penalty),
            settings,
            tools,
            instances,
            optimizer,
            evaluator,
            tracker,
            portfolio: Portfolio::new(),
            state: HydraState::Idle,
            previous_total: None,
        })
    }

    pub fn state(&self) -> HydraState {
        self.state
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn cost_matrix(&self) -> &CostMatrix {
        &self.cost_matrix
    }

    /// Run the loop to completion.
    pub fn run(&mut self) -> Result<HydraOutcome> {
        let start = Instant::now();
        let mut report = TuneReport::new(self.optimizer.name(), self.settings.clone());
        info!(
            iterations = self.settings.iterations,
            tools = self.tools.len(),
            instances = self.instances.len(),
            optimizer = self.optimizer.name(),
            "starting portfolio construction"
        );

        let mut reason = StopReason::Completed;
        for iteration in 0..self.settings.iterations {
            self.transition(HydraState::ConfiguratorRound { iteration });
            let (incumbents, picked_tools) = self.configurator_round(iteration)?;
            let mut record = IterationRecord {
                iteration,
                picked_tools,
                incumbents: incumbents.best_n(incumbents.len()).into_iter().map(summary).collect(),
                added: Vec::new(),
                portfolio_cost: None,
                remaining_cpu: 0,
                remaining_gpu: 0,
            };

            let stop = if incumbents.is_empty() {
                Some(StopReason::NoFeasibleTool)
            } else {
                self.transition(HydraState::UpdaterRound { iteration });
                let (added, stop) = self.updater_round(iteration, &incumbents)?;
                record.added = added;
                record.portfolio_cost = Some(self.portfolio.total_cost());
                stop
            };
            (record.remaining_cpu, record.remaining_gpu) = self.tracker.remaining();
            report.iterations.push(record);

            if let Some(stop) = stop {
                reason = stop;
                break;
            }
        }
        self.transition(HydraState::Done(reason));

        report.stop_reason = Some(reason);
        report.portfolio_size = self.portfolio.len();
        report.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            members = self.portfolio.len(),
            total_cost = self.portfolio.total_cost(),
            ?reason,
            "portfolio construction finished"
        );
        Ok(HydraOutcome {
            portfolio: self.portfolio.clone(),
            cost_matrix: self.cost_matrix.clone(),
            report,
        })
    }

    fn transition(&mut self, next: HydraState) {
        debug!(from = ?self.state, to = ?next, "hydra transition");
        self.state = next;
    }

    fn configurator_round(&mut self, iteration: usize) -> Result<(IncumbentSet, Vec<String>)> {
        let mut incumbents = IncumbentSet::new();
        let mut picked = Vec::new();
        for rep in 0..self.settings.configs_per_iter {
            let possible = self.tracker.get_possible();
            if possible.is_empty() {
                warn!(iteration, "no tool fits the remaining resources");
                break;
            }
            let round = (iteration * self.settings.configs_per_iter + rep) as u64;
            let seed = self.settings.seed.wrapping_add(round * 2);

            let tool = self.pick_tool(iteration, &possible, seed)?;
            let incumbent = self.tune_tool(iteration, &tool, seed.wrapping_add(1))?;
            info!(
                iteration,
                tool = %tool,
                config = %incumbent.configuration,
                mean_cost = ?incumbent.mean_cost(),
                "configurator round finished"
            );
            if !incumbents.add(incumbent) {
                debug!(iteration, tool = %tool, "incumbent already proposed this round");
            }
            picked.push(tool);
        }
        Ok((incumbents, picked))
    }

    fn candidate(&self, tool: &str) -> Result<&ToolCandidate> {
        self.tools
            .iter()
            .find(|candidate| candidate.name == tool)
            .ok_or_else(|| PortfolioError::UnknownTool(tool.to_string()))
    }

    fn pick_tool(&mut self, iteration: usize, possible: &[String], seed: u64) -> Result<String> {
        let budget = self.settings.pick_budget();
        if budget.is_zero() {
            let tool = possible[self.rng.usize(..possible.len())].clone();
            debug!(iteration, tool = %tool, "picked tool at random");
            return Ok(tool);
        }

        let defaults: HashMap<String, Configuration> = possible
            .iter()
            .map(|name| -> Result<(String, Configuration)> {
                Ok((name.clone(), self.candidate(name)?.default.clone()))
            })
            .collect::<Result<_>>()?;
        let space = SearchSpace::tool_pick(possible);
        let output = self.optimize("picking a tool", iteration, &space, budget, seed, None, |pick| {
            match pick.get(TOOL_PICK_PARAM) {
                Some(ParamValue::Str(name)) => defaults
                    .get(name)
                    .map(|config| (name.clone(), config.clone())),
                _ => None,
            }
        })?;

        match output.incumbent.get(TOOL_PICK_PARAM) {
            Some(ParamValue::Str(name)) => Ok(name.clone()),
            other => Err(PortfolioError::OptimizerFailure {
                stage: "picking a tool".into(),
                message: format!("optimizer returned an invalid tool pick {other:?}"),
            }),
        }
    }

    fn tune_tool(&mut self, iteration: usize, tool: &str, seed: u64) -> Result<Incumbent> {
        let candidate = self.candidate(tool)?.clone();
        let budget = self.settings.tune_budget();
        let default_only = budget.is_zero().then_some(&candidate.default);
        let name = candidate.name.clone();
        let output = self.optimize(
            "tuning",
            iteration,
            &candidate.space,
            budget,
            seed,
            default_only,
            |config| Some((name.clone(), config.clone())),
        )?;

        let configuration = output.incumbent;
        let history = output.history.for_configuration(&configuration);
        let instance_costs = per_instance_means(&history, &self.instances);
        Ok(Incumbent::new(tool, configuration, history, instance_costs))
    }

    /// Run an optimizer over `space`. `resolve` maps a proposed configuration
    /// to the tool and configuration that actually run. With `default_only`
    /// set, that configuration is measured instead of calling the optimizer.
    /// Raw outcomes are folded into the cost matrix once the optimizer returns.
    #[allow(clippy::too_many_arguments)]
    fn optimize(
        &mut self,
        stage: &str,
        iteration: usize,
        space: &SearchSpace,
        walltime: Duration,
        seed: u64,
        default_only: Option<&Configuration>,
        resolve: impl Fn(&Configuration) -> Option<(String, Configuration)>,
    ) -> Result<OptimizeOutput> {
        let penalty = self.settings.timeout_penalty;
        let evaluator = Arc::clone(&self.evaluator);
        let portfolio = &self.portfolio;
        let matrix = &self.cost_matrix;
        let mut raw: Vec<(Configuration, Instance, TrialOutcome)> = Vec::new();

        let result = {
            let mut cost = |proposed: &Configuration,
                            instance: &Instance,
                            trial_seed: u64|
             -> anyhow::Result<TrialCost> {
                let (tool, config) = resolve(proposed).ok_or_else(|| {
                    anyhow::anyhow!("cannot resolve proposed configuration {proposed}")
                })?;
                let measured = match matrix.get(&config, instance) {
                    Ok(known) => Some(known),
                    Err(_) => {
                        let outcome = evaluator.evaluate(&tool, &config, instance, trial_seed)?;
                        raw.push((config, instance.clone(), outcome));
                        outcome.penalized(penalty)
                    }
                };
                Ok(match measured {
                    None => TrialCost::Infeasible,
                    Some(cost) if iteration > 0 => {
                        let best = portfolio.cost(&instance.key()).unwrap_or(f64::INFINITY);
                        TrialCost::Finite(cost.min(best))
                    }
                    Some(cost) => TrialCost::Finite(cost),
                })
            };
            let request = OptimizeRequest {
                space,
                instances: &self.instances,
                walltime,
                seed,
            };
            if let Some(default) = default_only {
                evaluate_default(default, &request, &mut cost)
            } else {
                self.optimizer.optimize(&request, &mut cost)
            }
        };

        for (config, instance, outcome) in raw {
            self.cost_matrix.record(&config, &instance, outcome);
        }
        result.map_err(|err| optimizer_failure(stage, err))
    }

    fn updater_round(
        &mut self,
        iteration: usize,
        incumbents: &IncumbentSet,
    ) -> Result<(Vec<IncumbentSummary>, Option<StopReason>)> {
        let batch = incumbents.best_n(self.settings.incumbents_added_per_iter);
        if let Some(duplicate) = batch
            .iter()
            .find(|inc| self.portfolio.contains(&inc.tool, &inc.configuration))
        {
            info!(
                iteration,
                tool = %duplicate.tool,
                config = %duplicate.configuration,
                "incumbent already in portfolio, stopping"
            );
            return Ok((Vec::new(), Some(StopReason::DuplicateIncumbent)));
        }

        let mut added = Vec::new();
        for incumbent in batch {
            let preview = self.tracker.deduct_by_name(&incumbent.tool, true)?;
            debug!(tool = %incumbent.tool, ?preview, "allocation preview");
            let allocation = self.tracker.deduct_by_name(&incumbent.tool, false)?;
            self.portfolio.insert(ConfiguredVerifier::new(
                incumbent.tool.clone(),
                incumbent.configuration.clone(),
                allocation,
            ));
            info!(
                iteration,
                tool = %incumbent.tool,
                config = %incumbent.configuration,
                cpus = allocation.cpus(),
                gpus = allocation.gpus(),
                "added portfolio member"
            );
            added.push(summary(incumbent));
        }
        self.recompute_portfolio_costs()?;

        let total = self.portfolio.total_cost();
        let stalled = self.previous_total.is_some_and(|previous| total >= previous);
        self.previous_total = Some(total);
        if self.settings.stop_early && stalled {
            info!(iteration, total, "portfolio cost did not improve, stopping");
            return Ok((added, Some(StopReason::NoImprovement)));
        }
        Ok((added, None))
    }

    /// Per-instance VBS cost over all members; instances without a finite
    /// cost get the mean of the evaluated ones.
    fn recompute_portfolio_costs(&mut self) -> Result<()> {
        let configs: Vec<Configuration> = self
            .portfolio
            .configurations()
            .into_iter()
            .filter(|config| self.cost_matrix.contains(config))
            .collect();
        let mut costs = self.cost_matrix.vbs_cost(&configs, &self.instances)?;
        fill_unevaluated(&mut costs);
        self.portfolio.set_instance_costs(costs);
        Ok(())
    }
}

/// Stand-in for the optimizer when the tune budget is zero: measures the
/// tool's default configuration on every instance.
fn evaluate_default(
    default: &Configuration,
    request: &OptimizeRequest<'_>,
    cost: &mut CostFn<'_>,
) -> anyhow::Result<OptimizeOutput> {
    let incumbent = default.clone();
    let mut history = RunHistory::new();
    for instance in request.instances {
        let trial_cost = cost(&incumbent, instance, request.seed)?;
        history.push(TrialRecord {
            configuration: incumbent.clone(),
            instance: instance.key(),
            seed: request.seed,
            cost: trial_cost,
        });
    }
    Ok(OptimizeOutput { incumbent, history })
}

fn per_instance_means(history: &[TrialRecord], instances: &[Instance]) -> BTreeMap<String, f64> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for record in history {
        let entry = sums.entry(record.instance.as_str()).or_default();
        entry.0 += record.cost.value();
        entry.1 += 1;
    }
    instances
        .iter()
        .map(|instance| {
            let key = instance.key();
            let mean = sums
                .get(key.as_str())
                .map_or(f64::INFINITY, |(sum, n)| sum / *n as f64);
            (key, mean)
        })
        .collect()
}

fn fill_unevaluated(costs: &mut BTreeMap<String, f64>) {
    let finite: Vec<f64> = costs.values().copied().filter(|c| c.is_finite()).collect();
    if finite.is_empty() {
        return;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    for cost in costs.values_mut().filter(|c| !c.is_finite()) {
        *cost = mean;
    }
}

fn summary(incumbent: &Incumbent) -> IncumbentSummary {
    IncumbentSummary {
        tool: incumbent.tool.clone(),
        configuration: incumbent.configuration.clone(),
        mean_cost: incumbent.mean_cost(),
    }
}

fn setup_failure(message: &str) -> PortfolioError {
    PortfolioError::OptimizerFailure {
        stage: "setting up".into(),
        message: message.into(),
    }
}

fn optimizer_failure(stage: &str, err: anyhow::Error) -> PortfolioError {
    match err.downcast::<PortfolioError>() {
        Ok(PortfolioError::Interrupted) => PortfolioError::Interrupted,
        Ok(other) => PortfolioError::OptimizerFailure {
            stage: stage.into(),
            message: other.to_string(),
        },
        Err(err) => PortfolioError::OptimizerFailure {
            stage: stage.into(),
            message: format!("{err:#}"),
        },
    }
}
