//! Optimizer trait and the random-search implementation.

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;
use veriport_autotune::{RunHistory, TrialCost, TrialRecord};
use veriport_core::{Configuration, Instance, SearchSpace};

/// Cost callback handed to an optimizer: runs one configuration on one
/// instance with the given seed.
pub type CostFn<'a> = dyn FnMut(&Configuration, &Instance, u64) -> Result<TrialCost> + 'a;

/// One optimization problem.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeRequest<'a> {
    pub space: &'a SearchSpace,
    pub instances: &'a [Instance],
    pub walltime: Duration,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct OptimizeOutput {
    pub incumbent: Configuration,
    pub history: RunHistory,
}

/// Trait for single-configuration black-box optimizers.
pub trait Optimizer: Send + Sync {
    /// Name of this optimizer.
    fn name(&self) -> &str;

    /// Search `request.space` for the configuration with the lowest mean cost
    /// over `request.instances`.
    fn optimize(&self, request: &OptimizeRequest<'_>, cost: &mut CostFn<'_>)
        -> Result<OptimizeOutput>;
}

/// Seeded random search (no model, deterministic for a fixed seed).
///
/// Evaluates the default configuration first, then fresh samples until the
/// walltime or the trial cap is reached.
#[derive(Debug, Clone)]
pub struct RandomSearchOptimizer {
    pub max_trials: Option<usize>,
    /// Consecutive already-seen samples after which the space counts as
    /// exhausted.
    pub max_duplicate_draws: usize,
}

impl Default for RandomSearchOptimizer {
    fn default() -> Self {
        Self {
            max_trials: None,
            max_duplicate_draws: 32,
        }
    }
}

impl RandomSearchOptimizer {
    pub fn with_max_trials(max_trials: usize) -> Self {
        Self {
            max_trials: Some(max_trials),
            ..Self::default()
        }
    }

    fn next_candidate(
        &self,
        space: &SearchSpace,
        rng: &mut fastrand::Rng,
        seen: &HashSet<Configuration>,
    ) -> Option<Configuration> {
        if !seen.contains(&space.default_configuration()) {
            return Some(space.default_configuration());
        }
        (0..self.max_duplicate_draws)
            .map(|_| space.sample(rng))
            .find(|candidate| !seen.contains(candidate))
    }
}

impl Optimizer for RandomSearchOptimizer {
    fn name(&self) -> &str {
        "random-search"
    }

    fn optimize(
        &self,
        request: &OptimizeRequest<'_>,
        cost: &mut CostFn<'_>,
    ) -> Result<OptimizeOutput> {
        if request.instances.is_empty() {
            bail!("cannot optimize over an empty instance set");
        }

        let start = Instant::now();
        let mut rng = fastrand::Rng::with_seed(request.seed);
        let mut history = RunHistory::new();
        let mut seen = HashSet::new();
        let mut best: Option<(Configuration, f64)> = None;

        while let Some(candidate) = self.next_candidate(request.space, &mut rng, &seen) {
            let trial = seen.len() as u64;
            for instance in request.instances {
                let seed = request.seed.wrapping_add(trial);
                let trial_cost = cost(&candidate, instance, seed)?;
                history.push(TrialRecord {
                    configuration: candidate.clone(),
                    instance: instance.key(),
                    seed,
                    cost: trial_cost,
                });
            }

            let mean = history.mean_cost(&candidate).unwrap_or(f64::INFINITY);
            debug!(trial, config = %candidate, mean, "random search trial");
            if best.as_ref().map_or(true, |(_, best_mean)| mean < *best_mean) {
                best = Some((candidate.clone(), mean));
            }
            seen.insert(candidate);

            if start.elapsed() >= request.walltime
                || self.max_trials.is_some_and(|cap| seen.len() >= cap)
            {
                break;
            }
        }

        match best {
            Some((incumbent, _)) => Ok(OptimizeOutput { incumbent, history }),
            None => bail!("search space {} produced no candidate", request.space.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriport_core::ParamValue;

    fn instances() -> Vec<Instance> {
        (0..3)
            .map(|i| Instance::new(format!("n{i}.onnx"), format!("p{i}.vnnlib"), 30).unwrap())
            .collect()
    }

    #[test]
    fn test_default_is_evaluated_first() {
        let space = SearchSpace::new("t").integer("depth", 0, 100, 7);
        let instances = instances();
        let request = OptimizeRequest {
            space: &space,
            instances: &instances,
            walltime: Duration::ZERO,
            seed: 1,
        };
        let mut calls = Vec::new();
        let output = RandomSearchOptimizer::default()
            .optimize(&request, &mut |config, _, _| {
                calls.push(config.clone());
                Ok(TrialCost::Finite(1.0))
            })
            .unwrap();

        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c == &space.default_configuration()));
        assert_eq!(output.incumbent, space.default_configuration());
        assert_eq!(output.history.len(), 3);
    }

    #[test]
    fn test_picks_lowest_mean_and_avoids_infeasible() {
        let space = SearchSpace::new("t").categorical(
            "mode",
            vec!["slow".into(), "fast".into(), "broken".into()],
            "slow",
        );
        let instances = instances();
        let request = OptimizeRequest {
            space: &space,
            instances: &instances,
            walltime: Duration::from_secs(60),
            seed: 3,
        };
        let output = RandomSearchOptimizer::default()
            .optimize(&request, &mut |config, _, _| {
                Ok(match config.get("mode") {
                    Some(ParamValue::Str(mode)) if mode == "fast" => TrialCost::Finite(1.0),
                    Some(ParamValue::Str(mode)) if mode == "slow" => TrialCost::Finite(5.0),
                    _ => TrialCost::Infeasible,
                })
            })
            .unwrap();

        assert_eq!(output.incumbent.get("mode"), Some(&ParamValue::from("fast")));
        // each of the three choices ran once on every instance
        assert_eq!(output.history.len(), 9);
    }

    #[test]
    fn test_trial_cap_and_error_propagation() {
        let space = SearchSpace::new("t").float("alpha", 0.0, 1.0, 0.5);
        let instances = instances();
        let request = OptimizeRequest {
            space: &space,
            instances: &instances,
            walltime: Duration::from_secs(60),
            seed: 9,
        };
        let output = RandomSearchOptimizer::with_max_trials(4)
            .optimize(&request, &mut |_, _, _| Ok(TrialCost::Finite(2.0)))
            .unwrap();
        assert_eq!(output.history.len(), 12);

        let err = RandomSearchOptimizer::default()
            .optimize(&request, &mut |_, _, _| anyhow::bail!("tool crashed"))
            .unwrap_err();
        assert!(err.to_string().contains("tool crashed"));
    }
}
