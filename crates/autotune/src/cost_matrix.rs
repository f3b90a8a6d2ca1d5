//! Running-average cost per (configuration, instance).

use crate::history::TrialOutcome;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;
use veriport_core::{Configuration, Instance, PortfolioError, Result};

/// Multiplier applied to timeout samples before they are averaged.
pub const DEFAULT_TIMEOUT_PENALTY: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RunningMean {
    mean: f64,
    count: u64,
}

/// Running mean cost per instance key for one configuration.
#[derive(Debug, Clone, Default)]
pub struct InstanceCost {
    entries: HashMap<String, RunningMean>,
}

impl InstanceCost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `cost` into the mean for `key`.
    pub fn update(&mut self, key: &str, cost: f64) {
        let entry = self.entries.entry(key.to_string()).or_insert(RunningMean {
            mean: 0.0,
            count: 0,
        });
        entry.mean += (cost - entry.mean) / (entry.count + 1) as f64;
        entry.count += 1;
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).map(|entry| entry.mean)
    }

    pub fn count(&self, key: &str) -> u64 {
        self.entries.get(key).map_or(0, |entry| entry.count)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CostMatrix {
    costs: HashMap<Configuration, InstanceCost>,
    timeout_penalty: f64,
}

impl Default for CostMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl CostMatrix {
    pub fn new() -> Self {
        Self::with_penalty(DEFAULT_TIMEOUT_PENALTY)
    }

    pub fn with_penalty(timeout_penalty: f64) -> Self {
        Self {
            costs: HashMap::new(),
            timeout_penalty,
        }
    }

    pub fn timeout_penalty(&self) -> f64 {
        self.timeout_penalty
    }

    pub fn update(&mut self, config: &Configuration, instance: &Instance, cost: f64) {
        trace!(config = %config, instance = %instance, cost, "cost sample");
        self.costs
            .entry(config.clone())
            .or_default()
            .update(&instance.key(), cost);
    }

    /// Fold a timeout sample, scaled by the penalty multiplier.
    pub fn update_timeout(&mut self, config: &Configuration, instance: &Instance, timeout_secs: f64) {
        self.update(config, instance, timeout_secs * self.timeout_penalty);
    }

    /// Fold a trial outcome. Infeasible trials leave the matrix untouched.
    pub fn record(&mut self, config: &Configuration, instance: &Instance, outcome: TrialOutcome) {
        match outcome {
            TrialOutcome::Solved { secs } => self.update(config, instance, secs),
            TrialOutcome::Timeout { secs } => self.update_timeout(config, instance, secs),
            TrialOutcome::Infeasible => {}
        }
    }

    pub fn get(&self, config: &Configuration, instance: &Instance) -> Result<f64> {
        self.costs
            .get(config)
            .and_then(|costs| costs.get(&instance.key()))
            .ok_or_else(|| PortfolioError::NotFound(format!("{config} on {instance}")))
    }

    pub fn contains(&self, config: &Configuration) -> bool {
        self.costs.contains_key(config)
    }

    pub fn instance_costs(&self, config: &Configuration) -> Option<&InstanceCost> {
        self.costs.get(config)
    }

    pub fn remove(&mut self, config: &Configuration) -> Option<InstanceCost> {
        self.costs.remove(config)
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Virtual-best-solver cost: per instance, the minimum mean across
    /// `configs`. Instances none of them has run report `+inf`.
    pub fn vbs_cost(
        &self,
        configs: &[Configuration],
        instances: &[Instance],
    ) -> Result<BTreeMap<String, f64>> {
        let rows = configs
            .iter()
            .map(|config| {
                self.costs
                    .get(config)
                    .ok_or_else(|| PortfolioError::NotFound(format!("configuration {config}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(instances
            .iter()
            .map(|instance| {
                let key = instance.key();
                let best = rows
                    .iter()
                    .filter_map(|row| row.get(&key))
                    .fold(f64::INFINITY, f64::min);
                (key, best)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(idx: usize) -> Instance {
        Instance::new(format!("n{idx}.onnx"), format!("p{idx}.vnnlib"), 60).unwrap()
    }

    fn config(tag: i64) -> Configuration {
        Configuration::empty("t").with("tag", tag)
    }

    #[test]
    fn test_update_is_order_independent_mean() {
        let samples = [4.0, 1.0, 7.0, 0.5, 2.5];
        let mut forward = InstanceCost::new();
        let mut backward = InstanceCost::new();
        for s in samples {
            forward.update("k", s);
        }
        for s in samples.iter().rev() {
            backward.update("k", *s);
        }
        let expected = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((forward.get("k").unwrap() - expected).abs() < 1e-12);
        assert!((backward.get("k").unwrap() - expected).abs() < 1e-12);
        assert_eq!(forward.count("k"), 5);
    }

    #[test]
    fn test_get_unknown_pair_is_not_found() {
        let mut matrix = CostMatrix::new();
        matrix.update(&config(1), &instance(0), 1.0);
        assert!(matches!(
            matrix.get(&config(1), &instance(1)),
            Err(PortfolioError::NotFound(_))
        ));
        assert!(matches!(
            matrix.get(&config(2), &instance(0)),
            Err(PortfolioError::NotFound(_))
        ));
    }

    #[test]
    fn test_vbs_is_per_instance_minimum() {
        let mut matrix = CostMatrix::new();
        matrix.update(&config(1), &instance(0), 3.0);
        matrix.update(&config(2), &instance(0), 1.0);
        matrix.update(&config(1), &instance(1), 2.0);

        let vbs = matrix
            .vbs_cost(&[config(1), config(2)], &[instance(0), instance(1), instance(2)])
            .unwrap();
        assert_eq!(vbs[&instance(0).key()], 1.0);
        assert_eq!(vbs[&instance(1).key()], 2.0);
        assert!(vbs[&instance(2).key()].is_infinite());
    }

    #[test]
    fn test_vbs_with_unknown_config_fails() {
        let mut matrix = CostMatrix::new();
        matrix.update(&config(1), &instance(0), 3.0);
        let err = matrix.vbs_cost(&[config(1), config(9)], &[]).unwrap_err();
        assert!(matches!(err, PortfolioError::NotFound(_)));
    }

    #[test]
    fn test_timeouts_are_penalized() {
        let mut matrix = CostMatrix::with_penalty(10.0);
        matrix.record(&config(1), &instance(0), TrialOutcome::Solved { secs: 2.0 });
        matrix.record(&config(1), &instance(0), TrialOutcome::Timeout { secs: 60.0 });
        matrix.record(&config(1), &instance(0), TrialOutcome::Infeasible);
        assert_eq!(matrix.get(&config(1), &instance(0)).unwrap(), 301.0);
        assert_eq!(matrix.instance_costs(&config(1)).unwrap().count(&instance(0).key()), 2);
    }

    #[test]
    fn test_remove_configuration() {
        let mut matrix = CostMatrix::new();
        matrix.update(&config(1), &instance(0), 3.0);
        assert!(matrix.remove(&config(1)).is_some());
        assert!(!matrix.contains(&config(1)));
        assert!(matrix.is_empty());
    }
}
