//! Trial outcomes and optimizer run histories.

use serde::{Deserialize, Serialize};
use veriport_core::Configuration;

/// What actually happened when a configuration was run on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Solved { secs: f64 },
    /// Timed out or failed; `secs` is the instance timeout.
    Timeout { secs: f64 },
    /// The configuration cannot run on this instance at all.
    Infeasible,
}

impl TrialOutcome {
    /// Cost to fold into averages: timeouts scaled by `penalty`, infeasible
    /// trials have none.
    pub fn penalized(self, penalty: f64) -> Option<f64> {
        match self {
            TrialOutcome::Solved { secs } => Some(secs),
            TrialOutcome::Timeout { secs } => Some(secs * penalty),
            TrialOutcome::Infeasible => None,
        }
    }
}

/// Cost reported to an optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TrialCost {
    Finite(f64),
    Infeasible,
}

impl TrialCost {
    /// Infeasible trials rank behind every finite cost.
    pub fn value(self) -> f64 {
        match self {
            TrialCost::Finite(cost) => cost,
            TrialCost::Infeasible => f64::INFINITY,
        }
    }

    pub fn is_infeasible(self) -> bool {
        matches!(self, TrialCost::Infeasible)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub configuration: Configuration,
    /// Canonical instance key.
    pub instance: String,
    pub seed: u64,
    pub cost: TrialCost,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    records: Vec<TrialRecord>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn for_configuration(&self, configuration: &Configuration) -> Vec<TrialRecord> {
        self.records
            .iter()
            .filter(|record| &record.configuration == configuration)
            .cloned()
            .collect()
    }

    /// Mean reported cost of `configuration`; infinite if any trial was
    /// infeasible, `None` if it was never run.
    pub fn mean_cost(&self, configuration: &Configuration) -> Option<f64> {
        let costs: Vec<f64> = self
            .records
            .iter()
            .filter(|record| &record.configuration == configuration)
            .map(|record| record.cost.value())
            .collect();
        if costs.is_empty() {
            return None;
        }
        Some(costs.iter().sum::<f64>() / costs.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_only_scales_timeouts() {
        assert_eq!(TrialOutcome::Solved { secs: 2.0 }.penalized(10.0), Some(2.0));
        assert_eq!(TrialOutcome::Timeout { secs: 2.0 }.penalized(10.0), Some(20.0));
        assert_eq!(TrialOutcome::Infeasible.penalized(10.0), None);
    }

    #[test]
    fn test_mean_cost_per_configuration() {
        let a = Configuration::empty("t").with("x", 1i64);
        let b = Configuration::empty("t").with("x", 2i64);
        let mut history = RunHistory::new();
        for (config, cost) in [(&a, 1.0), (&a, 3.0), (&b, 5.0)] {
            history.push(TrialRecord {
                configuration: config.clone(),
                instance: "i".into(),
                seed: 0,
                cost: TrialCost::Finite(cost),
            });
        }
        assert_eq!(history.mean_cost(&a), Some(2.0));
        assert_eq!(history.for_configuration(&b).len(), 1);
        assert_eq!(history.mean_cost(&Configuration::empty("t")), None);
    }
}
