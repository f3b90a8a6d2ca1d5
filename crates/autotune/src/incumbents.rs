//! Ranking and deduplication of optimizer incumbents.

use crate::history::TrialRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use veriport_core::Configuration;

/// Best configuration of one optimizer round with its evaluation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incumbent {
    pub tool: String,
    pub configuration: Configuration,
    pub history: Vec<TrialRecord>,
    /// Mean cost per instance key; non-finite entries mean "not evaluated".
    pub instance_costs: BTreeMap<String, f64>,
}

impl Incumbent {
    pub fn new(
        tool: impl Into<String>,
        configuration: Configuration,
        history: Vec<TrialRecord>,
        instance_costs: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            tool: tool.into(),
            configuration,
            history,
            instance_costs,
        }
    }

    /// Mean over evaluated instances only; `None` when nothing was evaluated.
    pub fn mean_cost(&self) -> Option<f64> {
        let finite: Vec<f64> = self
            .instance_costs
            .values()
            .copied()
            .filter(|cost| cost.is_finite())
            .collect();
        if finite.is_empty() {
            None
        } else {
            Some(finite.iter().sum::<f64>() / finite.len() as f64)
        }
    }
}

fn rank(a: &Incumbent, b: &Incumbent) -> Ordering {
    match (a.mean_cost(), b.mean_cost()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Default)]
pub struct IncumbentSet {
    incumbents: Vec<Incumbent>,
}

impl IncumbentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless an incumbent with an equal configuration is present.
    pub fn add(&mut self, incumbent: Incumbent) -> bool {
        if self.contains(&incumbent.configuration) {
            return false;
        }
        self.incumbents.push(incumbent);
        true
    }

    pub fn contains(&self, configuration: &Configuration) -> bool {
        self.incumbents
            .iter()
            .any(|incumbent| &incumbent.configuration == configuration)
    }

    /// The `n` cheapest incumbents; ties keep insertion order.
    pub fn best_n(&self, n: usize) -> Vec<&Incumbent> {
        let mut ranked: Vec<&Incumbent> = self.incumbents.iter().collect();
        ranked.sort_by(|a, b| rank(a, b));
        ranked.truncate(n);
        ranked
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incumbent> {
        self.incumbents.iter()
    }

    pub fn len(&self) -> usize {
        self.incumbents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incumbents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incumbent(tag: i64, costs: &[f64]) -> Incumbent {
        let instance_costs = costs
            .iter()
            .enumerate()
            .map(|(idx, cost)| (format!("i{idx}"), *cost))
            .collect();
        Incumbent::new(
            "tool",
            Configuration::empty("tool").with("tag", tag),
            Vec::new(),
            instance_costs,
        )
    }

    #[test]
    fn test_duplicate_configuration_rejected() {
        let mut set = IncumbentSet::new();
        assert!(set.add(incumbent(1, &[1.0])));
        assert!(!set.add(incumbent(1, &[0.1])));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_best_n_ranks_by_mean_with_unevaluated_last() {
        let mut set = IncumbentSet::new();
        set.add(incumbent(1, &[f64::INFINITY]));
        set.add(incumbent(2, &[4.0, f64::INFINITY]));
        set.add(incumbent(3, &[1.0, 3.0]));
        set.add(incumbent(4, &[2.0, 2.0]));

        let tags: Vec<_> = set
            .best_n(4)
            .iter()
            .map(|inc| inc.configuration.get("tag").cloned())
            .collect();
        assert_eq!(
            tags,
            vec![Some(3i64.into()), Some(4i64.into()), Some(2i64.into()), Some(1i64.into())]
        );
        assert_eq!(set.best_n(1).len(), 1);
    }

    #[test]
    fn test_unevaluated_incumbent_has_no_mean() {
        assert_eq!(incumbent(1, &[]).mean_cost(), None);
        assert_eq!(incumbent(1, &[f64::NAN, 3.0]).mean_cost(), Some(3.0));
    }
}
