//! Portfolios of configured verifiers.

use crate::config::Configuration;
use crate::error::Result;
use crate::resources::ResourceAllocation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// A tool paired with one of its configurations and the resources it holds.
///
/// Equality and hashing ignore the allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredVerifier {
    pub tool: String,
    pub configuration: Configuration,
    pub allocation: ResourceAllocation,
}

impl ConfiguredVerifier {
    pub fn new(
        tool: impl Into<String>,
        configuration: Configuration,
        allocation: ResourceAllocation,
    ) -> Self {
        Self {
            tool: tool.into(),
            configuration,
            allocation,
        }
    }

    pub fn same_member(&self, tool: &str, configuration: &Configuration) -> bool {
        self.tool == tool && &self.configuration == configuration
    }
}

impl PartialEq for ConfiguredVerifier {
    fn eq(&self, other: &Self) -> bool {
        self.same_member(&other.tool, &other.configuration)
    }
}

impl Eq for ConfiguredVerifier {}

impl Hash for ConfiguredVerifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tool.hash(state);
        self.configuration.hash(state);
    }
}

/// Members plus the best known cost per instance key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portfolio {
    members: Vec<ConfiguredVerifier>,
    #[serde(default)]
    instance_costs: BTreeMap<String, f64>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[ConfiguredVerifier] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, tool: &str, configuration: &Configuration) -> bool {
        self.members
            .iter()
            .any(|member| member.same_member(tool, configuration))
    }

    /// Add a member unless an equal one is already present.
    pub fn insert(&mut self, member: ConfiguredVerifier) -> bool {
        if self.contains(&member.tool, &member.configuration) {
            return false;
        }
        self.members.push(member);
        true
    }

    pub fn configurations(&self) -> Vec<Configuration> {
        self.members
            .iter()
            .map(|member| member.configuration.clone())
            .collect()
    }

    pub fn instance_costs(&self) -> &BTreeMap<String, f64> {
        &self.instance_costs
    }

    /// Replace the per-instance costs. Non-finite entries are dropped, so an
    /// instance no member has a cost for reads back as `None`.
    pub fn set_instance_costs(&mut self, costs: BTreeMap<String, f64>) {
        self.instance_costs = costs
            .into_iter()
            .filter(|(_, cost)| cost.is_finite())
            .collect();
    }

    /// Best known cost for one instance key.
    pub fn cost(&self, instance_key: &str) -> Option<f64> {
        self.instance_costs.get(instance_key).copied()
    }

    pub fn total_cost(&self) -> f64 {
        self.instance_costs.values().sum()
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let portfolio = serde_json::from_slice(&data)?;
        Ok(portfolio)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(tool: &str, batch: i64, allocation: ResourceAllocation) -> ConfiguredVerifier {
        ConfiguredVerifier::new(
            tool,
            Configuration::empty(tool).with("batch", batch),
            allocation,
        )
    }

    #[test]
    fn test_duplicate_members_ignore_allocation() {
        let mut portfolio = Portfolio::new();
        assert!(portfolio.insert(member("abcrown", 8, ResourceAllocation::Counts { cpus: 1, gpus: 0 })));
        assert!(!portfolio.insert(member("abcrown", 8, ResourceAllocation::Counts { cpus: 4, gpus: 1 })));
        assert!(portfolio.insert(member("abcrown", 16, ResourceAllocation::Counts { cpus: 1, gpus: 0 })));
        assert_eq!(portfolio.len(), 2);
    }

    #[test]
    fn test_save_and_load_preserves_members_and_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/portfolio.json");

        let mut portfolio = Portfolio::new();
        portfolio.insert(member(
            "abcrown",
            8,
            ResourceAllocation::Bound {
                cpu_low: 2,
                cpu_high: 3,
                gpu: Some(0),
            },
        ));
        portfolio.insert(member(
            "nnenum",
            1,
            ResourceAllocation::Bound {
                cpu_low: 0,
                cpu_high: 1,
                gpu: None,
            },
        ));
        portfolio.set_instance_costs(BTreeMap::from([("a|b|10".to_string(), 1.5)]));
        portfolio.save_to_file(&path).unwrap();

        let loaded = Portfolio::load_from_file(&path).unwrap();
        assert_eq!(loaded.members(), portfolio.members());
        let allocations: Vec<_> = loaded.members().iter().map(|m| m.allocation).collect();
        let expected: Vec<_> = portfolio.members().iter().map(|m| m.allocation).collect();
        assert_eq!(allocations, expected);
        assert_eq!(loaded.cost("a|b|10"), Some(1.5));
    }
}
