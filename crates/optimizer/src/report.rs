//! Tuning reports written next to the portfolio.

use crate::hydra::HydraSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use veriport_core::Configuration;

/// Why the construction loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All iterations ran.
    Completed,
    /// The proposed batch repeated a portfolio member.
    DuplicateIncumbent,
    /// `stop_early` was set and the total portfolio cost did not drop.
    NoImprovement,
    /// No tool fits the remaining resource budget.
    NoFeasibleTool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncumbentSummary {
    pub tool: String,
    pub configuration: Configuration,
    /// Mean over evaluated instances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_cost: Option<f64>,
}

/// What happened in one configurator/updater iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub picked_tools: Vec<String>,
    /// Incumbents of the configurator round, best first.
    pub incumbents: Vec<IncumbentSummary>,
    /// Members committed to the portfolio in this iteration.
    pub added: Vec<IncumbentSummary>,
    /// Total portfolio cost after the update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_cost: Option<f64>,
    pub remaining_cpu: usize,
    pub remaining_gpu: usize,
}

/// Complete record of one portfolio construction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneReport {
    /// Name of the optimizer that drove the pick and tune rounds.
    pub optimizer: String,

    pub settings: HydraSettings,

    pub iterations: Vec<IterationRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    pub portfolio_size: usize,

    /// Wall-clock duration of the whole run (seconds).
    pub elapsed_secs: f64,
}

impl TuneReport {
    pub fn new(optimizer: impl Into<String>, settings: HydraSettings) -> Self {
        Self {
            optimizer: optimizer.into(),
            settings,
            iterations: Vec::new(),
            stop_reason: None,
            portfolio_size: 0,
            elapsed_secs: 0.0,
        }
    }

    /// Cost after the last iteration that recorded one.
    pub fn final_cost(&self) -> Option<f64> {
        self.iterations.iter().rev().find_map(|record| record.portfolio_cost)
    }

    /// Save report to JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load report from JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
