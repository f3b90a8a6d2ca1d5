//! JSON configuration for the `tune` and `run` commands.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Command-line flags override whatever the file sets.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use veriport_core::ResourcePool;
use veriport_optimizer::HydraSettings;
use veriport_verifiers::ProcessOptions;

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let blob = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&blob).with_context(|| format!("parsing config {}", path.display()))
}

fn pool(cpus: Option<usize>, gpus: usize) -> ResourcePool {
    let cpus = cpus.unwrap_or_else(|| ResourcePool::detect_cpus().cpus);
    ResourcePool::new(cpus, gpus)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    /// VNN-COMP style instances CSV.
    pub instances: Option<PathBuf>,
    /// Candidate tools; empty means every registered tool.
    pub tools: Vec<String>,
    /// CPUs to split across members; all detected CPUs when unset.
    pub cpus: Option<usize>,
    pub gpus: usize,
    pub hydra: HydraSettings,
    /// Cap on configurations per optimizer call.
    pub max_trials: Option<usize>,
    pub output: PathBuf,
    /// Tune report path; defaults to the portfolio path with a
    /// `.report.json` suffix.
    pub report: Option<PathBuf>,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            instances: None,
            tools: Vec::new(),
            cpus: None,
            gpus: 0,
            hydra: HydraSettings::default(),
            max_trials: None,
            output: PathBuf::from("portfolio.json"),
            report: None,
        }
    }
}

impl TuneConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn pool(&self) -> ResourcePool {
        pool(self.cpus, self.gpus)
    }

    pub fn report_path(&self) -> PathBuf {
        self.report
            .clone()
            .unwrap_or_else(|| self.output.with_extension("report.json"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub portfolio: PathBuf,
    pub instances: Option<PathBuf>,
    pub cpus: Option<usize>,
    pub gpus: usize,
    /// CSV file receiving one row per (instance, member).
    pub result_log: Option<PathBuf>,
    pub pin_cpus: bool,
    /// Seconds between SIGTERM and SIGKILL when stopping a verifier.
    pub grace_period_secs: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            portfolio: PathBuf::from("portfolio.json"),
            instances: None,
            cpus: None,
            gpus: 0,
            result_log: None,
            pin_cpus: true,
            grace_period_secs: 5.0,
        }
    }
}

impl RunConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn pool(&self) -> ResourcePool {
        pool(self.cpus, self.gpus)
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            pin_cpus: self.pin_cpus,
            grace_period: Duration::from_secs_f64(self.grace_period_secs.max(0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tune.json");
        fs::write(
            &path,
            r#"{"cpus": 8, "gpus": 2, "hydra": {"iterations": 5, "tune_budget_secs": 0}}"#,
        )
        .unwrap();

        let config = TuneConfig::load_from_file(&path).unwrap();
        assert_eq!(config.pool(), ResourcePool::new(8, 2));
        assert_eq!(config.hydra.iterations, 5);
        assert_eq!(config.hydra.tune_budget_secs, 0.0);
        assert_eq!(config.hydra.configs_per_iter, HydraSettings::default().configs_per_iter);
        assert_eq!(config.output, PathBuf::from("portfolio.json"));
        assert_eq!(config.report_path(), PathBuf::from("portfolio.report.json"));
    }

    #[test]
    fn test_run_config_grace_period() {
        let config: RunConfig = serde_json::from_str(r#"{"grace_period_secs": 0.5}"#).unwrap();
        assert_eq!(config.process_options().grace_period, Duration::from_millis(500));
        assert!(config.pin_cpus);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{not json").unwrap();
        let err = RunConfig::load_from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("run.json"));
    }
}
