//! Append-only CSV log with one row per (instance, member).

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use veriport_core::{Configuration, Instance, Result};
use veriport_verifiers::{Outcome, VerifierResult};

const HEADER: [&str; 10] = [
    "network",
    "property",
    "timeout",
    "tool",
    "config",
    "success",
    "result",
    "took",
    "counter_example",
    "error",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub network: String,
    pub property: String,
    pub timeout: u64,
    pub tool: String,
    pub config: String,
    /// `OK` unless the member errored.
    pub success: &'static str,
    pub result: &'static str,
    pub took: f64,
    pub counter_example: String,
    pub error: String,
}

impl ResultRow {
    pub fn new(
        instance: &Instance,
        tool: &str,
        configuration: &Configuration,
        result: &VerifierResult,
    ) -> Self {
        Self {
            network: instance.network().display().to_string(),
            property: instance.property().display().to_string(),
            timeout: instance.timeout_secs(),
            tool: tool.to_string(),
            config: configuration.to_string(),
            success: if result.outcome == Outcome::Err { "ERR" } else { "OK" },
            result: result.outcome.as_str(),
            took: result.took_secs,
            counter_example: result.counter_example.clone().unwrap_or_default(),
            error: result.error.clone().unwrap_or_default(),
        }
    }
}

pub struct ResultLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl ResultLog {
    /// Open `path` for appending. The header is written only when the file is
    /// new or empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn row(outcome: Outcome) -> ResultRow {
        let instance = Instance::new("nets/a.onnx", "props/a.vnnlib", 60).unwrap();
        let result = match outcome {
            Outcome::Err => VerifierResult::error("crashed, badly", Duration::from_millis(500)),
            other => VerifierResult::new(other, Duration::from_millis(1500)),
        };
        ResultRow::new(&instance, "nnenum", &Configuration::empty("nnenum"), &result)
    }

    #[test]
    fn test_header_written_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/results.csv");

        let mut log = ResultLog::open(&path).unwrap();
        log.append(&row(Outcome::Unsat)).unwrap();
        drop(log);
        let mut log = ResultLog::open(&path).unwrap();
        log.append(&row(Outcome::Err)).unwrap();
        drop(log);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.join(","));
        assert!(lines[1].contains(",OK,UNSAT,1.5,"));
        assert!(lines[2].contains(",ERR,ERR,0.5,"));
        assert!(lines[2].ends_with("\"crashed, badly\""));
    }
}
