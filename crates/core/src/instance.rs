//! Verification instances.

use crate::error::{PortfolioError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Separator used by [`Instance::key`]. Paths may not contain it.
pub const KEY_SEPARATOR: char = '|';

/// One verification query: network artifact, property artifact, timeout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    network: PathBuf,
    property: PathBuf,
    timeout_secs: u64,
}

impl Instance {
    pub fn new(
        network: impl Into<PathBuf>,
        property: impl Into<PathBuf>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let network = network.into();
        let property = property.into();
        for path in [&network, &property] {
            if path.to_string_lossy().contains(KEY_SEPARATOR) {
                return Err(PortfolioError::invalid_instance(
                    path.clone(),
                    format!("path contains the key separator `{KEY_SEPARATOR}`"),
                ));
            }
        }
        Ok(Self {
            network,
            property,
            timeout_secs,
        })
    }

    pub fn network(&self) -> &Path {
        &self.network
    }

    pub fn property(&self) -> &Path {
        &self.property
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Canonical string form used as a map key across components.
    pub fn key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.network.display(),
            self.property.display(),
            self.timeout_secs,
            sep = KEY_SEPARATOR
        )
    }

    pub fn from_key(key: &str) -> Result<Self> {
        let mut parts = key.split(KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(network), Some(property), Some(timeout), None) => {
                let timeout_secs = timeout.trim().parse().map_err(|_| {
                    PortfolioError::invalid_instance(key, format!("bad timeout `{timeout}`"))
                })?;
                Self::new(network, property, timeout_secs)
            }
            _ => Err(PortfolioError::invalid_instance(
                key,
                "expected network|property|timeout",
            )),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Load a VNN-COMP style `instances.csv` (`network,property,timeout`, no header).
///
/// Relative artifact paths are resolved against the directory holding the CSV.
pub fn load_instances_csv(path: &Path) -> Result<Vec<Instance>> {
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut instances = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 3 {
            return Err(PortfolioError::invalid_instance(
                path,
                format!("row {:?} needs network,property,timeout", record),
            ));
        }
        let timeout: f64 = record[2].parse().map_err(|_| {
            PortfolioError::invalid_instance(path, format!("bad timeout `{}`", &record[2]))
        })?;
        instances.push(Instance::new(
            base.join(&record[0]),
            base.join(&record[1]),
            timeout.ceil() as u64,
        )?);
    }
    tracing::debug!(path = %path.display(), count = instances.len(), "loaded instances");
    Ok(instances)
}
