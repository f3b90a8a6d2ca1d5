//! Structured verifier results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Sat,
    Unsat,
    Timeout,
    Err,
}

impl Outcome {
    /// SAT and UNSAT both settle the instance.
    pub fn is_solved(self) -> bool {
        matches!(self, Outcome::Sat | Outcome::Unsat)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Sat => "SAT",
            Outcome::Unsat => "UNSAT",
            Outcome::Timeout => "TIMEOUT",
            Outcome::Err => "ERR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierResult {
    pub outcome: Outcome,
    /// Wall-clock seconds; equals the instance timeout when the run timed out.
    pub took_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_example: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the run was stopped through its cancel handle.
    #[serde(default)]
    pub cancelled: bool,
}

impl VerifierResult {
    pub fn new(outcome: Outcome, took: Duration) -> Self {
        Self {
            outcome,
            took_secs: took.as_secs_f64(),
            counter_example: None,
            error: None,
            cancelled: false,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(Outcome::Timeout, timeout)
    }

    pub fn cancelled(took: Duration) -> Self {
        Self {
            cancelled: true,
            ..Self::new(Outcome::Timeout, took)
        }
    }

    pub fn error(message: impl Into<String>, took: Duration) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(Outcome::Err, took)
        }
    }

    pub fn with_counter_example(mut self, counter_example: Option<String>) -> Self {
        self.counter_example = counter_example;
        self
    }

    pub fn is_solved(&self) -> bool {
        self.outcome.is_solved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&Outcome::Unsat).unwrap();
        assert_eq!(json, "\"UNSAT\"");
        let parsed: Outcome = serde_json::from_str("\"TIMEOUT\"").unwrap();
        assert_eq!(parsed, Outcome::Timeout);
    }

    #[test]
    fn test_only_sat_and_unsat_solve() {
        assert!(Outcome::Sat.is_solved());
        assert!(Outcome::Unsat.is_solved());
        assert!(!Outcome::Timeout.is_solved());
        assert!(!Outcome::Err.is_solved());
        assert!(VerifierResult::cancelled(Duration::from_millis(10)).cancelled);
    }
}
