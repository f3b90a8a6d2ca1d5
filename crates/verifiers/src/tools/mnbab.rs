//! MN-BaB.

use super::tool_home;
use crate::result::Outcome;
use crate::tool::{quote_path, render_flags, verdict_from_marker, RunCommand, VerifierTool};
use std::path::Path;
use veriport_core::{Configuration, Instance, ResourceSpec, SearchSpace};

const MARKER: &str = "Result:";

const VERDICTS: &[(&str, Outcome)] = &[
    ("sat", Outcome::Sat),
    ("unsat", Outcome::Unsat),
    ("timeout", Outcome::Timeout),
    ("unknown", Outcome::Timeout),
];

#[derive(Debug, Default)]
pub struct MnBab;

impl VerifierTool for MnBab {
    fn name(&self) -> &str {
        "mnbab"
    }

    fn search_space(&self) -> SearchSpace {
        SearchSpace::new(self.name())
            .categorical(
                "branching",
                vec!["babsr".into(), "active_constraint_score".into()],
                "babsr",
            )
            .integer("batch_sizes", 1, 512, 64)
            .boolean("use_dependence_sets", false)
            .float("optimize_prima_lr", 0.001, 0.1, 0.01)
    }

    fn resources(&self) -> ResourceSpec {
        ResourceSpec::new(self.name(), 1, 1)
    }

    fn run_command(&self, instance: &Instance, config: &Configuration, _scratch: &Path) -> RunCommand {
        let home = tool_home(self.name());
        let lines = vec![
            format!("source {}", quote_path(&home.join("venv/bin/activate"))),
            format!("export PYTHONPATH={}", quote_path(&home)),
            format!(
                "python {} --network {} --spec {} --timeout {} {}",
                quote_path(&home.join("src/verify.py")),
                quote_path(instance.network()),
                quote_path(instance.property()),
                instance.timeout_secs(),
                render_flags(config),
            ),
        ];
        RunCommand::new(&lines, None)
    }

    fn parse_result(&self, stdout: &str, _result_file: Option<&str>) -> (Outcome, Option<String>) {
        (verdict_from_marker(stdout, MARKER, VERDICTS), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_stdout() {
        let stdout = "loading network\nResult: unsat\nTime: 3.2\n";
        assert_eq!(MnBab.parse_result(stdout, None).0, Outcome::Unsat);
        assert_eq!(MnBab.parse_result("crash", None).0, Outcome::Err);
    }
}
