//! OVAL branch-and-bound.

use super::tool_home;
use crate::result::Outcome;
use crate::tool::{quote_path, render_flags, verdict_from_first_line, RunCommand, VerifierTool};
use std::path::Path;
use veriport_core::{Configuration, Instance, ResourceSpec, SearchSpace};

const VERDICTS: &[(&str, Outcome)] = &[
    ("unsafe", Outcome::Sat),
    ("safe", Outcome::Unsat),
    ("timeout", Outcome::Timeout),
];

#[derive(Debug, Default)]
pub struct OvalBab;

impl VerifierTool for OvalBab {
    fn name(&self) -> &str {
        "ovalbab"
    }

    fn search_space(&self) -> SearchSpace {
        SearchSpace::new(self.name())
            .categorical("bounding", vec!["alpha-crown".into(), "beta-crown".into()], "alpha-crown")
            .categorical("branching", vec!["sr".into(), "fsb".into()], "fsb")
            .integer("max_solver_batch", 1000, 60000, 10000)
            .boolean("early_terminate", true)
    }

    fn resources(&self) -> ResourceSpec {
        ResourceSpec::new(self.name(), 1, 1)
    }

    fn run_command(&self, instance: &Instance, config: &Configuration, scratch: &Path) -> RunCommand {
        let home = tool_home(self.name());
        let results = scratch.join("result.txt");
        let lines = vec![
            "conda activate oval4vnncomp".to_string(),
            format!(
                "python {} bab {} {} --result_file {} --instance_timeout {} {}",
                quote_path(&home.join("tools/bab_tools/bab_from_vnnlib.py")),
                quote_path(instance.network()),
                quote_path(instance.property()),
                quote_path(&results),
                instance.timeout_secs(),
                render_flags(config),
            ),
        ];
        RunCommand::new(&lines, Some(results))
    }

    fn parse_result(&self, _stdout: &str, result_file: Option<&str>) -> (Outcome, Option<String>) {
        match result_file {
            Some(text) => verdict_from_first_line(text, VERDICTS),
            None => (Outcome::Err, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_means_unsat() {
        assert_eq!(OvalBab.parse_result("", Some("safe")).0, Outcome::Unsat);
        assert_eq!(OvalBab.parse_result("", Some("unsafe\nx")).0, Outcome::Sat);
    }
}
