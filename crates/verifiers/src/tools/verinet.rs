//! VeriNet.

use super::tool_home;
use crate::result::Outcome;
use crate::tool::{quote_path, render_flags, verdict_from_marker, RunCommand, VerifierTool};
use std::path::Path;
use veriport_core::{Configuration, Instance, ResourceSpec, SearchSpace};

const MARKER: &str = "Status.";

const VERDICTS: &[(&str, Outcome)] = &[
    ("unsafe", Outcome::Sat),
    ("safe", Outcome::Unsat),
    ("undecided", Outcome::Timeout),
    ("underflow", Outcome::Timeout),
];

#[derive(Debug, Default)]
pub struct VeriNet;

impl VerifierTool for VeriNet {
    fn name(&self) -> &str {
        "verinet"
    }

    fn search_space(&self) -> SearchSpace {
        SearchSpace::new(self.name())
            .integer("max_procs", 1, 16, 4)
            .boolean("use_lp", true)
            .boolean("input_bounds_tightening", true)
            .integer("split_domain_depth", 0, 10, 3)
    }

    fn resources(&self) -> ResourceSpec {
        ResourceSpec::new(self.name(), 2, 0)
    }

    fn run_command(&self, instance: &Instance, config: &Configuration, _scratch: &Path) -> RunCommand {
        let home = tool_home(self.name());
        let lines = vec![
            format!("source {}", quote_path(&home.join("venv/bin/activate"))),
            format!("cd {}", quote_path(&home)),
            format!(
                "python -m verinet.run_instance {} {} {} {}",
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
