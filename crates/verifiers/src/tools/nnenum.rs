//! nnenum (star-set enumeration, CPU only).

use super::tool_home;
use crate::result::Outcome;
use crate::tool::{
    quote_path, render_flags, verdict_from_first_line, RunCommand, ScopedContext, VerifierTool,
};
use std::path::Path;
use veriport_core::{Configuration, Instance, ResourceSpec, SearchSpace};

const VERDICTS: &[(&str, Outcome)] = &[
    ("violated", Outcome::Sat),
    ("holds", Outcome::Unsat),
    ("timeout", Outcome::Timeout),
    ("unknown", Outcome::Timeout),
];

#[derive(Debug, Default)]
pub struct Nnenum;

impl VerifierTool for Nnenum {
    fn name(&self) -> &str {
        "nnenum"
    }

    fn search_space(&self) -> SearchSpace {
        SearchSpace::new(self.name())
            .categorical(
                "overapprox_types",
                vec!["zono".into(), "star".into(), "zono.star".into()],
                "zono.star",
            )
            .boolean("try_quick_overapprox", true)
            .integer("split_overapprox_depth", 0, 20, 8)
            .boolean("single_set", false)
    }

    fn resources(&self) -> ResourceSpec {
        ResourceSpec::new(self.name(), 1, 0)
    }

    fn run_command(&self, instance: &Instance, config: &Configuration, scratch: &Path) -> RunCommand {
        let home = tool_home(self.name());
        let results = scratch.join("out.txt");
        let lines = vec![
            "export OPENBLAS_NUM_THREADS=1".to_string(),
            "export OMP_NUM_THREADS=1".to_string(),
            format!("source {}", quote_path(&home.join("venv/bin/activate"))),
            format!(
                "python -m nnenum.nnenum {} {} {} {} {}",
                quote_path(instance.network()),
                quote_path(instance.property()),
                instance.timeout_secs(),
                quote_path(&results),
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

    fn contexts(&self, _config: &Configuration) -> Vec<ScopedContext> {
        let src = tool_home(self.name()).join("src");
        vec![
            ScopedContext::Env {
                key: "PYTHONPATH".into(),
                value: src.to_string_lossy().into_owned(),
            },
            ScopedContext::WorkingDir(src),
        ]
    }
}
