//! alpha-beta-CROWN.

use super::tool_home;
use crate::result::Outcome;
use crate::tool::{quote_path, render_flags, verdict_from_first_line, RunCommand, VerifierTool};
use std::path::Path;
use veriport_core::{Configuration, Instance, ResourceSpec, SearchSpace};

const VERDICTS: &[(&str, Outcome)] = &[
    ("sat", Outcome::Sat),
    ("unsat", Outcome::Unsat),
    ("timeout", Outcome::Timeout),
    ("unknown", Outcome::Timeout),
];

#[derive(Debug, Default)]
pub struct AbCrown;

impl VerifierTool for AbCrown {
    fn name(&self) -> &str {
        "abcrown"
    }

    fn search_space(&self) -> SearchSpace {
        SearchSpace::new(self.name())
            .categorical(
                "branching_method",
                vec!["kfsb".into(), "babsr".into(), "fsb".into()],
                "kfsb",
            )
            .integer("batch_size", 16, 2048, 256)
            .float("init_alpha_lr", 0.01, 0.5, 0.1)
            .boolean("enable_incomplete_verification", true)
            .integer("attack_restarts", 1, 100, 10)
    }

    fn resources(&self) -> ResourceSpec {
        ResourceSpec::new(self.name(), 1, 1)
    }

    fn run_command(&self, instance: &Instance, config: &Configuration, scratch: &Path) -> RunCommand {
        let home = tool_home(self.name());
        let results = scratch.join("results.txt");
        let lines = vec![
            format!("source {}", quote_path(&home.join("venv/bin/activate"))),
            format!(
                "python {} --onnx_path {} --vnnlib_path {} --timeout {} --results_file {} {}",
                quote_path(&home.join("complete_verifier/abcrown.py")),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter_example() {
        let (outcome, ce) = AbCrown.parse_result("", Some("sat\n((X_0 1.0))"));
        assert_eq!(outcome, Outcome::Sat);
        assert_eq!(ce.as_deref(), Some("((X_0 1.0))"));
        assert_eq!(AbCrown.parse_result("", None).0, Outcome::Err);
    }

    #[test]
    fn test_run_command_mentions_artifacts() {
        let instance = Instance::new("/n/net.onnx", "/p/prop.vnnlib", 30).unwrap();
        let config = AbCrown.default_configuration();
        let run = AbCrown.run_command(&instance, &config, Path::new("/tmp/s"));
        assert!(run.script.starts_with("source "));
        assert!(run.script.contains("--onnx_path '/n/net.onnx'"));
        assert!(run.script.contains("--branching_method='kfsb'"));
        assert_eq!(run.result_file.as_deref(), Some(Path::new("/tmp/s/results.txt")));
    }
}
