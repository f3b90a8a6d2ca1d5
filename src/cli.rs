//! CLI wiring for VeriPort.

use crate::config::{RunConfig, TuneConfig};
use crate::session::{run_portfolio, tune_portfolio};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use veriport_core::{load_instances_csv, Instance, Portfolio};
use veriport_runner::{listen_for_signals, ShutdownLatch};
use veriport_verifiers::ToolRegistry;

#[derive(Parser, Debug)]
#[command(name = "veriport", about = "Portfolio construction and racing for NN verifiers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a portfolio with Hydra and save it as JSON.
    Tune {
        /// JSON config file; flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        instances: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
        #[arg(long)]
        cpus: Option<usize>,
        #[arg(long)]
        gpus: Option<usize>,
        #[arg(long)]
        iterations: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Race a saved portfolio on every instance of a CSV file.
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        portfolio: Option<PathBuf>,
        #[arg(long)]
        instances: Option<PathBuf>,
        #[arg(long)]
        cpus: Option<usize>,
        #[arg(long)]
        gpus: Option<usize>,
        #[arg(long)]
        result_log: Option<PathBuf>,
        /// Do not wrap verifier commands with taskset.
        #[arg(long, default_value_t = false)]
        no_pin: bool,
    },
    /// List the registered verifier tools and their resource needs.
    Tools,
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let registry = ToolRegistry::with_default_tools();

    match cli.command {
        Command::Tune {
            config,
            instances,
            tools,
            cpus,
            gpus,
            iterations,
            seed,
            output,
            report,
        } => {
            let mut tune = match config {
                Some(path) => TuneConfig::load_from_file(&path)?,
                None => TuneConfig::default(),
            };
            tune.instances = instances.or(tune.instances);
            if !tools.is_empty() {
                tune.tools = tools;
            }
            tune.cpus = cpus.or(tune.cpus);
            tune.gpus = gpus.unwrap_or(tune.gpus);
            tune.hydra.iterations = iterations.unwrap_or(tune.hydra.iterations);
            tune.hydra.seed = seed.unwrap_or(tune.hydra.seed);
            tune.output = output.unwrap_or(tune.output);
            tune.report = report.or(tune.report);

            let instances = load_instances(tune.instances.as_ref())?;
            let shutdown = ShutdownLatch::new();
            let watcher = shutdown.clone();
            std::thread::spawn(move || watch_signals(watcher));

            let outcome = tune_portfolio(&tune, registry, instances, &shutdown)?;
            outcome
                .portfolio
                .save_to_file(&tune.output)
                .with_context(|| format!("writing portfolio {}", tune.output.display()))?;
            let report_path = tune.report_path();
            outcome.report.save(&report_path)?;

            println!(
                "members={}, total_cost={:.3}, stop={:?}",
                outcome.portfolio.len(),
                outcome.portfolio.total_cost(),
                outcome.report.stop_reason
            );
            for member in outcome.portfolio.members() {
                println!(
                    "- {}: {} cpus={} gpus={}",
                    member.tool,
                    member.configuration,
                    member.allocation.cpus(),
                    member.allocation.gpus()
                );
            }
            info!(
                portfolio = %tune.output.display(),
                report = %report_path.display(),
                "tuning finished"
            );
        }
        Command::Run {
            config,
            portfolio,
            instances,
            cpus,
            gpus,
            result_log,
            no_pin,
        } => {
            let mut run = match config {
                Some(path) => RunConfig::load_from_file(&path)?,
                None => RunConfig::default(),
            };
            run.portfolio = portfolio.unwrap_or(run.portfolio);
            run.instances = instances.or(run.instances);
            run.cpus = cpus.or(run.cpus);
            run.gpus = gpus.unwrap_or(run.gpus);
            run.result_log = result_log.or(run.result_log);
            run.pin_cpus = run.pin_cpus && !no_pin;

            let members = Portfolio::load_from_file(&run.portfolio)
                .with_context(|| format!("loading portfolio {}", run.portfolio.display()))?;
            let instances = load_instances(run.instances.as_ref())?;

            let runtime = tokio::runtime::Runtime::new()?;
            let reports = runtime.block_on(async {
                let shutdown = ShutdownLatch::new();
                let signals = tokio::spawn(listen_for_signals(shutdown.clone()));
                let reports = run_portfolio(&run, registry, &members, &instances, shutdown).await;
                signals.abort();
                reports
            })?;

            for report in &reports {
                let recorded = report.recorded();
                println!(
                    "- {}: {} by {} in {:.2}s",
                    report.instance,
                    recorded.result.outcome,
                    recorded.tool,
                    recorded.result.took_secs
                );
            }
            let solved = reports.iter().filter(|report| report.is_solved()).count();
            println!("solved={}/{}", solved, reports.len());
        }
        Command::Tools => {
            for tool in registry.tools() {
                let resources = tool.resources();
                println!(
                    "{}: cpus={} gpus={} params={}",
                    tool.name(),
                    resources.cpu_hint,
                    resources.gpu_hint,
                    tool.search_space().params.len()
                );
            }
        }
    }
    Ok(())
}

fn load_instances(path: Option<&PathBuf>) -> Result<Vec<Instance>> {
    let path = path.context("no instances CSV given (use --instances or the config file)")?;
    let instances = load_instances_csv(path)
        .with_context(|| format!("loading instances {}", path.display()))?;
    info!(count = instances.len(), path = %path.display(), "loaded instances");
    Ok(instances)
}

/// Tuning runs on the main thread, so signals are watched from a small
/// dedicated runtime.
fn watch_signals(shutdown: ShutdownLatch) {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(listen_for_signals(shutdown)),
        Err(err) => tracing::error!(error = %err, "signal handling unavailable"),
    }
}
