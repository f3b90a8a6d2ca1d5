use anyhow::Result;
use clap::Parser;
use veriport::cli::{run_cli, Cli};

fn main() -> Result<()> {
    run_cli(Cli::parse())
}
