use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod experiment;
mod report;

use args::Args;
use experiment::Experiment;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let exp = Experiment::resolve(&args)?;
    let sim = experiment::run(&exp)?;
    report::emit(&sim, &exp)
}
