mod cli;
mod config;
mod error;
mod geotag;
mod pipeline;
mod run_context;
mod telemetry;
mod track;
mod video;

use anyhow::Result;
use cli::Args;
use config::RunConfig;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse_args();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RunConfig::from_args(&args)?;
    let summary = pipeline::orchestrator::run(&config)?;

    tracing::info!(
        "Done: {} images written to {} ({:?})",
        summary.export.written,
        config.output_dir.display(),
        summary.state
    );
    Ok(())
}
