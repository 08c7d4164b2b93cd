// Darwin agent-search engine
// Main entry point for the darwin binary

use clap::Parser;
use darwin_engine::cli::{Cli, Command};
use darwin_engine::config::Config;
use darwin_engine::handlers::{
    handle_evaluate, handle_run, handle_search, handle_summary, OutputFormat,
};
use darwin_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Flags win over the file; re-run validation for the merged values
    let experiment = cli.command.experiment();
    experiment.apply(&mut config);
    config.validate_and_process()?;
    let name = experiment.experiment_name(&config);

    // --log beats the config file; RUST_LOG beats both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Darwin Engine v{} ({} - {})", version, commit, timestamp);

    match &cli.command {
        Command::Search { .. } => {
            tracing::info!(experiment = %name, "Starting search");
            handle_search(&config, &name, format).await
        }

        Command::Evaluate { .. } => {
            tracing::info!(experiment = %name, "Starting evaluation");
            handle_evaluate(&config, &name, format).await
        }

        Command::Run { .. } => {
            tracing::info!(experiment = %name, "Starting search and evaluation");
            handle_run(&config, &name, format).await
        }

        Command::Summary { .. } => handle_summary(&config, &name, format).await,
    }
}
