use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatops_bridge::channels::ChannelCatalog;
use chatops_bridge::cli::{Cli, Command, LogFormat, run_channels_command};
use chatops_bridge::commands::CommandRegistry;
use chatops_bridge::{InputSupervisor, Lifecycle, LocalBackend, SignalService};

fn init_tracing(format: LogFormat) {
    // Logs go to stderr; stdout belongs to the stdio channel.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let catalog = ChannelCatalog::builtin();
    if !cli.should_run_bridge() {
        match &cli.command {
            Some(Command::Channels) => run_channels_command(&catalog),
            Some(Command::Run) | None => {}
        }
        return Ok(());
    }

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let registry = match catalog.build_registry(&config.inputs) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Input not found");
            std::process::exit(1);
        }
    };
    if registry.is_empty() {
        tracing::warn!("No inputs configured; set --inputs or CHATOPS_INPUTS");
    }

    let commands = Arc::new(CommandRegistry::with_builtins(&config.namespace).await);
    let backend = Arc::new(LocalBackend::from_config(&config, commands));
    tracing::info!(namespace = %config.namespace, inputs = ?config.inputs, "Starting chatops bridge");

    let supervisor = InputSupervisor::new(config, registry, backend);
    let lifecycle = Lifecycle::new(supervisor, SignalService);
    if let Err(e) = lifecycle.run().await {
        tracing::error!(error = %e, "Bridge exited with error");
        std::process::exit(1);
    }

    Ok(())
}
