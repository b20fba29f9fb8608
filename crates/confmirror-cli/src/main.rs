//! Confmirror command-line binary.

mod cli;
mod commands;
mod settings;

use anyhow::Result;
use clap::Parser;
use confmirror_git::MirrorRegistry;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    tracing::debug!(
        "Confmirror v{} with {} repositories, {} workers",
        env!("CARGO_PKG_VERSION"),
        settings.repositories.len(),
        settings.workers
    );

    let profile = settings.profile(cli.command.repo())?.clone();
    tracing::info!(
        "Repository {}: {} at {}",
        cli.command.repo(),
        profile.remote_url(),
        profile.local_path().display()
    );

    let registry = MirrorRegistry::new(settings.workers);
    let repository = registry.register(profile);

    commands::run(cli.command, &repository, cli.json).await
}
