use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tributary::app::AppContext;
use tributary::cli::{commands, Cli, Commands};
use tributary::config::Config;
use tributary::daemon::Daemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Run { startup_delay } => {
            let mut daemon = Daemon::new(ctx);
            if let Some(delay) = startup_delay {
                daemon = daemon.with_startup_delay(delay);
            }
            daemon.run().await?;
        }
        Commands::Add { url, category } => {
            commands::add_feed(&ctx, &url, category.as_deref()).await?;
        }
        Commands::Remove { url, keep_cache } => {
            commands::remove_feed(&ctx, &url, keep_cache).await?;
        }
        Commands::Category { title } => {
            commands::add_category(&ctx, &title).await?;
        }
        Commands::List => {
            commands::list_feeds(&ctx).await?;
        }
        Commands::Refresh => {
            commands::update_feeds(&ctx).await?;
        }
        Commands::Frequency { url, frequency } => {
            commands::set_frequency(&ctx, &url, frequency).await?;
        }
    }

    Ok(())
}
