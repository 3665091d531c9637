use clap::Parser;
use miette::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use permsync::console::client::HttpConsole;
use permsync::console::RateLimitedConsole;
use permsync::groups::directory::{DirectoryProvider, HttpDirectory};
use permsync::limiter::Limiter;
use permsync::settings::{Settings, SyncConfig};
use permsync::sync::{ConfigSlot, SyncLoop, SyncStatus};
use permsync::{watcher, web};

#[derive(Parser, Debug)]
#[command(
    name = "permsync",
    version,
    about = "Sync directory group membership into console organization roles"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings and rules; any error here is fatal
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");
    let config = Arc::new(SyncConfig::from_settings(&settings)?);

    // remote providers
    let directory: Arc<dyn DirectoryProvider> = Arc::new(HttpDirectory::new(&settings.directory)?);
    let console = RateLimitedConsole::new(
        Arc::new(HttpConsole::new(&settings.console)?),
        Limiter::per_second(settings.console.requests_per_second),
    );

    let slot = Arc::new(ConfigSlot::new());
    let status = Arc::new(SyncStatus::new());

    // hot reload
    let _watcher = watcher::start(&cli.config, &settings.sync.rules_path, slot.clone());

    // reconciliation loop
    let sync = SyncLoop::new(console, directory.clone(), config, slot, status.clone());
    tokio::spawn(sync.run());

    // admin API
    web::serve(&settings.listen_addr(), web::AdminState { status, directory }).await?;
    Ok(())
}
