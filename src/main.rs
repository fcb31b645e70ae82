//! hookline - capability bridge host
//!
//! Connects to a broker over WebSocket and serves the built-in capabilities
//! until interrupted.

mod builtins;

use clap::Parser;
use hookline_client::{config::CONFIG_ENV, Bridge, CapabilityRegistry, Config, MemoryCache};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hookline")]
#[command(about = "Expose capabilities to a remote broker over WebSocket")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Broker URL (overrides config and environment)
    #[arg(short, long)]
    url: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Defaults, then the config file (if named), then environment overrides.
    // A named file that fails to load is fatal.
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(url) = cli.url {
        config.server.url = url;
    }

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let cache = Arc::new(MemoryCache::new());
    let mut registry = CapabilityRegistry::new().with_cache(cache.clone());
    builtins::register_all(&mut registry)?;

    tracing::info!("Starting hookline");
    tracing::info!("  Broker: {}", config.server.url);
    tracing::info!(
        "  Component: {} (channel size {})",
        config.component.name,
        config.component.channel_size
    );
    tracing::info!("  Heartbeat interval: {}ms", config.polling.interval_ms);
    tracing::info!("  Capabilities: {}", registry.ids().join(", "));

    let mut bridge = Bridge::websocket(config.connection_config(), Arc::new(registry));
    bridge.start()?;

    let mut ticker = tokio::time::interval(config.host.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bridge.tick();
            }
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping bridge...");
                break;
            }
        }
    }

    // Joins the worker thread; run it off the async workers.
    tokio::task::block_in_place(|| bridge.stop());

    let totals = bridge.dispatcher().totals();
    tracing::info!(
        "Bridge stopped ({} command(s) processed, {} cache entr(ies))",
        totals.processed,
        cache.len()
    );
    Ok(())
}
