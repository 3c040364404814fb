//! FX options market-data synchronization service entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fxhub::api::{create_router, AppState};
use fxhub::cache::InMemoryDarkPoolCache;
use fxhub::config::Config;
use fxhub::hub::connection::HubConnection;
use fxhub::hub::transport::WsTransport;
use fxhub::keys::BookKey;
use fxhub::metrics;
use fxhub::utils::shutdown_signal;

/// FX options market-data synchronization service.
#[derive(Parser, Debug)]
#[command(name = "fxhub")]
#[command(about = "Keeps a live order book synchronized with the venue's market-data hub")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port for health/metrics.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the synchronization service (default).
    Run {
        /// HTTP server port for health/metrics.
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Instrument to subscribe on startup.
        #[arg(long)]
        instrument: Option<String>,

        /// Strategy to subscribe on startup.
        #[arg(long, default_value = "ATMF")]
        strategy: String,

        /// Tenors to subscribe on startup.
        #[arg(long, value_delimiter = ',', default_value = "1W,1M,3M,6M,1Y")]
        tenors: Vec<String>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Subscribe to one line and print depth rows (diagnostic).
    Watch {
        /// Instrument to watch.
        #[arg(long)]
        instrument: String,

        /// Strategy to watch.
        #[arg(long, default_value = "ATMF")]
        strategy: String,

        /// Tenor to watch.
        #[arg(long, default_value = "1M")]
        tenor: String,

        /// How long to watch, in seconds.
        #[arg(long, default_value = "30")]
        duration_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("fxhub=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    if let Err(e) = metrics::init_metrics() {
        warn!(error = %e, "Metrics recorder unavailable; continuing without metrics");
    }

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Run {
            port,
            instrument,
            strategy,
            tenors,
        }) => cmd_run(port, instrument, strategy, tenors).await,
        Some(Command::Watch {
            instrument,
            strategy,
            tenor,
            duration_secs,
        }) => cmd_watch(instrument, strategy, tenor, duration_secs).await,
        None => cmd_run(args.port, None, "ATMF".to_string(), Vec::new()).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("FXHUB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Hub URL: {}", config.hub_ws_url);
    println!("  Viewer: {}", config.viewer_id);
    println!(
        "  Firm: {}",
        config.viewer_firm.as_deref().unwrap_or("(none)")
    );
    println!("  Broker role: {}", config.viewer_is_broker);
    println!("  Keep-alive: {}s", config.keep_alive_interval_s);
    println!("  Server timeout: {}s", config.server_timeout_s);
    println!("  Reconnect delay: {}ms", config.reconnect_delay_ms);
    println!("  Pair buffer TTL: {}s", config.pair_buffer_ttl_s);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the synchronization service.
async fn cmd_run(
    port: u16,
    instrument: Option<String>,
    strategy: String,
    tenors: Vec<String>,
) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!("Hub URL: {}", config.hub_ws_url);
    info!("Viewer: {}", config.viewer_id);

    // Build the connection handle
    let transport = Arc::new(WsTransport::from_str(&config.hub_ws_url)?);
    let cache = Arc::new(InMemoryDarkPoolCache::new());
    let hub = HubConnection::new(config.hub_config(), config.viewer(), transport, cache);

    hub.on_connected(|| info!("Hub connection established"));
    hub.on_disconnected(|| warn!("Hub connection lost; reconnect scheduled"));

    // Start HTTP server
    let app_state = AppState::new(Arc::clone(&hub));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state);
    let _server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    // Connect and install startup subscriptions
    hub.clone().connect();

    if let Some(instrument) = instrument {
        for tenor in &tenors {
            hub.subscribe_market_data(&instrument, &strategy, tenor);
            hub.subscribe_dark_pool_price(&instrument, &strategy, tenor);
            info!("Subscribed {}/{}/{}", instrument, strategy, tenor);
        }
    }

    info!("Synchronization service started");

    shutdown_signal().await;
    hub.shutdown();
    info!("Shutdown complete");

    Ok(())
}

/// Subscribe to one line and print its depth rows.
async fn cmd_watch(
    instrument: String,
    strategy: String,
    tenor: String,
    duration_secs: u64,
) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("FXHUB - WATCH {}/{}/{}", instrument, strategy, tenor);
    println!("======================================================================");

    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let transport = Arc::new(WsTransport::from_str(&config.hub_ws_url)?);
    let cache = Arc::new(InMemoryDarkPoolCache::new());
    let hub = HubConnection::new(config.hub_config(), config.viewer(), transport, cache);

    let key = BookKey::lit(&instrument, &strategy, &tenor);
    let mut depth_rx = hub.depth_updates(&key);
    let mut dark_rx = hub.dark_pool_ticks(&key.as_dark_pool());

    hub.clone().connect();
    hub.subscribe_market_data(&instrument, &strategy, &tenor);
    hub.subscribe_dark_pool_price(&instrument, &strategy, &tenor);

    println!("Watching for {}s...", duration_secs);
    let start = Instant::now();
    let mut update_count = 0u32;

    while start.elapsed() < Duration::from_secs(duration_secs) {
        tokio::select! {
            update = depth_rx.recv() => {
                if let Ok(update) = update {
                    update_count += 1;
                    let row = &update.row;
                    println!(
                        "   [{:>6.1}s] {} bid {} x {} | ofr {} x {} | mid {} spread {}",
                        start.elapsed().as_secs_f64(),
                        row.tenor,
                        fmt_opt(row.bid.price),
                        fmt_opt(row.bid.size),
                        fmt_opt(row.ofr.price),
                        fmt_opt(row.ofr.size),
                        fmt_opt(row.mid),
                        fmt_opt(row.spread),
                    );
                }
            }
            tick = dark_rx.recv() => {
                if let Ok(tick) = tick {
                    println!(
                        "   [{:>6.1}s] {} dark pool {}",
                        start.elapsed().as_secs_f64(),
                        tick.key.tenor,
                        fmt_opt(tick.price),
                    );
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }

    println!("======================================================================");
    println!("WATCH COMPLETE");
    println!("  Depth updates: {}", update_count);
    println!(
        "  Connection status: {}",
        if hub.is_connected() { "Connected" } else { "Disconnected" }
    );
    println!("======================================================================");

    hub.shutdown();
    Ok(())
}

fn fmt_opt(value: Option<rust_decimal::Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
