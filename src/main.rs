use anyhow::Result;
use clap::Parser;
use sentinel_feed::transport::{loopback, serve_echo, Connector, WebSocketConnector};
use sentinel_feed::{backend_from_config, FeedEvent, LiveFeed, SentinelConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "sentinel-feed")]
#[command(about = "Live camera feed client for a remote inference service")]
#[command(version)]
#[command(long_about = "Captures a local camera, streams frames to a remote inference service \
over a persistent WebSocket with at most one frame in flight, and keeps the latest processed \
frame and detection metadata for display. Reconnects forever with a fixed delay.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sentinel.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the feed")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily-rolling files in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<String>,

    /// Override the inference service URL
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Use the in-process echo peer instead of a real inference service
    #[arg(long)]
    loopback: bool,

    /// Start in the performance-constrained quality profile
    #[arg(long)]
    performance_mode: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting sentinel-feed v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match SentinelConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if let Some(url) = &args.url {
        config.transport.url = url.clone();
    }
    if args.performance_mode {
        config.quality.performance_mode = true;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let backend = backend_from_config(&config.camera).map_err(|e| {
        error!("Failed to create camera backend: {}", e);
        e
    })?;

    let peer_cancel = CancellationToken::new();
    let connector: Arc<dyn Connector> = if args.loopback {
        info!("Loopback mode: frames are answered by an in-process echo peer");
        let (connector, acceptor) = loopback();
        tokio::spawn(serve_echo(acceptor, peer_cancel.clone()));
        Arc::new(connector)
    } else {
        Arc::new(WebSocketConnector::new(&config.transport.url)?)
    };

    let mut feed = LiveFeed::new(config, backend, connector);
    spawn_status_logger(&feed);

    feed.mount().await.map_err(|e| {
        error!("Failed to mount live feed: {}", e);
        e
    })?;

    let exit_code = feed.run().await.map_err(|e| {
        error!("Live feed error during execution: {}", e);
        e
    })?;
    peer_cancel.cancel();

    info!("sentinel-feed exited with code: {}", exit_code);
    // Flush buffered file logs; process::exit skips destructors
    drop(log_guard);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Log status changes the way a connection indicator would show them
fn spawn_status_logger(feed: &LiveFeed) {
    let mut events = feed.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(FeedEvent::ConnectionChanged { state, .. }) => {
                    info!("Inference service: {}", state.as_str());
                }
                Ok(FeedEvent::PermissionDenied { message }) => {
                    error!("Camera unavailable: {}", message);
                }
                Ok(FeedEvent::MetadataReceived { risk_score, level }) if risk_score >= 75.0 => {
                    warn!("Risk {:.0} ({})", risk_score, level.label());
                }
                Ok(FeedEvent::ShutdownRequested { .. }) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Status logger lagged, skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sentinel_feed={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sentinel-feed.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# sentinel-feed configuration file");
    println!("# Every key is optional; environment variables SENTINEL_<SECTION>_<KEY> override the file");
    println!("# camera.backend: \"mock\" or \"gstreamer\" (needs the `camera` feature)");
    println!();

    match SentinelConfig::default().to_toml() {
        Ok(toml) => println!("{}", toml),
        Err(e) => eprintln!("Failed to render default configuration: {}", e),
    }
}
