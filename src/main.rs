use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use cattrack::{CattrackConfig, CattrackOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "cattrack")]
#[command(about = "Cat tracker: live object detection on a camera feed with MJPEG streaming")]
#[command(version)]
#[command(long_about = "Pulls frames from an RTSP camera, runs an object detector on each \
frame, records a snapshot and an event whenever a cat is seen, and serves the annotated \
live stream together with the event history over HTTP.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cattrack.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Override the HTTP port
    #[arg(short, long, help = "Port for the HTTP server, overrides stream.port")]
    port: Option<u16>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily-rotated log files")]
    log_dir: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Held until exit so buffered file logs are flushed
    let log_guard = init_logging(&args)?;

    info!("Starting cattrack v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = CattrackConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(port) = args.port {
        info!("Overriding stream port with {}", port);
        config.stream.port = port;
    }

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            if args.validate_config {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            return Err(e).context("invalid configuration");
        }
    }

    let mut orchestrator = CattrackOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Cattrack exited with code: {}", exit_code);

    // Flush file logs before exiting with the code systemd sees
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("cattrack={}", log_level)));

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
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "cattrack.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
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
fn print_default_config() -> Result<()> {
    let rendered = toml::to_string_pretty(&CattrackConfig::default())
        .context("failed to render default configuration")?;

    println!("# Cattrack Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Environment overrides use the CATTRACK_ prefix, e.g. CATTRACK_STREAM__PORT=8080");
    println!("# Optional: [detector] font_path = \"/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf\"");
    println!();
    println!("{}", rendered);
    Ok(())
}
