//! # Linky Teleinfo
//!
//! Read Linky teleinfo frames from a serial port and store them in InfluxDB.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load and validate the configuration file
//!    - Set up logging with tracing subscriber
//!    - Connect to InfluxDB, creating the database if needed (retried while unreachable)
//!    - Open the teleinfo serial port
//!
//! 2. **Main Loop**
//!    - Read one frame, write it as one batch, skip the next N frames
//!    - Exit on a serial read error, leaving restarts to the service manager
//!
//! Expected output:
//! ```text
//! INFO linky_teleinfo: Teleinfo v0.1.0 starting...
//! INFO linky_teleinfo::storage::sink: Connect to InfluxDB...
//! INFO linky_teleinfo::storage::sink: Connected to teleinfo!
//! INFO linky_teleinfo::serial: Teleinfo serial port opened at /dev/ttyAMA0
//! INFO linky_teleinfo::ingest: Start collect data (keeping 1 frame out of 11)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use linky_teleinfo::config::{Config, LoggingConfig, CONFIG_HELP, DEFAULT_CONFIG_PATH};
use linky_teleinfo::error::TeleinfoError;
use linky_teleinfo::ingest::IngestionLoop;
use linky_teleinfo::serial::TeleinfoSerial;
use linky_teleinfo::storage::{sink::merge_tags, InfluxClient, RetryPolicy, StorageSink};

/// Log file name prefix inside the logging directory
const LOG_FILE_PREFIX: &str = "linky-teleinfo.log";

#[derive(Debug, Parser)]
#[command(version, about = "Store Linky teleinfo frames in InfluxDB")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&args.config, &e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_logging(&config.logging);
    info!("Teleinfo v{} starting...", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Print the missing keys and the expected file shape to stderr
fn report_config_error(path: &std::path::Path, error: &TeleinfoError) {
    if let TeleinfoError::MissingConfig(keys) = error {
        for key in keys {
            eprintln!("Missing config key: {}", key);
        }
    } else {
        eprintln!("Invalid config file '{}': {}", path.display(), error);
    }
    eprintln!("\n{}", CONFIG_HELP);
    eprintln!("Fix config");
}

/// Set up stdout logging, plus a daily rolling file when configured
///
/// The returned guard flushes the file writer on drop and must be kept alive.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn run(config: Config) -> Result<()> {
    let client = InfluxClient::new(&config.influxdb).context("Failed to build InfluxDB client")?;
    info!("InfluxDB endpoint: {}", client.base_url());

    let sink = StorageSink::connect(
        client,
        &config.influxdb.db,
        merge_tags(&config.tags),
        RetryPolicy::fixed(config.influxdb.retry_delay()),
    )
    .await
    .context("Failed to connect to InfluxDB")?;

    let serial = TeleinfoSerial::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.serial.timeout(),
    )?;
    info!("Teleinfo is reading on {}..", serial.device_path());

    let mut ingest = IngestionLoop::new(serial, sink, config.teleinfo.ignore_frames);

    tokio::select! {
        result = ingest.run() => {
            result.context("Ingestion stopped")?;
        }

        // Frames are only written once complete, so stopping here loses nothing
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    let stats = ingest.stats();
    info!(
        "Stored {} frames ({} points), dropped {}",
        stats.frames_written, stats.points_written, stats.frames_dropped
    );
    Ok(())
}
