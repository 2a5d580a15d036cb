use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dht_logger::{DriverKind, Logger, LoggerConfig, Overrides, Startup, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "dht-logger")]
#[command(about = "Log temperature and humidity to CSV on fixed wall-clock boundaries")]
struct Args {
    /// TOML configuration file (DHT_LOGGER_* environment variables also apply)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV file receiving one row per period
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Plain-text file receiving per-tick errors
    #[arg(long)]
    run_log_path: Option<PathBuf>,

    /// Single-instance lock file (default: <log_path>.lock)
    #[arg(long)]
    lock_path: Option<PathBuf>,

    /// Sampling period in seconds
    #[arg(short, long)]
    period_seconds: Option<i64>,

    /// Label midnight samples as 2400 of the previous day
    #[arg(long)]
    use_24_as_midnight: bool,

    /// GPIO pin the sensor is wired to
    #[arg(long)]
    sensor_pin: Option<u32>,

    /// Sensor driver: command or iio
    #[arg(long, value_parser = parse_driver)]
    driver: Option<DriverKind>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    check_config: bool,
}

impl Args {
    /// Only flags given on the command line override lower layers.
    fn overrides(&self) -> Overrides {
        Overrides {
            log_path: self.log_path.clone(),
            run_log_path: self.run_log_path.clone(),
            lock_path: self.lock_path.clone(),
            period_seconds: self.period_seconds,
            use_24_as_midnight: self.use_24_as_midnight.then_some(true),
            sensor_pin: self.sensor_pin,
            driver: self.driver,
        }
    }
}

fn parse_driver(s: &str) -> std::result::Result<DriverKind, String> {
    match s {
        "command" => Ok(DriverKind::Command),
        "iio" => Ok(DriverKind::Iio),
        other => Err(format!("unknown driver '{}', expected 'command' or 'iio'", other)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = LoggerConfig::load(args.config.as_deref(), &args.overrides())
        .context("Invalid configuration")?;

    if args.check_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    // Single-threaded: one sleep and one sensor read in flight at a time
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(config))
}

async fn run(config: LoggerConfig) -> Result<()> {
    let reader = config.sensor_reader()?;

    let (mut logger, _guard) = match Logger::start(&config, reader, Arc::new(SystemClock))? {
        Startup::Ready(logger, guard) => (logger, guard),
        Startup::AlreadyRunning => {
            println!("Another instance is already running. Exiting.");
            return Ok(());
        }
    };

    let signal = tokio::select! {
        result = logger.run() => {
            result.context("Sampling loop stopped")?;
            return Ok(());
        }
        signal = shutdown_signal() => signal?,
    };

    // Rows are already synced and the OS drops the lock on exit
    let stats = logger.stats();
    info!(
        "Received {}, exiting after {} rows and {} failed ticks",
        signal, stats.rows_written, stats.failed_ticks
    );
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, naming the signal.
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT").map_err(Into::into),
            _ = term.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midnight_flag_takes_no_value() {
        let args =
            Args::try_parse_from(["dht-logger", "--use-24-as-midnight", "-p", "300"]).unwrap();
        let overrides = args.overrides();
        assert_eq!(overrides.use_24_as_midnight, Some(true));
        assert_eq!(overrides.period_seconds, Some(300));

        // Absent flag leaves the file/env value alone
        let args = Args::try_parse_from(["dht-logger"]).unwrap();
        assert_eq!(args.overrides().use_24_as_midnight, None);
    }

    #[test]
    fn test_driver_flag() {
        let args = Args::try_parse_from(["dht-logger", "--driver", "iio"]).unwrap();
        assert_eq!(args.overrides().driver, Some(DriverKind::Iio));
        assert!(Args::try_parse_from(["dht-logger", "--driver", "spi"]).is_err());
    }
}
