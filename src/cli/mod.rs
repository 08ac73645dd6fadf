//! Command-line interface for Vigil.
//!
//! Just run `vigil` to serve metrics, health and alerts on port 9100 with
//! sensible defaults.

use crate::application::Application;
use crate::core::{Config, ConfigBuilder, LoggingConfig, Result, VigilError};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// In-process observability core: metrics, health and threshold alerts
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// HTTP port for the metrics, health and alert endpoints
    #[arg(short, long, env = "VIGIL_PORT")]
    pub port: Option<u16>,

    /// Address to bind the HTTP server to
    #[arg(long, env = "VIGIL_BIND")]
    pub bind: Option<IpAddr>,

    /// Configuration file path (default: ~/.config/vigil/config.yaml)
    #[arg(short, long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "VIGIL_DEBUG")]
    pub debug: bool,

    /// Write log lines as JSON
    #[arg(long, env = "VIGIL_STRUCTURED_LOGS")]
    pub structured_logs: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Config file to read: the explicit `--config`, or the default location
    /// when a file exists there.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        dirs::config_dir()
            .map(|d| d.join("vigil").join("config.yaml"))
            .filter(|p| p.exists())
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and `VIGIL_*` environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        if let Some(path) = self.config_path() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                VigilError::config(format!("Failed to read config file {:?}: {}", path, e))
            })?;
            builder = builder.from_yaml(&content)?;
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(bind) = self.bind {
            builder = builder.bind_address(bind);
        }

        let mut config = builder.debug(self.debug).build()?;
        if self.structured_logs {
            config.logging.structured = true;
        }
        Ok(config)
    }

    /// Initialize logging. `RUST_LOG` wins over `--debug`, which wins over
    /// the configured level.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug"
        } else {
            logging.level.as_str()
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer(logging, std::io::stdout))
            .try_init()
            .map_err(|e| VigilError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// JSON lines when `structured`, compact text otherwise.
fn fmt_layer<S, W>(logging: &LoggingConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if logging.structured {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .compact()
            .with_writer(writer)
            .boxed()
    }
}

/// Execute the Vigil application.
pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("vigil {}", env!("CARGO_PKG_VERSION"));
        println!("In-process observability core");
        return Ok(());
    }

    let config = cli.load_config().await?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Listen address: {}:{}", config.server.bind_address, config.server.port);
        println!("  Evaluation interval: {:?}", config.alerts.evaluation_interval);
        println!("  Alert rules: {}", config.alerts.rules.len());
        println!("  Health probes: {}", config.health.probes.len());
        return Ok(());
    }

    cli.init_logging(&config.logging)?;
    match cli.config_path() {
        Some(path) => tracing::info!("Loaded configuration from: {:?}", path),
        None => tracing::debug!("No config file found, using defaults"),
    }

    Application::new(config)?.run().await
}
