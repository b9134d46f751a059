//! filecryptd: filecrypt encryption server
//!
//! Usage:
//!   filecryptd [--config /etc/filecrypt/filecrypt.toml] [--listen 0.0.0.0:3001]

use anyhow::Result;
use clap::{Parser, ValueEnum};
use filecrypt_core::FilecryptConfig;
use filecryptd::AppState;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "filecryptd", version, about = "filecrypt encryption server")]
struct Cli {
    /// Path to filecrypt.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "FILECRYPT_CONFIG",
        default_value = "/etc/filecrypt/filecrypt.toml"
    )]
    config: PathBuf,

    /// Override server.listen
    #[arg(long, env = "FILECRYPT_LISTEN")]
    listen: Option<String>,

    /// Override server.data_dir
    #[arg(long, env = "FILECRYPT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides server.log_level
    #[arg(long, env = "FILECRYPT_LOG")]
    log: Option<String>,

    /// Log format; overrides server.log_format
    #[arg(long, env = "FILECRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Read without logging; the subscriber depends on the file's log settings
    let found = FilecryptConfig::read(&cli.config)?;
    let mut config = found.clone().unwrap_or_default();
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.server.data_dir = data_dir;
    }

    let level = cli.log.unwrap_or_else(|| config.server.log_level.clone());
    let format = cli.log_format.unwrap_or(match config.server.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    if found.is_none() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        listen = %config.server.listen,
        data_dir = %config.server.data_dir.display(),
        "filecryptd starting"
    );

    filecryptd::serve(AppState::new(config)).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
