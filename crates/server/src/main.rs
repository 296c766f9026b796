use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

mod api;
mod config;
mod sse;
mod ui;

use config::{ConfigOverrides, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "openpaye-relay")]
#[command(about = "MCP relay exposing OpenPaye payroll operations to agents", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "openpaye-relay.toml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// OpenPaye API root
    #[arg(long, env = "OPENPAYE_BASE_URL")]
    openpaye_base_url: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "openpaye_relay=info,tower_http=debug".into());

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    tracing::info!("Starting OpenPaye relay");

    // Load configuration
    let config = ServerConfig::load(
        &args.config,
        ConfigOverrides {
            host: args.host,
            port: args.port,
            openpaye_base_url: args.openpaye_base_url,
        },
    )?;

    api::serve(config).await?;

    Ok(())
}
