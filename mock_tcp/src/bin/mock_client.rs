use anyhow::Result;
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::{Ipv4Addr, SocketAddr};

use steel_rain_common::logging::{setup_logger, LogLevel, LoggerConfig, ModuleConfig};
use steel_rain_mock_tcp::run_client;

/// Keeps opening short-lived TCP connections to a local port
#[derive(Parser, Debug)]
#[command(name = "mock-client")]
struct Cli {
    /// Local port to connect to
    port: u16,

    /// Set log level
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log level override for one module, as `<module>=<level>`
    #[clap(long)]
    logs_modules: Vec<ModuleConfig>,

    /// Directory receiving the `mclient_<port>` log
    #[clap(long, default_value_t = String::from("."))]
    logs_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filename_log = format!("mclient_{}", cli.port);
    setup_logger(LoggerConfig {
        level: cli.log_level,
        dir_path: &cli.logs_path,
        filename_log: &filename_log,
        disable_file_logging: false,
        disable_colors: true,
        module_logs: &cli.logs_modules,
    })?;

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, cli.port));
    info!("CLIENT for {}", addr);
    run_client(addr, StdRng::from_entropy()).await;
    Ok(())
}
