use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;

use steel_rain_common::logging::{setup_logger, LogLevel, LoggerConfig, ModuleConfig};
use steel_rain_mock_tcp::serve;

/// Greets every TCP connection on a port and hangs up
#[derive(Parser, Debug)]
#[command(name = "mock-server")]
struct Cli {
    /// Port to listen on (all interfaces)
    port: u16,

    /// Set log level
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log level override for one module, as `<module>=<level>`
    #[clap(long)]
    logs_modules: Vec<ModuleConfig>,

    /// Directory receiving the `mserver_<port>` log
    #[clap(long, default_value_t = String::from("."))]
    logs_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filename_log = format!("mserver_{}", cli.port);
    setup_logger(LoggerConfig {
        level: cli.log_level,
        dir_path: &cli.logs_path,
        filename_log: &filename_log,
        disable_file_logging: false,
        disable_colors: true,
        module_logs: &cli.logs_modules,
    })?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Error starting server on {}", addr))?;
    info!("SERVER for port {}", cli.port);

    serve(listener).await?;
    Ok(())
}
