use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::Path;

use steel_rain::config::{defaults, ConfigValidator, ValidatedConfig};
use steel_rain::faults::PauseRange;
use steel_rain::rng::parse_seed;
use steel_rain::supervisor::StopSignal;
use steel_rain::topology::PortBases;
use steel_rain::Harness;
use steel_rain_common::logging::{setup_logger, LogLevel, LoggerConfig, ModuleConfig};

fn parse_seed_arg(value: &str) -> Result<u64, String> {
    parse_seed(value).ok_or_else(|| format!("'{}' is not a hexadecimal seed", value))
}

/// Steel Rain command line configuration
#[derive(Parser, Clone, Debug)]
#[command(name = "steel-rain")]
#[command(version, about = "Chaos harness for a fully-meshed router network")]
pub struct CliConfig {
    /// Number of routers in the mesh
    #[clap(long, default_value_t = defaults::NETWORK_SIZE)]
    network_size: usize,

    /// Router executable, launched as `<binary> --config <file>`
    #[clap(long, default_value_t = String::from(defaults::ROUTER_BINARY))]
    router_binary: String,

    /// Path to the skmanage executable
    #[clap(long, default_value_t = String::from(defaults::SKMANAGE))]
    skmanage: String,

    /// Directory receiving one config file per router (default: ./cc_<N>_configs)
    #[clap(long)]
    config_dir: Option<String>,

    /// Set log level
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log level override for one module, as `<module>=<level>` (repeatable)
    #[clap(long)]
    logs_modules: Vec<ModuleConfig>,

    /// Disable the log file
    #[clap(long)]
    disable_file_logging: bool,

    /// Disable the usage of colors in log
    #[clap(long)]
    disable_log_color: bool,

    /// Log filename
    #[clap(long, default_value_t = String::from(defaults::FILENAME_LOG))]
    filename_log: String,

    /// Logs directory, also used for the router output logs
    #[clap(long, default_value_t = String::from(defaults::LOGS_PATH))]
    logs_path: String,

    /// Run seed in hexadecimal; falls back to STEEL_RAIN_SEED, then a random seed
    #[clap(long, value_parser = parse_seed_arg)]
    seed: Option<u64>,

    /// Timeout of every administrative command, in seconds
    #[clap(long, default_value_t = defaults::ADMIN_TIMEOUT_SECS)]
    admin_timeout_secs: u64,

    /// Pause between starting the routers and the first audit, in seconds
    #[clap(long, default_value_t = defaults::STARTUP_GRACE_SECS)]
    startup_grace_secs: u64,

    /// Signal used to stop a router
    #[clap(long, value_enum, default_value_t)]
    stop_signal: StopSignal,

    /// Time a stopped router gets to exit before it is killed, in seconds
    #[clap(long, default_value_t = defaults::STOP_TIMEOUT_SECS)]
    stop_timeout_secs: u64,

    /// Mock TCP server executable, launched as `<binary> <port>`
    #[clap(long, default_value_t = String::from(defaults::MOCK_SERVER_BINARY))]
    mock_server_binary: String,

    /// Mock TCP client executable, launched as `<binary> <port>`
    #[clap(long, default_value_t = String::from(defaults::MOCK_CLIENT_BINARY))]
    mock_client_binary: String,

    /// Do not launch the mock TCP servers and clients
    #[clap(long)]
    no_traffic: bool,

    /// Do not bounce routers
    #[clap(long)]
    no_router_bounce: bool,

    /// Do not bounce TCP listeners
    #[clap(long)]
    no_listener_bounce: bool,

    /// Do not bounce TCP connectors
    #[clap(long)]
    no_connector_bounce: bool,

    /// Do not fire management queries
    #[clap(long)]
    no_management_probe: bool,

    /// Reset out-of-range settings to their defaults instead of failing
    #[clap(long)]
    auto_fix: bool,

    /// JSON File to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,
}

impl CliConfig {
    /// Convert CLI configuration to ValidatedConfig
    pub fn to_validated_config(self) -> ValidatedConfig {
        ValidatedConfig {
            log_level: self.log_level,
            disable_file_logging: self.disable_file_logging,
            disable_log_color: self.disable_log_color,
            filename_log: self.filename_log,
            logs_modules: self.logs_modules,
            logs_path: self.logs_path,
            network_size: self.network_size,
            config_dir: self.config_dir,
            router_binary: self.router_binary,
            skmanage: self.skmanage,
            mock_server_binary: self.mock_server_binary,
            mock_client_binary: self.mock_client_binary,
            port_bases: PortBases::default(),
            seed: self.seed,
            admin_timeout_secs: self.admin_timeout_secs,
            startup_grace_secs: self.startup_grace_secs,
            stop_signal: self.stop_signal,
            stop_timeout_secs: self.stop_timeout_secs,
            router_outage: defaults::ROUTER_OUTAGE,
            resource_pause: defaults::RESOURCE_PAUSE,
            probe_interval: defaults::PROBE_INTERVAL,
            router_bounce: !self.no_router_bounce,
            listener_bounce: !self.no_listener_bounce,
            connector_bounce: !self.no_connector_bounce,
            management_probe: !self.no_management_probe,
            traffic: !self.no_traffic,
            auto_fix_config: self.auto_fix,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    // Handle config template generation
    if let Some(path) = cli_config.config_file.as_ref() {
        if cli_config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {path}");
                eprintln!("Use a different path or remove the existing file");
                return Ok(());
            }

            ValidatedConfig::generate_template(path)?;
            println!("Configuration template generated at {path}");
            println!("Edit the file and run the harness with --config-file {path}");
            return Ok(());
        }
    }

    // Load the configuration, then install the logger before validating it
    // so the validator's records are not lost
    let mut config = if let Some(config_path) = &cli_config.config_file {
        println!("Loading configuration from: {config_path}");
        let mut config = ValidatedConfig::read_file(config_path)?;
        config.auto_fix_config |= cli_config.auto_fix;
        config
    } else {
        cli_config.to_validated_config()
    };

    setup_logger(LoggerConfig {
        level: config.log_level,
        dir_path: &config.logs_path,
        filename_log: &config.filename_log,
        disable_file_logging: config.disable_file_logging,
        disable_colors: config.disable_log_color,
        module_logs: &config.logs_modules,
    })?;

    ConfigValidator::new(config.auto_fix_config).validate(&mut config)?;

    info!("Steel Rain v{} starting...", steel_rain::VERSION);
    info!(
        "Network size {}, router binary {}, skmanage {}",
        config.network_size, config.router_binary, config.skmanage
    );
    log_pause("router outage", &config.router_outage);
    log_pause("resource pause", &config.resource_pause);
    log_pause("probe interval", &config.probe_interval);

    let harness = Harness::build(config)?;
    info!(
        "Run seed 0x{:016x} (replay with STEEL_RAIN_SEED=0x{:016x})",
        harness.seed(),
        harness.seed()
    );

    harness.run().await?;
    info!("Steel Rain exiting");
    Ok(())
}

fn log_pause(name: &str, range: &PauseRange) {
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("{}: {}..={} ms", name, range.min_ms, range.max_ms);
    }
}
