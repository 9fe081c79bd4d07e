//! Process-wide logger setup shared by the harness and the mock endpoints.

use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Timestamp format of every log line.
pub const LOGS_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => return Err("Invalid log level"),
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    }
}

/// Log level override for one module, written `<module>=<level>` on the
/// command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub module: String,
    pub level: LogLevel,
}

impl FromStr for ModuleConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, level) = s
            .split_once('=')
            .ok_or_else(|| format!("'{}' is not of the form <module>=<level>", s))?;
        let module = module.trim();
        if module.is_empty() {
            return Err(format!("'{}' has an empty module name", s));
        }
        let level = level
            .trim()
            .parse::<LogLevel>()
            .map_err(|e| format!("'{}': {}", s, e))?;
        Ok(Self {
            module: module.to_string(),
            level,
        })
    }
}

impl fmt::Display for ModuleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.module, self.level)
    }
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Failed to create logs directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open log file '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

pub struct LoggerConfig<'a> {
    pub level: LogLevel,
    pub dir_path: &'a str,
    pub filename_log: &'a str,
    pub disable_file_logging: bool,
    pub disable_colors: bool,
    /// Per-module overrides, e.g. `steel_rain::admin=debug`
    pub module_logs: &'a [ModuleConfig],
}

pub fn log_file_path(dir_path: &str, filename_log: &str) -> PathBuf {
    Path::new(dir_path).join(filename_log)
}

/// Install the global logger: colored stdout, plus an append-only log file
/// unless file logging is disabled. Panics are routed into the log.
pub fn setup_logger(config: LoggerConfig<'_>) -> Result<(), LoggerError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack);
    let disable_colors = config.disable_colors;

    let stdout = fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = chrono::Local::now().format(LOGS_DATETIME_FORMAT);
            if disable_colors {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    now,
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    now,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stdout());

    let mut base = fern::Dispatch::new().level(config.level.into());
    for module in config.module_logs {
        base = base.level_for(module.module.clone(), module.level.into());
    }
    base = base.chain(stdout);

    if !config.disable_file_logging {
        std::fs::create_dir_all(config.dir_path).map_err(|source| LoggerError::CreateDir {
            path: PathBuf::from(config.dir_path),
            source,
        })?;
        let path = log_file_path(config.dir_path, config.filename_log);
        let file = fern::log_file(&path).map_err(|source| LoggerError::OpenFile {
            path: path.clone(),
            source,
        })?;
        base = base.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "[{}] [{}] [{}] {}",
                        chrono::Local::now().format(LOGS_DATETIME_FORMAT),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .chain(file),
        );
    }

    base.apply()?;
    log_panics::init();
    Ok(())
}
