use std::time::Duration;

use clap::ValueEnum;
use log::LevelFilter;
use tether::{LogVerbosity, ServerConfig};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Verbosity {
    Off,
    #[default]
    Low,
    Medium,
    High,
}

impl From<Verbosity> for LogVerbosity {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Off => LogVerbosity::Off,
            Verbosity::Low => LogVerbosity::Low,
            Verbosity::Medium => LogVerbosity::Medium,
            Verbosity::High => LogVerbosity::High,
        }
    }
}

pub fn init_logging(verbosity: Verbosity) {
    let level: LevelFilter = LogVerbosity::from(verbosity).level_filter();
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[derive(Debug, Clone)]
pub struct EchoConfig {
    pub tick_rate: u32,
    /// Stop after this long; run until killed when unset.
    pub duration: Option<Duration>,
    pub server: ServerConfig,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            duration: None,
            server: ServerConfig::default(),
        }
    }
}
