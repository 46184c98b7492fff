use std::time::Duration;

use clap::ValueEnum;
use tether::{ClientConfig, LogVerbosity};

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
    env_logger::Builder::new()
        .filter_level(LogVerbosity::from(verbosity).level_filter())
        .parse_default_env()
        .init();
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub tick_rate: u32,
    pub linger: Duration,
    pub client: ClientConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            linger: Duration::from_secs(1),
            client: ClientConfig::default(),
        }
    }
}
