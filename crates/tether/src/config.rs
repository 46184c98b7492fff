use log::LevelFilter;

pub const PENDING_CHECK_UP: f32 = 0.5;
pub const PENDING_TIME_OUT: f32 = 5.0;
pub const CONNECTED_CHECK_UP: f32 = 10.0;
pub const CONNECTED_TIME_OUT: f32 = 60.0;
pub const DEFAULT_CAPACITY: usize = 32;

/// Resend intervals and silence limits, in seconds of accumulated `dt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub pending_check_up: f32,
    pub pending_time_out: f32,
    pub connected_check_up: f32,
    pub connected_time_out: f32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pending_check_up: PENDING_CHECK_UP,
            pending_time_out: PENDING_TIME_OUT,
            connected_check_up: CONNECTED_CHECK_UP,
            connected_time_out: CONNECTED_TIME_OUT,
        }
    }
}

impl Timing {
    pub fn check_up(&self, connected: bool) -> f32 {
        if connected {
            self.connected_check_up
        } else {
            self.pending_check_up
        }
    }

    pub fn time_out(&self, connected: bool) -> f32 {
        if connected {
            self.connected_time_out
        } else {
            self.pending_time_out
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Empty means clients are admitted without a password.
    pub password: String,
    pub capacity: usize,
    pub timing: Timing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            capacity: DEFAULT_CAPACITY,
            timing: Timing::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(password: impl Into<String>, capacity: usize) -> Self {
        Self {
            password: password.into(),
            capacity,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub password: String,
    pub timing: Timing,
}

impl ClientConfig {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..Default::default()
        }
    }
}

/// How much protocol activity gets logged.
///
/// `Low` covers connections and disconnections, `Medium` adds handshake
/// traffic and rejected handshake packets, `High` adds keepalives, messages
/// and every discarded datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogVerbosity {
    Off,
    #[default]
    Low,
    Medium,
    High,
}

impl LogVerbosity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogVerbosity::Off => LevelFilter::Off,
            LogVerbosity::Low => LevelFilter::Info,
            LogVerbosity::Medium => LevelFilter::Debug,
            LogVerbosity::High => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_selects_by_state() {
        let timing = Timing::default();
        assert_eq!(timing.check_up(false), 0.5);
        assert_eq!(timing.check_up(true), 10.0);
        assert_eq!(timing.time_out(false), 5.0);
        assert_eq!(timing.time_out(true), 60.0);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LogVerbosity::Off.level_filter(), LevelFilter::Off);
        assert_eq!(LogVerbosity::Medium.level_filter(), LevelFilter::Debug);
        assert!(LogVerbosity::High.level_filter() > LogVerbosity::Low.level_filter());
    }
}
