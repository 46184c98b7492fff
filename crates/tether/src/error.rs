use std::io;

/// Terminal reasons a client connection moved to `Disconnected`.
///
/// Each one is reported exactly once, by the `update` call that observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    #[error("server is full")]
    ServerFull,
    #[error("password rejected by server")]
    IncorrectPassword,
    #[error("connection terminated by server")]
    ServerDisconnected,
    #[error("connection timed out")]
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Failure(#[from] Failure),
    #[error("datagram of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn failure(&self) -> Option<Failure> {
        match self {
            Error::Failure(failure) => Some(*failure),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
