use std::net::SocketAddr;

use crate::net::protocol::Identifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ClientConnecting {
        addr: SocketAddr,
    },
    ClientConnected {
        addr: SocketAddr,
        identifier: Identifier,
    },
    ClientDisconnected {
        addr: SocketAddr,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: DenyReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    TimedOut,
    Kicked,
    ServerClosed,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::TimedOut => "timed out",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::ServerClosed => "server closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    ServerFull,
    IncorrectPassword,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::ServerFull => "server full",
            DenyReason::IncorrectPassword => "incorrect password",
        }
    }
}
