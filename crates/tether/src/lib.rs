pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod server;

pub use client::{Client, ConnectionState};
pub use config::{ClientConfig, LogVerbosity, ServerConfig, Timing};
pub use error::{Error, Failure, Result};
pub use net::{
    DEFAULT_PORT, Identifier, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, NetworkStats,
    PacketLossSimulation, Peer, SimNetwork, SimSocket, Transport, UdpTransport,
};
pub use server::{DenyReason, DisconnectReason, Server, ServerClient, ServerEvent};
