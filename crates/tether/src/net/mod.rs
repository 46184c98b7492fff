pub mod crypto;
pub mod protocol;
pub mod session;
pub mod simulator;
pub mod stats;
pub mod tracking;
pub mod transport;

pub use protocol::{
    ClientPacketType, DEFAULT_PORT, Discard, Identifier, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, Nonce,
    ServerPacketType,
};
pub use session::{Inbox, Liveness, Peer};
pub use simulator::{SimNetwork, SimSocket};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use tracking::SequenceWindow;
pub use transport::{Endpoint, Transport, UdpTransport};
