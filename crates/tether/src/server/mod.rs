mod events;

pub use events::{DenyReason, DisconnectReason, ServerEvent};

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use log::{debug, info, trace};

use crate::config::{ServerConfig, Timing};
use crate::error::{Error, Result};
use crate::net::crypto;
use crate::net::protocol::{
    CHALLENGE_RESPONSE_SIZE, CONNECTION_REQUEST_SIZE, ChallengeResponse, ClientPacketType,
    Discard, Frame, HEADER_SIZE, Identifier, MAX_PAYLOAD_SIZE, Nonce, ServerPacketType,
    encode_challenge, encode_rejection, encode_session,
};
use crate::net::session::{Inbox, Liveness, Peer};
use crate::net::stats::NetworkStats;
use crate::net::transport::{Endpoint, Transport, UdpTransport};

#[derive(Debug, Clone, Copy)]
struct Handshake {
    client_nonce: Nonce,
    server_nonce: Nonce,
    expected: ChallengeResponse,
}

#[derive(Debug, Clone, Copy)]
enum SessionState {
    Pending(Handshake),
    Connected { identifier: Identifier },
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    liveness: Liveness,
    inbox: Inbox,
}

impl Session {
    fn pending(handshake: Handshake) -> Self {
        Self {
            state: SessionState::Pending(handshake),
            liveness: Liveness::new(),
            inbox: Inbox::default(),
        }
    }

    fn identifier(&self) -> Option<Identifier> {
        match self.state {
            SessionState::Connected { identifier } => Some(identifier),
            SessionState::Pending(_) => None,
        }
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    fn control_packet(&self, has_password: bool) -> Vec<u8> {
        match &self.state {
            SessionState::Pending(handshake) => encode_challenge(
                &handshake.client_nonce,
                &handshake.server_nonce,
                has_password,
            ),
            SessionState::Connected { identifier } => {
                encode_session(ServerPacketType::Keepalive as u8, identifier, &[])
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    ConnectionRequest { client_nonce: Nonce },
    ChallengeResponse(ChallengeResponse),
    RedundantResponse,
    Keepalive,
    Disconnect,
    Message(Vec<u8>),
}

/// Accepts connections on one socket and tracks every peer in a session
/// table keyed by address. Driven by [`Server::update`].
pub struct Server<T: Transport = UdpTransport> {
    endpoint: Option<Endpoint<T>>,
    password: Vec<u8>,
    capacity: usize,
    timing: Timing,
    sessions: HashMap<SocketAddr, Session>,
    connected: HashSet<SocketAddr>,
    events: VecDeque<ServerEvent>,
    outbox: Vec<(SocketAddr, Vec<u8>)>,
}

impl Server<UdpTransport> {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: ServerConfig) -> Result<Self> {
        let transport = UdpTransport::bind(addr)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> Server<T> {
    pub fn with_transport(transport: T, config: ServerConfig) -> Self {
        let endpoint = Endpoint::new(transport);
        if let Ok(addr) = endpoint.local_addr() {
            debug!("Server listening on {}", addr);
        }

        Self {
            endpoint: Some(endpoint),
            password: crypto::password_bytes(&config.password),
            capacity: config.capacity,
            timing: config.timing,
            sessions: HashMap::new(),
            connected: HashSet::new(),
            events: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    /// `None` once the server has been closed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().and_then(|e| e.local_addr().ok())
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn clients(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.connected.iter().copied()
    }

    pub fn client(&mut self, addr: SocketAddr) -> Option<ServerClient<'_, T>> {
        if !self.sessions.contains_key(&addr) {
            return None;
        }
        Some(ServerClient { server: self, addr })
    }

    pub fn stats(&self) -> NetworkStats {
        self.endpoint
            .as_ref()
            .map(|e| e.stats().clone())
            .unwrap_or_default()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    /// Session failures are reported through [`Server::drain_events`]. A
    /// failed send does not stop the update; the first one is returned once
    /// every datagram and session has been handled.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        let datagrams = match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.receive()?,
            None => return Ok(()),
        };

        for (datagram, from) in datagrams {
            match self.classify(&datagram, from) {
                Ok(inbound) => self.apply(from, inbound),
                Err(discard) => {
                    if let Some(endpoint) = self.endpoint.as_mut() {
                        endpoint.record_discard();
                    }
                    trace!("Discarded datagram from {}: {}", from, discard);
                }
            }
        }

        self.sweep(dt);
        self.flush()?;
        Ok(())
    }

    fn classify(&self, datagram: &[u8], from: SocketAddr) -> std::result::Result<Inbound, Discard> {
        let frame = Frame::parse(datagram)?;
        let kind = ClientPacketType::from_u8(frame.kind).ok_or(Discard::UnexpectedType(frame.kind))?;

        let Some(session) = self.sessions.get(&from) else {
            frame.expect_len(CONNECTION_REQUEST_SIZE)?;
            if kind != ClientPacketType::ConnectionRequest {
                return Err(Discard::UnexpectedType(frame.kind));
            }
            return Ok(Inbound::ConnectionRequest {
                client_nonce: frame.nonce()?,
            });
        };

        match session.state {
            SessionState::Pending(_) => {
                frame.expect_len(CHALLENGE_RESPONSE_SIZE)?;
                if kind != ClientPacketType::ChallengeResponse {
                    return Err(Discard::UnexpectedType(frame.kind));
                }
                Ok(Inbound::ChallengeResponse(frame.array_at(0)?))
            }
            SessionState::Connected { identifier } => {
                frame.expect_min_len(HEADER_SIZE)?;
                if frame.identifier()? != identifier {
                    return Err(Discard::IdentifierMismatch);
                }
                match kind {
                    ClientPacketType::ChallengeResponse => {
                        frame.expect_len(CHALLENGE_RESPONSE_SIZE)?;
                        Ok(Inbound::RedundantResponse)
                    }
                    ClientPacketType::Keepalive => Ok(Inbound::Keepalive),
                    ClientPacketType::Disconnect => Ok(Inbound::Disconnect),
                    ClientPacketType::Message => Ok(Inbound::Message(frame.payload().to_vec())),
                    ClientPacketType::ConnectionRequest => Err(Discard::UnexpectedType(frame.kind)),
                }
            }
        }
    }

    fn apply(&mut self, from: SocketAddr, inbound: Inbound) {
        match inbound {
            Inbound::ConnectionRequest { client_nonce } => {
                if self.connected.len() >= self.capacity {
                    debug!("Server full, turned away {}", from);
                    self.deny(from, &client_nonce, DenyReason::ServerFull);
                    return;
                }

                let server_nonce = crypto::generate_nonce();
                let password = (!self.password.is_empty()).then_some(self.password.as_slice());
                let expected = crypto::challenge_response(&client_nonce, &server_nonce, password);
                self.sessions.insert(
                    from,
                    Session::pending(Handshake {
                        client_nonce,
                        server_nonce,
                        expected,
                    }),
                );
                self.events.push_back(ServerEvent::ClientConnecting { addr: from });

                debug!("Connection requested by {}", from);
            }
            Inbound::ChallengeResponse(response) => {
                let Some(session) = self.sessions.get_mut(&from) else {
                    return;
                };
                let SessionState::Pending(handshake) = session.state else {
                    return;
                };

                if self.connected.len() >= self.capacity {
                    self.sessions.remove(&from);
                    debug!("Server filled up before {} finished connecting", from);
                    self.deny(from, &handshake.client_nonce, DenyReason::ServerFull);
                    return;
                }

                if response != handshake.expected {
                    self.sessions.remove(&from);
                    debug!("Incorrect challenge response from {}", from);
                    self.deny(from, &handshake.client_nonce, DenyReason::IncorrectPassword);
                    return;
                }

                let identifier = crypto::identifier(&handshake.expected);
                session.state = SessionState::Connected { identifier };
                session.liveness.reset();
                self.connected.insert(from);
                self.events
                    .push_back(ServerEvent::ClientConnected { addr: from, identifier });

                info!("Client {} connected", from);
            }
            Inbound::RedundantResponse => {
                if let Some(session) = self.sessions.get_mut(&from) {
                    session.liveness.heard_from();
                    session.liveness.speak_now();
                }
                trace!("Redundant challenge response from {}", from);
            }
            Inbound::Keepalive => {
                if let Some(session) = self.sessions.get_mut(&from) {
                    session.liveness.heard_from();
                }
                trace!("Keepalive from {}", from);
            }
            Inbound::Disconnect => {
                self.evict(from);
                self.events.push_back(ServerEvent::ClientDisconnected {
                    addr: from,
                    reason: DisconnectReason::Graceful,
                });

                info!("Client {} disconnected", from);
            }
            Inbound::Message(payload) => {
                trace!("Message of {} bytes from {}", payload.len(), from);
                if let Some(session) = self.sessions.get_mut(&from) {
                    session.inbox.push(payload);
                    session.liveness.heard_from();
                }
            }
        }
    }

    fn deny(&mut self, addr: SocketAddr, client_nonce: &Nonce, reason: DenyReason) {
        self.events
            .push_back(ServerEvent::ConnectionDenied { addr, reason });

        let kind = match reason {
            DenyReason::ServerFull => ServerPacketType::ServerFull,
            DenyReason::IncorrectPassword => ServerPacketType::PasswordIncorrect,
        };
        self.outbox.push((addr, encode_rejection(kind, client_nonce)));
    }

    fn sweep(&mut self, dt: f32) {
        let has_password = self.has_password();
        let mut expired = Vec::new();

        for (addr, session) in &mut self.sessions {
            session.liveness.advance(dt);

            let connected = session.is_connected();
            if session.liveness.since_heard() >= self.timing.time_out(connected) {
                expired.push(*addr);
                continue;
            }

            if session.liveness.since_spoken() >= self.timing.check_up(connected) {
                self.outbox.push((*addr, session.control_packet(has_password)));
                session.liveness.spoken_to();
            }
        }

        for addr in expired {
            if let Some(session) = self.evict(addr) {
                if session.is_connected() {
                    self.events.push_back(ServerEvent::ClientDisconnected {
                        addr,
                        reason: DisconnectReason::TimedOut,
                    });
                    info!("Client {} timed out", addr);
                } else {
                    debug!("Pending client {} timed out", addr);
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(endpoint) = self.endpoint.as_mut() else {
            self.outbox.clear();
            return Ok(());
        };

        let mut first_error = None;
        for (addr, datagram) in self.outbox.drain(..) {
            trace!("Sending {} byte control packet to {}", datagram.len(), addr);
            if let Err(err) = endpoint.send_to(&datagram, addr) {
                debug!("Send to {} failed: {}", addr, err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn evict(&mut self, addr: SocketAddr) -> Option<Session> {
        self.connected.remove(&addr);
        self.sessions.remove(&addr)
    }

    fn kick(&mut self, addr: SocketAddr) -> Result<()> {
        let Some(session) = self.evict(addr) else {
            return Ok(());
        };
        let Some(identifier) = session.identifier() else {
            debug!("Dropped pending client {}", addr);
            return Ok(());
        };

        self.events.push_back(ServerEvent::ClientDisconnected {
            addr,
            reason: DisconnectReason::Kicked,
        });
        info!("Kicked client {}", addr);

        if let Some(endpoint) = self.endpoint.as_mut() {
            let datagram = encode_session(ServerPacketType::Disconnect as u8, &identifier, &[]);
            endpoint.send_to(&datagram, addr)?;
        }
        Ok(())
    }

    /// Notifies every connected client, forgets all sessions and releases
    /// the socket. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut endpoint) = self.endpoint.take() else {
            return Ok(());
        };

        let mut first_error = None;
        for (addr, session) in self.sessions.drain() {
            let Some(identifier) = session.identifier() else {
                continue;
            };

            let datagram = encode_session(ServerPacketType::Disconnect as u8, &identifier, &[]);
            if let Err(err) = endpoint.send_to(&datagram, addr) {
                first_error.get_or_insert(err);
            }
            self.events.push_back(ServerEvent::ClientDisconnected {
                addr,
                reason: DisconnectReason::ServerClosed,
            });
        }
        self.connected.clear();

        info!("Server closed");
        match first_error {
            Some(err) => Err(Error::Io(err)),
            None => Ok(()),
        }
    }
}

impl<T: Transport> Drop for Server<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One peer as seen from the server. The handle stays usable after the
/// session ends and then reports itself disconnected.
pub struct ServerClient<'a, T: Transport = UdpTransport> {
    server: &'a mut Server<T>,
    addr: SocketAddr,
}

impl<T: Transport> ServerClient<'_, T> {
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn identifier(&self) -> Option<Identifier> {
        self.session().and_then(Session::identifier)
    }

    fn session(&self) -> Option<&Session> {
        self.server.sessions.get(&self.addr)
    }
}

impl<T: Transport> Peer for ServerClient<'_, T> {
    fn is_connection_pending(&self) -> bool {
        self.session().is_some_and(|s| !s.is_connected())
    }

    fn is_connected(&self) -> bool {
        self.session().is_some_and(Session::is_connected)
    }

    fn is_disconnected(&self) -> bool {
        self.session().is_none()
    }

    fn has_datagrams(&self) -> bool {
        self.session().is_some_and(|s| !s.inbox.is_empty())
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        self.server
            .sessions
            .get_mut(&self.addr)
            .and_then(|s| s.inbox.pop())
    }

    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let Some(identifier) = self.identifier() else {
            return Ok(());
        };
        if datagram.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: datagram.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let frame = encode_session(ServerPacketType::Message as u8, &identifier, datagram);
        let Some(endpoint) = self.server.endpoint.as_mut() else {
            return Ok(());
        };
        endpoint.send_to(&frame, self.addr)?;

        if let Some(session) = self.server.sessions.get_mut(&self.addr) {
            session.liveness.spoken_to();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.server.kick(self.addr)
    }
}
