use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use log::{debug, info, trace};

use crate::config::{ClientConfig, Timing};
use crate::error::{Error, Failure, Result};
use crate::net::crypto;
use crate::net::protocol::{
    CHALLENGE_SIZE, ChallengeResponse, ClientPacketType, Discard, Frame, HEADER_SIZE, Identifier,
    MAX_PAYLOAD_SIZE, NONCE_SIZE, Nonce, REJECTION_SIZE, ServerPacketType,
    encode_challenge_response, encode_connection_request, encode_session,
};
use crate::net::session::{Inbox, Liveness, Peer};
use crate::net::stats::NetworkStats;
use crate::net::transport::{Endpoint, Transport, UdpTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    RequestingConnection,
    Challenged,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
enum ClientState {
    RequestingConnection {
        nonce: Nonce,
    },
    Challenged {
        nonce: Nonce,
        response: ChallengeResponse,
        identifier: Identifier,
    },
    Connected {
        identifier: Identifier,
    },
    Disconnected,
}

#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    ServerFull,
    PasswordIncorrect,
    Challenge { server_nonce: Nonce, has_password: bool },
    Keepalive,
    Disconnect,
    Message(Vec<u8>),
}

fn expect_nonce(frame: &Frame<'_>, nonce: &Nonce) -> std::result::Result<(), Discard> {
    if frame.nonce()? != *nonce {
        return Err(Discard::NonceMismatch);
    }
    Ok(())
}

fn expect_identifier(frame: &Frame<'_>, identifier: &Identifier) -> std::result::Result<(), Discard> {
    frame.expect_min_len(HEADER_SIZE)?;
    if frame.identifier()? != *identifier {
        return Err(Discard::IdentifierMismatch);
    }
    Ok(())
}

pub struct Client<T: Transport = UdpTransport> {
    endpoint: Option<Endpoint<T>>,
    server_addr: SocketAddr,
    password: Vec<u8>,
    timing: Timing,
    state: ClientState,
    liveness: Liveness,
    inbox: Inbox,
    failure: Option<Failure>,
}

impl Client<UdpTransport> {
    /// Resolves `hostname` and starts requesting a connection. Nothing is
    /// sent until the first `update`.
    pub fn connect(hostname: &str, port: u16, config: ClientConfig) -> Result<Self> {
        let server_addr = (hostname, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}", hostname),
            )
        })?;

        let transport = UdpTransport::bind_for(server_addr)?;
        Ok(Self::with_transport(transport, server_addr, config))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T, server_addr: SocketAddr, config: ClientConfig) -> Self {
        Self {
            endpoint: Some(Endpoint::new(transport)),
            server_addr,
            password: crypto::password_bytes(&config.password),
            timing: config.timing,
            state: ClientState::RequestingConnection {
                nonce: crypto::generate_nonce(),
            },
            liveness: Liveness::new(),
            inbox: Inbox::default(),
            failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state {
            ClientState::RequestingConnection { .. } => ConnectionState::RequestingConnection,
            ClientState::Challenged { .. } => ConnectionState::Challenged,
            ClientState::Connected { .. } => ConnectionState::Connected,
            ClientState::Disconnected => ConnectionState::Disconnected,
        }
    }

    pub fn identifier(&self) -> Option<Identifier> {
        match self.state {
            ClientState::Challenged { identifier, .. } | ClientState::Connected { identifier } => {
                Some(identifier)
            }
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<Failure> {
        self.failure
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().and_then(|e| e.local_addr().ok())
    }

    pub fn stats(&self) -> NetworkStats {
        self.endpoint
            .as_ref()
            .map(|e| e.stats().clone())
            .unwrap_or_default()
    }

    /// Receives everything waiting, enforces the time-out, then sends the
    /// control packet the current state calls for if one is due.
    ///
    /// A protocol failure is returned once, as `Error::Failure`, by the call
    /// that caused it; the connection is `Disconnected` afterwards and later
    /// calls do nothing.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        let datagrams = match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.receive()?,
            None => return Ok(()),
        };

        for (datagram, from) in datagrams {
            match self.classify(&datagram, from) {
                Ok(inbound) => self.apply(inbound)?,
                Err(discard) => {
                    if let Some(endpoint) = self.endpoint.as_mut() {
                        endpoint.record_discard();
                    }
                    trace!("Discarded datagram from {}: {}", from, discard);
                }
            }
        }

        self.liveness.advance(dt);

        let connected = matches!(self.state, ClientState::Connected { .. });
        if self.liveness.since_heard() > self.timing.time_out(connected) {
            return Err(self.fail(Failure::TimedOut));
        }

        if self.liveness.since_spoken() > self.timing.check_up(connected) {
            self.send_control()?;
            self.liveness.spoken_to();
        }

        Ok(())
    }

    fn classify(&self, datagram: &[u8], from: SocketAddr) -> std::result::Result<Inbound, Discard> {
        if from != self.server_addr {
            return Err(Discard::ForeignSource);
        }

        let frame = Frame::parse(datagram)?;
        let kind = ServerPacketType::from_u8(frame.kind).ok_or(Discard::UnexpectedType(frame.kind))?;

        match (&self.state, kind) {
            (
                ClientState::RequestingConnection { nonce } | ClientState::Challenged { nonce, .. },
                ServerPacketType::ServerFull,
            ) => {
                frame.expect_len(REJECTION_SIZE)?;
                expect_nonce(&frame, nonce)?;
                Ok(Inbound::ServerFull)
            }
            (ClientState::Challenged { nonce, .. }, ServerPacketType::PasswordIncorrect) => {
                frame.expect_len(REJECTION_SIZE)?;
                expect_nonce(&frame, nonce)?;
                Ok(Inbound::PasswordIncorrect)
            }
            (ClientState::RequestingConnection { nonce }, ServerPacketType::Challenge) => {
                frame.expect_len(CHALLENGE_SIZE)?;
                expect_nonce(&frame, nonce)?;
                Ok(Inbound::Challenge {
                    server_nonce: frame.array_at(NONCE_SIZE)?,
                    has_password: frame.body[NONCE_SIZE * 2] != 0,
                })
            }
            (ClientState::Challenged { identifier, .. }, ServerPacketType::Keepalive) => {
                expect_identifier(&frame, identifier)?;
                Ok(Inbound::Keepalive)
            }
            (ClientState::Connected { identifier }, kind) => {
                expect_identifier(&frame, identifier)?;
                match kind {
                    ServerPacketType::Keepalive => Ok(Inbound::Keepalive),
                    ServerPacketType::Disconnect => Ok(Inbound::Disconnect),
                    ServerPacketType::Message => Ok(Inbound::Message(frame.payload().to_vec())),
                    _ => Err(Discard::UnexpectedType(frame.kind)),
                }
            }
            _ => Err(Discard::UnexpectedType(frame.kind)),
        }
    }

    fn apply(&mut self, inbound: Inbound) -> Result<()> {
        match inbound {
            Inbound::ServerFull => Err(self.fail(Failure::ServerFull)),
            Inbound::PasswordIncorrect => Err(self.fail(Failure::IncorrectPassword)),
            Inbound::Challenge {
                server_nonce,
                has_password,
            } => {
                let ClientState::RequestingConnection { nonce } = self.state else {
                    return Ok(());
                };

                let password = has_password.then_some(self.password.as_slice());
                let response = crypto::challenge_response(&nonce, &server_nonce, password);
                self.state = ClientState::Challenged {
                    nonce,
                    response,
                    identifier: crypto::identifier(&response),
                };
                self.liveness.reset();

                debug!("Challenge received from {}", self.server_addr);
                Ok(())
            }
            Inbound::Keepalive => {
                if let ClientState::Challenged { identifier, .. } = self.state {
                    self.state = ClientState::Connected { identifier };
                    info!("Connected to {}", self.server_addr);
                } else {
                    trace!("Keepalive received from {}", self.server_addr);
                }
                self.liveness.heard_from();
                Ok(())
            }
            Inbound::Disconnect => {
                self.liveness.heard_from();
                Err(self.fail(Failure::ServerDisconnected))
            }
            Inbound::Message(payload) => {
                trace!("Message of {} bytes received", payload.len());
                self.inbox.push(payload);
                self.liveness.heard_from();
                Ok(())
            }
        }
    }

    fn send_control(&mut self) -> io::Result<()> {
        let datagram = match &self.state {
            ClientState::RequestingConnection { nonce } => {
                debug!("Sending connection request to {}", self.server_addr);
                encode_connection_request(nonce)
            }
            ClientState::Challenged { response, .. } => {
                debug!("Sending challenge response to {}", self.server_addr);
                encode_challenge_response(response)
            }
            ClientState::Connected { identifier } => {
                trace!("Sending keepalive to {}", self.server_addr);
                encode_session(ClientPacketType::Keepalive as u8, identifier, &[])
            }
            ClientState::Disconnected => return Ok(()),
        };

        match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.send_to(&datagram, self.server_addr),
            None => Ok(()),
        }
    }

    fn fail(&mut self, failure: Failure) -> Error {
        info!("Connection to {} ended: {}", self.server_addr, failure);

        // The server already considers us gone unless we went silent.
        let _ = self.shutdown(failure == Failure::TimedOut);
        self.failure = Some(failure);
        Error::Failure(failure)
    }

    fn shutdown(&mut self, notify: bool) -> io::Result<()> {
        let mut result = Ok(());
        if notify {
            if let (ClientState::Connected { identifier }, Some(endpoint)) =
                (&self.state, self.endpoint.as_mut())
            {
                let datagram = encode_session(ClientPacketType::Disconnect as u8, identifier, &[]);
                result = endpoint.send_to(&datagram, self.server_addr);
            }
        }

        self.endpoint = None;
        self.state = ClientState::Disconnected;
        self.inbox.clear();
        result
    }
}

impl<T: Transport> Peer for Client<T> {
    fn is_connection_pending(&self) -> bool {
        matches!(
            self.state,
            ClientState::RequestingConnection { .. } | ClientState::Challenged { .. }
        )
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected { .. })
    }

    fn is_disconnected(&self) -> bool {
        matches!(self.state, ClientState::Disconnected)
    }

    fn has_datagrams(&self) -> bool {
        !self.inbox.is_empty()
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        self.inbox.pop()
    }

    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let ClientState::Connected { identifier } = self.state else {
            return Ok(());
        };
        if datagram.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: datagram.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let frame = encode_session(ClientPacketType::Message as u8, &identifier, datagram);
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.send_to(&frame, self.server_addr)?;
            self.liveness.spoken_to();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let ClientState::Disconnected = self.state {
            return Ok(());
        }

        info!("Closing connection to {}", self.server_addr);
        self.shutdown(true)?;
        Ok(())
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        let _ = Peer::close(self);
    }
}
