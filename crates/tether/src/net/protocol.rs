use std::fmt;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const DEFAULT_PORT: u16 = 27015;

pub const CHECKSUM_SIZE: usize = 4;
pub const NONCE_SIZE: usize = 16;
pub const IDENTIFIER_SIZE: usize = 8;
pub const DIGEST_SIZE: usize = 32;

/// Checksum, type byte and session identifier.
pub const HEADER_SIZE: usize = CHECKSUM_SIZE + 1 + IDENTIFIER_SIZE;
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

// Connection requests are padded so a spoofed request never yields a reply
// larger than itself.
pub const CONNECTION_REQUEST_SIZE: usize = 1000;
pub const CHALLENGE_SIZE: usize = CHECKSUM_SIZE + 1 + NONCE_SIZE * 2 + 1;
pub const REJECTION_SIZE: usize = CHECKSUM_SIZE + 1 + NONCE_SIZE;
pub const CHALLENGE_RESPONSE_SIZE: usize = CHECKSUM_SIZE + 1 + DIGEST_SIZE;

pub type Nonce = [u8; NONCE_SIZE];
pub type Identifier = [u8; IDENTIFIER_SIZE];
pub type ChallengeResponse = [u8; DIGEST_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientPacketType {
    ConnectionRequest = 1,
    ChallengeResponse = 2,
    Keepalive = 3,
    Disconnect = 4,
    Message = 5,
}

impl ClientPacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ConnectionRequest),
            2 => Some(Self::ChallengeResponse),
            3 => Some(Self::Keepalive),
            4 => Some(Self::Disconnect),
            5 => Some(Self::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerPacketType {
    Challenge = 1,
    ServerFull = 2,
    PasswordIncorrect = 3,
    Keepalive = 4,
    Disconnect = 5,
    Message = 6,
}

impl ServerPacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Challenge),
            2 => Some(Self::ServerFull),
            3 => Some(Self::PasswordIncorrect),
            4 => Some(Self::Keepalive),
            5 => Some(Self::Disconnect),
            6 => Some(Self::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    TooShort(usize),
    BadChecksum,
    WrongSize { expected: usize, actual: usize },
    UnexpectedType(u8),
    NonceMismatch,
    IdentifierMismatch,
    ForeignSource,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::TooShort(len) => write!(f, "too short ({} bytes)", len),
            Discard::BadChecksum => write!(f, "failed checksum"),
            Discard::WrongSize { expected, actual } => {
                write!(f, "wrong size (expected {}, got {})", expected, actual)
            }
            Discard::UnexpectedType(kind) => write!(f, "unexpected type {}", kind),
            Discard::NonceMismatch => write!(f, "nonce mismatch"),
            Discard::IdentifierMismatch => write!(f, "identifier mismatch"),
            Discard::ForeignSource => write!(f, "unexpected source address"),
        }
    }
}

pub fn checksum(datagram: &[u8]) -> u32 {
    crc32fast::hash(&datagram[CHECKSUM_SIZE..])
}

pub fn write_checksum(datagram: &mut [u8]) {
    let crc = checksum(datagram);
    datagram[..CHECKSUM_SIZE].copy_from_slice(&crc.to_le_bytes());
}

pub fn verify_checksum(datagram: &[u8]) -> bool {
    if datagram.len() < CHECKSUM_SIZE {
        return false;
    }
    let stored = u32::from_le_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]);
    stored == checksum(datagram)
}

#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub kind: u8,
    pub body: &'a [u8],
    len: usize,
}

impl<'a> Frame<'a> {
    pub fn parse(datagram: &'a [u8]) -> Result<Self, Discard> {
        if datagram.len() <= CHECKSUM_SIZE {
            return Err(Discard::TooShort(datagram.len()));
        }
        if !verify_checksum(datagram) {
            return Err(Discard::BadChecksum);
        }

        Ok(Self {
            kind: datagram[CHECKSUM_SIZE],
            body: &datagram[CHECKSUM_SIZE + 1..],
            len: datagram.len(),
        })
    }

    pub fn expect_len(&self, expected: usize) -> Result<(), Discard> {
        if self.len != expected {
            return Err(Discard::WrongSize {
                expected,
                actual: self.len,
            });
        }
        Ok(())
    }

    pub fn expect_min_len(&self, min: usize) -> Result<(), Discard> {
        if self.len < min {
            return Err(Discard::TooShort(self.len));
        }
        Ok(())
    }

    pub fn nonce(&self) -> Result<Nonce, Discard> {
        self.array_at(0)
    }

    pub fn identifier(&self) -> Result<Identifier, Discard> {
        self.array_at(0)
    }

    pub fn payload(&self) -> &'a [u8] {
        self.body.get(IDENTIFIER_SIZE..).unwrap_or(&[])
    }

    pub fn array_at<const N: usize>(&self, offset: usize) -> Result<[u8; N], Discard> {
        self.body
            .get(offset..offset + N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(Discard::TooShort(self.len))
    }
}

struct FrameBuilder {
    buf: Vec<u8>,
}

impl FrameBuilder {
    fn new(kind: u8, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity);
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        buf.push(kind);
        Self { buf }
    }

    fn put(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn pad_to(mut self, len: usize) -> Self {
        self.buf.resize(len.max(self.buf.len()), 0);
        self
    }

    fn finish(mut self) -> Vec<u8> {
        write_checksum(&mut self.buf);
        self.buf
    }
}

pub fn encode_connection_request(nonce: &Nonce) -> Vec<u8> {
    FrameBuilder::new(
        ClientPacketType::ConnectionRequest as u8,
        CONNECTION_REQUEST_SIZE,
    )
    .put(nonce)
    .pad_to(CONNECTION_REQUEST_SIZE)
    .finish()
}

pub fn encode_challenge(client_nonce: &Nonce, server_nonce: &Nonce, has_password: bool) -> Vec<u8> {
    FrameBuilder::new(ServerPacketType::Challenge as u8, CHALLENGE_SIZE)
        .put(client_nonce)
        .put(server_nonce)
        .put(&[has_password as u8])
        .finish()
}

pub fn encode_rejection(kind: ServerPacketType, client_nonce: &Nonce) -> Vec<u8> {
    FrameBuilder::new(kind as u8, REJECTION_SIZE)
        .put(client_nonce)
        .finish()
}

pub fn encode_challenge_response(response: &ChallengeResponse) -> Vec<u8> {
    FrameBuilder::new(
        ClientPacketType::ChallengeResponse as u8,
        CHALLENGE_RESPONSE_SIZE,
    )
    .put(response)
    .finish()
}

pub fn encode_session(kind: u8, identifier: &Identifier, payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new(kind, HEADER_SIZE + payload.len())
        .put(identifier)
        .put(payload)
        .finish()
}
