use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::protocol::MAX_PACKET_SIZE;
use super::stats::NetworkStats;

pub trait Transport {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Returns `Ok(None)` once nothing more is waiting.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn bind_for(remote: SocketAddr) -> io::Result<Self> {
        match remote {
            SocketAddr::V4(_) => Self::bind("0.0.0.0:0"),
            SocketAddr::V6(_) => Self::bind("[::]:0"),
        }
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(datagram, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        loop {
            match self.socket.recv_from(buf) {
                Ok(received) => return Ok(Some(received)),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP unreachable for an earlier send, reported on some platforms.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct Endpoint<T: Transport> {
    transport: T,
    stats: NetworkStats,
    recv_buffer: [u8; MAX_PACKET_SIZE],
}

impl<T: Transport> Endpoint<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> io::Result<()> {
        let bytes = self.transport.send_to(datagram, addr)?;

        self.stats.datagrams_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(())
    }

    pub fn receive(&mut self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        let mut datagrams = Vec::new();

        while let Some((size, addr)) = self.transport.recv_from(&mut self.recv_buffer)? {
            self.stats.datagrams_received += 1;
            self.stats.bytes_received += size as u64;
            datagrams.push((self.recv_buffer[..size].to_vec(), addr));
        }

        Ok(datagrams)
    }

    pub fn record_discard(&mut self) {
        self.stats.datagrams_discarded += 1;
    }
}
