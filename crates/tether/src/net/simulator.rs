use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::stats::PacketLossSimulation;
use super::transport::Transport;

const FIRST_EPHEMERAL_PORT: u16 = 40000;

#[derive(Debug)]
struct SimState {
    mailboxes: HashMap<SocketAddr, VecDeque<(Vec<u8>, SocketAddr)>>,
    severed: HashSet<SocketAddr>,
    conditions: PacketLossSimulation,
    rng: StdRng,
    next_port: u16,
    dropped: u64,
}

impl SimState {
    fn deliver(&mut self, datagram: &[u8], from: SocketAddr, to: SocketAddr) {
        if self.severed.contains(&from) || self.severed.contains(&to) {
            self.dropped += 1;
            return;
        }
        if self.conditions.should_drop(&mut self.rng) {
            self.dropped += 1;
            return;
        }

        let copies = if self.conditions.should_duplicate(&mut self.rng) {
            2
        } else {
            1
        };

        let Some(mailbox) = self.mailboxes.get_mut(&to) else {
            self.dropped += 1;
            return;
        };
        for _ in 0..copies {
            mailbox.push_back((datagram.to_vec(), from));
        }
    }
}

/// In-memory datagram network for deterministic, single-threaded tests.
///
/// Delivery is instantaneous and in order unless impairments are
/// configured; datagrams addressed to unbound ports vanish like UDP.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                mailboxes: HashMap::new(),
                severed: HashSet::new(),
                conditions: PacketLossSimulation::default(),
                rng: StdRng::seed_from_u64(seed),
                next_port: FIRST_EPHEMERAL_PORT,
                dropped: 0,
            })),
        }
    }

    pub fn bind(&self, addr: SocketAddr) -> io::Result<SimSocket> {
        let mut state = self.state.borrow_mut();
        if state.mailboxes.contains_key(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} already bound", addr),
            ));
        }
        state.mailboxes.insert(addr, VecDeque::new());

        Ok(SimSocket {
            network: self.clone(),
            addr,
        })
    }

    pub fn bind_ephemeral(&self) -> io::Result<SimSocket> {
        let port = {
            let mut state = self.state.borrow_mut();
            let port = state.next_port;
            state.next_port = state.next_port.wrapping_add(1);
            port
        };
        self.bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    pub fn set_conditions(&self, conditions: PacketLossSimulation) {
        self.state.borrow_mut().conditions = conditions;
    }

    /// Silently drops everything sent to or from `addr` until healed.
    pub fn sever(&self, addr: SocketAddr) {
        self.state.borrow_mut().severed.insert(addr);
    }

    pub fn heal(&self, addr: SocketAddr) {
        self.state.borrow_mut().severed.remove(&addr);
    }

    pub fn inject(&self, datagram: &[u8], from: SocketAddr, to: SocketAddr) {
        if let Some(mailbox) = self.state.borrow_mut().mailboxes.get_mut(&to) {
            mailbox.push_back((datagram.to_vec(), from));
        }
    }

    pub fn intercept(&self, addr: SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> {
        self.state
            .borrow_mut()
            .mailboxes
            .get_mut(&addr)
            .map(|mailbox| mailbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.state
            .borrow()
            .mailboxes
            .get(&addr)
            .map_or(0, VecDeque::len)
    }

    pub fn dropped(&self) -> u64 {
        self.state.borrow().dropped
    }
}

#[derive(Debug)]
pub struct SimSocket {
    network: SimNetwork,
    addr: SocketAddr,
}

impl SimSocket {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transport for SimSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }

    fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.network
            .state
            .borrow_mut()
            .deliver(datagram, self.addr, addr);
        Ok(datagram.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut state = self.network.state.borrow_mut();
        let Some((datagram, from)) = state
            .mailboxes
            .get_mut(&self.addr)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };

        let size = datagram.len().min(buf.len());
        buf[..size].copy_from_slice(&datagram[..size]);
        Ok(Some((size, from)))
    }
}

impl Drop for SimSocket {
    fn drop(&mut self) {
        self.network.state.borrow_mut().mailboxes.remove(&self.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_in_order() {
        let network = SimNetwork::new();
        let mut a = network.bind_ephemeral().unwrap();
        let mut b = network.bind_ephemeral().unwrap();

        a.send_to(b"first", b.addr()).unwrap();
        a.send_to(b"second", b.addr()).unwrap();

        let mut buf = [0u8; 64];
        let (size, from) = b.recv_from(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..size], b"first");
        assert_eq!(from, a.addr());
        let (size, _) = b.recv_from(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..size], b"second");
        assert!(b.recv_from(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_unbound_destination_is_dropped() {
        let network = SimNetwork::new();
        let mut a = network.bind_ephemeral().unwrap();
        let nowhere: SocketAddr = "127.0.0.1:9".parse().unwrap();

        assert_eq!(a.send_to(b"lost", nowhere).unwrap(), 4);
        assert_eq!(network.dropped(), 1);
    }

    #[test]
    fn test_address_in_use() {
        let network = SimNetwork::new();
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let _socket = network.bind(addr).unwrap();

        let err = network.bind(addr).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[test]
    fn test_drop_unbinds() {
        let network = SimNetwork::new();
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        drop(network.bind(addr).unwrap());
        assert!(network.bind(addr).is_ok());
    }

    #[test]
    fn test_severed_address_loses_traffic() {
        let network = SimNetwork::new();
        let mut a = network.bind_ephemeral().unwrap();
        let b = network.bind_ephemeral().unwrap();

        network.sever(b.addr());
        a.send_to(b"gone", b.addr()).unwrap();
        assert_eq!(network.pending(b.addr()), 0);

        network.heal(b.addr());
        a.send_to(b"here", b.addr()).unwrap();
        assert_eq!(network.pending(b.addr()), 1);
    }

    #[test]
    fn test_duplication() {
        let network = SimNetwork::new();
        network.set_conditions(PacketLossSimulation {
            enabled: true,
            loss_percent: 0.0,
            duplicate_percent: 100.0,
        });
        let mut a = network.bind_ephemeral().unwrap();
        let b = network.bind_ephemeral().unwrap();

        a.send_to(b"twice", b.addr()).unwrap();
        assert_eq!(network.pending(b.addr()), 2);
    }
}
