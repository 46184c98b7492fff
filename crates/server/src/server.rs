use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{info, warn};
use tether::{Peer, Server, ServerEvent};

use crate::config::EchoConfig;

/// Runs a [`Server`] on a fixed tick and sends every message straight back
/// to the client that sent it.
pub struct EchoServer {
    server: Server,
    tick_duration: Duration,
    last_tick_time: Instant,
    deadline: Option<Instant>,
    echoed: u64,
}

impl EchoServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: EchoConfig) -> Result<Self> {
        let server = Server::bind(addr, config.server)?;
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);

        Ok(Self {
            server,
            tick_duration,
            last_tick_time: Instant::now(),
            deadline: config.duration.map(|d| Instant::now() + d),
            echoed: 0,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn run(&mut self) -> Result<()> {
        while self.deadline.is_none_or(|deadline| Instant::now() < deadline) {
            self.tick_once();

            let elapsed = self.last_tick_time.elapsed();
            if elapsed < self.tick_duration {
                std::thread::sleep(self.tick_duration - elapsed);
            }
        }

        let stats = self.server.stats();
        self.server.close()?;
        info!(
            "Echoed {} messages ({} datagrams in, {} out, {} discarded)",
            self.echoed, stats.datagrams_received, stats.datagrams_sent, stats.datagrams_discarded
        );
        Ok(())
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        // A failed send to one peer still leaves every other peer served.
        if let Err(err) = self.server.update(dt) {
            warn!("Server update failed: {}", err);
        }
        self.report_events();
        self.echo();
    }

    fn report_events(&mut self) {
        for event in self.server.drain_events() {
            match event {
                ServerEvent::ClientConnecting { addr } => {
                    info!("Connection request from {}", addr);
                }
                ServerEvent::ClientConnected { addr, identifier } => {
                    info!("Client {} connected ({:02x?})", addr, identifier);
                }
                ServerEvent::ClientDisconnected { addr, reason } => {
                    info!("Client {} {}", addr, reason.as_str());
                }
                ServerEvent::ConnectionDenied { addr, reason } => {
                    warn!("Denied {}: {}", addr, reason.as_str());
                }
            }
        }
    }

    fn echo(&mut self) {
        let addrs: Vec<SocketAddr> = self.server.clients().collect();
        for addr in addrs {
            let Some(mut client) = self.server.client(addr) else {
                continue;
            };
            while let Some(message) = client.receive() {
                match client.send(&message) {
                    Ok(()) => self.echoed += 1,
                    Err(err) => warn!("Echo to {} failed: {}", addr, err),
                }
            }
        }
    }
}
