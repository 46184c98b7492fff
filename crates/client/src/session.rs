use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use tether::{Client, Peer};

use crate::config::ChatConfig;

pub struct ChatSession {
    client: Client,
    tick_duration: Duration,
    last_tick_time: Instant,
    linger: Duration,
}

impl ChatSession {
    pub fn connect(host: &str, port: u16, config: ChatConfig) -> Result<Self> {
        let client = Client::connect(host, port, config.client)
            .with_context(|| format!("failed to open a connection to {}:{}", host, port))?;

        Ok(Self {
            client,
            tick_duration: Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64),
            last_tick_time: Instant::now(),
            linger: config.linger,
        })
    }

    pub fn wait_until_connected(&mut self) -> Result<()> {
        info!("Connecting to {}", self.client.server_addr());
        while !self.client.is_connected() {
            self.tick()?;
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let elapsed = self.last_tick_time.elapsed();
        if elapsed < self.tick_duration {
            thread::sleep(self.tick_duration - elapsed);
        }

        let now = Instant::now();
        let dt = (now - self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        self.client
            .update(dt)
            .with_context(|| format!("connection to {} lost", self.client.server_addr()))?;

        while let Some(reply) = self.client.receive() {
            println!("{}", String::from_utf8_lossy(&reply));
        }
        Ok(())
    }

    pub fn send_all(&mut self, messages: &[String]) -> Result<()> {
        for message in messages {
            self.send(message)?;
        }
        self.linger()
    }

    pub fn relay_stdin(&mut self) -> Result<()> {
        let lines = spawn_stdin_reader();
        loop {
            match lines.try_recv() {
                Ok(line) => self.send(&line)?,
                Err(TryRecvError::Empty) => self.tick()?,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        self.linger()
    }

    fn send(&mut self, message: &str) -> Result<()> {
        if !self.client.is_connected() {
            bail!("not connected");
        }
        debug!("Sending {} bytes", message.len());
        self.client.send(message.as_bytes())?;
        Ok(())
    }

    fn linger(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.linger;
        while Instant::now() < deadline {
            self.tick()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.client.close()?;
        let stats = self.client.stats();
        debug!(
            "Sent {} datagrams, received {}",
            stats.datagrams_sent, stats.datagrams_received
        );
        Ok(())
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
