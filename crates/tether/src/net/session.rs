use std::collections::VecDeque;

use crate::error::Result;

pub trait Peer {
    fn is_connection_pending(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn is_disconnected(&self) -> bool;
    fn has_datagrams(&self) -> bool;
    fn receive(&mut self) -> Option<Vec<u8>>;
    /// Does nothing unless connected.
    fn send(&mut self, datagram: &[u8]) -> Result<()>;
    /// Safe to call any number of times.
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Liveness {
    heard: f32,
    spoken: f32,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Starts overdue for a send so the first update speaks immediately.
    pub fn new() -> Self {
        Self {
            heard: 0.0,
            spoken: f32::INFINITY,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.heard += dt;
        self.spoken += dt;
    }

    pub fn heard_from(&mut self) {
        self.heard = 0.0;
    }

    pub fn spoken_to(&mut self) {
        self.spoken = 0.0;
    }

    pub fn speak_now(&mut self) {
        self.spoken = f32::INFINITY;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn since_heard(&self) -> f32 {
        self.heard
    }

    pub fn since_spoken(&self) -> f32 {
        self.spoken
    }
}

#[derive(Debug, Default)]
pub struct Inbox {
    datagrams: VecDeque<Vec<u8>>,
}

impl Inbox {
    pub fn push(&mut self, datagram: Vec<u8>) {
        self.datagrams.push_back(datagram);
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.datagrams.pop_front()
    }

    pub fn len(&self) -> usize {
        self.datagrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datagrams.is_empty()
    }

    pub fn clear(&mut self) {
        self.datagrams.clear();
    }
}
