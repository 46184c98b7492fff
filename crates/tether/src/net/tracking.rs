use std::collections::BTreeSet;

pub const DEFAULT_WINDOW: usize = 256;

/// Sliding window over recently received sequence numbers.
///
/// Each number is accepted at most once. Numbers that fall `capacity` or
/// more behind the newest accepted one are rejected as stale, so
/// traffic reordered further than the window must be resent by the caller.
#[derive(Debug, Clone)]
pub struct SequenceWindow {
    seen: BTreeSet<u64>,
    capacity: usize,
    outgoing: u64,
}

impl Default for SequenceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, 0)
    }
}

impl SequenceWindow {
    pub fn new(capacity: usize, initial_outgoing: u64) -> Self {
        Self {
            seen: BTreeSet::new(),
            capacity: capacity.max(1),
            outgoing: initial_outgoing,
        }
    }

    pub fn record_received(&mut self, sequence: u64) -> bool {
        let Some(&newest) = self.seen.last() else {
            self.seen.insert(sequence);
            return true;
        };

        if self.seen.contains(&sequence) {
            return false;
        }

        if sequence.saturating_add(self.capacity as u64) <= newest {
            return false;
        }

        self.seen.insert(sequence);
        while self.seen.len() > self.capacity {
            self.seen.pop_first();
        }

        true
    }

    pub fn next_outgoing(&mut self) -> u64 {
        let sequence = self.outgoing;
        self.outgoing = self.outgoing.wrapping_add(1);
        sequence
    }

    pub fn newest(&self) -> Option<u64> {
        self.seen.last().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
