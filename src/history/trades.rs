use std::collections::VecDeque;

use crate::engine::types::Trade;

/// Most recent trades in arrival order, bounded by count.
#[derive(Debug)]
pub struct TradeBuffer {
    trades: VecDeque<Trade>,
    capacity: usize,
}

impl TradeBuffer {
    pub fn new(capacity: usize) -> Self {
        // the configured cap may be far larger than what ever arrives
        Self { trades: VecDeque::with_capacity(capacity.min(4096)), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a batch and evict the oldest beyond capacity.
    pub fn extend(&mut self, batch: &[Trade]) {
        self.trades.extend(batch.iter().copied());
        if self.trades.len() > self.capacity {
            let excess = self.trades.len() - self.capacity;
            self.trades.drain(..excess);
        }
    }

    pub fn latest(&self) -> Option<&Trade> {
        self.trades.back()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trade> + '_ {
        self.trades.iter()
    }
}
