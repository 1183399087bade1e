use std::collections::VecDeque;

use crate::engine::types::{HistorySample, OrderBookState};

/// Every level of every book update, oldest first.
#[derive(Debug, Default)]
pub struct HeatmapBuffer {
    samples: VecDeque<HistorySample>,
}

impl HeatmapBuffer {
    /// Copy both sides of `state` in, then evict from the front down to `capacity`.
    pub fn push_book(&mut self, state: &OrderBookState, capacity: usize) {
        let time_ms = state.last_update_ms;
        self.samples.extend(
            state
                .bids
                .iter()
                .chain(state.asks.iter())
                .map(|level| HistorySample { price: level.price, size: level.size, time_ms }),
        );
        if self.samples.len() > capacity {
            let excess = self.samples.len() - capacity;
            self.samples.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> + '_ {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::PriceLevel;
    use proptest::prelude::*;

    fn state(time_ms: u64, levels: usize) -> OrderBookState {
        let side: Vec<PriceLevel> = (0..levels).map(|i| PriceLevel { price: i as f64, size: 1.0 }).collect();
        OrderBookState { bids: side.clone(), asks: side, last_update_ms: time_ms }
    }

    #[test]
    fn test_samples_carry_update_time() {
        let mut buffer = HeatmapBuffer::default();
        buffer.push_book(&state(42, 2), 100);
        assert_eq!(buffer.len(), 4);
        assert!(buffer.iter().all(|s| s.time_ms == 42));
    }

    #[test]
    fn test_empty_book_adds_nothing() {
        let mut buffer = HeatmapBuffer::default();
        buffer.push_book(&OrderBookState::default(), 10);
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_cap_and_evicts_oldest(
            sizes in proptest::collection::vec(0usize..8, 1..40),
            capacity in 1usize..30,
        ) {
            let mut buffer = HeatmapBuffer::default();
            let mut pushed = Vec::new();
            for (t, &levels) in sizes.iter().enumerate() {
                let update = state(t as u64, levels);
                buffer.push_book(&update, capacity);
                pushed.extend(update.bids.iter().chain(update.asks.iter()).map(|l| (l.price, t as u64)));
                prop_assert!(buffer.len() <= capacity);
            }
            let kept: Vec<(f64, u64)> = buffer.iter().map(|s| (s.price, s.time_ms)).collect();
            let tail = &pushed[pushed.len() - kept.len()..];
            prop_assert_eq!(kept.as_slice(), tail);
        }
    }
}
