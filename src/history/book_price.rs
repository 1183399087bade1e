use std::collections::VecDeque;

use tracing::trace;

use crate::engine::types::{BookPriceSample, OrderBookState};

// Top of book per update, drawn as the bid/ask lines
#[derive(Debug, Default)]
pub struct BookPriceBuffer {
    samples: VecDeque<BookPriceSample>,
}

impl BookPriceBuffer {
    /// Returns the recorded sample; `None` while either side is empty.
    pub fn push_book(&mut self, state: &OrderBookState, capacity: usize) -> Option<BookPriceSample> {
        let (Some(bid), Some(ask)) = (state.best_bid(), state.best_ask()) else {
            trace!(time_ms = state.last_update_ms, "One-sided book, no price sample");
            return None;
        };
        let sample = BookPriceSample { time_ms: state.last_update_ms, best_bid: bid.price, best_ask: ask.price };
        self.samples.push_back(sample);
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
        Some(sample)
    }

    pub fn latest(&self) -> Option<&BookPriceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookPriceSample> + '_ {
        self.samples.iter()
    }
}
