use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use tracing::{debug, instrument, trace};

use crate::engine::types::{BookError, Contiguity, OrderBookState, PriceLevel, SeqInfo};

// price -> aggregate size; the map keeps each side sorted and unique by price
type Ladder = BTreeMap<OrderedFloat<f64>, f64>;

#[derive(Debug, Default, PartialEq)]
pub struct Book {
    bids: Ladder,
    asks: Ladder,
    last_update_ms: u64,
    last_seq: Option<u64>,
    has_snapshot: bool,
    // venues that always open with a snapshot treat an early delta as an error
    require_snapshot: bool,
}

impl Book {
    pub fn new(require_snapshot: bool) -> Self {
        Book { require_snapshot, ..Default::default() }
    }

    pub fn is_synced(&self) -> bool {
        self.has_snapshot || !self.require_snapshot
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    /// Forget everything; the next delta must be preceded by a snapshot again.
    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_seq = None;
        self.has_snapshot = false;
        debug!("Book reset, awaiting snapshot");
    }

    /// Replace both sides wholesale. Zero-size entries are dropped.
    #[instrument(level = "trace", skip(self, bids, asks), fields(bids = bids.len(), asks = asks.len()))]
    pub fn apply_snapshot(&mut self, bids: &[(f64, f64)], asks: &[(f64, f64)], time_ms: u64, seq: Option<SeqInfo>) {
        self.bids = Self::ladder_from(bids);
        self.asks = Self::ladder_from(asks);
        self.last_update_ms = time_ms;
        self.has_snapshot = true;
        if let Some(seq) = seq {
            self.last_seq = Some(seq.id);
        }
        trace!(bid_levels = self.bids.len(), ask_levels = self.asks.len(), "Applied snapshot");
    }

    /// Upsert or remove individual levels.
    ///
    /// `size == 0` removes the level at `price` (no-op when absent), any other
    /// size replaces or inserts it. Nothing is touched when the sequence check
    /// fails.
    #[instrument(level = "trace", skip(self, bids, asks), fields(bids = bids.len(), asks = asks.len()))]
    pub fn apply_delta(
        &mut self,
        bids: &[(f64, f64)],
        asks: &[(f64, f64)],
        time_ms: u64,
        seq: Option<SeqInfo>,
    ) -> Result<(), BookError> {
        if self.require_snapshot && !self.has_snapshot {
            return Err(BookError::DeltaBeforeSnapshot);
        }
        if let (Some(seq), Some(last)) = (seq, self.last_seq) {
            if seq.id <= last {
                return Err(BookError::StaleUpdate { received: seq.id, last });
            }
            if seq.contiguity == Contiguity::Contiguous && seq.id != last + 1 {
                return Err(BookError::SequenceGap { expected: last + 1, received: seq.id });
            }
        }

        for &(price, size) in bids {
            Self::apply_level(&mut self.bids, price, size);
        }
        for &(price, size) in asks {
            Self::apply_level(&mut self.asks, price, size);
        }
        self.last_update_ms = time_ms;
        if let Some(seq) = seq {
            self.last_seq = Some(seq.id);
        }
        trace!(bid_levels = self.bids.len(), ask_levels = self.asks.len(), "Applied delta");
        Ok(())
    }

    /// Refresh the timestamp without changing any level.
    pub fn touch(&mut self, time_ms: u64) {
        self.last_update_ms = time_ms;
    }

    pub fn best_bid(&self) -> Option<(f64, f64)> {
        self.bids.iter().next_back().map(|(p, s)| (p.0, *s))
    }

    pub fn best_ask(&self) -> Option<(f64, f64)> {
        self.asks.iter().next().map(|(p, s)| (p.0, *s))
    }

    pub fn spread(&self) -> Option<f64> {
        let (bid, _) = self.best_bid()?;
        let (ask, _) = self.best_ask()?;
        Some(ask - bid)
    }

    pub fn bid_size_at(&self, price: f64) -> Option<f64> {
        self.bids.get(&OrderedFloat(price)).copied()
    }

    pub fn ask_size_at(&self, price: f64) -> Option<f64> {
        self.asks.get(&OrderedFloat(price)).copied()
    }

    /// Copy out the book as ascending level lists.
    pub fn state(&self) -> OrderBookState {
        OrderBookState {
            bids: Self::levels(&self.bids),
            asks: Self::levels(&self.asks),
            last_update_ms: self.last_update_ms,
        }
    }

    fn ladder_from(pairs: &[(f64, f64)]) -> Ladder {
        pairs
            .iter()
            .filter(|(_, size)| *size != 0.0)
            .map(|&(price, size)| (OrderedFloat(price), size))
            .collect()
    }

    fn apply_level(ladder: &mut Ladder, price: f64, size: f64) {
        if size == 0.0 {
            ladder.remove(&OrderedFloat(price));
        } else {
            ladder.insert(OrderedFloat(price), size);
        }
    }

    fn levels(ladder: &Ladder) -> Vec<PriceLevel> {
        ladder.iter().map(|(p, s)| PriceLevel { price: p.0, size: *s }).collect()
    }
}
