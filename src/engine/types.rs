use std::time::{SystemTime, UNIX_EPOCH};

// One aggregated price level. A level with size 0 never exists in a book.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// Exchange-agnostic view of one symbol's book.
///
/// Both sides are ascending by price with unique prices. Consumers must not
/// assume every bid sits below every ask: a late snapshot can cross the book
/// for a moment.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct OrderBookState {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub last_update_ms: u64,
}

impl OrderBookState {
    /// Highest bid with a nonzero size.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.iter().rev().find(|l| l.size > 0.0).copied()
    }

    /// Lowest ask with a nonzero size.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.iter().find(|l| l.size > 0.0).copied()
    }

    pub fn level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

// Executed trade as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Trade {
    pub price: f64,
    pub size: f64,
    pub taker_is_buyer: bool,
    pub time_ms: u64,
}

// A book level copied out at the moment of a book update (heatmap cell)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HistorySample {
    pub price: f64,
    pub size: f64,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BookPriceSample {
    pub time_ms: u64,
    pub best_bid: f64,
    pub best_ask: f64,
}

impl BookPriceSample {
    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }
}

/// Whether a book payload replaces the book or patches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Snapshot,
    Delta,
}

/// How a venue's sequence numbers relate from one book message to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contiguity {
    /// Only strictly increasing, gaps are normal.
    Monotonic,
    /// The id must be exactly one past the previous message's id.
    Contiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqInfo {
    pub id: u64,
    pub contiguity: Contiguity,
}

// Canonical events leaving an adapter
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    // Full book after a snapshot or delta has been applied
    Book(OrderBookState),
    // Every trade from one inbound trade message, in message order
    Trades(Vec<Trade>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookError {
    #[error("delta received before any snapshot")]
    DeltaBeforeSnapshot,
    #[error("stale update: received id {received}, last applied {last}")]
    StaleUpdate { received: u64, last: u64 },
    #[error("sequence gap: expected id {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },
}

impl BookError {
    /// A stale update is harmless; anything else means the book can no
    /// longer be trusted until a fresh snapshot arrives.
    pub fn needs_resync(&self) -> bool {
        !matches!(self, BookError::StaleUpdate { .. })
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
