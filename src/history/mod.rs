//! Bounded, time-windowed history of book levels, top of book and trades.
//!
//! Buffers are capped by count when written and filtered by age when read.
//! Both limits derive from the same `max_age`, so moving the window slider
//! reshapes what gets kept as well as what gets shown.

use std::time::Duration;

use crate::engine::types::{BookPriceSample, HistorySample, OrderBookState, Trade};

pub mod book_price;
pub mod heatmap;
pub mod trades;

pub use book_price::BookPriceBuffer;
pub use heatmap::HeatmapBuffer;
pub use trades::TradeBuffer;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    pub max_age: Duration,
    /// Expected time between two book updates.
    pub update_interval: Duration,
    pub depth: u32,
    pub trade_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30),
            update_interval: Duration::from_millis(20),
            depth: 50,
            trade_capacity: 1000,
        }
    }
}

impl HistoryConfig {
    /// Book updates expected inside one window, never less than one.
    pub fn updates_per_window(&self) -> usize {
        let interval = self.update_interval.as_millis().max(1);
        usize::try_from(self.max_age.as_millis() / interval).unwrap_or(usize::MAX).max(1)
    }

    /// Saturates instead of wrapping for absurdly long windows.
    pub fn heatmap_capacity(&self) -> usize {
        self.updates_per_window().saturating_mul(self.depth as usize).saturating_mul(2)
    }

    pub fn book_price_capacity(&self) -> usize {
        self.updates_per_window()
    }
}

/// Anything stamped with an exchange time in epoch milliseconds.
pub trait Timestamped {
    fn time_ms(&self) -> u64;

    fn is_visible(&self, now_ms: u64, max_age: Duration) -> bool {
        now_ms.saturating_sub(self.time_ms()) <= u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Timestamped for HistorySample {
    fn time_ms(&self) -> u64 {
        self.time_ms
    }
}

impl Timestamped for BookPriceSample {
    fn time_ms(&self) -> u64 {
        self.time_ms
    }
}

impl Timestamped for Trade {
    fn time_ms(&self) -> u64 {
        self.time_ms
    }
}

#[derive(Debug)]
pub struct History {
    config: HistoryConfig,
    heatmap: HeatmapBuffer,
    book_prices: BookPriceBuffer,
    trades: TradeBuffer,
    latest_book: Option<OrderBookState>,
}

impl History {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            heatmap: HeatmapBuffer::default(),
            book_prices: BookPriceBuffer::default(),
            trades: TradeBuffer::new(config.trade_capacity),
            latest_book: None,
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn max_age(&self) -> Duration {
        self.config.max_age
    }

    /// Takes effect on the next read and the next write; nothing is evicted now.
    pub fn set_max_age(&mut self, max_age: Duration) {
        self.config.max_age = max_age;
    }

    pub fn record_book(&mut self, state: &OrderBookState) {
        self.heatmap.push_book(state, self.config.heatmap_capacity());
        self.book_prices.push_book(state, self.config.book_price_capacity());
        self.latest_book = Some(state.clone());
    }

    pub fn record_trades(&mut self, trades: &[Trade]) {
        self.trades.extend(trades);
    }

    pub fn heatmap(&self) -> &HeatmapBuffer {
        &self.heatmap
    }

    pub fn book_prices(&self) -> &BookPriceBuffer {
        &self.book_prices
    }

    pub fn trades(&self) -> &TradeBuffer {
        &self.trades
    }

    pub fn latest_book(&self) -> Option<&OrderBookState> {
        self.latest_book.as_ref()
    }

    pub fn visible_heatmap(&self, now_ms: u64) -> impl Iterator<Item = &HistorySample> + '_ {
        let max_age = self.config.max_age;
        self.heatmap.iter().filter(move |s| s.is_visible(now_ms, max_age))
    }

    pub fn visible_book_prices(&self, now_ms: u64) -> impl Iterator<Item = &BookPriceSample> + '_ {
        let max_age = self.config.max_age;
        self.book_prices.iter().filter(move |s| s.is_visible(now_ms, max_age))
    }

    pub fn visible_trades(&self, now_ms: u64) -> impl Iterator<Item = &Trade> + '_ {
        let max_age = self.config.max_age;
        self.trades.iter().filter(move |t| t.is_visible(now_ms, max_age))
    }

    /// Lowest and highest price among the visible heatmap samples.
    pub fn price_range(&self, now_ms: u64) -> Option<(f64, f64)> {
        self.visible_heatmap(now_ms).fold(None, |range, s| match range {
            None => Some((s.price, s.price)),
            Some((lo, hi)) => Some((lo.min(s.price), hi.max(s.price))),
        })
    }

    pub fn latest_mid(&self) -> Option<f64> {
        self.book_prices.latest().map(|s| s.mid())
    }
}
