// Router fans adapter events out to the history and attached observers
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::engine::types::{MarketEvent, OrderBookState, Trade};
use crate::history::{History, HistoryConfig};

/// History shared between the dispatcher (writer) and renderers (readers).
pub type SharedHistory = Arc<RwLock<History>>;

/// Downstream consumer of canonical updates, e.g. a heatmap renderer.
///
/// Every book call carries both full sides, never a diff.
pub trait MarketObserver: Send {
    fn update_order_book(&mut self, state: &OrderBookState) -> anyhow::Result<()>;
    fn add_trades(&mut self, trades: &[Trade]) -> anyhow::Result<()>;
}

pub struct Dispatcher {
    history: SharedHistory,
    observers: Vec<Box<dyn MarketObserver>>,
}

impl Dispatcher {
    pub fn new(config: HistoryConfig) -> Self {
        Self { history: Arc::new(RwLock::new(History::new(config))), observers: Vec::new() }
    }

    pub fn attach(&mut self, observer: Box<dyn MarketObserver>) {
        self.observers.push(observer);
    }

    pub fn history(&self) -> SharedHistory {
        Arc::clone(&self.history)
    }

    pub fn max_age(&self) -> Duration {
        self.history.read().max_age()
    }

    pub fn set_max_age(&self, max_age: Duration) {
        info!(max_age_secs = max_age.as_secs_f64(), "History window changed");
        self.history.write().set_max_age(max_age);
    }

    pub fn update_order_book(&mut self, state: &OrderBookState) {
        self.history.write().record_book(state);
        for (index, observer) in self.observers.iter_mut().enumerate() {
            if let Err(e) = observer.update_order_book(state) {
                warn!(observer = index, error = %e, "Observer failed on book update");
            }
        }
    }

    pub fn add_trades(&mut self, trades: &[Trade]) {
        self.history.write().record_trades(trades);
        for (index, observer) in self.observers.iter_mut().enumerate() {
            if let Err(e) = observer.add_trades(trades) {
                warn!(observer = index, error = %e, "Observer failed on trades");
            }
        }
    }

    pub fn dispatch(&mut self, event: MarketEvent) {
        match event {
            MarketEvent::Book(state) => self.update_order_book(&state),
            MarketEvent::Trades(trades) => self.add_trades(&trades),
        }
    }

    /// Drain `rx` until every sender is gone. Returns the number of events handled.
    #[instrument(skip_all)]
    pub async fn run(&mut self, mut rx: mpsc::Receiver<MarketEvent>) -> u64 {
        let mut handled = 0u64;
        while let Some(event) = rx.recv().await {
            self.dispatch(event);
            handled += 1;
        }
        debug!(handled, "Event channel closed");
        handled
    }
}
