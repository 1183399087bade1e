// Shared traits, frames and errors for venue adapters

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;

use crate::engine::types::{BookError, MarketEvent, SeqInfo, Trade, UpdateKind};
use crate::settings::{AppConfig, ConfigError};

pub mod adapter;
pub mod binance;
pub mod binance_types;
pub mod bitget;
pub mod bitget_types;
pub mod bybit;
pub mod bybit_types;

pub use adapter::Adapter;

/// A frame that could not be read as the shape its channel promises.
/// Dropped by the adapter; the connection stays up.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("unexpected {field}: {value:?}")]
    UnexpectedValue { field: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("connection is not open")]
    NotConnected,
    #[error("connection closed by peer")]
    Closed,
    #[error("gave up after {0} reconnect attempts")]
    RetriesExhausted(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Consistency(#[from] BookError),
}

/// Book payload in canonical units, before it touches the book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookFrame {
    // None: the venue sent a book frame that neither replaces nor patches;
    // only the timestamp is refreshed
    pub kind: Option<UpdateKind>,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
    pub time_ms: u64,
    pub seq: Option<SeqInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Book(BookFrame),
    Trades(Vec<Trade>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub every: Duration,
    pub payload: String,
}

/// Pure, per-venue protocol knowledge: where to connect, what to subscribe
/// to, and how to turn one text frame into a canonical [`Frame`].
pub trait Venue: Send + Sync + 'static {
    fn kind(&self) -> VenueKind;
    fn symbol(&self) -> &str;
    fn depth(&self) -> u32;
    fn endpoint(&self) -> String;
    fn subscribe_payload(&self) -> String;

    /// `Ok(None)` for frames on no subscribed channel (acks, pongs, ...).
    fn parse(&self, raw: &str) -> Result<Option<Frame>, ProtocolError>;

    /// Whether the venue always opens a book channel with a snapshot.
    fn requires_snapshot(&self) -> bool {
        true
    }

    fn heartbeat(&self) -> Option<Heartbeat> {
        None
    }

    fn update_interval(&self) -> Duration {
        self.kind().default_update_interval(self.depth())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VenueKind {
    #[serde(alias = "bybitusdtperp")]
    BybitLinear,
    #[serde(alias = "bybitspot")]
    BybitSpot,
    #[serde(alias = "binancespot")]
    BinanceSpot,
    #[serde(alias = "binancefutures")]
    BinanceFutures,
    #[serde(alias = "bitgetspot")]
    BitgetSpot,
    #[serde(alias = "bitgetfutures")]
    BitgetFutures,
}

impl VenueKind {
    pub const ALL: [VenueKind; 6] = [
        VenueKind::BybitLinear,
        VenueKind::BybitSpot,
        VenueKind::BinanceSpot,
        VenueKind::BinanceFutures,
        VenueKind::BitgetSpot,
        VenueKind::BitgetFutures,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VenueKind::BybitLinear => "bybit-linear",
            VenueKind::BybitSpot => "bybit-spot",
            VenueKind::BinanceSpot => "binance-spot",
            VenueKind::BinanceFutures => "binance-futures",
            VenueKind::BitgetSpot => "bitget-spot",
            VenueKind::BitgetFutures => "bitget-futures",
        }
    }

    pub fn default_depth(self) -> u32 {
        match self {
            VenueKind::BybitLinear | VenueKind::BybitSpot => 50,
            VenueKind::BinanceSpot | VenueKind::BinanceFutures => 20,
            VenueKind::BitgetSpot | VenueKind::BitgetFutures => 15,
        }
    }

    pub fn supported_depths(self) -> &'static [u32] {
        match self {
            VenueKind::BybitLinear => &[1, 50, 200, 500, 1000],
            VenueKind::BybitSpot => &[1, 50, 200, 1000],
            VenueKind::BinanceSpot | VenueKind::BinanceFutures => &[5, 10, 20],
            // 400 is the full book
            VenueKind::BitgetSpot | VenueKind::BitgetFutures => &[1, 5, 15, 400],
        }
    }

    /// Typical push cadence of the book channel at `depth`.
    pub fn default_update_interval(self, depth: u32) -> Duration {
        let ms = match self {
            VenueKind::BybitLinear | VenueKind::BybitSpot => match depth {
                1 => 10,
                50 => 20,
                200 => 100,
                500 => 100,
                _ => 200,
            },
            VenueKind::BinanceSpot | VenueKind::BinanceFutures => 100,
            VenueKind::BitgetSpot | VenueKind::BitgetFutures => match depth {
                1 => 100,
                5 | 15 => 150,
                _ => 200,
            },
        };
        Duration::from_millis(ms)
    }
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "bybit-linear" | "bybitusdtperp" => VenueKind::BybitLinear,
            "bybit-spot" | "bybitspot" => VenueKind::BybitSpot,
            "binance-spot" | "binancespot" => VenueKind::BinanceSpot,
            "binance-futures" | "binancefutures" => VenueKind::BinanceFutures,
            "bitget-spot" | "bitgetspot" => VenueKind::BitgetSpot,
            "bitget-futures" | "bitgetfutures" => VenueKind::BitgetFutures,
            _ => return Err(format!("unknown venue {s:?}")),
        };
        Ok(kind)
    }
}

/// Lifecycle every adapter exposes, whatever the venue.
///
/// Book and trade updates leave through the `tx` channel handed to
/// [`VenueAdapter::run`]: one [`MarketEvent::Book`] per applied book frame,
/// one [`MarketEvent::Trades`] per trade frame.
#[async_trait::async_trait]
pub trait VenueAdapter: Send {
    fn kind(&self) -> VenueKind;
    fn depth(&self) -> u32;
    fn update_interval(&self) -> Duration;

    /// Open the socket and send the subscribe payload. Never retries.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Classify and apply one inbound text frame.
    fn handle_message(&mut self, raw: &str) -> Result<Option<MarketEvent>, AdapterError>;

    /// Drive the connection until shutdown, reconnecting per policy.
    async fn run(&mut self, tx: mpsc::Sender<MarketEvent>, shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Build the adapter selected by `config`.
pub fn build_adapter(config: &AppConfig) -> Result<Box<dyn VenueAdapter>, ConfigError> {
    config.validate()?;
    let depth = config.depth();
    let symbol = config.symbol.as_str();
    let reconnect = config.reconnect.clone();

    let adapter: Box<dyn VenueAdapter> = match config.venue {
        VenueKind::BybitLinear => Box::new(Adapter::new(bybit::Bybit::linear(symbol, depth), reconnect)),
        VenueKind::BybitSpot => Box::new(Adapter::new(bybit::Bybit::spot(symbol, depth), reconnect)),
        VenueKind::BinanceSpot => Box::new(Adapter::new(binance::Binance::spot(symbol, depth), reconnect)),
        VenueKind::BinanceFutures => Box::new(Adapter::new(binance::Binance::futures(symbol, depth), reconnect)),
        VenueKind::BitgetSpot => Box::new(Adapter::new(bitget::Bitget::spot(symbol, depth), reconnect)),
        VenueKind::BitgetFutures => Box::new(Adapter::new(bitget::Bitget::futures(symbol, depth), reconnect)),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_names_round_trip() {
        for kind in VenueKind::ALL {
            assert_eq!(kind.as_str().parse::<VenueKind>().unwrap(), kind);
            assert!(kind.supported_depths().contains(&kind.default_depth()));
        }
        assert_eq!("bybitusdtperp".parse::<VenueKind>().unwrap(), VenueKind::BybitLinear);
        assert!("kraken".parse::<VenueKind>().is_err());
    }

    #[test]
    fn test_build_adapter_uses_venue_defaults() {
        let config = AppConfig { venue: VenueKind::BitgetSpot, symbol: "btcusdt".into(), ..AppConfig::default() };
        let adapter = build_adapter(&config).unwrap();
        assert_eq!(adapter.kind(), VenueKind::BitgetSpot);
        assert_eq!(adapter.depth(), 15);
        assert_eq!(adapter.update_interval(), Duration::from_millis(150));
    }

    #[test]
    fn test_build_adapter_rejects_bad_depth() {
        let config = AppConfig { venue: VenueKind::BinanceSpot, depth: Some(50), ..AppConfig::default() };
        assert!(matches!(build_adapter(&config), Err(ConfigError::UnsupportedDepth { .. })));
    }
}
