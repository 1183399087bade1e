// Bybit v5 public streams (USDT perpetual and spot)

use std::time::Duration;

use tracing::warn;

use super::bybit_types::{WsBook, WsFrame, WsTrade};
use super::{BookFrame, Frame, Heartbeat, ProtocolError, Venue, VenueKind};
use crate::engine::types::{Contiguity, SeqInfo, Trade, UpdateKind};
use crate::market_data::normaliser::{norm_side, parse_price, parse_size};

pub struct Bybit {
    pub kind: VenueKind,
    pub symbol: String, // e.g. "BTCUSDT"
    pub depth: u32,
    pub ws_url: String, // "wss://stream.bybit.com/v5/public/linear"
    book_topic: String,
    trade_topic: String,
    heartbeat_every: Duration,
}

impl Bybit {
    pub fn linear(symbol: &str, depth: u32) -> Self {
        Self::new(VenueKind::BybitLinear, "wss://stream.bybit.com/v5/public/linear", symbol, depth)
    }

    pub fn spot(symbol: &str, depth: u32) -> Self {
        Self::new(VenueKind::BybitSpot, "wss://stream.bybit.com/v5/public/spot", symbol, depth)
    }

    fn new(kind: VenueKind, ws_url: &str, symbol: &str, depth: u32) -> Self {
        let symbol = symbol.to_uppercase();
        Self {
            kind,
            book_topic: format!("orderbook.{depth}.{symbol}"),
            trade_topic: format!("publicTrade.{symbol}"),
            symbol,
            depth,
            ws_url: ws_url.into(),
            heartbeat_every: Duration::from_secs(20),
        }
    }

    pub fn with_endpoint(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_heartbeat_every(mut self, every: Duration) -> Self {
        self.heartbeat_every = every;
        self
    }

    fn parse_book(&self, frame: WsFrame) -> Result<Frame, ProtocolError> {
        let kind = match frame.kind.as_deref() {
            Some("snapshot") => UpdateKind::Snapshot,
            Some("delta") => UpdateKind::Delta,
            other => {
                return Err(ProtocolError::UnexpectedValue { field: "type", value: other.unwrap_or_default().to_string() })
            }
        };
        let time_ms = frame.cts.or(frame.ts).ok_or(ProtocolError::MissingField("cts"))?;
        let book: WsBook = serde_json::from_value(frame.data.ok_or(ProtocolError::MissingField("data"))?)?;

        Ok(Frame::Book(BookFrame {
            kind: Some(kind),
            bids: norm_side(&book.b)?,
            asks: norm_side(&book.a)?,
            time_ms,
            seq: Some(SeqInfo { id: book.u, contiguity: Contiguity::Contiguous }),
        }))
    }

    fn parse_trades(&self, frame: WsFrame) -> Result<Frame, ProtocolError> {
        let raw: Vec<WsTrade> = serde_json::from_value(frame.data.ok_or(ProtocolError::MissingField("data"))?)?;
        let trades = raw
            .iter()
            .map(|t| {
                let taker_is_buyer = match t.side.as_str() {
                    "Buy" => true,
                    "Sell" => false,
                    other => return Err(ProtocolError::UnexpectedValue { field: "S", value: other.to_string() }),
                };
                Ok(Trade { price: parse_price(&t.p)?, size: parse_size(&t.v)?, taker_is_buyer, time_ms: t.time })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Frame::Trades(trades))
    }
}

impl Venue for Bybit {
    fn kind(&self) -> VenueKind {
        self.kind
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn endpoint(&self) -> String {
        self.ws_url.clone()
    }

    fn subscribe_payload(&self) -> String {
        serde_json::json!({
            "op": "subscribe",
            "args": [self.book_topic, self.trade_topic]
        })
        .to_string()
    }

    fn parse(&self, raw: &str) -> Result<Option<Frame>, ProtocolError> {
        let frame: WsFrame = serde_json::from_str(raw)?;

        if frame.success == Some(false) {
            warn!(op = ?frame.op, ret_msg = ?frame.ret_msg, "Bybit rejected request");
            return Ok(None);
        }

        match frame.topic.as_deref() {
            Some(topic) if topic == self.book_topic => self.parse_book(frame).map(Some),
            Some(topic) if topic == self.trade_topic => self.parse_trades(frame).map(Some),
            _ => Ok(None),
        }
    }

    fn heartbeat(&self) -> Option<Heartbeat> {
        Some(Heartbeat { every: self.heartbeat_every, payload: r#"{"op":"ping"}"#.into() })
    }
}
