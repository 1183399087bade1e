// Bitget v2 public socket (spot and USDT-futures)

use std::time::Duration;

use tracing::warn;

use super::bitget_types::{WsBook, WsFrame, WsTrade};
use super::{BookFrame, Frame, Heartbeat, ProtocolError, Venue, VenueKind};
use crate::engine::types::{Contiguity, SeqInfo, Trade, UpdateKind};
use crate::market_data::normaliser::{norm_side, parse_price, parse_size};

const BITGET_WS_URL: &str = "wss://ws.bitget.com/v2/ws/public";
// depth that selects the unbounded `books` channel
const FULL_BOOK_DEPTH: u32 = 400;

pub struct Bitget {
    pub kind: VenueKind,
    pub symbol: String, // upper-case, e.g. "BTCUSDT"
    pub depth: u32,
    pub ws_url: String,
    inst_type: &'static str,
    book_channel: String,
    heartbeat_every: Duration,
}

impl Bitget {
    pub fn spot(symbol: &str, depth: u32) -> Self {
        Self::new(VenueKind::BitgetSpot, "SPOT", symbol, depth)
    }

    pub fn futures(symbol: &str, depth: u32) -> Self {
        Self::new(VenueKind::BitgetFutures, "USDT-FUTURES", symbol, depth)
    }

    fn new(kind: VenueKind, inst_type: &'static str, symbol: &str, depth: u32) -> Self {
        Self {
            kind,
            symbol: symbol.to_uppercase(),
            depth,
            ws_url: BITGET_WS_URL.into(),
            inst_type,
            book_channel: format!("books{}", Self::depth_suffix(depth)),
            heartbeat_every: Duration::from_secs(30),
        }
    }

    // the full book is `books`, every other depth is a numeric suffix
    fn depth_suffix(depth: u32) -> String {
        if depth == FULL_BOOK_DEPTH {
            String::new()
        } else {
            depth.to_string()
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

    fn parse_book(&self, action: Option<&str>, data: serde_json::Value) -> Result<Frame, ProtocolError> {
        let mut books: Vec<WsBook> = serde_json::from_value(data)?;
        if books.is_empty() {
            return Err(ProtocolError::MissingField("data[0]"));
        }
        let book = books.swap_remove(0);
        let time_ms = book.ts.as_millis()?;
        let seq = book.seq.map(|id| SeqInfo { id, contiguity: Contiguity::Monotonic });

        let kind = match action {
            Some("snapshot") => Some(UpdateKind::Snapshot),
            Some("update") => Some(UpdateKind::Delta),
            _ => None,
        };
        let (bids, asks) = match kind {
            Some(_) => (norm_side(&book.bids)?, norm_side(&book.asks)?),
            None => (Vec::new(), Vec::new()),
        };
        Ok(Frame::Book(BookFrame { kind, bids, asks, time_ms, seq }))
    }

    fn parse_trades(&self, data: serde_json::Value) -> Result<Frame, ProtocolError> {
        let raw: Vec<WsTrade> = serde_json::from_value(data)?;
        let trades = raw
            .iter()
            .map(|t| {
                let taker_is_buyer = match t.side.as_str() {
                    "buy" => true,
                    "sell" => false,
                    other => return Err(ProtocolError::UnexpectedValue { field: "side", value: other.to_string() }),
                };
                Ok(Trade {
                    price: parse_price(&t.price)?,
                    size: parse_size(&t.size)?,
                    taker_is_buyer,
                    time_ms: t.ts.as_millis()?,
                })
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        Ok(Frame::Trades(trades))
    }
}

impl Venue for Bitget {
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
            "args": [
                { "instType": self.inst_type, "channel": self.book_channel, "instId": self.symbol },
                { "instType": self.inst_type, "channel": "trade", "instId": self.symbol }
            ]
        })
        .to_string()
    }

    fn parse(&self, raw: &str) -> Result<Option<Frame>, ProtocolError> {
        // heartbeat reply is plain text
        if raw == "pong" {
            return Ok(None);
        }
        let frame: WsFrame = serde_json::from_str(raw)?;

        match frame.event.as_deref() {
            Some("error") => {
                warn!(code = ?frame.code, msg = ?frame.msg, "Bitget rejected request");
                return Ok(None);
            }
            Some(_) => return Ok(None),
            None => {}
        }

        let (Some(arg), Some(data)) = (frame.arg, frame.data) else {
            return Ok(None);
        };
        if arg.channel == self.book_channel {
            self.parse_book(frame.action.as_deref(), data).map(Some)
        } else if arg.channel == "trade" {
            self.parse_trades(data).map(Some)
        } else {
            Ok(None)
        }
    }

    fn heartbeat(&self) -> Option<Heartbeat> {
        Some(Heartbeat { every: self.heartbeat_every, payload: "ping".into() })
    }
}
