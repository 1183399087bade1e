// Binance combined streams (spot and USDT-M futures)

use tracing::warn;

use super::binance_types::{CombinedFrame, DepthUpdate, PartialDepth, WsTrade};
use super::{BookFrame, Frame, ProtocolError, Venue, VenueKind};
use crate::engine::types::{now_ms, Contiguity, SeqInfo, Trade, UpdateKind};
use crate::market_data::normaliser::{norm_side, parse_price, parse_size};

pub struct Binance {
    pub kind: VenueKind,
    pub symbol: String, // lower-case, e.g. "btcusdt"
    pub depth: u32,
    pub ws_url: String,
    depth_stream: String,
    trade_stream: String,
}

impl Binance {
    pub fn spot(symbol: &str, depth: u32) -> Self {
        Self::new(VenueKind::BinanceSpot, "wss://stream.binance.com:9443/stream", symbol, depth, "trade")
    }

    pub fn futures(symbol: &str, depth: u32) -> Self {
        Self::new(VenueKind::BinanceFutures, "wss://fstream.binance.com/stream", symbol, depth, "aggTrade")
    }

    fn new(kind: VenueKind, ws_url: &str, symbol: &str, depth: u32, trade_channel: &str) -> Self {
        let symbol = symbol.to_lowercase();
        Self {
            kind,
            depth_stream: format!("{symbol}@depth{depth}@100ms"),
            trade_stream: format!("{symbol}@{trade_channel}"),
            symbol,
            depth,
            ws_url: ws_url.into(),
        }
    }

    pub fn with_endpoint(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    fn parse_depth(&self, data: serde_json::Value) -> Result<Frame, ProtocolError> {
        let is_delta = data.get("e").and_then(serde_json::Value::as_str) == Some("depthUpdate");

        // futures partial depth also arrives as depthUpdate and is merged as a
        // delta, so levels that leave the top N linger until sized to zero
        let frame = if is_delta {
            let update: DepthUpdate = serde_json::from_value(data)?;
            BookFrame {
                kind: Some(UpdateKind::Delta),
                bids: norm_side(&update.b)?,
                asks: norm_side(&update.a)?,
                time_ms: update.event_time,
                seq: update.final_update_id.map(monotonic),
            }
        } else {
            // partial depth snapshots carry no event time
            let snapshot: PartialDepth = serde_json::from_value(data)?;
            BookFrame {
                kind: Some(UpdateKind::Snapshot),
                bids: norm_side(&snapshot.bids)?,
                asks: norm_side(&snapshot.asks)?,
                time_ms: now_ms(),
                seq: snapshot.last_update_id.map(monotonic),
            }
        };
        Ok(Frame::Book(frame))
    }

    fn parse_trade(&self, data: serde_json::Value) -> Result<Frame, ProtocolError> {
        let trade: WsTrade = serde_json::from_value(data)?;
        Ok(Frame::Trades(vec![Trade {
            price: parse_price(&trade.p)?,
            size: parse_size(&trade.q)?,
            taker_is_buyer: !trade.m,
            time_ms: trade.trade_time,
        }]))
    }
}

fn monotonic(id: u64) -> SeqInfo {
    SeqInfo { id, contiguity: Contiguity::Monotonic }
}

impl Venue for Binance {
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
            "method": "SUBSCRIBE",
            "params": [self.depth_stream, self.trade_stream],
            "id": 1
        })
        .to_string()
    }

    fn parse(&self, raw: &str) -> Result<Option<Frame>, ProtocolError> {
        let frame: CombinedFrame = serde_json::from_str(raw)?;

        if let Some(error) = frame.error {
            warn!(id = ?frame.id, %error, "Binance rejected request");
            return Ok(None);
        }

        let (Some(stream), Some(data)) = (frame.stream, frame.data) else {
            return Ok(None);
        };
        if stream == self.depth_stream {
            self.parse_depth(data).map(Some)
        } else if stream == self.trade_stream {
            self.parse_trade(data).map(Some)
        } else {
            Ok(None)
        }
    }

    // partial depth frames are self-contained; nothing to wait for
    fn requires_snapshot(&self) -> bool {
        false
    }
}
