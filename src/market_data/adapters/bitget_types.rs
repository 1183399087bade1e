// Source: https://www.bitget.com/api-doc/spot/websocket/public/Depth-Channel
//         https://www.bitget.com/api-doc/spot/websocket/public/Trades-Channel

use crate::market_data::adapters::ProtocolError;
use crate::market_data::normaliser::parse_millis;

#[derive(Debug, serde::Deserialize)]
pub struct WsFrame {
    pub event: Option<String>, // "subscribe" | "error" on control replies
    pub action: Option<String>, // "snapshot" | "update" on data frames
    pub arg: Option<WsArg>,
    pub data: Option<serde_json::Value>,
    pub code: Option<serde_json::Value>,
    pub msg: Option<String>,
}

// instType/instId echo our own subscription; only the channel routes
#[derive(Debug, serde::Deserialize)]
pub struct WsArg {
    pub channel: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct WsBook {
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
    pub ts: Millis,
    #[serde(default)]
    pub seq: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct WsTrade {
    pub ts: Millis,
    pub price: String,
    pub size: String,
    pub side: String, // "buy" | "sell", taker side
}

// Timestamps arrive as strings, occasionally as numbers
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum Millis {
    Text(String),
    Number(u64),
}

impl Millis {
    pub fn as_millis(&self) -> Result<u64, ProtocolError> {
        match self {
            Millis::Text(s) => parse_millis(s),
            Millis::Number(n) => Ok(*n),
        }
    }
}
