// Source: https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams
//         https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams

// Combined-stream wrapper; SUBSCRIBE replies carry `result`/`id` instead
#[derive(Debug, serde::Deserialize)]
pub struct CombinedFrame {
    pub stream: Option<String>,
    pub data: Option<serde_json::Value>,
    pub id: Option<u64>,
    pub error: Option<serde_json::Value>,
}

// Spot partial book depth: a full top-N book with no event type
#[derive(Debug, serde::Deserialize)]
pub struct PartialDepth {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: Option<u64>,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

// `"e": "depthUpdate"` payloads
#[derive(Debug, serde::Deserialize)]
pub struct DepthUpdate {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "u")]
    pub final_update_id: Option<u64>,
    pub b: Vec<(String, String)>,
    pub a: Vec<(String, String)>,
}

// Works for both `trade` (spot) and `aggTrade` (futures)
#[derive(Debug, serde::Deserialize)]
pub struct WsTrade {
    pub p: String,
    pub q: String,
    pub m: bool, // buyer is the maker
    #[serde(rename = "T")]
    pub trade_time: u64,
}
