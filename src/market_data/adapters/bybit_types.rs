// Source: https://bybit-exchange.github.io/docs/v5/websocket/public/orderbook
//         https://bybit-exchange.github.io/docs/v5/websocket/public/trade

// Every frame on the public v5 socket; control replies carry `op`/`success`
// and no `topic`
#[derive(Debug, serde::Deserialize)]
pub struct WsFrame {
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub ts: Option<u64>,
    pub cts: Option<u64>, // matching engine cross time
    pub data: Option<serde_json::Value>,
    pub op: Option<String>,
    pub success: Option<bool>,
    pub ret_msg: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct WsBook {
    pub b: Vec<(String, String)>, // bids [price, size]
    pub a: Vec<(String, String)>, // asks [price, size]
    pub u: u64,                   // update id, contiguous per topic
}

#[derive(Debug, serde::Deserialize)]
pub struct WsTrade {
    #[serde(rename = "T")]
    pub time: u64,
    #[serde(rename = "S")]
    pub side: String, // "Buy" | "Sell", taker side
    pub v: String,
    pub p: String,
}
