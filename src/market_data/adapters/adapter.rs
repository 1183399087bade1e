use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, trace, warn};

use super::{AdapterError, BookFrame, ConnectionError, Frame, Venue, VenueAdapter, VenueKind};
use crate::engine::book::Book;
use crate::engine::types::{BookError, MarketEvent, UpdateKind};
use crate::market_data::connection::Connection;
use crate::settings::ReconnectConfig;
use crate::telemetry;

/// Connection lifecycle plus book state, shared by every venue.
/// The venue only supplies protocol knowledge.
pub struct Adapter<V: Venue> {
    venue: V,
    book: Book,
    connection: Option<Connection>,
    reconnect: ReconnectConfig,
}

enum SessionEnd {
    Shutdown,
    Resync,
    Dropped(Option<ConnectionError>),
}

impl<V: Venue> Adapter<V> {
    pub fn new(venue: V, reconnect: ReconnectConfig) -> Self {
        let book = Book::new(venue.requires_snapshot());
        Self { venue, book, connection: None, reconnect }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_open)
    }

    fn apply(&mut self, update: BookFrame) -> Result<(), BookError> {
        match update.kind {
            Some(UpdateKind::Snapshot) => {
                self.book.apply_snapshot(&update.bids, &update.asks, update.time_ms, update.seq);
            }
            Some(UpdateKind::Delta) => {
                if let Err(e) = self.book.apply_delta(&update.bids, &update.asks, update.time_ms, update.seq) {
                    if e.needs_resync() {
                        self.book.reset();
                    }
                    return Err(e);
                }
            }
            None => self.book.touch(update.time_ms),
        }
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), ConnectionError> {
        let Some(heartbeat) = self.venue.heartbeat() else { return Ok(()) };
        let conn = self.connection.as_mut().ok_or(ConnectionError::NotConnected)?;
        trace!(payload = %heartbeat.payload, "Sending heartbeat");
        conn.send_text(heartbeat.payload).await
    }

    // Read frames until the session has to end for one reason or another.
    async fn session(&mut self, tx: &mpsc::Sender<MarketEvent>, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        let heartbeat = self.venue.heartbeat();
        let period = heartbeat.as_ref().map(|h| h.every).unwrap_or(Duration::from_secs(3600));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            if *shutdown.borrow() {
                return SessionEnd::Shutdown;
            }
            let Some(conn) = self.connection.as_mut() else {
                return SessionEnd::Dropped(None);
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return SessionEnd::Shutdown;
                    }
                }
                _ = ticker.tick(), if heartbeat.is_some() => {
                    if let Err(e) = self.send_heartbeat().await {
                        return SessionEnd::Dropped(Some(e));
                    }
                }
                frame = conn.next_text() => match frame {
                    None => return SessionEnd::Dropped(None),
                    Some(Err(e)) => return SessionEnd::Dropped(Some(e)),
                    Some(Ok(text)) => match self.handle_message(&text) {
                        Ok(Some(event)) => {
                            if tx.send(event).await.is_err() {
                                info!("Event receiver dropped, stopping adapter");
                                return SessionEnd::Shutdown;
                            }
                        }
                        Ok(None) => {}
                        Err(AdapterError::Protocol(e)) => {
                            metrics::counter!(telemetry::PROTOCOL_ERRORS, "venue" => self.venue.kind().as_str()).increment(1);
                            warn!(error = %e, "Dropping malformed frame");
                        }
                        Err(AdapterError::Consistency(e)) if e.needs_resync() => {
                            warn!(error = %e, "Book out of sync, resubscribing");
                            return SessionEnd::Resync;
                        }
                        Err(AdapterError::Consistency(e)) => debug!(error = %e, "Dropping book update"),
                    },
                },
            }
        }
    }

    // Re-open the connection after a dropped session or a resync request.
    async fn reconnect(&mut self, immediate: bool, shutdown: &mut watch::Receiver<bool>) -> Result<bool, ConnectionError> {
        let mut attempt: u32 = 0;
        loop {
            if !(immediate && attempt == 0) {
                let delay = self.reconnect.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
                tokio::select! {
                    _ = shutdown.changed() => return Ok(false),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;
            match self.connect().await {
                Ok(()) => {
                    metrics::counter!(telemetry::RECONNECTS, "venue" => self.venue.kind().as_str()).increment(1);
                    info!(attempt, "Reconnected");
                    return Ok(true);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect failed");
                    if !self.reconnect.enabled {
                        return Err(e);
                    }
                    if self.reconnect.max_attempts != 0 && attempt >= self.reconnect.max_attempts {
                        return Err(ConnectionError::RetriesExhausted(attempt));
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<V: Venue> VenueAdapter for Adapter<V> {
    fn kind(&self) -> VenueKind {
        self.venue.kind()
    }

    fn depth(&self) -> u32 {
        self.venue.depth()
    }

    fn update_interval(&self) -> Duration {
        self.venue.update_interval()
    }

    #[instrument(skip_all, fields(venue = %self.venue.kind(), symbol = %self.venue.symbol()))]
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.close().await;
        let mut conn = Connection::open(&self.venue.endpoint()).await?;
        let payload = self.venue.subscribe_payload();
        debug!(%payload, "Sending subscription");
        conn.send_text(payload).await?;
        // a new subscription always starts from a fresh book
        self.book.reset();
        self.connection = Some(conn);
        info!(depth = self.venue.depth(), "Subscribed");
        Ok(())
    }

    fn handle_message(&mut self, raw: &str) -> Result<Option<MarketEvent>, AdapterError> {
        let venue = self.venue.kind().as_str();
        metrics::counter!(telemetry::FRAMES, "venue" => venue).increment(1);

        let Some(frame) = self.venue.parse(raw)? else {
            metrics::counter!(telemetry::FRAMES_IGNORED, "venue" => venue).increment(1);
            trace!(raw, "Ignoring frame");
            return Ok(None);
        };

        match frame {
            Frame::Book(update) => {
                self.apply(update)?;
                metrics::counter!(telemetry::BOOK_UPDATES, "venue" => venue).increment(1);
                Ok(Some(MarketEvent::Book(self.book.state())))
            }
            Frame::Trades(trades) if trades.is_empty() => Ok(None),
            Frame::Trades(trades) => {
                metrics::counter!(telemetry::TRADES, "venue" => venue).increment(trades.len() as u64);
                debug!(count = trades.len(), "Trades");
                Ok(Some(MarketEvent::Trades(trades)))
            }
        }
    }

    #[instrument(skip_all, fields(venue = %self.venue.kind(), symbol = %self.venue.symbol()))]
    async fn run(&mut self, tx: mpsc::Sender<MarketEvent>, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            self.connect().await?;
        }

        loop {
            let end = self.session(&tx, &mut shutdown).await;
            self.close().await;

            let immediate = match end {
                SessionEnd::Shutdown => return Ok(()),
                SessionEnd::Resync => {
                    metrics::counter!(telemetry::RESYNCS, "venue" => self.venue.kind().as_str()).increment(1);
                    true
                }
                SessionEnd::Dropped(err) => {
                    match &err {
                        Some(e) => warn!(error = %e, "Connection lost"),
                        None => warn!("Connection closed"),
                    }
                    if !self.reconnect.enabled {
                        return Err(err.unwrap_or(ConnectionError::Closed));
                    }
                    false
                }
            };

            if !self.reconnect(immediate, &mut shutdown).await? {
                return Ok(());
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::PriceLevel;
    use crate::market_data::adapters::bitget::Bitget;
    use crate::market_data::adapters::bybit::Bybit;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn bybit_adapter() -> Adapter<Bybit> {
        Adapter::new(Bybit::linear("BTCUSDT", 50), ReconnectConfig::default())
    }

    fn book_frame(kind: &str, u: u64, bids: &str, asks: &str) -> String {
        format!(
            r#"{{"topic":"orderbook.50.BTCUSDT","type":"{kind}","ts":1000,"data":{{"s":"BTCUSDT","b":{bids},"a":{asks},"u":{u},"seq":1}},"cts":{u}}}"#
        )
    }

    #[test]
    fn test_snapshot_then_delta_scenario() {
        let mut adapter = bybit_adapter();

        let event = adapter
            .handle_message(&book_frame("snapshot", 1, r#"[["100.0","2"],["99.5","1"]]"#, r#"[["100.5","3"]]"#))
            .unwrap();
        let Some(MarketEvent::Book(state)) = event else { panic!("expected book event") };
        assert_eq!(state.bids, vec![PriceLevel { price: 99.5, size: 1.0 }, PriceLevel { price: 100.0, size: 2.0 }]);
        assert_eq!(state.asks, vec![PriceLevel { price: 100.5, size: 3.0 }]);

        let event = adapter
            .handle_message(&book_frame("delta", 2, r#"[["99.5","0"],["99.0","5"]]"#, "[]"))
            .unwrap();
        let Some(MarketEvent::Book(state)) = event else { panic!("expected book event") };
        assert_eq!(state.bids, vec![PriceLevel { price: 99.0, size: 5.0 }, PriceLevel { price: 100.0, size: 2.0 }]);
        assert_eq!(state.last_update_ms, 2);
    }

    #[test]
    fn test_one_event_per_trade_message() {
        let mut adapter = bybit_adapter();
        let raw = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":5,"data":[
            {"T":10,"s":"BTCUSDT","S":"Buy","v":"0.5","p":"101","L":"PlusTick","i":"a","BT":false},
            {"T":11,"s":"BTCUSDT","S":"Sell","v":"1","p":"100.5","L":"MinusTick","i":"b","BT":false}]}"#;
        let Some(MarketEvent::Trades(trades)) = adapter.handle_message(raw).unwrap() else { panic!("expected trades") };
        assert_eq!(trades.len(), 2);
        assert!(trades[0].taker_is_buyer);
        assert!(!trades[1].taker_is_buyer);
    }

    #[test]
    fn test_ack_and_garbage() {
        let mut adapter = bybit_adapter();
        let ack = r#"{"success":true,"ret_msg":"","conn_id":"x","op":"subscribe"}"#;
        assert!(adapter.handle_message(ack).unwrap().is_none());
        assert!(matches!(adapter.handle_message("not json"), Err(AdapterError::Protocol(_))));
    }

    #[test]
    fn test_gap_resets_book_until_snapshot() {
        let mut adapter = bybit_adapter();
        adapter.handle_message(&book_frame("snapshot", 10, r#"[["1","1"]]"#, r#"[["2","1"]]"#)).unwrap();
        let err = adapter.handle_message(&book_frame("delta", 12, r#"[["1.5","1"]]"#, "[]")).unwrap_err();
        assert!(matches!(err, AdapterError::Consistency(BookError::SequenceGap { expected: 11, received: 12 })));
        assert!(!adapter.book().is_synced());

        let err = adapter.handle_message(&book_frame("delta", 13, "[]", "[]")).unwrap_err();
        assert!(matches!(err, AdapterError::Consistency(BookError::DeltaBeforeSnapshot)));

        adapter.handle_message(&book_frame("snapshot", 20, r#"[["3","1"]]"#, "[]")).unwrap();
        assert!(adapter.handle_message(&book_frame("delta", 21, r#"[["3","2"]]"#, "[]")).unwrap().is_some());
        assert_eq!(adapter.book().bid_size_at(3.0), Some(2.0));
    }

    #[test]
    fn test_stale_delta_emits_nothing() {
        let mut adapter = bybit_adapter();
        adapter.handle_message(&book_frame("snapshot", 10, r#"[["1","1"]]"#, "[]")).unwrap();
        let err = adapter.handle_message(&book_frame("delta", 9, r#"[["1","0"]]"#, "[]")).unwrap_err();
        assert!(matches!(err, AdapterError::Consistency(BookError::StaleUpdate { .. })));
        assert_eq!(adapter.book().bid_size_at(1.0), Some(1.0));
        assert!(adapter.book().is_synced());
    }

    #[tokio::test]
    async fn test_connect_closed_port_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let venue = Bybit::linear("BTCUSDT", 50).with_endpoint(format!("ws://{addr}"));
        let mut adapter = Adapter::new(venue, ReconnectConfig::default());
        assert!(matches!(adapter.connect().await, Err(ConnectionError::Connect { .. })));
        assert!(!adapter.is_connected());
    }

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    async fn accept_subscriber(listener: &TcpListener) -> (ServerWs, String) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let subscribe = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected subscribe, got {other:?}"),
        };
        (ws, subscribe)
    }

    // hold the socket open until the client closes it
    async fn drain(ws: &mut ServerWs) {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    }

    async fn next_bids(rx: &mut mpsc::Receiver<MarketEvent>) -> Vec<f64> {
        loop {
            match rx.recv().await {
                Some(MarketEvent::Book(state)) => return state.bids.iter().map(|l| l.price).collect(),
                Some(MarketEvent::Trades(_)) => {}
                None => panic!("adapter stopped before the next book"),
            }
        }
    }

    fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig { enabled: true, base_delay_ms: 20, max_delay_ms: 100, max_attempts: 5 }
    }

    #[tokio::test]
    async fn test_loopback_subscribe_and_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut ws, subscribe) = accept_subscriber(&listener).await;
            ws.send(Message::Text(r#"{"success":true,"op":"subscribe"}"#.into())).await.unwrap();
            ws.send(Message::Text(book_frame("snapshot", 1, r#"[["100","1"]]"#, r#"[["101","2"]]"#))).await.unwrap();
            ws.send(Message::Text(
                r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":5,"data":[{"T":10,"s":"BTCUSDT","S":"Buy","v":"0.5","p":"101","L":"PlusTick","i":"a","BT":false}]}"#.into(),
            ))
            .await
            .unwrap();
            drain(&mut ws).await;
            subscribe
        });

        let venue = Bybit::linear("BTCUSDT", 50).with_endpoint(format!("ws://{addr}"));
        let mut adapter = Adapter::new(venue, ReconnectConfig { enabled: false, ..ReconnectConfig::default() });
        adapter.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(async move {
            let result = adapter.run(tx, shutdown_rx).await;
            adapter.close().await;
            adapter.close().await;
            result
        });

        let Some(MarketEvent::Book(state)) = rx.recv().await else { panic!("expected book") };
        assert_eq!(state.bids, vec![PriceLevel { price: 100.0, size: 1.0 }]);
        let Some(MarketEvent::Trades(trades)) = rx.recv().await else { panic!("expected trades") };
        assert_eq!(trades.len(), 1);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();

        let subscribe = server.await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&subscribe).unwrap();
        assert_eq!(payload["op"], "subscribe");
        assert_eq!(payload["args"][0], "orderbook.50.BTCUSDT");
        assert_eq!(payload["args"][1], "publicTrade.BTCUSDT");
    }

    #[tokio::test]
    async fn test_sequence_gap_resubscribes_and_rebuilds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut ws, first) = accept_subscriber(&listener).await;
            ws.send(Message::Text(book_frame("snapshot", 10, r#"[["1","1"]]"#, r#"[["2","1"]]"#))).await.unwrap();
            // 11 never arrives
            ws.send(Message::Text(book_frame("delta", 12, r#"[["1.5","1"]]"#, "[]"))).await.unwrap();
            drain(&mut ws).await;

            let (mut ws, second) = accept_subscriber(&listener).await;
            ws.send(Message::Text(book_frame("snapshot", 50, r#"[["5","1"]]"#, r#"[["6","1"]]"#))).await.unwrap();
            drain(&mut ws).await;
            vec![first, second]
        });

        let venue = Bybit::linear("BTCUSDT", 50).with_endpoint(format!("ws://{addr}"));
        let mut adapter = Adapter::new(venue, fast_reconnect());
        adapter.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(async move { adapter.run(tx, shutdown_rx).await });

        assert_eq!(next_bids(&mut rx).await, vec![1.0]);
        // the gapped delta produced no book; the next one comes from the fresh snapshot
        assert_eq!(next_bids(&mut rx).await, vec![5.0]);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();

        let subscriptions = server.await.unwrap();
        assert_eq!(subscriptions.len(), 2);
        assert_eq!(subscriptions[0], subscriptions[1]);
    }

    #[tokio::test]
    async fn test_dropped_socket_reconnects_after_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut ws, _) = accept_subscriber(&listener).await;
            ws.send(Message::Text(book_frame("snapshot", 1, r#"[["1","1"]]"#, r#"[["2","1"]]"#))).await.unwrap();
            ws.close(None).await.unwrap();
            drop(ws);

            let closed_at = std::time::Instant::now();
            let (mut ws, _) = accept_subscriber(&listener).await;
            let waited = closed_at.elapsed();
            ws.send(Message::Text(book_frame("snapshot", 1, r#"[["3","1"]]"#, r#"[["4","1"]]"#))).await.unwrap();
            drain(&mut ws).await;
            waited
        });

        let venue = Bybit::linear("BTCUSDT", 50).with_endpoint(format!("ws://{addr}"));
        let mut adapter = Adapter::new(venue, fast_reconnect());
        adapter.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(async move { adapter.run(tx, shutdown_rx).await });

        assert_eq!(next_bids(&mut rx).await, vec![1.0]);
        assert_eq!(next_bids(&mut rx).await, vec![3.0]);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
        assert!(server.await.unwrap() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_dropped_socket_without_reconnect_ends_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut ws, _) = accept_subscriber(&listener).await;
            ws.close(None).await.unwrap();
        });

        let venue = Bybit::linear("BTCUSDT", 50).with_endpoint(format!("ws://{addr}"));
        let mut adapter = Adapter::new(venue, ReconnectConfig { enabled: false, ..fast_reconnect() });
        adapter.connect().await.unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(adapter.run(tx, shutdown_rx).await.is_err());
        assert!(!adapter.is_connected());
        server.await.unwrap();
    }

    // Returns the first text the server reads after the subscription.
    async fn heartbeat_round_trip<V: Venue>(make: impl FnOnce(String) -> V, pong: &'static str, book: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut ws, _) = accept_subscriber(&listener).await;
            let ping = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("expected heartbeat, got {other:?}"),
            };
            ws.send(Message::Text(pong.into())).await.unwrap();
            ws.send(Message::Text(book)).await.unwrap();
            drain(&mut ws).await;
            ping
        });

        let mut adapter = Adapter::new(make(format!("ws://{addr}")), ReconnectConfig { enabled: false, ..ReconnectConfig::default() });
        adapter.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(async move { adapter.run(tx, shutdown_rx).await });

        // the book is only sent once the heartbeat arrived, and the pong before it is ignored
        assert_eq!(next_bids(&mut rx).await, vec![7.0]);
        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
        server.await.unwrap()
    }

    #[tokio::test]
    async fn test_bybit_heartbeat() {
        let ping = heartbeat_round_trip(
            |url| Bybit::linear("BTCUSDT", 50).with_endpoint(url).with_heartbeat_every(Duration::from_millis(30)),
            r#"{"success":true,"ret_msg":"pong","conn_id":"x","op":"ping"}"#,
            book_frame("snapshot", 1, r#"[["7","1"]]"#, r#"[["8","1"]]"#),
        )
        .await;
        assert_eq!(ping, r#"{"op":"ping"}"#);
    }

    #[tokio::test]
    async fn test_bitget_heartbeat() {
        let ping = heartbeat_round_trip(
            |url| Bitget::spot("BTCUSDT", 15).with_endpoint(url).with_heartbeat_every(Duration::from_millis(30)),
            "pong",
            r#"{"action":"snapshot","arg":{"instType":"SPOT","channel":"books15","instId":"BTCUSDT"},"data":[{"asks":[["8","1"]],"bids":[["7","1"]],"seq":1,"ts":"5"}]}"#.into(),
        )
        .await;
        assert_eq!(ping, "ping");
    }
}
