// One websocket connection: open, send text, read text, close.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument};

use crate::market_data::adapters::ConnectionError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct Connection {
    url: String,
    stream: Option<WsStream>,
}

impl Connection {
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn open(url: &str) -> Result<Self, ConnectionError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|source| ConnectionError::Connect { url: url.to_string(), source })?;
        info!(status = %response.status(), "Websocket connected");
        Ok(Self { url: url.to_string(), stream: Some(stream) })
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Next text payload. `None` once the peer has closed or the stream ended.
    /// Control frames are answered by tungstenite and skipped here.
    pub async fn next_text(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("Skipping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, url = %self.url, "Websocket closed by server");
                    self.stream = None;
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(Err(e.into()));
                }
                None => {
                    self.stream = None;
                    return None;
                }
            }
        }
    }

    /// Send a close frame and drop the socket. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, url = %self.url, "Close handshake failed");
            }
            info!(url = %self.url, "Websocket closed");
        }
    }
}
