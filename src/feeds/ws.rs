//! WebSocket Frame Reader
//!
//! Connects to a websocket endpoint and forwards every data frame into a
//! monitored queue. No reconnect loop: a closed or failed connection ends the
//! task with an error and the process exits for its supervisor to restart.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::error::{ArbError, Result};
use crate::feeds::queue::QueueSender;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Endpoint plus extra handshake headers (e.g. Binance `X-MBX-APIKEY`).
#[derive(Clone)]
pub struct WsEndpoint {
    pub name: &'static str,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
}

impl std::fmt::Debug for WsEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Header values carry credentials.
        f.debug_struct("WsEndpoint")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("headers", &self.headers.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .finish()
    }
}

pub async fn run_ws_reader(endpoint: WsEndpoint, frames: QueueSender<Vec<u8>>) -> Result<()> {
    let name = endpoint.name;
    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ArbError::venue(name, format!("bad websocket url: {}", e)))?;

    for (key, value) in &endpoint.headers {
        let header = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ArbError::venue(name, format!("bad header name {}: {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ArbError::venue(name, format!("bad header {}: {}", key, e)))?;
        request.headers_mut().insert(header, value);
    }

    info!("🔌 Connecting to {} websocket...", name);
    let (ws_stream, response) = connect_async(request)
        .await
        .map_err(|e| ArbError::venue(name, format!("websocket connect failed: {}", e)))?;
    info!("✅ {} websocket connected (status: {})", name, response.status());

    let (mut write, mut read) = ws_stream.split();
    let mut received: u64 = 0;

    while let Some(message) = read.next().await {
        let message = message.map_err(|e| ArbError::venue(name, format!("websocket error: {}", e)))?;
        let frame = match message {
            Message::Binary(bytes) => bytes,
            Message::Text(text) => text.into_bytes(),
            Message::Ping(payload) => {
                if let Err(e) = write.send(Message::Pong(payload)).await {
                    warn!("{} pong failed: {}", name, e);
                }
                continue;
            }
            Message::Close(frame) => {
                warn!("{} websocket closed by server: {:?}", name, frame);
                break;
            }
            Message::Pong(_) | Message::Frame(_) => continue,
        };

        received += 1;
        if frames.send(frame).is_err() {
            debug!("{} frame queue closed, stopping reader", name);
            return Ok(());
        }
    }

    Err(ArbError::venue(
        name,
        format!("websocket stream ended after {} frames", received),
    ))
}
