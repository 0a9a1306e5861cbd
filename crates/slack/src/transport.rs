//! Socket Mode over a real WebSocket.
//!
//! The connection URL is single-use and comes from `apps.connections.open`,
//! so every `connect` asks the Web API for a fresh one.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::api::SlackApi;
use crate::events::{parse_envelope, SlackEnvelope};
use crate::socket::{SocketTransport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Ignored,
}

fn classify_frame(text: &str) -> Result<Frame, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let frame = match value.get("type").and_then(Value::as_str) {
        Some("hello") => Frame::Hello,
        Some("disconnect") => Frame::Disconnect {
            reason: value.get("reason").and_then(Value::as_str).unwrap_or("unknown").to_owned(),
        },
        _ => parse_envelope(&value).map_or(Frame::Ignored, Frame::Envelope),
    };
    Ok(frame)
}

pub struct WebSocketTransport {
    api: Arc<dyn SlackApi>,
    sink: Mutex<Option<WsSink>>,
    source: Mutex<Option<WsSource>>,
}

impl WebSocketTransport {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api, sink: Mutex::new(None), source: Mutex::new(None) }
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };
        sink.send(message).await.map_err(|e| TransportError::Acknowledge(e.to_string()))
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url =
            self.api.open_socket_url().await.map_err(|e| TransportError::Connect(e.to_string()))?;
        let (stream, _response) =
            connect_async(url.as_str()).await.map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, source) = stream.split();

        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.source.lock().await;
        let Some(source) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        loop {
            let message = match source.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Ok(None),
            };

            match message {
                Message::Text(text) => match classify_frame(text.as_str()) {
                    Ok(Frame::Hello) => info!("socket mode hello received"),
                    Ok(Frame::Disconnect { reason }) => {
                        info!(reason = %reason, "slack requested socket disconnect");
                        return Ok(None);
                    }
                    Ok(Frame::Envelope(envelope)) => return Ok(Some(envelope)),
                    Ok(Frame::Ignored) => debug!("ignoring socket frame without envelope"),
                    Err(error) => warn!(error = %error, "dropping malformed socket frame"),
                },
                Message::Ping(data) => {
                    if let Err(error) = self.send(Message::Pong(data)).await {
                        warn!(error = %error, "failed to answer socket ping");
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let payload = json!({ "envelope_id": envelope_id }).to_string();
        self.send(Message::text(payload)).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.source.lock().await.take();
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        // The peer may already be gone; a failed close is not worth surfacing.
        if let Err(error) = sink.close().await {
            debug!(error = %error, "socket close after disconnect failed");
        }
        Ok(())
    }
}
