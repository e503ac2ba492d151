//! # STOMP over WebSocket Connector
//!
//! Opens the backend's raw WebSocket endpoint, performs the STOMP 1.2
//! handshake and subscribes to every event topic. The resulting stream
//! yields the text of each inbound frame for the router to decode.
//!
//! Heart-beats are negotiated off (`0,0`); liveness relies on the WebSocket
//! layer, which answers pings while the stream is being read.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::ingestors::connection::{ConnectionError, Connector, FrameStream};
use crate::ingestors::stomp::{StompCommand, StompFrame};
use crate::model::Category;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WsStompConnector {
    url: Arc<str>,
    topics: Arc<[String]>,
    handshake_timeout: Duration,
}

impl WsStompConnector {
    /// Connector subscribed to the topics of every [`Category`].
    pub fn new(url: impl Into<String>) -> Self {
        let topics: Vec<String> = Category::ALL.iter().map(|c| c.topic().to_string()).collect();
        Self::with_topics(url, topics)
    }

    pub fn with_topics(url: impl Into<String>, topics: Vec<String>) -> Self {
        let url: String = url.into();
        Self {
            url: Arc::from(url),
            topics: Arc::from(topics),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Connector for WsStompConnector {
    fn open(&self) -> BoxFuture<'static, Result<FrameStream, ConnectionError>> {
        let this = self.clone();
        async move { this.open_session().await }.boxed()
    }
}

impl WsStompConnector {
    async fn open_session(self) -> Result<FrameStream, ConnectionError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|_| ConnectionError::InvalidUrl(self.url.to_string()))?;
        let host = uri
            .host()
            .ok_or_else(|| ConnectionError::InvalidUrl(self.url.to_string()))?
            .to_string();

        log::info!("Connecting to push endpoint: {}", self.url);
        let (mut ws, _) = connect_async(self.url.as_ref())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        send_frame(&mut ws, &StompFrame::connect(&host, (0, 0))).await?;
        tokio::time::timeout(self.handshake_timeout, await_connected(&mut ws))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)??;

        for (i, topic) in self.topics.iter().enumerate() {
            send_frame(&mut ws, &StompFrame::subscribe(format!("sub-{i}"), topic.as_str())).await?;
            log::debug!("Subscribed to {}", topic);
        }

        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => Some(Ok(String::from_utf8_lossy(&data).into_owned())),
                Ok(Message::Close(_)) => Some(Err(ConnectionError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}

async fn send_frame(ws: &mut WsStream, frame: &StompFrame) -> Result<(), ConnectionError> {
    ws.send(Message::Text(frame.encode().into()))
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))
}

async fn await_connected(ws: &mut WsStream) -> Result<(), ConnectionError> {
    while let Some(msg) = ws.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => return Err(ConnectionError::Closed),
            Ok(_) => continue,
            Err(e) => return Err(ConnectionError::Transport(e.to_string())),
        };
        match StompFrame::decode(&text) {
            Ok(Some(frame)) if frame.command == StompCommand::Connected => {
                log::info!(
                    "STOMP session established (version {})",
                    frame.get("version").unwrap_or("?")
                );
                return Ok(());
            }
            Ok(Some(frame)) if frame.command == StompCommand::Error => {
                let reason = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                return Err(ConnectionError::Handshake(reason));
            }
            Ok(_) => continue,
            Err(e) => return Err(ConnectionError::Handshake(e.to_string())),
        }
    }
    Err(ConnectionError::Closed)
}
