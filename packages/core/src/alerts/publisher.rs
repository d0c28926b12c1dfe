//! Publishes the active threshold set to the monitoring service over a
//! WebSocket connection.
//!
//! Every publication is one JSON text frame:
//! `{"event":"thresholds","thresholds":[ThresholdEvent, ...]}`.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::alerts::ThresholdEvent;
use crate::thresholds::{ChangeNotifier, NotifyError, Threshold};

const EVENT_NAME: &str = "thresholds";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
struct ThresholdsFrame {
    event: &'static str,
    thresholds: Vec<ThresholdEvent>,
}

/// An open socket. The reader task drains inbound frames so pings are
/// answered, and finishes when the peer closes or the socket breaks.
struct Link {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

impl Link {
    fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    async fn close(mut self) {
        if let Err(err) = self.sink.close().await {
            tracing::debug!("Close handshake with monitoring service failed: {}", err);
        }
        self.reader.abort();
    }
}

#[derive(Default)]
struct LinkState {
    /// Set by `connect`, cleared by `disconnect`. While set, a dead link is
    /// reopened on the next publication.
    wanted: bool,
    link: Option<Link>,
}

pub struct WsChangePublisher {
    url: String,
    state: Mutex<LinkState>,
}

impl WsChangePublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(LinkState::default()),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.link.as_ref().is_some_and(Link::is_alive)
    }

    async fn open(&self) -> Result<Link, NotifyError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| NotifyError::connection(format!("{}: {}", self.url, err)))?;
        let (sink, mut inbound) = stream.split();

        let url = self.url.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = inbound.next().await {
                match frame {
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(url = %url, "Monitoring service socket failed: {}", err);
                        break;
                    }
                }
            }
            tracing::debug!(url = %url, "Monitoring service socket closed");
        });

        tracing::info!(url = %self.url, "Connected to monitoring service");
        Ok(Link { sink, reader })
    }
}

fn encode(active: &[Threshold]) -> Result<String, NotifyError> {
    let frame = ThresholdsFrame {
        event: EVENT_NAME,
        thresholds: active.iter().map(ThresholdEvent::from).collect(),
    };
    Ok(serde_json::to_string(&frame)?)
}

#[async_trait]
impl ChangeNotifier for WsChangePublisher {
    /// Open the connection. A no-op when already connected. A failed attempt
    /// still marks the connection as wanted, so publishing retries it.
    async fn connect(&self) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        state.wanted = true;
        if state.link.as_ref().is_some_and(Link::is_alive) {
            return Ok(());
        }
        if let Some(dead) = state.link.take() {
            dead.close().await;
        }

        state.link = Some(self.open().await?);
        Ok(())
    }

    /// Send a close frame and drop the connection. Idempotent.
    async fn disconnect(&self) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        state.wanted = false;
        let Some(link) = state.link.take() else {
            return Ok(());
        };
        link.close().await;
        tracing::info!(url = %self.url, "Disconnected from monitoring service");
        Ok(())
    }

    async fn notify_change(&self, active: &[Threshold]) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        if !state.wanted {
            return Err(NotifyError::NotConnected);
        }

        let link = match state.link.take() {
            Some(link) if link.is_alive() => link,
            stale => {
                if let Some(dead) = stale {
                    dead.close().await;
                }
                tracing::info!(url = %self.url, "Reconnecting to monitoring service");
                self.open().await?
            }
        };
        let link = state.link.insert(link);

        let payload = encode(active)?;
        if let Err(err) = link.sink.send(Message::Text(payload)).await {
            if let Some(broken) = state.link.take() {
                broken.reader.abort();
            }
            return Err(NotifyError::delivery(err.to_string()));
        }

        tracing::debug!(count = active.len(), "Published active thresholds");
        Ok(())
    }
}
