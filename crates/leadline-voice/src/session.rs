//! Realtime session transport.
//!
//! A connected session is a pair of channels: typed client events go out,
//! typed server events come in. The WebSocket itself is owned by two
//! background tasks, so a session can be driven from any event loop and
//! replaced by an in-memory fake in tests.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::RealtimeConfig;
use crate::error::VoiceError;
use crate::events::{ClientEvent, RealtimeEvent};

/// Capacity of each direction of a session.
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Channel ends of a connected realtime session.
///
/// Dropping `tx` closes the socket; `rx` yields `None` once the server side
/// has gone away.
#[derive(Debug)]
pub struct RealtimeSession {
    pub tx: mpsc::Sender<ClientEvent>,
    pub rx: mpsc::Receiver<RealtimeEvent>,
}

/// Opens realtime sessions.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, call_id: &str) -> Result<RealtimeSession, VoiceError>;
}

/// Connects over WebSocket with bearer auth.
#[derive(Debug, Clone)]
pub struct WsRealtimeConnector {
    config: RealtimeConfig,
}

impl WsRealtimeConnector {
    pub fn new(config: RealtimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }
}

#[async_trait]
impl RealtimeConnector for WsRealtimeConnector {
    async fn connect(&self, call_id: &str) -> Result<RealtimeSession, VoiceError> {
        if !self.config.is_enabled() {
            return Err(VoiceError::Config("realtime url is empty".to_string()));
        }
        if self.config.api_key.is_empty() {
            return Err(VoiceError::Config("realtime api key is empty".to_string()));
        }

        let mut request = self.config.endpoint().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| VoiceError::Config(format!("invalid api key header: {e}")))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        info!(call_id, model = %self.config.model, "realtime session connected");

        let (mut sink, mut stream) = socket.split();
        let (client_tx, mut client_rx) = mpsc::channel::<ClientEvent>(SESSION_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<RealtimeEvent>(SESSION_CHANNEL_CAPACITY);

        let writer_call_id = call_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = client_rx.recv().await {
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(call_id = %writer_call_id, error = %e, "dropping unserializable client event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(call_id = %writer_call_id, error = %e, "realtime send failed");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!(call_id = %writer_call_id, "realtime writer finished");
        });

        let reader_call_id = call_id.to_string();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match RealtimeEvent::parse(text.as_str()) {
                        Ok(event) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(call_id = %reader_call_id, error = %e, "malformed realtime event");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(call_id = %reader_call_id, error = %e, "realtime socket error");
                        break;
                    }
                }
            }
            debug!(call_id = %reader_call_id, "realtime reader finished");
        });

        Ok(RealtimeSession {
            tx: client_tx,
            rx: event_rx,
        })
    }
}
