//! Telephony media-stream WebSocket endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use leadline_voice::{TelephonyEvent, TelephonyOutbound};

use crate::bridge::{Bridge, BridgeInput};
use crate::AppState;

/// Upgrades the provider's media stream and runs one call over it.
pub async fn media_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_call(socket, state))
}

/// Counts a call as active for as long as it is held.
struct ActiveCall(Arc<AtomicUsize>);

impl ActiveCall {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_call(socket: WebSocket, state: Arc<AppState>) {
    let _active = ActiveCall::start(&state.active_calls);
    let (bridge, inbox, mut outbound) = Bridge::new(state.services.clone());
    let call_id = bridge.call_id().to_string();
    let (mut sender, mut receiver) = socket.split();

    // Writes bridge output back to the provider; ends after sending Close.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = match frame {
                TelephonyOutbound::Audio(bytes) => AxumMessage::Binary(bytes.into()),
                TelephonyOutbound::Close => {
                    let _ = sender.send(AxumMessage::Close(None)).await;
                    break;
                }
                control => match control.control_text() {
                    Some(text) => AxumMessage::Text(text.into()),
                    None => continue,
                },
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let event = match msg {
                AxumMessage::Binary(bytes) => TelephonyEvent::from_binary(bytes.to_vec()),
                AxumMessage::Text(text) => TelephonyEvent::from_text(text.as_str()),
                AxumMessage::Close(_) => break,
                AxumMessage::Ping(_) | AxumMessage::Pong(_) => continue,
            };
            if inbox.send(BridgeInput::Telephony(event)).await.is_err() {
                return;
            }
        }
        let _ = inbox.send(BridgeInput::TelephonyClosed).await;
    });

    let report = bridge.run().await;
    recv_task.abort();
    if let Err(e) = send_task.await {
        tracing::debug!(%call_id, error = %e, "media stream writer ended abnormally");
    }

    tracing::info!(
        %call_id,
        final_state = ?report.final_state(),
        phase = %report.phase,
        turns = report.transcript.len(),
        saved_explicitly = report.saved_explicitly,
        "call finished"
    );
}
