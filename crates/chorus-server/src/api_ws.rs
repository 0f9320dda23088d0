//! WebSocket session transport and the per-session recognition bridge.
//!
//! One socket is one [`ClientSession`](chorus_types::SessionState): the
//! handler demultiplexes JSON control messages from binary audio frames on
//! the way in, and multiplexes transcript events plus synthesized audio on
//! the way out. Once a session is `Active` it owns exactly one upstream
//! speech-to-text stream whose lifetime mirrors the session's.

use crate::api_voice::respond_and_deliver;
use crate::registry::OutboundFrame;
use crate::AppState;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use axum::extract::{ConnectInfo, Extension, WebSocketUpgrade};
use axum::response::IntoResponse;
use chorus_types::{ConversationRef, ReplyRequest, SessionState, TranscriptEvent};
use chorus_voice::{SttStream, VoiceError};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Capacity of each session's outbound buffer. 256 frames is ample for normal
/// operation; beyond that the client is too slow and frames are dropped.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Frames larger than 32 seconds of PCM are dropped; a single message this
/// size indicates a misbehaving client.
const MAX_FRAME_BYTES: usize =
    32 * chorus_types::SAMPLE_RATE_HZ as usize * chorus_types::BYTES_PER_SAMPLE;

/// Inbound control messages. Anything that does not parse into one of these
/// shapes is ignored, not fatal.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Start,
}

/// Outbound transcript messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum TranscriptMessage {
    #[serde(rename = "partial_transcript")]
    Partial { text: String },
    #[serde(rename = "final_transcript")]
    Final { text: String },
}

impl From<&TranscriptEvent> for TranscriptMessage {
    fn from(event: &TranscriptEvent) -> Self {
        match event {
            TranscriptEvent::Partial { text, .. } => Self::Partial { text: text.clone() },
            TranscriptEvent::Final { text, .. } => Self::Final { text: text.clone() },
        }
    }
}

fn parse_control(text: &str) -> Option<ControlMessage> {
    serde_json::from_str(text).ok()
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(remote_addr = %addr, "websocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The recognition side of one `Active` session: the registry entry, the
/// upstream speech-to-text stream, and the transcript relay task.
struct SessionBridge {
    session_id: Uuid,
    state: Arc<AppState>,
    stt: Option<SttStream>,
    relay_task: JoinHandle<()>,
    /// Set once the single per-session reconnection has been spent.
    reconnected: bool,
}

impl SessionBridge {
    /// Registers the session and opens its upstream stream. The initial
    /// connect gets one retry; a second failure is fatal for the session.
    async fn open(
        state: Arc<AppState>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<Self, VoiceError> {
        let session_id = state.registry.add_session(outbound).await;

        let mut reconnected = false;
        let (stt, events) = match SttStream::connect(&state.config.stt).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    "speech-to-text connect failed, retrying once: {}",
                    e
                );
                reconnected = true;
                match SttStream::connect(&state.config.stt).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        state.registry.remove_session(session_id).await;
                        return Err(e);
                    }
                }
            }
        };

        let relay_task = spawn_transcript_relay(state.clone(), session_id, events);
        Ok(Self {
            session_id,
            state,
            stt: Some(stt),
            relay_task,
            reconnected,
        })
    }

    /// Forwards one audio frame upstream, in arrival order. On a lost stream
    /// this spends the session's single reconnection attempt; `Err` means the
    /// session must close.
    async fn forward(&mut self, frame: &[u8]) -> Result<(), VoiceError> {
        if let Some(stt) = self.stt.as_mut() {
            match stt.send_frame(frame).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        "speech-to-text forward failed: {}",
                        e
                    );
                }
            }
        }

        if self.reconnected {
            return Err(VoiceError::Stt(
                "upstream stream lost after reconnect".to_string(),
            ));
        }
        self.reconnected = true;

        // Transcripts pause while the stream is down; the failed frame is not
        // replayed (frames are never buffered beyond the current relay step).
        self.relay_task.abort();
        if let Some(old) = self.stt.take() {
            old.close().await;
        }

        match SttStream::connect(&self.state.config.stt).await {
            Ok((stt, events)) => {
                self.relay_task =
                    spawn_transcript_relay(self.state.clone(), self.session_id, events);
                self.stt = Some(stt);
                tracing::info!(session_id = %self.session_id, "speech-to-text stream reconnected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Releases the registry entry and closes the upstream connection. No
    /// transcript event is emitted for this session after this returns.
    async fn shutdown(mut self) {
        self.state.registry.remove_session(self.session_id).await;
        self.relay_task.abort();
        if let Some(stt) = self.stt.take() {
            stt.close().await;
        }
        tracing::info!(session_id = %self.session_id, "session closed");
    }
}

/// Relays transcript events to the client and fires reply orchestration for
/// every Final. The hand-off is fire-and-forget: the bridge keeps accepting
/// audio while the reply pipeline runs.
fn spawn_transcript_relay(
    state: Arc<AppState>,
    session_id: Uuid,
    mut events: mpsc::Receiver<TranscriptEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&TranscriptMessage::from(&event)) {
                Ok(json) => {
                    state
                        .registry
                        .send(session_id, OutboundFrame::Text(json))
                        .await;
                }
                Err(e) => {
                    tracing::error!("failed to serialize transcript message: {}", e);
                    continue;
                }
            }

            if let TranscriptEvent::Final { text, .. } = event {
                let conversation =
                    ConversationRef::new(state.config.server.default_conversation.clone());
                state
                    .registry
                    .bind_conversation(&conversation, session_id)
                    .await;

                let request = ReplyRequest { text, conversation };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = respond_and_deliver(state, request).await {
                        tracing::warn!(session_id = %session_id, "reply pipeline rejected utterance: {}", e);
                    }
                });
            }
        }
    })
}

/// Handles one client connection through the whole session lifecycle.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Bounded outbound buffer drained by a dedicated task so transcript relay
    // and fan-out never block on a slow client.
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CHANNEL_CAPACITY);
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                OutboundFrame::Text(text) => AxumMessage::Text(text.into()),
                OutboundFrame::Audio(bytes) => AxumMessage::Binary(bytes.into()),
            };
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut lifecycle = SessionState::Connecting;
    let mut bridge: Option<SessionBridge> = None;

    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            AxumMessage::Text(text) => {
                // Unrecognized or malformed control messages are ignored.
                let Some(ControlMessage::Start) = parse_control(&text) else {
                    continue;
                };
                if !lifecycle.can_transition_to(SessionState::Active) {
                    tracing::debug!("ignoring duplicate start message");
                    continue;
                }

                match SessionBridge::open(state.clone(), tx.clone()).await {
                    Ok(opened) => {
                        lifecycle = SessionState::Active;
                        tracing::info!(session_id = %opened.session_id, "session active");
                        bridge = Some(opened);
                    }
                    Err(e) => {
                        tracing::error!("failed to open speech-to-text stream: {}", e);
                        break;
                    }
                }
            }
            AxumMessage::Binary(frame) => {
                // No audio is relayed before `Active`.
                if !lifecycle.accepts_audio() {
                    tracing::debug!("dropping audio frame before session start");
                    continue;
                }
                if frame.len() > MAX_FRAME_BYTES {
                    tracing::warn!("dropping oversized audio frame ({} bytes)", frame.len());
                    continue;
                }
                let Some(active) = bridge.as_mut() else {
                    continue;
                };
                if let Err(e) = active.forward(&frame).await {
                    tracing::error!(
                        session_id = %active.session_id,
                        "speech-to-text stream unrecoverable, closing session: {}",
                        e
                    );
                    break;
                }
            }
            AxumMessage::Close(_) => break,
            // Ping/Pong are answered by the protocol layer.
            _ => {}
        }
    }

    lifecycle = SessionState::Closing;
    tracing::debug!(state = ?lifecycle, "tearing down session");
    if let Some(active) = bridge.take() {
        active.shutdown().await;
    }
    send_task.abort();
    lifecycle = SessionState::Closed;
    tracing::debug!(state = ?lifecycle, "transport finished");
}
