//! Streaming speech-to-text connection.
//!
//! One [`SttStream`] mirrors the lifetime of one client session: audio frames
//! go up in call order, decoded transcript events come back through a bounded
//! channel. The provider speaks JSON events carrying a finality flag and a
//! first transcript alternative; anything else is ignored.

use crate::config::SttConfig;
use crate::error::VoiceError;
use chorus_types::TranscriptEvent;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Capacity of the transcript-event channel. Beyond this the consumer is not
/// keeping up and the read task parks until it drains.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// An open streaming connection to the speech-to-text provider.
///
/// Owned exclusively by the session it serves; a session holds at most one
/// live stream at any time.
pub struct SttStream {
    sink: WsSink,
    read_task: tokio::task::JoinHandle<()>,
}

impl SttStream {
    /// Opens the provider connection, configured for the gateway frame format
    /// (16 kHz mono 16-bit PCM), and starts decoding provider events into the
    /// returned channel. The channel closes when the upstream connection does.
    pub async fn connect(
        config: &SttConfig,
    ) -> Result<(Self, mpsc::Receiver<TranscriptEvent>), VoiceError> {
        let uri = format!(
            "{}?encoding=linear16&sample_rate={}&channels={}",
            config.url.trim_end_matches('/'),
            config.sample_rate,
            chorus_types::AUDIO_CHANNELS,
        );

        let mut request = uri
            .into_client_request()
            .map_err(|e| VoiceError::Config(format!("invalid speech-to-text URL: {}", e)))?;
        if !config.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Token {}", config.api_key))
                .map_err(|e| VoiceError::Config(format!("invalid speech-to-text key: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| VoiceError::Stt(format!("connect failed: {}", e)))?;
        let (sink, mut source) = stream.split();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let read_task = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let Ok(raw) = serde_json::from_str::<serde_json::Value>(&text) else {
                            tracing::debug!("ignoring non-JSON provider message");
                            continue;
                        };
                        if let Some(event) = decode_provider_event(raw) {
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("speech-to-text stream read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((Self { sink, read_task }, events_rx))
    }

    /// Forwards one audio frame verbatim. Frames sent through the same stream
    /// reach the provider in call order.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<(), VoiceError> {
        self.sink
            .send(Message::Binary(frame.to_vec().into()))
            .await
            .map_err(|e| VoiceError::Stt(format!("frame send failed: {}", e)))
    }

    /// Closes the upstream connection and stops the read task. Consumes the
    /// stream; no transcript event is emitted after this returns.
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
        self.read_task.abort();
    }
}

/// Decodes one provider payload into a transcript event.
///
/// A message is Final when its finality flag is set and the transcript text is
/// non-empty after trimming; empty finals carry no orchestration value and
/// produce no event. Payloads without a transcript alternative are ignored.
fn decode_provider_event(raw: serde_json::Value) -> Option<TranscriptEvent> {
    let text = raw
        .pointer("/channel/alternatives/0/transcript")?
        .as_str()?
        .to_string();
    let is_final = raw
        .get("is_final")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    if is_final {
        if text.trim().is_empty() {
            return None;
        }
        Some(TranscriptEvent::Final { text, raw })
    } else {
        Some(TranscriptEvent::Partial { text, raw })
    }
}
