//! Active-session registry and playback fan-out.
//!
//! The registry is the only shared mutable state in the gateway: fan-out
//! iteration and session churn run concurrently, so every map is
//! `RwLock`-guarded. It is created once at service start, stored in
//! `AppState`, and handed to both the transport and the fan-out paths.

use chorus_types::{ConversationRef, SynthesizedAudio};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// One outbound frame to a client: a JSON transcript message or a
/// synthesized-audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Audio(Vec<u8>),
}

/// Registry of `Active` sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    /// Active sessions: session id -> outbound sender.
    sessions: Arc<RwLock<HashMap<Uuid, mpsc::Sender<OutboundFrame>>>>,
    /// Playback routing: conversation id -> originating session. Populated at
    /// utterance-finalization time, advisory only.
    conversations: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly `Active` session and returns its identifier.
    pub async fn add_session(&self, sender: mpsc::Sender<OutboundFrame>) -> Uuid {
        let session_id = Uuid::new_v4();
        self.sessions.write().await.insert(session_id, sender);
        session_id
    }

    /// Removes a session. Idempotent: removing an unknown session is a no-op.
    ///
    /// Conversation routes pointing at the session are left in place on
    /// purpose: a route to a closed session marks its in-flight replies as
    /// "drop on delivery" rather than letting them fall back to broadcast.
    /// Stale routes are discarded by [`Self::deliver`].
    pub async fn remove_session(&self, session_id: Uuid) {
        self.sessions.write().await.remove(&session_id);
    }

    /// Number of currently active sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Records which session originated the utterance a conversation's next
    /// reply belongs to. Later deliveries for the same conversation replace
    /// the binding.
    pub async fn bind_conversation(&self, conversation: &ConversationRef, session_id: Uuid) {
        self.conversations
            .write()
            .await
            .insert(conversation.as_str().to_string(), session_id);
    }

    /// Sends one frame to one session. A send to an unknown (already closed)
    /// session is a no-op, not an error; a full buffer drops the frame.
    pub async fn send(&self, session_id: Uuid, frame: OutboundFrame) {
        let sessions = self.sessions.read().await;
        if let Some(sender) = sessions.get(&session_id) {
            if let Err(e) = sender.try_send(frame) {
                tracing::warn!(
                    session_id = %session_id,
                    "dropping outbound frame for slow consumer: {}",
                    e
                );
            }
        }
    }

    /// Delivers synthesized audio. A conversation bound to a live session is
    /// routed to that session alone; a conversation bound to a session that
    /// has since closed is dropped (there is no session to write to); an
    /// unbound conversation is broadcast to every active session. Best-effort
    /// in every case — sessions that fail to accept the write are skipped,
    /// not retried.
    pub async fn deliver(&self, audio: SynthesizedAudio) {
        let target = {
            let conversations = self.conversations.read().await;
            conversations.get(audio.conversation.as_str()).copied()
        };

        if let Some(session_id) = target {
            let delivered = {
                let sessions = self.sessions.read().await;
                match sessions.get(&session_id) {
                    Some(sender) => {
                        if let Err(e) = sender.try_send(OutboundFrame::Audio(audio.bytes)) {
                            tracing::warn!(
                                session_id = %session_id,
                                conversation = %audio.conversation,
                                "dropping routed reply audio for slow consumer: {}",
                                e
                            );
                        }
                        true
                    }
                    None => false,
                }
            };

            if !delivered {
                tracing::debug!(
                    session_id = %session_id,
                    conversation = %audio.conversation,
                    "dropping reply audio for closed session"
                );
                self.conversations
                    .write()
                    .await
                    .remove(audio.conversation.as_str());
            }
            return;
        }

        self.broadcast_audio(audio.bytes).await;
    }

    /// Broadcasts one audio buffer to every active session.
    pub async fn broadcast_audio(&self, bytes: Vec<u8>) {
        let sessions = self.sessions.read().await;
        for (session_id, sender) in sessions.iter() {
            if let Err(e) = sender.try_send(OutboundFrame::Audio(bytes.clone())) {
                tracing::warn!(
                    session_id = %session_id,
                    "dropping broadcast audio for slow consumer: {}",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_for(conversation: &str, bytes: &[u8]) -> SynthesizedAudio {
        SynthesizedAudio {
            conversation: ConversationRef::new(conversation),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn bound_conversation_routes_to_the_originating_session_only() {
        let registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let session_a = registry.add_session(tx_a).await;
        let _session_b = registry.add_session(tx_b).await;

        registry
            .bind_conversation(&ConversationRef::new("conv-1"), session_a)
            .await;
        registry.deliver(audio_for("conv-1", b"pcm")).await;

        assert_eq!(
            rx_a.recv().await,
            Some(OutboundFrame::Audio(b"pcm".to_vec()))
        );
        assert!(rx_b.try_recv().is_err(), "unrelated session must not receive");
    }

    #[tokio::test]
    async fn unbound_conversation_broadcasts_to_every_active_session() {
        let registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        registry.add_session(tx_a).await;
        registry.add_session(tx_b).await;

        registry.deliver(audio_for("unknown-conv", b"pcm")).await;

        assert_eq!(
            rx_a.recv().await,
            Some(OutboundFrame::Audio(b"pcm".to_vec()))
        );
        assert_eq!(
            rx_b.recv().await,
            Some(OutboundFrame::Audio(b"pcm".to_vec()))
        );
    }

    #[tokio::test]
    async fn reply_audio_for_a_closed_bound_session_is_dropped_not_rerouted() {
        let registry = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let session_a = registry.add_session(tx_a).await;
        registry.add_session(tx_b).await;

        registry
            .bind_conversation(&ConversationRef::new("conv-1"), session_a)
            .await;
        registry.remove_session(session_a).await;

        // The in-flight reply has no session to write to; nobody receives it.
        registry.deliver(audio_for("conv-1", b"orphaned")).await;
        assert!(rx_b.try_recv().is_err());

        // The stale route is discarded with it, so later deliveries for the
        // same conversation take the broadcast path.
        registry.deliver(audio_for("conv-1", b"pcm")).await;
        assert_eq!(
            rx_b.recv().await,
            Some(OutboundFrame::Audio(b"pcm".to_vec()))
        );
    }

    #[tokio::test]
    async fn remove_session_is_idempotent() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let session = registry.add_session(tx).await;
        registry
            .bind_conversation(&ConversationRef::new("conv-1"), session)
            .await;

        registry.remove_session(session).await;
        assert_eq!(registry.active_count().await, 0);

        // Removing again is a no-op.
        registry.remove_session(session).await;
    }

    #[tokio::test]
    async fn send_to_unknown_session_is_a_noop() {
        let registry = SessionRegistry::new();
        registry
            .send(Uuid::new_v4(), OutboundFrame::Text("{}".to_string()))
            .await;
    }

    #[tokio::test]
    async fn slow_consumer_is_skipped_not_awaited() {
        let registry = SessionRegistry::new();
        let (tx_full, _rx_full) = mpsc::channel(1);
        let (tx_ok, mut rx_ok) = mpsc::channel(8);
        registry.add_session(tx_full.clone()).await;
        registry.add_session(tx_ok).await;

        // Fill the first session's buffer so the broadcast write fails.
        tx_full
            .try_send(OutboundFrame::Audio(b"backlog".to_vec()))
            .unwrap();

        registry.broadcast_audio(b"pcm".to_vec()).await;
        assert_eq!(
            rx_ok.recv().await,
            Some(OutboundFrame::Audio(b"pcm".to_vec()))
        );
    }

    #[tokio::test]
    async fn concurrent_churn_and_broadcast_do_not_deadlock() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..25 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, mut rx) = mpsc::channel(16);
                let session = registry.add_session(tx).await;
                tokio::spawn(async move { while rx.recv().await.is_some() {} });
                registry
                    .bind_conversation(&ConversationRef::new("shared"), session)
                    .await;
                registry.broadcast_audio(b"pcm".to_vec()).await;
                registry.remove_session(session).await;
            }));
        }

        for handle in handles {
            handle.await.expect("task should not panic");
        }
        assert_eq!(registry.active_count().await, 0);
    }
}
