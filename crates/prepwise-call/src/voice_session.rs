//! Voice session client: the boundary to the real-time voice SDK.
//!
//! Concrete clients forward SDK events into an [`EventHub`]; consumers hold a
//! [`Subscription`] for as long as they want events and drop it to unsubscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use prepwise_core::error::Result;
use prepwise_core::types::MessageRole;

/// Events delivered by the voice SDK, in its wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum VoiceEvent {
    CallStart,
    CallEnd,
    Message { message: VoiceMessage },
    SpeechStart,
    SpeechEnd,
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Payload of a `message` event. Only transcripts matter to the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VoiceMessage {
    #[serde(rename_all = "camelCase")]
    Transcript {
        role: MessageRole,
        transcript_type: TranscriptType,
        transcript: String,
    },
    #[serde(other)]
    Other,
}

impl VoiceMessage {
    pub fn final_transcript(role: MessageRole, text: impl Into<String>) -> Self {
        Self::Transcript {
            role,
            transcript_type: TranscriptType::Final,
            transcript: text.into(),
        }
    }

    pub fn partial_transcript(role: MessageRole, text: impl Into<String>) -> Self {
        Self::Transcript {
            role,
            transcript_type: TranscriptType::Partial,
            transcript: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Final,
    Partial,
}

/// What the voice SDK should connect to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallTarget {
    /// A hosted workflow, parameterised by variable values.
    #[serde(rename_all = "camelCase")]
    Workflow {
        workflow_id: String,
        variable_values: serde_json::Map<String, serde_json::Value>,
    },
    /// An inline assistant definition.
    #[serde(rename_all = "camelCase")]
    Assistant {
        assistant: serde_json::Value,
        variable_values: serde_json::Map<String, serde_json::Value>,
    },
}

/// A real-time voice session.
#[async_trait]
pub trait VoiceSessionClient: Send + Sync {
    /// Ask the SDK to start a call. Resolves once the request is accepted;
    /// the call is live only after a [`VoiceEvent::CallStart`] arrives.
    async fn start(&self, target: CallTarget) -> Result<()>;

    /// Terminate the current call.
    async fn stop(&self) -> Result<()>;

    /// Register for events until the returned guard is dropped.
    fn subscribe(&self) -> Subscription;
}

type Subscribers = HashMap<u64, mpsc::UnboundedSender<VoiceEvent>>;

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl HubInner {
    fn remove(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Fan-out of voice events to every live subscription.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        trace!(id, "Voice subscription added");
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to all subscribers; returns how many received it.
    pub fn emit(&self, event: VoiceEvent) -> usize {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Scoped event registration. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<VoiceEvent>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Next event, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<VoiceEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
            trace!(id = self.id, "Voice subscription removed");
        }
    }
}
