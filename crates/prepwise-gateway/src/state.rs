//! Gateway shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use prepwise_call::{FeedbackService, LlmFeedbackService, VoiceSettings};
use prepwise_core::config::Config;
use prepwise_core::store::DocumentStore;
use prepwise_providers::ProviderHandle;

/// Shared state accessible from all handlers. Requests never mutate it apart
/// from the live call counter.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub provider: ProviderHandle,
    pub feedback: Arc<dyn FeedbackService>,
    pub voice: VoiceSettings,
    active_calls: AtomicUsize,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn DocumentStore>, provider: ProviderHandle) -> Self {
        let feedback: Arc<dyn FeedbackService> = Arc::new(LlmFeedbackService::new(
            config.clone(),
            provider.clone(),
            store.clone(),
        ));
        let voice = VoiceSettings::from_config(&config);
        Self {
            config,
            store,
            provider,
            feedback,
            voice,
            active_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the feedback collaborator.
    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackService>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn call_opened(&self) -> usize {
        self.active_calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn call_closed(&self) -> usize {
        self.active_calls.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }
}
