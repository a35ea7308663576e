//! What happens once a call reaches FINISHED.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use prepwise_core::types::{CallPurpose, SavedMessage};

use crate::feedback::{FeedbackRequest, FeedbackService};
use crate::navigation::{Navigator, Route};

/// One-shot handler for the end of a call.
///
/// Generate calls go straight home. Interview calls submit the transcript for
/// scoring and land on the feedback view when it was saved, home otherwise.
pub struct CompletionDispatcher {
    purpose: CallPurpose,
    interview_id: Option<String>,
    user_id: String,
    feedback_id: Option<String>,
    feedback: Arc<dyn FeedbackService>,
    navigator: Arc<dyn Navigator>,
    fired: AtomicBool,
}

impl CompletionDispatcher {
    pub fn new(
        purpose: CallPurpose,
        interview_id: Option<String>,
        user_id: String,
        feedback_id: Option<String>,
        feedback: Arc<dyn FeedbackService>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            purpose,
            interview_id,
            user_id,
            feedback_id,
            feedback,
            navigator,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Run completion for `transcript`. Only the first call does anything;
    /// later calls return `None`.
    pub async fn dispatch(&self, transcript: Vec<SavedMessage>) -> Option<Route> {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Completion already dispatched");
            return None;
        }

        let route = match self.purpose {
            CallPurpose::Generate => Route::Home,
            CallPurpose::Interview => self.submit(transcript).await,
        };
        self.navigator.navigate(route.clone());
        Some(route)
    }

    async fn submit(&self, transcript: Vec<SavedMessage>) -> Route {
        let Some(interview_id) = self.interview_id.clone() else {
            error!("Interview call finished without an interview id");
            return Route::Home;
        };

        info!(
            interview_id = %interview_id,
            messages = transcript.len(),
            "Submitting transcript for feedback"
        );

        let request = FeedbackRequest {
            interview_id: interview_id.clone(),
            user_id: self.user_id.clone(),
            transcript,
            feedback_id: self.feedback_id.clone(),
        };

        match self.feedback.create_feedback(request).await {
            Ok(outcome) if outcome.success && outcome.feedback_id.is_some() => {
                Route::Feedback { interview_id }
            }
            Ok(outcome) => {
                error!(interview_id = %interview_id, ?outcome, "Error saving feedback");
                Route::Home
            }
            Err(e) => {
                error!(interview_id = %interview_id, error = %e, "Feedback submission failed");
                Route::Home
            }
        }
    }
}
