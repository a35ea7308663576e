//! Call lifecycle for voice interviews.
//!
//! An [`agent::Agent`] drives one call: it starts the voice session, tracks
//! [`call_status::CallStatus`], accumulates the [`transcript::Transcript`], and
//! hands off to the [`completion::CompletionDispatcher`] when the call ends.

pub mod agent;
pub mod call_status;
pub mod completion;
pub mod feedback;
pub mod navigation;
pub mod transcript;
pub mod voice_session;

pub use agent::{Agent, AgentCommand, AgentProps, AgentUpdate, VoiceSettings};
pub use call_status::{CallStatus, TransitionError};
pub use completion::CompletionDispatcher;
pub use feedback::{FeedbackOutcome, FeedbackRequest, FeedbackService, LlmFeedbackService};
pub use navigation::{Navigator, Route};
pub use transcript::Transcript;
pub use voice_session::{CallTarget, EventHub, Subscription, VoiceEvent, VoiceMessage, VoiceSessionClient};
