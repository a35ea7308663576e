//! Per-call coordinator.
//!
//! The [`Agent`] owns everything one call needs: the injected voice client,
//! call status, transcript, and completion dispatcher. [`Agent::run`] drives
//! it from SDK events and user commands, one at a time, until the call has
//! finished and been dispatched.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use prepwise_core::config::Config;
use prepwise_core::error::{PrepwiseError, Result};
use prepwise_core::types::{CallPurpose, SavedMessage};

use crate::call_status::CallStatus;
use crate::completion::CompletionDispatcher;
use crate::feedback::FeedbackService;
use crate::navigation::{Navigator, Route};
use crate::transcript::Transcript;
use crate::voice_session::{CallTarget, Subscription, VoiceEvent, VoiceSessionClient};

/// Who the call is for and what it is about.
#[derive(Debug, Clone, Default)]
pub struct AgentProps {
    pub user_name: String,
    pub user_id: String,
    pub interview_id: Option<String>,
    pub feedback_id: Option<String>,
    pub purpose: CallPurpose,
    pub questions: Vec<String>,
}

/// Voice SDK targets used to start calls.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub workflow_id: Option<String>,
    pub assistant: Value,
}

impl VoiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workflow_id: config.workflow_id(),
            assistant: config
                .voice
                .as_ref()
                .and_then(|v| v.assistant.clone())
                .unwrap_or_else(default_interviewer),
        }
    }
}

/// Built-in interviewer assistant. `{{questions}}` is filled from the call's
/// variable values.
pub fn default_interviewer() -> Value {
    json!({
        "name": "Interviewer",
        "firstMessage": "Hello! Thank you for taking the time to speak with me today. I'm looking forward to learning more about you and your experience.",
        "transcriber": {
            "provider": "deepgram",
            "model": "nova-2",
            "language": "en"
        },
        "voice": {
            "provider": "11labs",
            "voiceId": "sarah",
            "stability": 0.4,
            "similarityBoost": 0.8,
            "speed": 0.9,
            "style": 0.5,
            "useSpeakerBoost": true
        },
        "model": {
            "provider": "openai",
            "model": "gpt-4",
            "messages": [{
                "role": "system",
                "content": "You are a professional job interviewer conducting a real-time voice interview with a candidate. Your goal is to assess their qualifications, motivation, and fit for the role.\n\nFollow the structured question flow:\n{{questions}}\n\nListen actively, acknowledge answers before moving on, and ask brief follow-up questions when a response is vague. Keep responses short and conversational, as in a real voice interview. Stay professional and polite. When the questions are done, thank the candidate, tell them the company will reach out with feedback, and end the conversation."
            }]
        }
    })
}

/// User actions on the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    Call,
    Disconnect,
}

/// Changes the UI should reflect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentUpdate {
    Status { status: CallStatus },
    #[serde(rename_all = "camelCase")]
    Transcript { last_message: String },
    Speaking { speaking: bool },
}

type UpdateSink = Box<dyn Fn(AgentUpdate) + Send + Sync>;

pub struct Agent {
    props: AgentProps,
    voice: VoiceSettings,
    client: Arc<dyn VoiceSessionClient>,
    dispatcher: CompletionDispatcher,
    status: CallStatus,
    transcript: Transcript,
    speaking: bool,
    updates: Option<UpdateSink>,
}

impl Agent {
    pub fn new(
        props: AgentProps,
        voice: VoiceSettings,
        client: Arc<dyn VoiceSessionClient>,
        feedback: Arc<dyn FeedbackService>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let dispatcher = CompletionDispatcher::new(
            props.purpose,
            props.interview_id.clone(),
            props.user_id.clone(),
            props.feedback_id.clone(),
            feedback,
            navigator,
        );
        debug!(
            purpose = ?props.purpose,
            user_id = %props.user_id,
            interview_id = props.interview_id.as_deref().unwrap_or("-"),
            questions = props.questions.len(),
            "Agent created"
        );
        Self {
            props,
            voice,
            client,
            dispatcher,
            status: CallStatus::Inactive,
            transcript: Transcript::new(),
            speaking: false,
            updates: None,
        }
    }

    /// Forward status, transcript, and speaking changes to `tx`.
    pub fn with_updates(self, tx: mpsc::UnboundedSender<AgentUpdate>) -> Self {
        self.on_update(move |update| {
            let _ = tx.send(update);
        })
    }

    /// Call `sink` synchronously for every update, in the order they happen.
    pub fn on_update(mut self, sink: impl Fn(AgentUpdate) + Send + Sync + 'static) -> Self {
        self.updates = Some(Box::new(sink));
        self
    }

    pub fn props(&self) -> &AgentProps {
        &self.props
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn transcript(&self) -> &[SavedMessage] {
        self.transcript.messages()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.transcript.last_message()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    fn publish(&self, update: AgentUpdate) {
        if let Some(sink) = &self.updates {
            sink(update);
        }
    }

    fn transition(&mut self, next: CallStatus) -> Result<()> {
        self.status = self.status.transition(next)?;
        info!(status = %self.status, "Call status changed");
        self.publish(AgentUpdate::Status {
            status: self.status,
        });
        Ok(())
    }

    /// Apply a transition requested by an SDK event; invalid ones are logged
    /// and leave the state untouched.
    fn transition_on_event(&mut self, next: CallStatus) {
        if let Err(e) = self.transition(next) {
            warn!(error = %e, "Ignoring voice event");
        }
    }

    fn call_target(&self) -> Result<CallTarget> {
        match self.props.purpose {
            CallPurpose::Generate => {
                let workflow_id = self.voice.workflow_id.clone().ok_or_else(|| {
                    PrepwiseError::Config("voice workflow id is missing for generate calls".into())
                })?;
                let mut variable_values = Map::new();
                variable_values.insert("username".into(), json!(self.props.user_name));
                variable_values.insert("userid".into(), json!(self.props.user_id));
                Ok(CallTarget::Workflow {
                    workflow_id,
                    variable_values,
                })
            }
            CallPurpose::Interview => {
                let mut variable_values = Map::new();
                variable_values.insert(
                    "questions".into(),
                    json!(format_questions(&self.props.questions)),
                );
                Ok(CallTarget::Assistant {
                    assistant: self.voice.assistant.clone(),
                    variable_values,
                })
            }
        }
    }

    /// Start the call. Any local failure returns the agent to INACTIVE.
    pub async fn handle_call(&mut self) -> Result<()> {
        self.transition(CallStatus::Connecting)?;

        let started = match self.call_target() {
            Ok(target) => {
                info!(purpose = ?self.props.purpose, "Starting voice call");
                self.client.start(target).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = started {
            error!(error = %e, "Error starting voice call");
            self.transition(CallStatus::Inactive)?;
            return Err(e);
        }
        Ok(())
    }

    /// End the call from the user's side.
    pub async fn handle_disconnect(&mut self) -> Result<()> {
        self.transition(CallStatus::Finished)?;
        if let Err(e) = self.client.stop().await {
            warn!(error = %e, "Voice client did not stop cleanly");
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::CallStart => self.transition_on_event(CallStatus::Active),
            VoiceEvent::CallEnd => self.transition_on_event(CallStatus::Finished),
            VoiceEvent::Message { message } => {
                if let Some(saved) = self.transcript.accept(&message) {
                    let last_message = saved.content.clone();
                    self.publish(AgentUpdate::Transcript { last_message });
                }
            }
            VoiceEvent::SpeechStart => self.set_speaking(true),
            VoiceEvent::SpeechEnd => self.set_speaking(false),
            VoiceEvent::Error { message } => {
                error!(error = %message, status = %self.status, "Voice session error");
                if self.status == CallStatus::Active {
                    self.transition_on_event(CallStatus::Finished);
                }
            }
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        debug!(speaking, "Speech");
        self.speaking = speaking;
        self.publish(AgentUpdate::Speaking { speaking });
    }

    async fn handle_command(&mut self, command: AgentCommand) {
        let result = match command {
            AgentCommand::Call => self.handle_call().await,
            AgentCommand::Disconnect => self.handle_disconnect().await,
        };
        if let Err(e) = result {
            warn!(?command, error = %e, "Command rejected");
        }
    }

    /// Hand the transcript to the completion dispatcher.
    pub async fn complete(&mut self) -> Option<Route> {
        if self.status != CallStatus::Finished {
            return None;
        }
        self.dispatcher.dispatch(self.transcript.take()).await
    }

    /// Drive the call until it finishes, the client goes away, or the command
    /// channel closes.
    pub async fn run(self, commands: mpsc::UnboundedReceiver<AgentCommand>) -> Option<Route> {
        let events = self.client.subscribe();
        self.run_subscribed(events, commands).await
    }

    /// Like [`Agent::run`], for callers that subscribed before spawning.
    pub async fn run_subscribed(
        mut self,
        mut events: Subscription,
        mut commands: mpsc::UnboundedReceiver<AgentCommand>,
    ) -> Option<Route> {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Voice event stream closed");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },
            }

            if self.status == CallStatus::Finished {
                return self.complete().await;
            }
        }

        if matches!(self.status, CallStatus::Connecting | CallStatus::Active) {
            info!(status = %self.status, "Tearing down unfinished call");
            if let Err(e) = self.client.stop().await {
                warn!(error = %e, "Voice client did not stop cleanly");
            }
        }
        None
    }
}

/// Questions as `- question` lines for the assistant prompt.
pub fn format_questions(questions: &[String]) -> String {
    questions
        .iter()
        .map(|q| format!("- {q}"))
        .collect::<Vec<_>>()
        .join("\n")
}
