//! End-to-end call flows: an Agent driven by a scripted voice client.
//!
//! Run with: `cargo test -p prepwise-call --test call_flow`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use prepwise_call::agent::default_interviewer;
use prepwise_call::{
    Agent, AgentCommand, AgentProps, AgentUpdate, CallStatus, CallTarget, EventHub,
    FeedbackOutcome, FeedbackRequest, FeedbackService, Navigator, Route, Subscription,
    VoiceEvent, VoiceMessage, VoiceSessionClient, VoiceSettings,
};
use prepwise_core::error::Result;
use prepwise_core::types::{CallPurpose, MessageRole, SavedMessage};

/// Emits `script` to subscribers as soon as a call is started.
struct ScriptedClient {
    hub: EventHub,
    script: Vec<VoiceEvent>,
    stops: Mutex<usize>,
}

impl ScriptedClient {
    fn new(script: Vec<VoiceEvent>) -> Arc<Self> {
        Arc::new(Self {
            hub: EventHub::new(),
            script,
            stops: Mutex::new(0),
        })
    }
}

#[async_trait]
impl VoiceSessionClient for ScriptedClient {
    async fn start(&self, _target: CallTarget) -> Result<()> {
        for event in &self.script {
            self.hub.emit(event.clone());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

struct RecordingFeedback {
    succeed: bool,
    requests: Mutex<Vec<FeedbackRequest>>,
}

#[async_trait]
impl FeedbackService for RecordingFeedback {
    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackOutcome> {
        self.requests.lock().unwrap().push(request);
        Ok(if self.succeed {
            FeedbackOutcome::saved("fb-1")
        } else {
            FeedbackOutcome::failed()
        })
    }
}

#[derive(Default)]
struct History(Mutex<Vec<Route>>);

impl Navigator for History {
    fn navigate(&self, route: Route) {
        self.0.lock().unwrap().push(route);
    }
}

fn said(role: MessageRole, text: &str) -> VoiceEvent {
    VoiceEvent::Message {
        message: VoiceMessage::final_transcript(role, text),
    }
}

struct Harness {
    agent: Agent,
    client: Arc<ScriptedClient>,
    feedback: Arc<RecordingFeedback>,
    history: Arc<History>,
}

fn harness(purpose: CallPurpose, script: Vec<VoiceEvent>, succeed: bool) -> Harness {
    let client = ScriptedClient::new(script);
    let feedback = Arc::new(RecordingFeedback {
        succeed,
        requests: Mutex::new(Vec::new()),
    });
    let history = Arc::new(History::default());
    let props = AgentProps {
        user_name: "Ada".into(),
        user_id: "user-1".into(),
        interview_id: Some("int-1".into()),
        feedback_id: None,
        purpose,
        questions: vec!["Why Rust?".into()],
    };
    let voice = VoiceSettings {
        workflow_id: Some("wf-1".into()),
        assistant: default_interviewer(),
    };
    let agent = Agent::new(props, voice, client.clone(), feedback.clone(), history.clone());
    Harness {
        agent,
        client,
        feedback,
        history,
    }
}

#[tokio::test]
async fn test_interview_call_submits_transcript_once() {
    let h = harness(
        CallPurpose::Interview,
        vec![
            VoiceEvent::CallStart,
            said(MessageRole::Assistant, "Why Rust?"),
            VoiceEvent::Message {
                message: VoiceMessage::partial_transcript(MessageRole::User, "Because"),
            },
            said(MessageRole::User, "Because of the borrow checker."),
            said(MessageRole::Assistant, "Thanks, that is all."),
            VoiceEvent::CallEnd,
            VoiceEvent::CallEnd,
        ],
        true,
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(AgentCommand::Call).unwrap();
    let route = tokio::time::timeout(Duration::from_secs(5), h.agent.run(rx))
        .await
        .unwrap();

    let expected = Route::Feedback {
        interview_id: "int-1".into(),
    };
    assert_eq!(route, Some(expected.clone()));
    assert_eq!(expected.path(), "/interview/int-1/feedback");

    let requests = h.feedback.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].transcript,
        vec![
            SavedMessage::new(MessageRole::Assistant, "Why Rust?"),
            SavedMessage::new(MessageRole::User, "Because of the borrow checker."),
            SavedMessage::new(MessageRole::Assistant, "Thanks, that is all."),
        ]
    );
    assert_eq!(requests[0].interview_id, "int-1");
    assert_eq!(*h.history.0.lock().unwrap(), vec![expected]);
    assert_eq!(h.client.hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_failed_feedback_navigates_home() {
    let h = harness(
        CallPurpose::Interview,
        vec![
            VoiceEvent::CallStart,
            said(MessageRole::User, "Hello"),
            VoiceEvent::CallEnd,
        ],
        false,
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(AgentCommand::Call).unwrap();
    let route = h.agent.run(rx).await;

    assert_eq!(route, Some(Route::Home));
    assert_eq!(h.feedback.requests.lock().unwrap().len(), 1);
    assert_eq!(*h.history.0.lock().unwrap(), vec![Route::Home]);
}

#[tokio::test]
async fn test_generate_call_goes_home_without_feedback() {
    let h = harness(
        CallPurpose::Generate,
        vec![VoiceEvent::CallStart, said(MessageRole::User, "Backend, senior"), VoiceEvent::CallEnd],
        true,
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(AgentCommand::Call).unwrap();
    assert_eq!(h.agent.run(rx).await, Some(Route::Home));
    assert!(h.feedback.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_disconnect_finishes_and_stops() {
    let h = harness(
        CallPurpose::Interview,
        vec![VoiceEvent::CallStart, said(MessageRole::Assistant, "Welcome.")],
        true,
    );

    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let agent = h.agent.with_updates(updates_tx);
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(AgentCommand::Call).unwrap();
    let task = tokio::spawn(agent.run(rx));

    // wait until the greeting is on screen before hanging up
    while let Some(update) = updates.recv().await {
        if matches!(update, AgentUpdate::Transcript { .. }) {
            break;
        }
    }
    tx.send(AgentCommand::Disconnect).unwrap();

    let route = task.await.unwrap();
    assert_eq!(
        route,
        Some(Route::Feedback {
            interview_id: "int-1".into()
        })
    );
    assert_eq!(*h.client.stops.lock().unwrap(), 1);

    let mut statuses = Vec::new();
    while let Ok(update) = updates.try_recv() {
        if let AgentUpdate::Status { status } = update {
            statuses.push(status);
        }
    }
    assert_eq!(statuses.last(), Some(&CallStatus::Finished));
    assert_eq!(h.feedback.requests.lock().unwrap()[0].transcript.len(), 1);
}

#[tokio::test]
async fn test_error_mid_call_still_dispatches() {
    let h = harness(
        CallPurpose::Interview,
        vec![
            VoiceEvent::CallStart,
            said(MessageRole::User, "My answer"),
            VoiceEvent::Error {
                message: "transport lost".into(),
            },
        ],
        true,
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(AgentCommand::Call).unwrap();
    let route = tokio::time::timeout(Duration::from_secs(5), h.agent.run(rx))
        .await
        .unwrap();

    assert!(matches!(route, Some(Route::Feedback { .. })));
    assert_eq!(h.feedback.requests.lock().unwrap().len(), 1);
}
