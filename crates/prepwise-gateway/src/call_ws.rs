//! `/api/call/ws`: runs an [`Agent`] for a browser that hosts the voice SDK.
//!
//! The browser forwards SDK events (`{"event":"call-start"}`, ...) and user
//! actions (`{"action":"call"}`). The server answers with frames tagged by
//! `type`: `start`/`stop` drive the SDK, `status`/`transcript`/`speaking`
//! update the UI, and `navigate` tells the page where to go once the call is
//! dispatched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use prepwise_call::{
    Agent, AgentCommand, AgentProps, AgentUpdate, CallStatus, CallTarget, EventHub, Navigator,
    Route, Subscription, VoiceEvent, VoiceSessionClient,
};
use prepwise_core::error::{PrepwiseError, Result};
use prepwise_core::store::load_interview;
use prepwise_core::types::CallPurpose;

use crate::state::AppState;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Query string of the upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallParams {
    #[serde(rename = "type")]
    pub purpose: CallPurpose,
    pub user_name: String,
    pub user_id: String,
    pub interview_id: Option<String>,
    pub feedback_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    Call,
    Disconnect,
}

impl From<ClientAction> for AgentCommand {
    fn from(action: ClientAction) -> Self {
        match action {
            ClientAction::Call => AgentCommand::Call,
            ClientAction::Disconnect => AgentCommand::Disconnect,
        }
    }
}

/// Frames sent by the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Action { action: ClientAction },
    Event(VoiceEvent),
}

/// Frames sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Start { target: CallTarget },
    Stop,
    Status { status: CallStatus },
    #[serde(rename_all = "camelCase")]
    Transcript { last_message: String },
    Speaking { speaking: bool },
    Navigate { path: String },
    Error { message: String },
}

impl From<AgentUpdate> for ServerFrame {
    fn from(update: AgentUpdate) -> Self {
        match update {
            AgentUpdate::Status { status } => Self::Status { status },
            AgentUpdate::Transcript { last_message } => Self::Transcript { last_message },
            AgentUpdate::Speaking { speaking } => Self::Speaking { speaking },
        }
    }
}

/// Voice session whose SDK lives in the browser on the other end of the socket.
struct BridgeVoiceSession {
    hub: EventHub,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl BridgeVoiceSession {
    fn send(&self, frame: ServerFrame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| PrepwiseError::Call("call socket closed".into()))
    }
}

#[async_trait]
impl VoiceSessionClient for BridgeVoiceSession {
    async fn start(&self, target: CallTarget) -> Result<()> {
        self.send(ServerFrame::Start { target })
    }

    async fn stop(&self) -> Result<()> {
        self.send(ServerFrame::Stop)
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

struct WsNavigator {
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl Navigator for WsNavigator {
    fn navigate(&self, route: Route) {
        let path = route.path();
        if self.outbound.send(ServerFrame::Navigate { path }).is_err() {
            debug!(%route, "Call socket gone before navigation");
        }
    }
}

pub async fn call_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<CallParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_call_socket(state, params, socket))
}

async fn handle_call_socket(state: Arc<AppState>, params: CallParams, socket: WebSocket) {
    let call_id = Uuid::new_v4().to_string();
    let live = state.call_opened();
    info!(call_id = %call_id, purpose = ?params.purpose, live, "Call socket opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerFrame>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Unserializable call frame");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let _ = outbound.send(ServerFrame::Status {
        status: CallStatus::Inactive,
    });

    match agent_props(&state, params).await {
        Ok(props) => run_call(&state, &call_id, props, &outbound, &mut ws_rx).await,
        Err(e) => {
            warn!(call_id = %call_id, error = %e, "Call rejected");
            let _ = outbound.send(ServerFrame::Error {
                message: e.detail(),
            });
        }
    }

    drop(outbound);
    if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
        warn!(call_id = %call_id, "Timed out flushing call socket");
    }

    let live = state.call_closed();
    info!(call_id = %call_id, live, "Call socket closed");
}

/// Resolve the agent props, loading interview questions from the store.
async fn agent_props(state: &AppState, params: CallParams) -> Result<AgentProps> {
    let questions = match params.purpose {
        CallPurpose::Generate => Vec::new(),
        CallPurpose::Interview => {
            let id = params.interview_id.as_deref().ok_or_else(|| {
                PrepwiseError::Call("interviewId is required for interview calls".into())
            })?;
            load_interview(state.store.as_ref(), id)
                .await?
                .ok_or_else(|| PrepwiseError::Store(format!("Interview {id} not found")))?
                .questions
        }
    };

    Ok(AgentProps {
        user_name: params.user_name,
        user_id: params.user_id,
        interview_id: params.interview_id,
        feedback_id: params.feedback_id,
        purpose: params.purpose,
        questions,
    })
}

async fn run_call(
    state: &AppState,
    call_id: &str,
    props: AgentProps,
    outbound: &mpsc::UnboundedSender<ServerFrame>,
    ws_rx: &mut SplitStream<WebSocket>,
) {
    let hub = EventHub::new();
    let client = Arc::new(BridgeVoiceSession {
        hub: hub.clone(),
        outbound: outbound.clone(),
    });
    let navigator = Arc::new(WsNavigator {
        outbound: outbound.clone(),
    });

    // Subscribe before spawning so no forwarded event can be missed.
    let events = client.subscribe();
    let updates = outbound.clone();
    let agent = Agent::new(
        props,
        state.voice.clone(),
        client,
        state.feedback.clone(),
        navigator,
    )
    .on_update(move |update| {
        let _ = updates.send(ServerFrame::from(update));
    });

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let mut commands = Some(command_tx);
    let mut agent_task = tokio::spawn(agent.run_subscribed(events, command_rx));

    let outcome = loop {
        tokio::select! {
            outcome = &mut agent_task => break outcome,
            msg = ws_rx.next(), if commands.is_some() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientFrame>(text.as_str()) {
                        Ok(ClientFrame::Action { action }) => {
                            debug!(call_id = %call_id, ?action, "Call action");
                            if let Some(tx) = &commands {
                                let _ = tx.send(action.into());
                            }
                        }
                        Ok(ClientFrame::Event(event)) => {
                            log_event(call_id, &event);
                            hub.emit(event);
                        }
                        Err(e) => {
                            warn!(call_id = %call_id, error = %e, "Invalid call frame");
                            let _ = outbound.send(ServerFrame::Error {
                                message: format!("Invalid frame: {e}"),
                            });
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(call_id = %call_id, "Client closed the call socket");
                    commands = None;
                }
                Some(Err(e)) => {
                    error!(call_id = %call_id, error = %e, "Call socket error");
                    commands = None;
                }
                Some(Ok(_)) => {}
            },
        }
    };

    match outcome {
        Ok(Some(route)) => info!(call_id = %call_id, route = %route, "Call dispatched"),
        Ok(None) => info!(call_id = %call_id, "Call ended before completion"),
        Err(e) => error!(call_id = %call_id, error = %e, "Call task failed"),
    }
}

fn log_event(call_id: &str, event: &VoiceEvent) {
    match event {
        VoiceEvent::Message { .. } => {}
        VoiceEvent::Error { message } => warn!(call_id = %call_id, %message, "SDK error"),
        other => debug!(call_id = %call_id, event = ?other, "SDK event"),
    }
}
