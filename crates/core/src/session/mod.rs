//! Session Controller
//!
//! Drives one realtime conversation: agent lookup, microphone permission,
//! credential negotiation, socket lifecycle, keep-alive and the half-duplex
//! turn-taking rule. Every input (user commands, socket signals, captured
//! frames, playback completions, keep-alive ticks) arrives on a single event
//! queue and is applied to an explicit state machine:
//!
//! ```text
//! disconnected -> connecting -> initializing -> listening <-> speaking
//!       ^______________________________________________________|
//! ```
//!
//! The controller exclusively owns the capture stream, the socket and the
//! keep-alive timer, and releases all three on every path back to
//! `disconnected`.

mod audio;
mod events;

pub use audio::{AudioOutput, CaptureError, CaptureStream, Microphone};
pub use events::{
    ConnectionState, EventSink, PlaybackOutcome, RelaySignal, SessionCommand, SessionEvent,
    SessionHandle, SessionSnapshot, SessionUpdate, Speaker,
};

use crate::{
    codec,
    config::SessionConfig,
    credentials::{self, CredentialSource, UrlKind},
    protocol::{ControlMessage, RelayEvent, UserAudioChunk},
    relay::{RelayConnector, RelaySocket},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, interval_at},
};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Agent is not ready")]
    AgentNotReady,
    #[error("Agent lookup failed: {0}")]
    AgentLookup(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Relay endpoint is unusable: {0}")]
    Endpoint(String),
    #[error("Relay connection failed: {0}")]
    Socket(String),
    #[error("Not connected")]
    NotConnected,
}

/// The collaborators a controller drives.
pub struct SessionDeps {
    pub credentials: Arc<dyn CredentialSource>,
    pub connector: Arc<dyn RelayConnector>,
    pub microphone: Arc<dyn Microphone>,
    pub output: Box<dyn AudioOutput>,
}

pub struct SessionController {
    config: SessionConfig,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn RelayConnector>,
    microphone: Arc<dyn Microphone>,
    output: Box<dyn AudioOutput>,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,

    state: ConnectionState,
    generation: u64,
    agent_id: Option<String>,
    conversation_id: Option<String>,
    last_error: Option<String>,
    url_kind: Option<UrlKind>,
    pending_playback: usize,
    messages_sent: u64,
    frames_sent: u64,
    frames_suppressed: u64,
    chunks_received: u64,

    capture: Option<Box<dyn CaptureStream>>,
    socket: Option<Box<dyn RelaySocket>>,
    keep_alive: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Creates a controller in the `disconnected` state, along with the stream
    /// of UI updates it will emit.
    pub fn new(
        config: SessionConfig,
        deps: SessionDeps,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let agent_id = config.agent_id.clone().filter(|id| !id.is_empty());
        let (snapshot_tx, _) = watch::channel(SessionSnapshot {
            agent_id: agent_id.clone(),
            ..Default::default()
        });

        let controller = Self {
            config,
            credentials: deps.credentials,
            connector: deps.connector,
            microphone: deps.microphone,
            output: deps.output,
            events_tx,
            events_rx,
            updates_tx,
            snapshot_tx,
            state: ConnectionState::Disconnected,
            generation: 0,
            agent_id,
            conversation_id: None,
            last_error: None,
            url_kind: None,
            pending_playback: 0,
            messages_sent: 0,
            frames_sent: 0,
            frames_suppressed: 0,
            chunks_received: 0,
            capture: None,
            socket: None,
            keep_alive: None,
        };
        (controller, updates_rx)
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Watches the session snapshot; updated after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            agent_id: self.agent_id.clone(),
            conversation_id: self.conversation_id.clone(),
            agent_speaking: self.state == ConnectionState::Speaking,
            last_error: self.last_error.clone(),
            url_kind: self.url_kind,
            messages_sent: self.messages_sent,
            frames_sent: self.frames_sent,
            frames_suppressed: self.frames_suppressed,
            chunks_received: self.chunks_received,
        }
    }

    /// Processes events until a `Shutdown` command.
    pub async fn run(mut self) {
        info!("Session controller started.");
        while let Some(event) = self.events_rx.recv().await {
            if !self.dispatch(event).await {
                break;
            }
        }
        self.teardown().await;
        self.publish();
        info!("Session controller stopped.");
    }

    /// Processes every event already queued, without waiting for more.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            if !self.dispatch(event).await {
                break;
            }
        }
    }

    /// Applies one event. Returns `false` when the loop should stop.
    pub async fn dispatch(&mut self, event: SessionEvent) -> bool {
        let keep_running = match event {
            SessionEvent::Command(SessionCommand::Connect) => {
                self.on_connect().await;
                true
            }
            SessionEvent::Command(SessionCommand::Disconnect) => {
                self.on_disconnect().await;
                true
            }
            SessionEvent::Command(SessionCommand::Shutdown) => {
                self.on_disconnect().await;
                false
            }
            SessionEvent::Relay { generation, signal } if generation == self.generation => {
                self.on_relay(signal).await;
                true
            }
            SessionEvent::Frame {
                generation,
                samples,
            } if generation == self.generation => {
                self.transmit_frame(&samples).await;
                true
            }
            SessionEvent::KeepAlive { generation } if generation == self.generation => {
                self.on_keep_alive().await;
                true
            }
            SessionEvent::Playback {
                generation,
                outcome,
            } if generation == self.generation => {
                self.on_playback(outcome);
                true
            }
            stale => {
                debug!(?stale, current = self.generation, "Dropping event from a closed connection.");
                true
            }
        };
        self.publish();
        keep_running
    }

    #[instrument(name = "session_connect", skip_all, fields(generation = self.generation))]
    async fn on_connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!(state = %self.state, "Connect while active; tearing down the previous connection.");
            self.teardown().await;
        }

        let agent_id = match self.resolve_agent().await {
            Ok(agent_id) => agent_id,
            Err(e) => {
                warn!(error = %e, "Connect refused.");
                self.record_error(&e);
                return;
            }
        };

        self.set_state(ConnectionState::Connecting);
        self.conversation_id = None;
        self.url_kind = None;

        match self.microphone.acquire().await {
            Ok(capture) => self.capture = Some(capture),
            Err(e) => {
                self.fail(SessionError::Capture(e)).await;
                return;
            }
        }

        let resolved = match credentials::negotiate(
            self.credentials.as_ref(),
            &self.config.ws_endpoint_template,
            &agent_id,
        )
        .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(SessionError::Endpoint(e.to_string())).await;
                return;
            }
        };
        self.url_kind = Some(resolved.kind);
        info!(url_kind = %resolved.kind, "Opening relay socket.");

        match self.connector.connect(&resolved.url, self.sink()).await {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => self.fail(SessionError::Socket(format!("{e:#}"))).await,
        }
    }

    async fn resolve_agent(&mut self) -> Result<String, SessionError> {
        if let Some(agent_id) = &self.agent_id {
            return Ok(agent_id.clone());
        }
        let identity = self
            .credentials
            .agent_identity()
            .await
            .map_err(|e| SessionError::AgentLookup(e.to_string()))?;
        let agent_id = identity
            .ready_id()
            .ok_or(SessionError::AgentNotReady)?
            .to_string();
        info!(%agent_id, "Agent is ready.");
        self.agent_id = Some(agent_id.clone());
        Ok(agent_id)
    }

    async fn on_disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            debug!("Disconnect while already disconnected.");
            return;
        }
        info!("Disconnect requested.");
        self.teardown().await;
    }

    async fn on_relay(&mut self, signal: RelaySignal) {
        match signal {
            RelaySignal::Opened => {
                if self.state != ConnectionState::Connecting {
                    warn!(state = %self.state, "Socket opened in an unexpected state.");
                    return;
                }
                self.set_state(ConnectionState::Initializing);
                let initiation = ControlMessage::initiation(self.config.language.as_deref());
                if let Err(e) = self.send(&initiation).await {
                    self.fail(e).await;
                    return;
                }
                info!("Initiation sent.");
            }
            RelaySignal::Message(text) => match RelayEvent::parse(&text) {
                Ok(event) => self.on_relay_event(event).await,
                Err(e) => warn!(error = %e, "Dropping malformed relay message."),
            },
            RelaySignal::Closed { reason } => {
                info!(?reason, "Relay connection closed.");
                self.notify(SessionUpdate::Notice("Connection closed".to_string()));
                self.teardown().await;
            }
            RelaySignal::Failed(reason) => {
                self.fail(SessionError::Socket(reason)).await;
            }
        }
    }

    async fn on_relay_event(&mut self, event: RelayEvent) {
        debug!(kind = event.kind(), "Relay event.");
        match event {
            RelayEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: metadata,
            } => {
                if self.state != ConnectionState::Initializing {
                    warn!(state = %self.state, "Ignoring repeated initiation metadata.");
                    return;
                }
                info!(
                    conversation_id = %metadata.conversation_id,
                    audio_format = metadata.agent_output_audio_format.as_deref().unwrap_or("pcm_16000"),
                    "Conversation ready."
                );
                self.conversation_id = Some(metadata.conversation_id);
                self.set_state(ConnectionState::Listening);
                self.start_keep_alive();
                self.start_capture().await;
            }
            RelayEvent::UserTranscript {
                user_transcription_event,
            } => {
                let text = user_transcription_event.user_transcript;
                if !text.trim().is_empty() {
                    self.notify(SessionUpdate::Transcript {
                        speaker: Speaker::User,
                        text,
                    });
                }
            }
            RelayEvent::AgentResponse {
                agent_response_event,
            } => {
                self.notify(SessionUpdate::Transcript {
                    speaker: Speaker::Agent,
                    text: agent_response_event.agent_response,
                });
                if self.state == ConnectionState::Listening {
                    self.set_state(ConnectionState::Speaking);
                }
            }
            RelayEvent::AgentResponseCorrection {
                agent_response_correction_event,
            } => {
                self.notify(SessionUpdate::Transcript {
                    speaker: Speaker::AgentCorrection,
                    text: agent_response_correction_event.corrected_agent_response,
                });
            }
            RelayEvent::Audio { audio_event } => {
                self.chunks_received += 1;
                match codec::decode_chunk(&audio_event.audio_base_64) {
                    Ok(clip) => {
                        self.pending_playback += 1;
                        let sink = self.sink();
                        self.output.play(clip, sink);
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable audio chunk.");
                        self.finish_turn_if_drained();
                    }
                }
            }
            RelayEvent::Interruption => {
                info!("Agent interrupted.");
                self.output.flush();
                self.pending_playback = 0;
                if self.state == ConnectionState::Speaking {
                    self.set_state(ConnectionState::Listening);
                }
            }
            RelayEvent::VadScore { vad_score_event } => {
                self.notify(SessionUpdate::VoiceActivity(
                    vad_score_event.vad_score.clamp(0.0, 1.0),
                ));
            }
            RelayEvent::Ping { ping_event } => {
                let pong = ControlMessage::Pong {
                    event_id: ping_event.event_id,
                };
                if let Err(e) = self.send(&pong).await {
                    self.fail(e).await;
                }
            }
            RelayEvent::Error { message } => {
                let message = message.unwrap_or_else(|| "Relay reported an error".to_string());
                warn!(%message, "Relay error event.");
                self.last_error = Some(message.clone());
                self.notify(SessionUpdate::Notice(message));
            }
            RelayEvent::Unknown => debug!("Ignoring unrecognized relay event."),
        }
    }

    /// The single frame-production boundary: frames are only transmitted while
    /// listening. Anything else (not yet acknowledged, agent speaking) is dropped.
    async fn transmit_frame(&mut self, samples: &[f32]) {
        if self.state != ConnectionState::Listening {
            self.frames_suppressed += 1;
            return;
        }
        let chunk = UserAudioChunk {
            user_audio_chunk: codec::encode_frame(samples),
        };
        if let Err(e) = self.send(&chunk).await {
            self.fail(e).await;
            return;
        }
        self.frames_sent += 1;
        self.notify(SessionUpdate::Volume(codec::volume_level(samples)));
    }

    async fn on_keep_alive(&mut self) {
        if !matches!(
            self.state,
            ConnectionState::Listening | ConnectionState::Speaking
        ) {
            return;
        }
        if let Err(e) = self.send(&ControlMessage::KeepAlive).await {
            self.fail(e).await;
            return;
        }
        debug!("Keep-alive sent.");
    }

    fn on_playback(&mut self, outcome: PlaybackOutcome) {
        if let PlaybackOutcome::Failed(reason) = outcome {
            warn!(%reason, "Audio clip failed to play.");
        }
        self.pending_playback = self.pending_playback.saturating_sub(1);
        self.finish_turn_if_drained();
    }

    /// The agent's turn ends once nothing is left to play.
    fn finish_turn_if_drained(&mut self) {
        if self.pending_playback == 0 && self.state == ConnectionState::Speaking {
            self.set_state(ConnectionState::Listening);
        }
    }

    fn start_keep_alive(&mut self) {
        let sink = self.sink();
        let period = self.config.keep_alive_interval;
        self.keep_alive = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !sink.keep_alive() {
                    break;
                }
            }
        }));
    }

    async fn start_capture(&mut self) {
        let sink = self.sink();
        let frame_size = self.config.frame_size;
        let started = match self.capture.as_mut() {
            Some(capture) => capture.start(frame_size, sink),
            None => Err(CaptureError::NoDevice),
        };
        if let Err(e) = started {
            self.fail(SessionError::Capture(e)).await;
        }
    }

    async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), SessionError> {
        let text = serde_json::to_string(message).map_err(|e| SessionError::Socket(e.to_string()))?;
        let socket = self.socket.as_mut().ok_or(SessionError::NotConnected)?;
        socket
            .send_text(text)
            .await
            .map_err(|e| SessionError::Socket(format!("{e:#}")))?;
        self.messages_sent += 1;
        Ok(())
    }

    /// Fatal path: record, notify, release everything.
    async fn fail(&mut self, error: SessionError) {
        error!(error = %error, state = %self.state, "Session failed.");
        self.record_error(&error);
        self.teardown().await;
    }

    fn record_error(&mut self, error: &SessionError) {
        let message = error.to_string();
        self.last_error = Some(message.clone());
        self.notify(SessionUpdate::Notice(message));
    }

    /// Stops capture, closes the socket, cancels keep-alive, in that order.
    /// Each resource is released at most once; repeated calls are no-ops.
    async fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }
        if let Some(keep_alive) = self.keep_alive.take() {
            keep_alive.abort();
        }
        if self.pending_playback > 0 {
            self.output.flush();
            self.pending_playback = 0;
        }
        self.generation += 1;
        self.set_state(ConnectionState::Disconnected);
    }

    fn sink(&self) -> EventSink {
        EventSink::new(self.generation, self.events_tx.clone())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "Session state change.");
        self.state = state;
        self.notify(SessionUpdate::StateChanged(state));
    }

    fn notify(&self, update: SessionUpdate) {
        let _ = self.updates_tx.send(update);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
