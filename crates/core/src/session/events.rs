//! Inputs to the session event queue and the observable outputs of a session.

use crate::credentials::UrlKind;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Microphone requested, credential being acquired, handshake in progress.
    Connecting,
    /// Socket open, initiation sent, awaiting acknowledgment.
    Initializing,
    /// Capture active, frames transmitted.
    Listening,
    /// Agent audio playing; frames are not transmitted.
    Speaking,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Listening => "listening",
            ConnectionState::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// User-issued commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    /// Disconnect and stop the event loop.
    Shutdown,
}

/// What the relay socket reported.
#[derive(Debug, Clone, PartialEq)]
pub enum RelaySignal {
    Opened,
    Message(String),
    Closed { reason: Option<String> },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// One entry on the session event queue.
///
/// Resource-originated events carry the generation of the connection that
/// produced them; the controller drops those from torn-down connections.
#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Relay { generation: u64, signal: RelaySignal },
    Frame { generation: u64, samples: Vec<f32> },
    KeepAlive { generation: u64 },
    Playback { generation: u64, outcome: PlaybackOutcome },
}

/// Handle given to a socket, capture stream, player or timer so it can feed
/// the queue on behalf of one connection.
#[derive(Clone, Debug)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { generation, tx }
    }

    /// Returns `false` once the controller is gone.
    pub fn relay(&self, signal: RelaySignal) -> bool {
        self.push(SessionEvent::Relay {
            generation: self.generation,
            signal,
        })
    }

    /// Delivers one 16 kHz mono frame of normalized samples.
    pub fn frame(&self, samples: Vec<f32>) -> bool {
        self.push(SessionEvent::Frame {
            generation: self.generation,
            samples,
        })
    }

    pub fn playback(&self, outcome: PlaybackOutcome) -> bool {
        self.push(SessionEvent::Playback {
            generation: self.generation,
            outcome,
        })
    }

    pub(crate) fn keep_alive(&self) -> bool {
        self.push(SessionEvent::KeepAlive {
            generation: self.generation,
        })
    }

    fn push(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Sends user commands to a running controller.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub(crate) tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn connect(&self) -> bool {
        self.command(SessionCommand::Connect)
    }

    pub fn disconnect(&self) -> bool {
        self.command(SessionCommand::Disconnect)
    }

    pub fn shutdown(&self) -> bool {
        self.command(SessionCommand::Shutdown)
    }

    fn command(&self, command: SessionCommand) -> bool {
        self.tx.send(SessionEvent::Command(command)).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Agent,
    /// The agent's revision of its previous response.
    AgentCorrection,
}

/// UI-facing output of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(ConnectionState),
    Transcript { speaker: Speaker, text: String },
    /// A user-visible notice, typically an error.
    Notice(String),
    /// Normalized input level of the last transmitted frame.
    Volume(f32),
    /// Relay-side voice-activity score in `[0, 1]`.
    VoiceActivity(f32),
}

/// Externally observable session state, for statistics and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub agent_id: Option<String>,
    pub conversation_id: Option<String>,
    pub agent_speaking: bool,
    pub last_error: Option<String>,
    pub url_kind: Option<UrlKind>,
    pub messages_sent: u64,
    pub frames_sent: u64,
    pub frames_suppressed: u64,
    pub chunks_received: u64,
}
