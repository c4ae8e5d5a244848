//! Core of the voice relay client.
//!
//! Holds everything that does not touch a concrete audio device or HTTP
//! server: the PCM16 codec, the relay wire protocol, credential negotiation,
//! the socket transport and the session controller that ties them together.

pub mod codec;
pub mod config;
pub mod credentials;
pub mod protocol;
pub mod relay;
pub mod session;

pub use config::SessionConfig;
pub use session::{
    ConnectionState, SessionController, SessionDeps, SessionHandle, SessionSnapshot,
    SessionUpdate,
};
