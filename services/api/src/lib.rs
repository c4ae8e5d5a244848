//! VoxBridge API Library Crate
//!
//! The credential intermediary for the voice relay: it holds the provider API
//! key, exchanges it for signed relay URLs, reports the configured agent, and
//! serves the browser client. The `api` binary is a thin wrapper around this
//! library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod signer;
pub mod state;
