//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration,
//! the provider client and the request counters reported by diagnostics.

use crate::{config::Config, signer::UrlSigner};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Instant;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when no provider API key is configured.
    pub signer: Option<Arc<dyn UrlSigner>>,
    pub started_at: Instant,
    pub stats: SignedUrlStats,
}

impl AppState {
    pub fn new(config: Config, signer: Option<Arc<dyn UrlSigner>>) -> Self {
        Self {
            config: Arc::new(config),
            signer,
            started_at: Instant::now(),
            stats: SignedUrlStats::default(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Counters for the signed-URL endpoint.
#[derive(Default)]
pub struct SignedUrlStats {
    requests: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl SignedUrlStats {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.into());
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|last| last.clone())
    }
}
