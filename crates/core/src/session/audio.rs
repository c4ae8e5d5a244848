//! Capture and playback seams owned by the session.

use super::events::EventSink;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("No capture device available")]
    NoDevice,
    #[error("Capture device error: {0}")]
    Device(String),
}

/// Grants access to the capture device.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An acquired capture device.
pub trait CaptureStream: Send {
    /// Starts delivering frames of `frame_size` samples (16 kHz mono) to `events`.
    fn start(&mut self, frame_size: usize, events: EventSink) -> Result<(), CaptureError>;

    /// Stops capture and releases the device.
    fn stop(&mut self);
}

/// Plays WAV clips in the order they are queued.
pub trait AudioOutput: Send {
    /// Queues a clip. Its completion or failure is reported through `events`.
    fn play(&mut self, clip: Vec<u8>, events: EventSink);

    /// Drops every queued clip. Dropped clips are not reported.
    fn flush(&mut self) {}
}
