//! Device-backed implementations of the session's capture and playback seams.

mod capture;
pub mod dsp;
mod playback;

pub use capture::CpalMicrophone;
pub use playback::CpalOutput;
