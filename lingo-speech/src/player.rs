//! Audio sink abstraction
//!
//! The session only needs two things from an output device: start an
//! utterance, and stop it again. `CpalSink` is the real implementation;
//! tests substitute recording sinks.

use crate::error::Result;

/// A started utterance
pub trait PlaybackHandle: Send {
    /// Stop and unload. Returns once the audio is silent.
    fn stop(&mut self);

    /// True once the utterance has played to the end (or was stopped)
    fn is_finished(&self) -> bool;
}

/// Output that can play MP3 bytes
pub trait AudioSink: Send + Sync {
    /// Decode and start playing `audio`
    ///
    /// # Arguments
    /// * `audio` - MP3 bytes
    /// * `label` - Human-readable name for logs (the spoken text)
    fn play(&self, audio: Vec<u8>, label: &str) -> Result<Box<dyn PlaybackHandle>>;
}
