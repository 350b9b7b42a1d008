//! Audio decoding and device output
//!
//! **Architecture:** symphonia decodes the whole utterance into interleaved
//! stereo f32; cpal plays it from a dedicated thread.

pub mod decode;
pub mod output;

pub use decode::{decode_mp3, DecodedAudio};
pub use output::{CpalPlayback, CpalSink};
