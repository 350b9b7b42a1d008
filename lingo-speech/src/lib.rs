//! # Lingo Speech Library (lingo-speech)
//!
//! Resolves spoken phrases to audio and plays them one at a time.
//!
//! **Lookup order:** on-device cache, then remote synthesis. Synthesized
//! audio is written to the cache before playback.
//!
//! **Playback:** single-flight. Every request mints a token and only the
//! latest token may start audio; older requests still populate the cache.

pub mod audio;
pub mod cache;
pub mod error;
pub mod player;
pub mod session;
pub mod synth;

pub use cache::SpeechCache;
pub use error::{Result, SpeechError};
pub use player::{AudioSink, PlaybackHandle};
pub use session::{AudioSource, PlayOutcome, SpeechRequest, SpeechSession};
pub use synth::{
    HttpSynthesizer, IdentityTokenProvider, SpeechSynthesizer, StaticTokenProvider,
    SynthesisRequest, SynthesizedSpeech,
};
