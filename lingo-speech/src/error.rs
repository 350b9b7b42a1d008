//! Error types for lingo-speech
//!
//! Every failure is terminal for the single request that hit it. Nothing is
//! retried and a failed request never leaves a cache entry behind.

use thiserror::Error;

/// Main error type for lingo-speech
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Configuration errors (missing endpoint, bad client settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache directory or file I/O errors
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure talking to the synthesis endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// Endpoint answered with a non-success HTTP status
    #[error("Synthesis API error {0}: {1}")]
    Api(u16, String),

    /// Endpoint answered `success: false`
    #[error("Synthesis rejected: {0}")]
    Rejected(String),

    /// Response body missing audio or not decodable
    #[error("Malformed synthesis response: {0}")]
    MalformedResponse(String),

    /// Audio bytes could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),
}

/// Convenience Result type using SpeechError
pub type Result<T> = std::result::Result<T, SpeechError>;
