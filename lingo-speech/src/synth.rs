//! Remote speech synthesis client
//!
//! The synthesis endpoint takes `{fileName, text, language}` and answers
//! `{success, encodedMP3?, source?}` with base64 MP3 audio. The endpoint may
//! itself serve pre-rendered audio (reported in `source`).
//!
//! No retries and no backoff: a failed request is terminal for that utterance.

use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("lingo-speech/", env!("CARGO_PKG_VERSION"));

/// Request body sent to the synthesis endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    /// Cache file name, lets the server key its own pre-rendered store
    pub file_name: String,
    pub text: String,
    pub language: String,
}

/// Response body from the synthesis endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "encodedMP3", default)]
    pub encoded_mp3: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decoded synthesis result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    /// MP3 bytes
    pub audio: Vec<u8>,
    /// Where the server got the audio from (e.g. "storage", "tts"), if reported
    pub source: Option<String>,
}

impl SynthesisResponse {
    /// Validate the response and decode its audio
    pub fn into_speech(self) -> Result<SynthesizedSpeech> {
        if !self.success {
            return Err(SpeechError::Rejected(
                self.error
                    .unwrap_or_else(|| "endpoint reported failure".to_string()),
            ));
        }

        let encoded = self
            .encoded_mp3
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SpeechError::MalformedResponse("missing encodedMP3".to_string()))?;

        let audio = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SpeechError::MalformedResponse(format!("invalid base64 audio: {}", e)))?;

        if audio.is_empty() {
            return Err(SpeechError::MalformedResponse("empty audio".to_string()));
        }

        Ok(SynthesizedSpeech {
            audio,
            source: self.source,
        })
    }
}

/// Anything that can turn text into MP3 bytes
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech>;
}

/// Supplies the current user's identity token
#[async_trait]
pub trait IdentityTokenProvider: Send + Sync {
    /// Opaque bearer token, None when signed out
    async fn id_token(&self) -> Option<String>;
}

/// Token provider returning a fixed token
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl IdentityTokenProvider for StaticTokenProvider {
    async fn id_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// HTTP synthesis client
pub struct HttpSynthesizer {
    http_client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn IdentityTokenProvider>,
}

impl HttpSynthesizer {
    /// Build a client for `endpoint`
    ///
    /// # Arguments
    /// * `endpoint` - Synthesis URL (POST)
    /// * `tokens` - Identity token source for bearer auth
    /// * `timeout` - Whole-request timeout
    pub fn new(
        endpoint: impl Into<String>,
        tokens: Arc<dyn IdentityTokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(SpeechError::Config("synthesis endpoint is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SpeechError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            tokens,
        })
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech> {
        debug!(
            file = %request.file_name,
            language = %request.language,
            "Requesting speech synthesis"
        );

        let mut builder = self.http_client.post(&self.endpoint).json(request);
        match self.tokens.id_token().await {
            Some(token) => builder = builder.bearer_auth(token),
            None => debug!("No identity token available, sending unauthenticated request"),
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api(status.as_u16(), error_text));
        }

        let body: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::MalformedResponse(e.to_string()))?;

        let speech = body.into_speech()?;

        info!(
            file = %request.file_name,
            bytes = speech.audio.len(),
            source = speech.source.as_deref().unwrap_or("unknown"),
            "Speech synthesized"
        );

        Ok(speech)
    }
}
