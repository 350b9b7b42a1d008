//! Single-flight speech playback session
//!
//! One `SpeechSession` per process owns the "current utterance" and the
//! latest request token. Callers share it behind an `Arc`.
//!
//! # Resolution order
//!
//! 1. Empty text or language: ignored, no I/O
//! 2. Mint a token, stop whatever is playing
//! 3. Cache hit: play
//! 4. Cache miss: synthesize, write the cache entry, then play
//!
//! # Cancellation
//!
//! A request may only start audio if its token is still the latest when its
//! I/O completes. Superseded requests still write their cache entry; only
//! their playback is suppressed. The network call itself is never aborted.
//!
//! The freshness check and the installation of the new handle happen under
//! the same lock a newer request takes to stop the current handle, so two
//! utterances can never overlap. `stop()` also mints a token, so a request
//! still in flight when it is called stays silent.
//!
//! Sink calls (decode, device open, thread join) are synchronous and run on
//! the blocking pool, never on the async worker.

use crate::cache::SpeechCache;
use crate::error::{Result, SpeechError};
use crate::player::{AudioSink, PlaybackHandle};
use crate::synth::{SpeechSynthesizer, SynthesisRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// How often `wait_until_idle` polls the current handle
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A phrase to speak
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    /// Language or voice code, e.g. "es-ES"
    pub language: String,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
        }
    }

    /// True if either field is empty (request is a no-op)
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() || self.language.is_empty()
    }
}

/// Where played audio came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// Read from the on-device cache
    Cache,
    /// Fetched from the synthesis endpoint (and now cached)
    Synthesized,
}

/// Result of a `play` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Empty text or language, nothing happened
    Ignored,
    /// Audio started
    Played { token: u64, source: AudioSource },
    /// A newer request arrived first; audio is cached but was not played
    Superseded { token: u64 },
}

/// Player session: cache + synthesizer + sink, with single-flight playback
pub struct SpeechSession {
    cache: SpeechCache,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    /// Token of the most recent request
    latest: AtomicU64,
    /// Currently playing utterance
    current: Mutex<Option<Box<dyn PlaybackHandle>>>,
}

impl SpeechSession {
    pub fn new(
        cache: SpeechCache,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            cache,
            synthesizer,
            sink,
            latest: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Speech cache used by this session
    pub fn cache(&self) -> &SpeechCache {
        &self.cache
    }

    /// Token of the most recent request or `stop()` (0 before either)
    pub fn latest_token(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Resolve and play a phrase
    ///
    /// # Returns
    /// * `Ok(PlayOutcome)` - Ignored, played, or superseded by a newer request
    /// * `Err(_)` - Cache, network, endpoint, or output failure. Already logged;
    ///   nothing was played and no cache entry was written for a failed
    ///   synthesis.
    pub async fn play(&self, request: &SpeechRequest) -> Result<PlayOutcome> {
        if request.is_empty() {
            debug!("Ignoring speech request with empty text or language");
            return Ok(PlayOutcome::Ignored);
        }

        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_current().await;

        let file_name = SpeechCache::file_name(&request.text, &request.language);

        let cached = self.cache.lookup(&file_name).await.map_err(|e| {
            error!(token, file = %file_name, "Speech cache read failed: {}", e);
            e
        })?;

        if let Some(audio) = cached {
            return self.start_if_latest(token, audio, AudioSource::Cache, &request.text).await;
        }

        self.cache.ensure_dir().await.map_err(|e| {
            error!(token, dir = %self.cache.dir().display(), "Cannot create speech cache: {}", e);
            e
        })?;

        let synthesis = SynthesisRequest {
            file_name: file_name.clone(),
            text: request.text.clone(),
            language: request.language.clone(),
        };

        let speech = self.synthesizer.synthesize(&synthesis).await.map_err(|e| {
            error!(token, file = %file_name, "Speech synthesis failed: {}", e);
            e
        })?;

        self.cache.store(&file_name, &speech.audio).await.map_err(|e| {
            error!(token, file = %file_name, "Speech cache write failed: {}", e);
            e
        })?;

        self.start_if_latest(token, speech.audio, AudioSource::Synthesized, &request.text)
            .await
    }

    /// Stop the current utterance, if any
    ///
    /// Requests still waiting on the cache or the synthesizer will not play.
    pub async fn stop(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
        self.stop_current().await;
    }

    /// True while an utterance is playing
    pub async fn is_playing(&self) -> bool {
        let current = self.current.lock().await;
        current.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Wait until nothing is playing
    pub async fn wait_until_idle(&self) {
        while self.is_playing().await {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    async fn stop_current(&self) {
        let mut current = self.current.lock().await;
        if let Some(mut handle) = current.take() {
            match tokio::task::spawn_blocking(move || handle.stop()).await {
                Ok(()) => debug!("Stopped previous utterance"),
                Err(e) => error!("Stopping utterance failed: {}", e),
            }
        }
    }

    /// Start playback if `token` is still the latest request
    async fn start_if_latest(
        &self,
        token: u64,
        audio: Vec<u8>,
        source: AudioSource,
        label: &str,
    ) -> Result<PlayOutcome> {
        let mut current = self.current.lock().await;

        let latest = self.latest.load(Ordering::SeqCst);
        if latest != token {
            info!(token, latest, text = %label, "Speech request superseded, skipping playback");
            return Ok(PlayOutcome::Superseded { token });
        }

        let sink = Arc::clone(&self.sink);
        let label_owned = label.to_string();
        let started = tokio::task::spawn_blocking(move || sink.play(audio, &label_owned))
            .await
            .map_err(|e| SpeechError::AudioOutput(format!("Playback task failed: {}", e)))
            .and_then(|result| result);

        let handle = started.map_err(|e| {
            error!(token, text = %label, "Speech playback failed: {}", e);
            e
        })?;
        *current = Some(handle);

        info!(token, text = %label, ?source, "Speech playback started");
        Ok(PlayOutcome::Played { token, source })
    }
}
