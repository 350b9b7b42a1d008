//! Test doubles for the speech session
//!
//! - `RecordingSink`: records every utterance started and every stop
//! - `CountingSynth`: returns `mp3:<text>` and counts calls
//! - `FailingSynth`: always fails with a network error
//! - `GatedSynth`: holds one phrase until released
//! - `BlockingSink`: blocks its calling thread in `play` or in the first
//!   handle's `stop` until released

#![allow(dead_code)]

use async_trait::async_trait;
use lingo_speech::{
    AudioSink, PlaybackHandle, Result, SpeechError, SpeechSynthesizer, SynthesisRequest,
    SynthesizedSpeech,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Upper bound on how long a `BlockingSink` holds its thread
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Audio bytes the fake synthesizers produce for `text`
pub fn fake_audio(text: &str) -> Vec<u8> {
    format!("mp3:{}", text).into_bytes()
}

#[derive(Default)]
pub struct RecordingSink {
    pub played: Mutex<Vec<Vec<u8>>>,
    pub stops: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct RecordingHandle {
    stops: Arc<AtomicUsize>,
    finished: AtomicBool,
}

impl PlaybackHandle for RecordingHandle {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, audio: Vec<u8>, _label: &str) -> Result<Box<dyn PlaybackHandle>> {
        self.played.lock().unwrap().push(audio);
        Ok(Box::new(RecordingHandle {
            stops: Arc::clone(&self.stops),
            finished: AtomicBool::new(false),
        }))
    }
}

#[derive(Default)]
pub struct CountingSynth {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<SynthesisRequest>>,
}

impl CountingSynth {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for CountingSynth {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        Ok(SynthesizedSpeech {
            audio: fake_audio(&request.text),
            source: Some("fake".to_string()),
        })
    }
}

#[derive(Default)]
pub struct FailingSynth {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for FailingSynth {
    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<SynthesizedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SpeechError::Network("connection refused".to_string()))
    }
}

/// Blocks synthesis of `gated_text` until `release()`; other phrases pass
pub struct GatedSynth {
    gated_text: String,
    entered: Notify,
    gate: Notify,
    pub calls: AtomicUsize,
}

impl GatedSynth {
    pub fn new(gated_text: &str) -> Self {
        Self {
            gated_text: gated_text.to_string(),
            entered: Notify::new(),
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Resolves once the gated phrase has reached the synthesizer
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SpeechSynthesizer for GatedSynth {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.text == self.gated_text {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(SynthesizedSpeech {
            audio: fake_audio(&request.text),
            source: None,
        })
    }
}

/// Which sink call `BlockingSink` parks in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPoint {
    Play,
    FirstStop,
}

/// Parks the calling OS thread (not just the task) until `release()`
///
/// Gives up after `GATE_TIMEOUT`; a timed-out `play` returns an
/// `AudioOutput` error so a test run on a starved executor fails instead of
/// hanging.
pub struct BlockingSink {
    block_point: BlockPoint,
    entered: Arc<Notify>,
    gate_tx: Mutex<mpsc::Sender<()>>,
    gate_rx: Arc<Mutex<mpsc::Receiver<()>>>,
    gate_handed_out: AtomicBool,
    pub played: Mutex<Vec<Vec<u8>>>,
}

impl BlockingSink {
    pub fn new(block_point: BlockPoint) -> Self {
        let (gate_tx, gate_rx) = mpsc::channel();
        Self {
            block_point,
            entered: Arc::new(Notify::new()),
            gate_tx: Mutex::new(gate_tx),
            gate_rx: Arc::new(Mutex::new(gate_rx)),
            gate_handed_out: AtomicBool::new(false),
            played: Mutex::new(Vec::new()),
        }
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }

    /// Resolves once a thread is parked at the block point
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        let _ = self.gate_tx.lock().unwrap().send(());
    }
}

fn park(entered: &Notify, gate: &Mutex<mpsc::Receiver<()>>) -> bool {
    entered.notify_one();
    gate.lock().unwrap().recv_timeout(GATE_TIMEOUT).is_ok()
}

pub struct BlockingHandle {
    gate: Option<(Arc<Notify>, Arc<Mutex<mpsc::Receiver<()>>>)>,
    finished: bool,
}

impl PlaybackHandle for BlockingHandle {
    fn stop(&mut self) {
        if let Some((entered, gate)) = self.gate.take() {
            park(&entered, &gate);
        }
        self.finished = true;
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

impl AudioSink for BlockingSink {
    fn play(&self, audio: Vec<u8>, _label: &str) -> Result<Box<dyn PlaybackHandle>> {
        if self.block_point == BlockPoint::Play && !park(&self.entered, &self.gate_rx) {
            return Err(SpeechError::AudioOutput("sink gate timed out".to_string()));
        }
        self.played.lock().unwrap().push(audio);

        let gate = (self.block_point == BlockPoint::FirstStop
            && !self.gate_handed_out.swap(true, Ordering::SeqCst))
        .then(|| (Arc::clone(&self.entered), Arc::clone(&self.gate_rx)));

        Ok(Box::new(BlockingHandle {
            gate,
            finished: false,
        }))
    }
}
