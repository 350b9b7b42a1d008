//! Audio output using cpal
//!
//! Each utterance gets its own output thread: cpal streams must be created
//! and dropped on a non-async thread, and an utterance is short enough that
//! opening the device per phrase is cheap.
//!
//! Stopping sets a flag and joins the thread, so by the time `stop()`
//! returns the stream has been dropped.

use crate::audio::decode::{decode_mp3, DecodedAudio};
use crate::error::{Result, SpeechError};
use crate::player::{AudioSink, PlaybackHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the output thread checks for stop/finish
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Reads decoded stereo frames at the device rate (linear interpolation)
#[derive(Debug)]
pub struct PlaybackCursor {
    samples: Vec<f32>,
    position: f64,
    step: f64,
}

impl PlaybackCursor {
    pub fn new(audio: DecodedAudio, device_rate: u32) -> Self {
        let step = if device_rate == 0 {
            1.0
        } else {
            audio.sample_rate as f64 / device_rate as f64
        };
        Self {
            samples: audio.samples,
            position: 0.0,
            step,
        }
    }

    /// Next (left, right) frame, None when exhausted
    pub fn next_frame(&mut self) -> Option<(f32, f32)> {
        let frames = self.samples.len() / 2;
        let idx = self.position as usize;
        if idx >= frames {
            return None;
        }

        let frac = (self.position - idx as f64) as f32;
        let (l0, r0) = (self.samples[idx * 2], self.samples[idx * 2 + 1]);
        let (l1, r1) = if idx + 1 < frames {
            (self.samples[idx * 2 + 2], self.samples[idx * 2 + 3])
        } else {
            (l0, r0)
        };

        self.position += self.step;
        Some((l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac))
    }
}

/// cpal-backed audio sink
pub struct CpalSink {
    /// Requested device name (None = default)
    device_name: Option<String>,
    /// Master volume 0.0-1.0, shared with running streams
    volume: Arc<Mutex<f32>>,
}

impl CpalSink {
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            volume: Arc::new(Mutex::new(1.0)),
        }
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| SpeechError::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Set output volume, clamped to [0.0, 1.0].
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        if let Ok(mut v) = self.volume.lock() {
            *v = clamped;
        }
        debug!("Volume set to {:.2}", clamped);
    }

    /// Get current volume.
    pub fn volume(&self) -> f32 {
        self.volume.lock().map(|v| *v).unwrap_or(1.0)
    }
}

impl AudioSink for CpalSink {
    fn play(&self, audio: Vec<u8>, label: &str) -> Result<Box<dyn PlaybackHandle>> {
        let decoded = decode_mp3(audio)?;

        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let device_name = self.device_name.clone();
        let volume = Arc::clone(&self.volume);
        let stop_clone = Arc::clone(&stop);
        let finished_clone = Arc::clone(&finished);
        let label_owned = label.to_string();

        let thread = std::thread::Builder::new()
            .name("lingo-audio".to_string())
            .spawn(move || {
                run_output(
                    device_name,
                    decoded,
                    volume,
                    stop_clone,
                    finished_clone,
                    ready_tx,
                    label_owned,
                )
            })
            .map_err(|e| SpeechError::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalPlayback {
                stop,
                finished,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(SpeechError::AudioOutput(
                    "audio thread exited before starting".to_string(),
                ))
            }
        }
    }
}

/// Handle to an utterance playing on its own output thread
pub struct CpalPlayback {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle for CpalPlayback {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
        self.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        // Ensure stream is stopped on drop
        self.stop();
    }
}

/// Output thread body: open device, play until done or stopped, drop stream
fn run_output(
    device_name: Option<String>,
    audio: DecodedAudio,
    volume: Arc<Mutex<f32>>,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<()>>,
    label: String,
) {
    // Set by the device callback once every frame has been handed out
    let exhausted = Arc::new(AtomicBool::new(false));

    let stream = match open_stream(device_name.as_deref(), audio, volume, Arc::clone(&exhausted)) {
        Ok(stream) => stream,
        Err(e) => {
            finished.store(true, Ordering::SeqCst);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    info!(text = %label, "Playing utterance");
    let _ = ready_tx.send(Ok(()));

    while !stop.load(Ordering::SeqCst) && !exhausted.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);
    }

    if stop.load(Ordering::SeqCst) {
        debug!(text = %label, "Utterance stopped");
    } else {
        // Let the device drain the last buffer
        std::thread::sleep(POLL_INTERVAL * 5);
        debug!(text = %label, "Utterance finished");
    }

    if let Err(e) = stream.pause() {
        warn!("Failed to pause stream: {}", e);
    }
    drop(stream);
    finished.store(true, Ordering::SeqCst);
}

/// Pick a device (with fallback to default), build and start a stream
fn open_stream(
    device_name: Option<&str>,
    audio: DecodedAudio,
    volume: Arc<Mutex<f32>>,
    exhausted: Arc<AtomicBool>,
) -> Result<Stream> {
    let device = select_device(device_name)?;

    let supported = device
        .default_output_config()
        .map_err(|e| SpeechError::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let cursor = PlaybackCursor::new(audio, config.sample_rate.0);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, cursor, volume, exhausted)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, cursor, volume, exhausted)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, cursor, volume, exhausted)?,
        other => {
            return Err(SpeechError::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| SpeechError::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok(stream)
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| SpeechError::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(dev);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| SpeechError::AudioOutput("No default output device found".to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut cursor: PlaybackCursor,
    volume: Arc<Mutex<f32>>,
    exhausted: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let gain = volume.lock().map(|v| *v).unwrap_or(1.0);

                for frame in data.chunks_mut(channels) {
                    let (left, right) = match cursor.next_frame() {
                        Some((l, r)) => (l * gain, r * gain),
                        None => {
                            exhausted.store(true, Ordering::SeqCst);
                            (0.0, 0.0)
                        }
                    };

                    if channels == 1 {
                        let mono = ((left + right) * 0.5).clamp(-1.0, 1.0);
                        frame[0] = <T as FromSample<f32>>::from_sample_(mono);
                        continue;
                    }
                    for (ch, out) in frame.iter_mut().enumerate() {
                        let value = match ch {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        };
                        *out = <T as FromSample<f32>>::from_sample_(value.clamp(-1.0, 1.0));
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None, // No timeout
        )
        .map_err(|e| SpeechError::AudioOutput(format!("Failed to build stream: {}", e)))
}
