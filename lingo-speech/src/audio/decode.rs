//! MP3 decoding using symphonia
//!
//! # Sample Format
//!
//! - Output: Stereo f32 samples (interleaved: [L, R, L, R, ...])
//! - Mono input: duplicated to stereo
//! - Multi-channel input: downmixed to stereo

use crate::error::{Result, SpeechError};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded utterance
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo f32 samples [L, R, L, R, ...]
    pub samples: Vec<f32>,

    /// Native sample rate
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Decode in-memory MP3 bytes
///
/// Corrupt packets are skipped; a stream that yields no audio at all is an
/// error.
pub fn decode_mp3(bytes: Vec<u8>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SpeechError::Decode(format!("unrecognized audio: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SpeechError::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| SpeechError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break; // EOF
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(SpeechError::Decode(e.to_string())),
        };

        // Skip packets from other tracks
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping corrupt audio packet: {}", msg);
                continue;
            }
            Err(e) => return Err(SpeechError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        append_stereo(buffer.samples(), spec.channels.count(), &mut samples);
    }

    if samples.is_empty() {
        return Err(SpeechError::Decode("stream contained no audio".to_string()));
    }

    let audio = DecodedAudio {
        samples,
        sample_rate,
    };
    debug!(
        "Decoded {} frames at {} Hz ({} ms)",
        audio.frames(),
        audio.sample_rate,
        audio.duration_ms()
    );
    Ok(audio)
}

/// Append interleaved samples with `channels` channels as stereo
fn append_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            // Mono: duplicate to stereo
            for &sample in interleaved {
                out.push(sample);
                out.push(sample);
            }
        }
        2 => out.extend_from_slice(interleaved),
        _ => {
            // Multi-channel: even channels to left, odd to right
            let half = channels as f32 / 2.0;
            for frame in interleaved.chunks_exact(channels) {
                let mut left_sum = 0.0f32;
                let mut right_sum = 0.0f32;
                for (ch_idx, sample) in frame.iter().enumerate() {
                    if ch_idx % 2 == 0 {
                        left_sum += sample;
                    } else {
                        right_sum += sample;
                    }
                }
                out.push(left_sum / half);
                out.push(right_sum / half);
            }
        }
    }
}
