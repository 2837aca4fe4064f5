//! Audio decoding and resampling
//!
//! Uses symphonia for format-agnostic decoding (WAV, MP3, FLAC, OGG, ...)
//! and rubato for sample rate conversion.

use rubato::{FftFixedIn, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{Error, Result};

/// Frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded audio result
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono audio samples (f32, range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Original channel count
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode an audio file to mono f32 PCM samples
///
/// Multi-channel audio is mixed down by averaging channels. Packets that
/// fail to decode are skipped.
pub fn decode_audio_file(file_path: &Path) -> Result<DecodedAudio> {
    tracing::debug!(path = %file_path.display(), "Decoding audio file");

    let file = std::fs::File::open(file_path).map_err(|e| {
        Error::Audio(format!("Failed to open audio file {}: {}", file_path.display(), e))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Audio(format!("Unsupported audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Audio("No audio track found in file".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Audio("Sample rate unknown".to_string()))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Audio(format!("Failed to create decoder: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(Error::Audio(format!("Error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let frame_channels = spec.channels.count().max(1);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                mono.extend(
                    buf.samples()
                        .chunks(frame_channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame_channels as f32),
                );
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::warn!(path = %file_path.display(), "Skipping undecodable packet: {}", msg);
            }
            Err(e) => return Err(Error::Audio(format!("Decode failed: {}", e))),
        }
    }

    tracing::debug!(
        path = %file_path.display(),
        sample_rate,
        channels,
        total_samples = mono.len(),
        "Audio decoding complete"
    );

    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
        channels,
    })
}

/// Load a window of an audio file as mono samples at `target_rate`
///
/// The window `[offset_secs, offset_secs + duration_secs)` is cut at the
/// native rate before resampling and clamped to the available audio. A
/// `None` duration keeps everything after the offset.
pub fn load_clip(
    file_path: &Path,
    target_rate: u32,
    offset_secs: f64,
    duration_secs: Option<f64>,
) -> Result<Vec<f32>> {
    let decoded = decode_audio_file(file_path)?;
    let window = slice_window(&decoded.samples, decoded.sample_rate, offset_secs, duration_secs);
    resample(window, decoded.sample_rate, target_rate)
}

/// Cut `[offset, offset + duration)` seconds out of `samples`
pub fn slice_window(
    samples: &[f32],
    sample_rate: u32,
    offset_secs: f64,
    duration_secs: Option<f64>,
) -> &[f32] {
    let rate = sample_rate as f64;
    let start = ((offset_secs.max(0.0) * rate).round() as usize).min(samples.len());
    let end = match duration_secs {
        Some(d) => (start + (d.max(0.0) * rate).round() as usize).min(samples.len()),
        None => samples.len(),
    };
    &samples[start..end]
}

/// Resample mono audio from `from_rate` to `to_rate`
///
/// Output length is `round(len * to_rate / from_rate)`; the resampler's
/// group delay is trimmed from the front.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Audio("Sample rate must be non-zero".to_string()));
    }

    let expected_len =
        (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| Error::Audio(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected_len + delay + RESAMPLE_CHUNK);
    let mut position = 0;

    while samples.len() - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk = [&samples[position..position + needed]];
        let out = resampler
            .process(&chunk[..], None)
            .map_err(|e| Error::Audio(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
        position += needed;
    }

    if position < samples.len() {
        let chunk = [&samples[position..]];
        let out = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| Error::Audio(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
    }

    // Flush until the delayed tail has been emitted
    while output.len() < expected_len + delay {
        let out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| Error::Audio(format!("Resampling failed: {}", e)))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let mut result: Vec<f32> = output.into_iter().skip(delay).take(expected_len).collect();
    result.resize(expected_len, 0.0);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_audio_file_not_found() {
        let result = decode_audio_file(Path::new("/nonexistent/file.wav"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to open audio file"));
    }

    #[test]
    fn test_slice_window_clamps() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();

        let window = slice_window(&samples, 10, 0.5, Some(3.0));
        assert_eq!(window.len(), 30);
        assert_eq!(window[0], 5.0);

        let tail = slice_window(&samples, 10, 8.0, Some(3.0));
        assert_eq!(tail.len(), 20);

        let past_end = slice_window(&samples, 10, 20.0, Some(3.0));
        assert!(past_end.is_empty());

        let open_ended = slice_window(&samples, 10, 1.0, None);
        assert_eq!(open_ended.len(), 90);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 22050, 22050).unwrap(), samples);
    }

    #[test]
    fn test_resample_length() {
        let samples = vec![0.0f32; 48000];
        let out = resample(&samples, 48000, 22050).unwrap();
        assert_eq!(out.len(), 22050);

        let short = vec![0.0f32; 1000];
        let out = resample(&short, 44100, 22050).unwrap();
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn test_resample_preserves_tone_energy() {
        let from = 44100;
        let samples: Vec<f32> = (0..from)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / from as f32).sin())
            .collect();
        let out = resample(&samples, from as u32, 22050).unwrap();

        // RMS of a unit sine is 1/sqrt(2); check the middle to skip edge effects
        let mid = &out[2000..out.len() - 2000];
        let rms = (mid.iter().map(|s| s * s).sum::<f32>() / mid.len() as f32).sqrt();
        assert!((rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.05, "rms = {}", rms);
    }
}
