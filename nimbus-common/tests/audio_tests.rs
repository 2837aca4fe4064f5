//! Decoding and feature extraction against generated WAV files

use nimbus_common::audio::{decode_audio_file, load_clip, FeatureExtractor, FeatureKind};
use std::path::Path;

fn write_tone(path: &Path, freq: f32, secs: f32, sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (secs * sample_rate as f32) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (0.5 * (2.0 * std::f32::consts::PI * freq * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[test]
fn test_decode_stereo_wav_to_mono() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo.wav");
    write_tone(&path, 440.0, 1.0, 44100, 2);

    let decoded = decode_audio_file(&path).unwrap();
    assert_eq!(decoded.sample_rate, 44100);
    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.samples.len(), 44100);
    assert!((decoded.duration_seconds() - 1.0).abs() < 1e-6);

    let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!((peak - 0.5).abs() < 0.01, "peak = {}", peak);
}

#[test]
fn test_load_clip_window_and_resample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.wav");
    write_tone(&path, 220.0, 5.0, 44100, 1);

    let clip = load_clip(&path, 22050, 0.5, Some(3.0)).unwrap();
    assert_eq!(clip.len(), 3 * 22050);

    // Shorter than offset + duration: clamped to what is available
    let short_path = dir.path().join("short.wav");
    write_tone(&short_path, 220.0, 2.0, 22050, 1);
    let clip = load_clip(&short_path, 22050, 0.5, Some(3.0)).unwrap();
    assert_eq!(clip.len(), (1.5 * 22050.0) as usize);
}

#[test]
fn test_extract_file_summary_and_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voice.wav");
    write_tone(&path, 330.0, 4.0, 16000, 1);

    let summary = FeatureExtractor::new(FeatureKind::Summary)
        .extract_file(&path)
        .unwrap();
    assert_eq!(summary.len(), 180);
    assert!(summary.iter().all(|v| v.is_finite()));

    let sequence = FeatureExtractor::new(FeatureKind::Sequence)
        .extract_file(&path)
        .unwrap();
    assert_eq!(sequence.len(), 1690);
}

#[test]
fn test_clip_shorter_than_offset_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blip.wav");
    write_tone(&path, 440.0, 0.25, 22050, 1);

    let err = FeatureExtractor::new(FeatureKind::Summary)
        .extract_file(&path)
        .unwrap_err();
    assert!(err.to_string().contains("audio clip is empty"));
}

#[test]
fn test_garbage_file_is_audio_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-audio.wav");
    std::fs::write(&path, b"this is not a wav file").unwrap();

    let err = FeatureExtractor::new(FeatureKind::Summary)
        .extract_file(&path)
        .unwrap_err();
    assert!(matches!(err, nimbus_common::Error::Audio(_)));
}
