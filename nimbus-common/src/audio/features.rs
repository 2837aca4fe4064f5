//! Acoustic feature extraction
//!
//! Short-time spectral features using the common speech-analysis defaults:
//!
//! - centered frames, zero padded by `n_fft / 2` on both sides
//! - periodic Hann window, power spectrogram `|STFT|^2`
//! - Slaney-style mel filterbank (area normalized)
//! - MFCC = orthonormal DCT-II of the mel spectrogram in dB (top 80 dB)
//! - chroma = pitch-class filterbank over the power spectrum, each frame
//!   scaled so its loudest pitch class is 1.0
//!
//! Spectrogram data is stored frame-major: `frames[t][k]`.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use super::decode::load_clip;
use crate::{Error, Result};

/// Frame-major matrix: one inner vector per analysis frame
pub type Frames = Vec<Vec<f32>>;

/// Which feature vector a model consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Time-averaged 40 MFCC, 12 chroma and 128 mel bands (180 values)
    Summary,
    /// 13 MFCC per frame over a fixed 130-frame window, flattened (1690 values)
    Sequence,
}

impl FeatureKind {
    /// Extraction parameters for this feature kind
    pub fn config(self) -> FeatureConfig {
        match self {
            FeatureKind::Summary => FeatureConfig {
                n_mfcc: 40,
                offset_secs: 0.5,
                duration_secs: Some(3.0),
                fixed_frames: None,
                ..FeatureConfig::default()
            },
            FeatureKind::Sequence => FeatureConfig {
                n_mfcc: 13,
                offset_secs: 0.0,
                duration_secs: Some(3.0),
                fixed_frames: Some(130),
                ..FeatureConfig::default()
            },
        }
    }

    /// Length of the feature vector produced for this kind
    pub fn dimension(self) -> usize {
        let config = self.config();
        match self {
            FeatureKind::Summary => config.n_mfcc + config.n_chroma + config.n_mels,
            FeatureKind::Sequence => config.n_mfcc * config.fixed_frames.unwrap_or(0),
        }
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureKind::Summary => write!(f, "summary"),
            FeatureKind::Sequence => write!(f, "sequence"),
        }
    }
}

impl std::str::FromStr for FeatureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "summary" => Ok(FeatureKind::Summary),
            "sequence" => Ok(FeatureKind::Sequence),
            other => Err(Error::InvalidInput(format!("Unknown feature kind: {}", other))),
        }
    }
}

/// Spectral analysis parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    pub n_chroma: usize,
    /// Seconds skipped at the start of the file
    pub offset_secs: f64,
    /// Seconds of audio analyzed (`None` = until end of file)
    pub duration_secs: Option<f64>,
    /// Pad or truncate the MFCC sequence to this many frames
    pub fixed_frames: Option<usize>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: 20,
            n_chroma: 12,
            offset_secs: 0.0,
            duration_secs: None,
            fixed_frames: None,
        }
    }
}

/// STFT with precomputed window, FFT plan and filterbanks
pub struct SpectralAnalyzer {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    mel_basis: Vec<Vec<f32>>,
    chroma_basis: Vec<Vec<f32>>,
    dct_basis: Vec<Vec<f32>>,
}

impl SpectralAnalyzer {
    pub fn new(config: &FeatureConfig) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            window: hann_window(config.n_fft),
            fft,
            mel_basis: mel_filterbank(config.sample_rate, config.n_fft, config.n_mels),
            chroma_basis: chroma_filterbank(config.sample_rate, config.n_fft, config.n_chroma),
            dct_basis: dct_ortho_basis(config.n_mfcc, config.n_mels),
        }
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Power spectrogram, `1 + n_fft / 2` bins per frame
    pub fn power_spectrogram(&self, samples: &[f32]) -> Frames {
        let pad = self.n_fft / 2;
        let n_bins = self.n_fft / 2 + 1;
        let n_frames = self.frame_count(samples.len());

        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let mut frames = Vec::with_capacity(n_frames);

        for t in 0..n_frames {
            let start = t * self.hop_length;
            let segment = &padded[start..start + self.n_fft];
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new(x * w, 0.0);
            }

            self.fft.process(&mut buffer);

            frames.push(buffer[..n_bins].iter().map(|c| c.norm_sqr()).collect());
        }

        frames
    }

    /// Mel power spectrogram from a power spectrogram
    pub fn mel_spectrogram(&self, power: &Frames) -> Frames {
        power.iter().map(|frame| apply_basis(&self.mel_basis, frame)).collect()
    }

    /// MFCCs from a mel power spectrogram
    pub fn mfcc(&self, mel: &Frames) -> Frames {
        power_to_db(mel)
            .iter()
            .map(|frame| apply_basis(&self.dct_basis, frame))
            .collect()
    }

    /// Chromagram from a power spectrogram, max-normalized per frame
    pub fn chroma(&self, power: &Frames) -> Frames {
        power
            .iter()
            .map(|frame| {
                let mut chroma = apply_basis(&self.chroma_basis, frame);
                let peak = chroma.iter().fold(0.0f32, |m, v| m.max(v.abs()));
                if peak >= f32::MIN_POSITIVE {
                    chroma.iter_mut().for_each(|v| *v /= peak);
                }
                chroma
            })
            .collect()
    }
}

/// Feature vector extraction for one [`FeatureKind`]
///
/// Immutable after construction; share it behind an `Arc` across threads.
pub struct FeatureExtractor {
    kind: FeatureKind,
    config: FeatureConfig,
    analyzer: SpectralAnalyzer,
}

impl FeatureExtractor {
    pub fn new(kind: FeatureKind) -> Self {
        let config = kind.config();
        let analyzer = SpectralAnalyzer::new(&config);
        Self {
            kind,
            config,
            analyzer,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Decode the configured window of `path` and extract its features
    pub fn extract_file(&self, path: &Path) -> Result<Vec<f32>> {
        let samples = load_clip(
            path,
            self.config.sample_rate,
            self.config.offset_secs,
            self.config.duration_secs,
        )?;
        self.extract_samples(&samples)
    }

    /// Extract features from mono samples already at the configured rate
    pub fn extract_samples(&self, samples: &[f32]) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Err(Error::Audio("audio clip is empty".to_string()));
        }

        let power = self.analyzer.power_spectrogram(samples);
        let mel = self.analyzer.mel_spectrogram(&power);
        let mfcc = self.analyzer.mfcc(&mel);

        let features = match self.kind {
            FeatureKind::Summary => {
                let chroma = self.analyzer.chroma(&power);
                let mut v = Vec::with_capacity(self.kind.dimension());
                v.extend(time_mean(&mfcc));
                v.extend(time_mean(&chroma));
                v.extend(time_mean(&mel));
                v
            }
            FeatureKind::Sequence => {
                let frames = self.config.fixed_frames.unwrap_or(mfcc.len());
                let width = self.config.n_mfcc;
                let mut v = vec![0.0f32; frames * width];
                for (t, frame) in mfcc.iter().take(frames).enumerate() {
                    v[t * width..(t + 1) * width].copy_from_slice(frame);
                }
                v
            }
        };

        if features.iter().any(|v| !v.is_finite()) {
            return Err(Error::Audio("non-finite feature value".to_string()));
        }

        Ok(features)
    }
}

/// Per-coefficient mean over all frames
pub fn time_mean(frames: &Frames) -> Vec<f32> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let mut sums = vec![0.0f64; first.len()];
    for frame in frames {
        for (s, &v) in sums.iter_mut().zip(frame) {
            *s += v as f64;
        }
    }
    let n = frames.len() as f64;
    sums.into_iter().map(|s| (s / n) as f32).collect()
}

/// Convert power to decibels: `10 log10(max(S, 1e-10))`, floored at
/// `max - 80 dB` across the whole spectrogram
pub fn power_to_db(frames: &Frames) -> Frames {
    const AMIN: f32 = 1e-10;
    const TOP_DB: f32 = 80.0;

    let db: Frames = frames
        .iter()
        .map(|frame| frame.iter().map(|&p| 10.0 * p.max(AMIN).log10()).collect())
        .collect();

    let peak = db
        .iter()
        .flatten()
        .fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let floor = peak - TOP_DB;

    db.into_iter()
        .map(|frame| frame.into_iter().map(|v| v.max(floor)).collect())
        .collect()
}

fn apply_basis(basis: &[Vec<f32>], frame: &[f32]) -> Vec<f32> {
    basis
        .iter()
        .map(|row| row.iter().zip(frame).map(|(w, x)| w * x).sum())
        .collect()
}

/// Periodic Hann window
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()) as f32)
        .collect()
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above
pub fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * (logstep * (mel - min_log_mel)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filterbank, `n_mels` rows of `1 + n_fft / 2` weights
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;
    let fft_freqs: Vec<f64> = (0..n_bins).map(|j| j as f64 * sr / n_fft as f64).collect();

    let mel_max = hz_to_mel(sr / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (hi - lo);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - lo) / (center - lo);
                    let upper = (hi - f) / (hi - center);
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

/// Pitch-class filterbank, `n_chroma` rows of `1 + n_fft / 2` weights
///
/// Reference pitch A440 with zero tuning offset; rows start at C.
pub fn chroma_filterbank(sample_rate: u32, n_fft: usize, n_chroma: usize) -> Vec<Vec<f32>> {
    const CENTER_OCTAVE: f64 = 5.0;
    const OCTAVE_WIDTH: f64 = 2.0;
    let a0 = 440.0 / 16.0;
    let nc = n_chroma as f64;
    let sr = sample_rate as f64;

    // Fractional chroma bin of every FFT frequency; DC gets a virtual bin
    // 1.5 octaves below the first real one
    let mut frq_bins: Vec<f64> = (1..n_fft)
        .map(|j| nc * (j as f64 * sr / n_fft as f64 / a0).log2())
        .collect();
    frq_bins.insert(0, frq_bins[0] - 1.5 * nc);

    let mut bin_widths: Vec<f64> = frq_bins.windows(2).map(|w| (w[1] - w[0]).max(1.0)).collect();
    bin_widths.push(1.0);

    let half = (nc / 2.0).round();
    let mut weights: Vec<Vec<f64>> = (0..n_chroma)
        .map(|c| {
            frq_bins
                .iter()
                .zip(&bin_widths)
                .map(|(&f, &width)| {
                    let d = (f - c as f64 + half + 10.0 * nc).rem_euclid(nc) - half;
                    (-0.5 * (2.0 * d / width).powi(2)).exp()
                })
                .collect()
        })
        .collect();

    // Unit L2 norm per frequency column, then Gaussian octave emphasis
    for i in 0..n_fft {
        let norm = weights.iter().map(|row| row[i] * row[i]).sum::<f64>().sqrt();
        let octave_weight =
            (-0.5 * ((frq_bins[i] / nc - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();
        for row in weights.iter_mut() {
            if norm > 0.0 {
                row[i] /= norm;
            }
            row[i] *= octave_weight;
        }
    }

    // Rotate so row 0 is C (A is 3 semitones below C in the rotation)
    let shift = 3 * (n_chroma / 12);
    weights.rotate_left(shift % n_chroma.max(1));

    weights
        .into_iter()
        .map(|row| row.into_iter().take(n_fft / 2 + 1).map(|w| w as f32).collect())
        .collect()
}

/// Orthonormal DCT-II basis, `n_out` rows of `n_in` weights
pub fn dct_ortho_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, secs: f32, rate: u32) -> Vec<f32> {
        let n = (secs * rate as f32) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(FeatureKind::Summary.dimension(), 180);
        assert_eq!(FeatureKind::Sequence.dimension(), 1690);
    }

    #[test]
    fn test_three_seconds_is_130_frames() {
        let analyzer = SpectralAnalyzer::new(&FeatureKind::Summary.config());
        assert_eq!(analyzer.frame_count(3 * 22050), 130);
    }

    #[test]
    fn test_summary_vector_length() {
        let extractor = FeatureExtractor::new(FeatureKind::Summary);
        let features = extractor.extract_samples(&sine(220.0, 3.0, 22050)).unwrap();
        assert_eq!(features.len(), 180);
    }

    #[test]
    fn test_sequence_pads_short_clips() {
        let extractor = FeatureExtractor::new(FeatureKind::Sequence);
        let features = extractor.extract_samples(&sine(220.0, 1.0, 22050)).unwrap();
        assert_eq!(features.len(), 1690);

        // 1 s = 44 frames; everything after is zero padding
        let frames_present = 1 + 22050 / 512;
        assert!(features[..frames_present * 13].iter().any(|v| *v != 0.0));
        assert!(features[frames_present * 13..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_empty_clip_rejected() {
        let extractor = FeatureExtractor::new(FeatureKind::Summary);
        let err = extractor.extract_samples(&[]).unwrap_err();
        assert!(err.to_string().contains("audio clip is empty"));
    }

    #[test]
    fn test_chroma_peaks_at_a_for_440hz() {
        let config = FeatureKind::Summary.config();
        let analyzer = SpectralAnalyzer::new(&config);
        let power = analyzer.power_spectrogram(&sine(440.0, 1.0, config.sample_rate));
        let chroma = time_mean(&analyzer.chroma(&power));

        let peak = chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 9, "chroma = {:?}", chroma);
    }

    #[test]
    fn test_silence_gives_zero_mel_and_finite_mfcc() {
        let extractor = FeatureExtractor::new(FeatureKind::Summary);
        let features = extractor.extract_samples(&vec![0.0; 22050]).unwrap();

        let mel = &features[52..];
        assert!(mel.iter().all(|v| *v == 0.0));
        let chroma = &features[40..52];
        assert!(chroma.iter().all(|v| *v == 0.0));
        assert!(features[..40].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_mel_band_tracks_tone_frequency() {
        let config = FeatureKind::Summary.config();
        let analyzer = SpectralAnalyzer::new(&config);

        let loudest_band = |freq: f32| {
            let power = analyzer.power_spectrogram(&sine(freq, 1.0, config.sample_rate));
            let mel = time_mean(&analyzer.mel_spectrogram(&power));
            mel.iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(i, _)| i)
                .unwrap()
        };

        assert!(loudest_band(300.0) < loudest_band(3000.0));
    }

    #[test]
    fn test_mel_scale_roundtrip_and_breakpoint() {
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
        for hz in [0.0, 440.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_ortho_basis(8, 8);
        for i in 0..8 {
            for j in 0..8 {
                let dot: f32 = basis[i].iter().zip(&basis[j]).map(|(a, b)| a * b).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_power_to_db_floor() {
        let frames = vec![vec![1.0, 1e-12, 1e-3]];
        let db = power_to_db(&frames);
        assert!((db[0][0] - 0.0).abs() < 1e-4);
        assert!((db[0][1] + 80.0).abs() < 1e-4);
        assert!((db[0][2] + 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_feature_kind_parse() {
        assert_eq!("summary".parse::<FeatureKind>().unwrap(), FeatureKind::Summary);
        assert_eq!("sequence".parse::<FeatureKind>().unwrap(), FeatureKind::Sequence);
        assert!("lstm".parse::<FeatureKind>().is_err());
    }
}
