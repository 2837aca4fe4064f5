//! Audio input: decoding, resampling and feature extraction

pub mod decode;
pub mod features;

pub use decode::{decode_audio_file, load_clip, resample, DecodedAudio};
pub use features::{FeatureConfig, FeatureExtractor, FeatureKind};
