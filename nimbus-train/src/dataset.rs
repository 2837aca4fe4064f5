//! Feature matrices, label encoding and train/validation/test splits

use nimbus_common::audio::FeatureExtractor;
use nimbus_common::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::corpus::LabeledClip;

/// Log progress every this many clips
const PROGRESS_INTERVAL: usize = 100;

/// Feature rows with encoded labels
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub features: Vec<Vec<f32>>,
    /// Index into `label_names` per row
    pub labels: Vec<usize>,
    /// Sorted unique label names
    pub label_names: Vec<String>,
}

impl Dataset {
    /// Encode string labels against their sorted unique set
    pub fn from_labeled(features: Vec<Vec<f32>>, labels: &[String]) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(Error::InvalidInput(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let (label_names, encoded) = encode_labels(labels);
        Ok(Self {
            features,
            labels: encoded,
            label_names,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.label_names.len()
    }

    /// Rows and labels at `indices`
    pub fn subset(&self, indices: &[usize]) -> (Vec<Vec<f32>>, Vec<usize>) {
        indices
            .iter()
            .map(|&i| (self.features[i].clone(), self.labels[i]))
            .unzip()
    }
}

/// Map labels to indices of their sorted unique set
pub fn encode_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
    let names: Vec<String> = labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let encoded = labels
        .iter()
        .filter_map(|l| names.binary_search(l).ok())
        .collect();
    (names, encoded)
}

/// Extract features for every clip; clips that fail are logged and skipped
pub fn extract_dataset(clips: &[LabeledClip], extractor: &FeatureExtractor) -> Result<Dataset> {
    let mut features = Vec::with_capacity(clips.len());
    let mut labels = Vec::with_capacity(clips.len());
    let mut skipped = 0usize;

    for (i, clip) in clips.iter().enumerate() {
        match extractor.extract_file(&clip.path) {
            Ok(row) => {
                features.push(row);
                labels.push(clip.label.clone());
            }
            Err(e) => {
                skipped += 1;
                warn!("Skipping {}: {}", clip.path.display(), e);
            }
        }
        if (i + 1) % PROGRESS_INTERVAL == 0 {
            info!("Extracted features from {}/{} clips", i + 1, clips.len());
        }
    }

    info!(
        extracted = features.len(),
        skipped,
        features = %extractor.kind(),
        "Feature extraction complete"
    );
    Dataset::from_labeled(features, &labels)
}

/// Row indices of each partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` and cut it into train/validation/test
///
/// The test set takes `ceil(test_size * n)` rows. The validation set takes
/// `ceil(val_size / (1 - test_size) * rest)` of the remainder, so `val_size`
/// is a fraction of the whole corpus.
pub fn split_indices(n: usize, test_size: f64, val_size: f64, seed: u64) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::InvalidInput(format!(
            "test size must be in (0, 1), got {}",
            test_size
        )));
    }
    if !(0.0..1.0).contains(&val_size) || test_size + val_size >= 1.0 {
        return Err(Error::InvalidInput(format!(
            "validation size must be in [0, 1) and leave room for training, got {}",
            val_size
        )));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    let rest = n.saturating_sub(n_test);
    let n_val = (val_size / (1.0 - test_size) * rest as f64).ceil() as usize;
    let n_train = rest.saturating_sub(n_val);
    if n_train == 0 || n_test == 0 {
        return Err(Error::InvalidInput(format!(
            "{} clips are too few to split into train/validation/test",
            n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test = indices[..n_test].to_vec();
    let validation = indices[n_test..n_test + n_val].to_vec();
    let train = indices[n_test + n_val..].to_vec();
    Ok(Split {
        train,
        validation,
        test,
    })
}

/// Standard normal sample (Box-Muller)
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}

/// Gaussian noise features with uniformly random labels
///
/// Produces a model that exercises the whole serving path without any
/// audio corpus; its predictions carry no information. Every name in
/// `labels` is kept even if no row happens to draw it.
pub fn synthetic_dataset(samples: usize, width: usize, labels: &[&str], seed: u64) -> Result<Dataset> {
    let label_names: Vec<String> = labels
        .iter()
        .map(|l| l.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if label_names.is_empty() {
        return Err(Error::InvalidInput("synthetic data needs at least one label".to_string()));
    }
    let mut rng = StdRng::seed_from_u64(seed);

    let features = (0..samples)
        .map(|_| (0..width).map(|_| gaussian(&mut rng)).collect())
        .collect();
    let encoded = (0..samples)
        .map(|_| rng.gen_range(0..label_names.len()))
        .collect();

    Ok(Dataset {
        features,
        labels: encoded,
        label_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_labels_sorted() {
        let labels: Vec<String> = ["sad", "angry", "sad", "happy"].iter().map(|s| s.to_string()).collect();
        let (names, encoded) = encode_labels(&labels);
        assert_eq!(names, vec!["angry", "happy", "sad"]);
        assert_eq!(encoded, vec![2, 0, 2, 1]);
    }

    #[test]
    fn test_split_sizes() {
        let split = split_indices(100, 0.2, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.validation.len(), 20);
        assert_eq!(split.train.len(), 60);

        let mut all: Vec<usize> = split
            .train
            .iter()
            .chain(&split.validation)
            .chain(&split.test)
            .copied()
            .collect();
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rounds_up() {
        let split = split_indices(11, 0.2, 0.2, 1).unwrap();
        // ceil(2.2) = 3 test; ceil(0.25 * 8) = 2 validation
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.validation.len(), 2);
        assert_eq!(split.train.len(), 6);
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(split_indices(50, 0.2, 0.2, 7).unwrap(), split_indices(50, 0.2, 0.2, 7).unwrap());
        assert_ne!(split_indices(50, 0.2, 0.2, 7).unwrap(), split_indices(50, 0.2, 0.2, 8).unwrap());
    }

    #[test]
    fn test_split_rejects_tiny_or_invalid() {
        assert!(split_indices(2, 0.2, 0.2, 42).is_err());
        assert!(split_indices(100, 0.0, 0.2, 42).is_err());
        assert!(split_indices(100, 0.5, 0.5, 42).is_err());
    }

    #[test]
    fn test_synthetic_dataset_shape() {
        let data = synthetic_dataset(200, 180, &["a", "b", "c"], 42).unwrap();
        assert_eq!(data.len(), 200);
        assert!(data.features.iter().all(|r| r.len() == 180));
        assert_eq!(data.label_names, vec!["a", "b", "c"]);

        let mean: f32 = data.features.iter().flatten().sum::<f32>() / (200.0 * 180.0);
        assert!(mean.abs() < 0.05, "mean = {}", mean);
    }

    #[test]
    fn test_synthetic_dataset_keeps_undrawn_labels() {
        let data = synthetic_dataset(2, 4, &["a", "b", "c", "d", "e", "f", "g"], 1).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.n_classes(), 7);
        assert!(data.labels.iter().all(|&l| l < 7));
    }

    #[test]
    fn test_subset() {
        let labels: Vec<String> = ["x", "y", "x"].iter().map(|s| s.to_string()).collect();
        let data = Dataset::from_labeled(vec![vec![1.0], vec![2.0], vec![3.0]], &labels).unwrap();
        let (rows, y) = data.subset(&[2, 1]);
        assert_eq!(rows, vec![vec![3.0], vec![2.0]]);
        assert_eq!(y, vec![0, 1]);
    }
}
