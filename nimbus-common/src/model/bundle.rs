//! Emotion model bundle
//!
//! A trained model is persisted as one JSON document holding the feature
//! layout, label names, scaler and forest. The server loads it once at
//! startup; the trainer writes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::forest::{argmax, RandomForest};
use super::scaler::StandardScaler;
use crate::audio::FeatureKind;
use crate::{Error, Result};

/// Bundle format written by this version
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Label set of the serving model
pub const DEFAULT_EMOTIONS: [&str; 7] =
    ["angry", "disgust", "fear", "happy", "neutral", "sad", "surprise"];

/// Where the model came from and how well it did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Corpus description (e.g. "ravdess:/data/ravdess")
    pub corpus: String,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub test_samples: usize,
    pub validation_accuracy: Option<f64>,
    pub test_accuracy: Option<f64>,
}

/// Classification result for one clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub emotion: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

/// Trained scaler + forest with its label names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionModel {
    pub format_version: u32,
    pub feature_kind: FeatureKind,
    pub labels: Vec<String>,
    pub scaler: StandardScaler,
    pub forest: RandomForest,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub training_summary: TrainingSummary,
}

impl EmotionModel {
    pub fn new(
        feature_kind: FeatureKind,
        labels: Vec<String>,
        scaler: StandardScaler,
        forest: RandomForest,
        training_summary: TrainingSummary,
    ) -> Result<Self> {
        let model = Self {
            format_version: MODEL_FORMAT_VERSION,
            feature_kind,
            labels,
            scaler,
            forest,
            trained_at: Utc::now(),
            training_summary,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::Model(format!(
                "Unsupported model format version {} (expected {})",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        self.scaler.validate()?;
        self.forest.validate()?;
        if self.labels.len() != self.forest.n_classes() {
            return Err(Error::Model(format!(
                "Model has {} labels but {} classes",
                self.labels.len(),
                self.forest.n_classes()
            )));
        }
        if self.scaler.n_features() != self.forest.n_features() {
            return Err(Error::Model(format!(
                "Scaler width {} does not match forest width {}",
                self.scaler.n_features(),
                self.forest.n_features()
            )));
        }
        if self.forest.n_features() != self.feature_kind.dimension() {
            return Err(Error::Model(format!(
                "{} features expect width {}, model has {}",
                self.feature_kind,
                self.feature_kind.dimension(),
                self.forest.n_features()
            )));
        }
        Ok(())
    }

    /// Write the bundle atomically (temp file in the same directory, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        info!(path = %path.display(), labels = ?self.labels, "Saved emotion model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let model: Self = serde_json::from_slice(&content)?;
        model.validate()?;
        Ok(model)
    }

    /// Scale a raw feature vector and classify it
    pub fn classify(&self, features: &[f32]) -> Result<Prediction> {
        let scaled = self.scaler.transform(features)?;
        let proba = self.forest.predict_proba(&scaled)?;
        let best = argmax(&proba);

        Ok(Prediction {
            emotion: self.labels[best].clone(),
            confidence: proba[best] as f64,
            probabilities: self
                .labels
                .iter()
                .cloned()
                .zip(proba.iter().map(|&p| p as f64))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::forest::ForestParams;

    fn tiny_model() -> EmotionModel {
        let width = FeatureKind::Summary.dimension();
        let rows: Vec<Vec<f32>> = (0..8)
            .map(|i| vec![if i % 2 == 0 { -1.0 } else { 1.0 }; width])
            .collect();
        let labels: Vec<usize> = (0..8).map(|i| i % 2).collect();

        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform_all(&rows).unwrap();
        let forest = RandomForest::fit(
            &scaled,
            &labels,
            2,
            ForestParams {
                n_trees: 3,
                bootstrap: false,
                ..ForestParams::default()
            },
        )
        .unwrap();

        EmotionModel::new(
            FeatureKind::Summary,
            vec!["calm".to_string(), "angry".to_string()],
            scaler,
            forest,
            TrainingSummary::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_classify_reports_all_labels() {
        let model = tiny_model();
        let width = FeatureKind::Summary.dimension();

        let prediction = model.classify(&vec![1.0; width]).unwrap();
        assert_eq!(prediction.emotion, "angry");
        assert_eq!(prediction.probabilities.len(), 2);
        assert_eq!(prediction.confidence, prediction.probabilities["angry"]);
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");

        let model = tiny_model();
        model.save(&path).unwrap();
        let loaded = EmotionModel::load(&path).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_label_count_mismatch_rejected() {
        let mut model = tiny_model();
        model.labels.push("extra".to_string());
        assert!(matches!(model.validate(), Err(Error::Model(_))));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut model = tiny_model();
        model.format_version = 99;
        std::fs::write(&path, serde_json::to_vec(&model).unwrap()).unwrap();

        let err = EmotionModel::load(&path).unwrap_err();
        assert!(err.to_string().contains("format version"));
    }

    #[test]
    fn test_corrupt_tree_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut value = serde_json::to_value(tiny_model()).unwrap();
        value["forest"]["trees"][0]["nodes"][0] =
            serde_json::json!({"type": "split", "feature": 0, "threshold": 0.0, "left": 9999, "right": 9999});
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        let err = EmotionModel::load(&path).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_wrong_feature_width_rejected() {
        let model = tiny_model();
        assert!(model.classify(&[0.0; 3]).is_err());
    }
}
