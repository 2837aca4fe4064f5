//! Training pipeline
//!
//! extract -> encode -> split -> scale -> fit forest -> evaluate -> save

use chrono::{DateTime, Utc};
use nimbus_common::audio::{FeatureExtractor, FeatureKind};
use nimbus_common::model::{EmotionModel, ForestParams, RandomForest, StandardScaler, TrainingSummary};
use nimbus_common::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::corpus::LabeledClip;
use crate::dataset::{extract_dataset, split_indices, Dataset};
use crate::metrics::{accuracy, ClassificationReport};

/// Options shared by every corpus
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub features: FeatureKind,
    pub output: PathBuf,
    pub forest: ForestParams,
    pub test_size: f64,
    pub val_size: f64,
    /// Optional JSON evaluation report
    pub report: Option<PathBuf>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            features: FeatureKind::Summary,
            output: PathBuf::from("model/emotion_model.json"),
            forest: ForestParams::default(),
            test_size: 0.2,
            val_size: 0.2,
            report: None,
        }
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: EmotionModel,
    pub validation_accuracy: Option<f64>,
    pub test_report: ClassificationReport,
}

/// Contents of the `--report` file
#[derive(Debug, Serialize)]
struct EvaluationReport<'a> {
    generated_at: DateTime<Utc>,
    model_path: &'a Path,
    feature_kind: FeatureKind,
    summary: &'a TrainingSummary,
    forest: &'a ForestParams,
    test: &'a ClassificationReport,
}

/// Extract features from `clips` and train on them
pub fn train_on_clips(corpus: &str, clips: &[LabeledClip], opts: &TrainOptions) -> Result<TrainOutcome> {
    if clips.is_empty() {
        return Err(Error::InvalidInput(format!("No audio clips found for {}", corpus)));
    }
    let extractor = FeatureExtractor::new(opts.features);
    let dataset = extract_dataset(clips, &extractor)?;
    train_on_dataset(corpus, &dataset, opts)
}

/// Split, fit, evaluate and save a model for `dataset`
pub fn train_on_dataset(corpus: &str, dataset: &Dataset, opts: &TrainOptions) -> Result<TrainOutcome> {
    if dataset.n_classes() < 2 {
        return Err(Error::InvalidInput(format!(
            "Need at least 2 labels to train, found {:?}",
            dataset.label_names
        )));
    }
    let width = opts.features.dimension();
    if let Some(row) = dataset.features.iter().find(|r| r.len() != width) {
        return Err(Error::InvalidInput(format!(
            "{} features expect width {}, got {}",
            opts.features,
            width,
            row.len()
        )));
    }

    let split = split_indices(dataset.len(), opts.test_size, opts.val_size, opts.forest.seed)?;
    info!(
        train = split.train.len(),
        validation = split.validation.len(),
        test = split.test.len(),
        labels = ?dataset.label_names,
        "Split dataset"
    );

    let (train_x, train_y) = dataset.subset(&split.train);
    let scaler = StandardScaler::fit(&train_x)?;
    let train_x = scaler.transform_all(&train_x)?;

    info!(trees = opts.forest.n_trees, max_depth = ?opts.forest.max_depth, "Training random forest");
    let forest = RandomForest::fit(&train_x, &train_y, dataset.n_classes(), opts.forest.clone())?;

    let evaluate = |indices: &[usize]| -> Result<(Vec<usize>, Vec<usize>)> {
        let (rows, truth) = dataset.subset(indices);
        let predicted = rows
            .iter()
            .map(|r| forest.predict(&scaler.transform(r)?))
            .collect::<Result<Vec<_>>>()?;
        Ok((truth, predicted))
    };

    let validation_accuracy = if split.validation.is_empty() {
        None
    } else {
        let (truth, predicted) = evaluate(&split.validation)?;
        let acc = accuracy(&truth, &predicted);
        info!("Validation accuracy: {:.4}", acc);
        Some(acc)
    };

    let (truth, predicted) = evaluate(&split.test)?;
    let test_report = ClassificationReport::new(&truth, &predicted, &dataset.label_names);
    info!("Test accuracy: {:.4}", test_report.accuracy);

    let summary = TrainingSummary {
        corpus: corpus.to_string(),
        train_samples: split.train.len(),
        validation_samples: split.validation.len(),
        test_samples: split.test.len(),
        validation_accuracy,
        test_accuracy: Some(test_report.accuracy),
    };
    let model = EmotionModel::new(
        opts.features,
        dataset.label_names.clone(),
        scaler,
        forest,
        summary,
    )?;
    model.save(&opts.output)?;

    if let Some(path) = &opts.report {
        write_report(path, &opts.output, &model, &opts.forest, &test_report)?;
    }

    Ok(TrainOutcome {
        model,
        validation_accuracy,
        test_report,
    })
}

fn write_report(
    path: &Path,
    model_path: &Path,
    model: &EmotionModel,
    forest: &ForestParams,
    test: &ClassificationReport,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let report = EvaluationReport {
        generated_at: Utc::now(),
        model_path,
        feature_kind: model.feature_kind,
        summary: &model.training_summary,
        forest,
        test,
    };
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &report)?;
    info!("Wrote evaluation report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::synthetic_dataset;

    /// Two well separated gaussian blobs
    fn separable(width: usize) -> Dataset {
        let noise = synthetic_dataset(60, width, &["x"], 3).unwrap();
        let labels: Vec<String> = (0..60)
            .map(|i| if i % 2 == 0 { "calm" } else { "angry" }.to_string())
            .collect();
        let features = noise
            .features
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let shift = if i % 2 == 0 { -5.0 } else { 5.0 };
                row.into_iter().map(|v| v * 0.5 + shift).collect()
            })
            .collect();
        Dataset::from_labeled(features, &labels).unwrap()
    }

    fn options(dir: &Path) -> TrainOptions {
        TrainOptions {
            output: dir.join("model").join("emotion_model.json"),
            forest: ForestParams {
                n_trees: 10,
                ..ForestParams::default()
            },
            report: Some(dir.join("report.json")),
            ..TrainOptions::default()
        }
    }

    #[test]
    fn test_pipeline_trains_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let data = separable(FeatureKind::Summary.dimension());

        let outcome = train_on_dataset("test:blobs", &data, &opts).unwrap();
        assert_eq!(outcome.test_report.accuracy, 1.0);
        assert_eq!(outcome.validation_accuracy, Some(1.0));
        assert_eq!(outcome.model.labels, vec!["angry", "calm"]);
        assert_eq!(outcome.model.training_summary.test_samples, 12);
        assert_eq!(outcome.model.training_summary.validation_samples, 12);
        assert_eq!(outcome.model.training_summary.train_samples, 36);

        let loaded = EmotionModel::load(&opts.output).unwrap();
        assert_eq!(loaded, outcome.model);

        let report: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("report.json")).unwrap()).unwrap();
        assert_eq!(report["summary"]["corpus"], "test:blobs");
        assert_eq!(report["test"]["accuracy"], 1.0);
    }

    #[test]
    fn test_single_label_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = synthetic_dataset(20, FeatureKind::Summary.dimension(), &["only"], 1).unwrap();
        let err = train_on_dataset("one", &data, &options(dir.path())).unwrap_err();
        assert!(err.to_string().contains("at least 2 labels"));
    }

    #[test]
    fn test_width_must_match_feature_kind() {
        let dir = tempfile::tempdir().unwrap();
        let data = separable(10);
        assert!(train_on_dataset("narrow", &data, &options(dir.path())).is_err());
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(train_on_clips("empty", &[], &options(dir.path())).is_err());
    }
}
