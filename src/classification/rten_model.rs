use anyhow::Context;
use image::imageops::{self, FilterType};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{Classifier, digit_labels, rank_scores};
use crate::config::ClassifierConfig;
use crate::error::ClassificationError;
use crate::models::{ClassificationResult, RectifiedImage};

/// Runs a single-channel image model (MNIST layout by default) through `rten`
pub struct RtenClassifier {
    model: Model,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
}

impl std::fmt::Debug for RtenClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtenClassifier")
            .field("labels", &self.labels)
            .field("input_width", &self.input_width)
            .field("input_height", &self.input_height)
            .finish()
    }
}

/// Read one label per line, skipping blank lines
pub fn load_labels(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels file {:?}", path))?;
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        anyhow::bail!("Labels file {:?} contains no labels", path);
    }
    Ok(labels)
}

impl RtenClassifier {
    /// Load the model and labels named by `config`.
    ///
    /// Any failure here is a `ModelLoadFailure`: the classifier cannot be used
    /// for the rest of the process.
    pub fn load(config: &ClassifierConfig) -> Result<Self, ClassificationError> {
        Self::try_load(config).map_err(|e| ClassificationError::ModelLoadFailure {
            reason: format!("{:#}", e),
        })
    }

    fn try_load(config: &ClassifierConfig) -> anyhow::Result<Self> {
        if !config.model_path.exists() {
            anyhow::bail!(
                "Model not found at {}. Convert a pre-trained MNIST model to .rten and place it there, \
                 or pass --model",
                config.model_path.display()
            );
        }

        let model = Model::load_file(&config.model_path)
            .with_context(|| format!("Failed to load model {:?}", config.model_path))?;
        let labels = match &config.labels_path {
            Some(path) => load_labels(path)?,
            None => digit_labels(),
        };
        if config.input_width == 0 || config.input_height == 0 {
            anyhow::bail!("Model input size must be non-zero");
        }

        info!(
            model = %config.model_path.display(),
            labels = labels.len(),
            "Classification model loaded"
        );

        Ok(Self {
            model,
            labels,
            input_width: config.input_width,
            input_height: config.input_height,
        })
    }

    /// Resize to the model input and scale to `[0, 1]`, NCHW with one channel
    fn prepare_input(&self, image: &RectifiedImage) -> NdTensor<f32, 4> {
        let (w, h) = (self.input_width, self.input_height);
        let resized = imageops::resize(&image.image, w, h, FilterType::Triangle);
        let data: Vec<f32> = resized.pixels().map(|p| p[0] as f32 / 255.0).collect();
        NdTensor::from_data([1, 1, h as usize, w as usize], data)
    }
}

impl Classifier for RtenClassifier {
    fn classify(&self, image: &RectifiedImage) -> Result<ClassificationResult, ClassificationError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassificationError::Inference(
                "rectified image is empty".to_string(),
            ));
        }

        let input = self.prepare_input(image);
        let output: Tensor<f32> = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| ClassificationError::Inference(e.to_string()))?
            .try_into()
            .map_err(|e| ClassificationError::Inference(format!("{:?}", e)))?;

        let scores = output.to_vec();
        if scores.len() != self.labels.len() {
            warn!(
                scores = scores.len(),
                labels = self.labels.len(),
                "Model output size does not match label count"
            );
        }

        let result = rank_scores(&self.labels, &scores)?;
        debug!(
            label = %result.top().label,
            confidence = result.top().confidence,
            "Classified rectified image"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "rten Classifier"
    }
}
