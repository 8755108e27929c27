pub mod rten_model;

use crate::error::ClassificationError;
use crate::models::{ClassificationResult, RectifiedImage};

pub use rten_model::RtenClassifier;

/// A pre-trained model that maps a rectified image onto a fixed label set
pub trait Classifier: Send + Sync {
    /// Labels ranked by descending confidence
    fn classify(&self, image: &RectifiedImage) -> Result<ClassificationResult, ClassificationError>;

    fn name(&self) -> &str;
}

/// The ten digit labels, in model output order
pub fn digit_labels() -> Vec<String> {
    (0..10).map(|d| d.to_string()).collect()
}

/// Turn raw model outputs into probabilities.
///
/// Outputs that already form a distribution are left alone; anything else
/// (logits, log-probabilities) goes through a numerically stable softmax.
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let is_distribution = !scores.is_empty()
        && scores.iter().all(|s| (0.0..=1.0).contains(s))
        && (scores.iter().sum::<f32>() - 1.0).abs() < 1e-3;
    if is_distribution {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Turn raw model outputs into a ranked result over `labels`.
///
/// Non-finite outputs mean the model misbehaved and are an `Inference` error.
pub fn rank_scores(
    labels: &[String],
    scores: &[f32],
) -> Result<ClassificationResult, ClassificationError> {
    if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
        return Err(ClassificationError::Inference(format!(
            "model output {} is {}",
            index, scores[index]
        )));
    }
    ClassificationResult::from_scores(labels, &to_probabilities(scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distributions_pass_through() {
        let probs = to_probabilities(&[0.1, 0.6, 0.3]);
        assert_eq!(probs, vec![0.1, 0.6, 0.3]);
    }

    #[test]
    fn logits_are_softmaxed() {
        let probs = to_probabilities(&[2.0, -1.0, 0.5, 8.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > 0.99);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn non_finite_outputs_are_rejected() {
        let labels = digit_labels();
        for scores in [[f32::INFINITY, 0.0, 1.0], [f32::NAN, 0.2, 0.1]] {
            let err = rank_scores(&labels[..3], &scores).unwrap_err();
            assert!(matches!(err, ClassificationError::Inference(_)), "{err:?}");
        }
    }

    #[test]
    fn logits_rank_by_probability() {
        let labels = digit_labels();
        let result = rank_scores(&labels[..3], &[0.5, 4.0, -2.0]).unwrap();
        assert_eq!(result.top().label, "1");
        assert!(result.ranked().iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
    }

    #[test]
    fn ten_digit_labels() {
        let labels = digit_labels();
        assert_eq!(labels.len(), 10);
        assert_eq!(labels[0], "0");
        assert_eq!(labels[9], "9");
    }
}
