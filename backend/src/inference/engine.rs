use std::sync::Arc;

use shared::PredictionResult;

use super::class_index::ClassIndex;
use super::model::Classifier;
use super::preprocess::{PreprocessedImage, decode_image, preprocess};
use crate::error::{InferenceError, ModelLoadError, PredictError};

/// Numerically stable softmax. `None` if any score is non-finite.
pub fn softmax(scores: &[f32]) -> Option<Vec<f32>> {
    if scores.iter().any(|s| !s.is_finite()) {
        return None;
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    Some(exps.into_iter().map(|e| e / sum).collect())
}

/// Index and value of the largest element; ties go to the lowest index.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, top)) if v <= top => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// Shared, read-only prediction pipeline: one model, one class index.
#[derive(Clone)]
pub struct InferenceEngine {
    model: Arc<dyn Classifier>,
    classes: Arc<ClassIndex>,
}

impl InferenceEngine {
    pub fn new(model: Arc<dyn Classifier>, classes: Arc<ClassIndex>) -> Result<Self, ModelLoadError> {
        if model.num_classes() != classes.len() {
            return Err(ModelLoadError::ClassCountMismatch {
                model: model.num_classes(),
                classes: classes.len(),
            });
        }
        Ok(Self { model, classes })
    }

    pub fn classes(&self) -> &ClassIndex {
        &self.classes
    }

    pub fn predict(&self, image: &PreprocessedImage) -> Result<PredictionResult, InferenceError> {
        let logits = self.model.logits(image)?;
        if logits.len() != self.classes.len() {
            return Err(InferenceError::OutputWidth {
                expected: self.classes.len(),
                found: logits.len(),
            });
        }

        let probs = softmax(&logits).ok_or(InferenceError::NonFinite)?;
        let (index, confidence) = argmax(&probs).ok_or(InferenceError::OutputWidth {
            expected: self.classes.len(),
            found: 0,
        })?;
        let label = self
            .classes
            .label(index)
            .ok_or(InferenceError::UnknownClass(index))?;

        Ok(PredictionResult {
            label: label.to_string(),
            confidence,
        })
    }

    /// Decode, preprocess and classify one uploaded image.
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = decode_image(bytes)?;
        let input = preprocess(&image);
        Ok(self.predict(&input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Returns the same scores for every input.
    struct FixedLogits(pub Vec<f32>);

    impl Classifier for FixedLogits {
        fn num_classes(&self) -> usize {
            self.0.len()
        }

        fn logits(&self, _image: &PreprocessedImage) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    fn engine(labels: &str, logits: Vec<f32>) -> InferenceEngine {
        let classes = Arc::new(ClassIndex::from_json_str(labels).unwrap());
        InferenceEngine::new(Arc::new(FixedLogits(logits)), classes).unwrap()
    }

    fn any_image() -> PreprocessedImage {
        preprocess(&RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])))
    }

    #[test]
    fn softmax_sums_to_one() {
        for scores in [
            vec![0.0],
            vec![2.0, 0.5],
            vec![-3.0, 10.0, 0.1, 0.1],
            vec![1000.0, 999.0, -1000.0],
            vec![-1e30, 1e30],
        ] {
            let probs = softmax(&scores).unwrap();
            let sum: f32 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "{scores:?} -> {sum}");
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn softmax_rejects_non_finite_scores() {
        assert!(softmax(&[1.0, f32::NAN]).is_none());
        assert!(softmax(&[f32::INFINITY, 0.0]).is_none());
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(argmax(&[0.1, 0.3, 0.6]), Some((2, 0.6)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn predicts_pothole_from_fixed_scores() {
        let engine = engine(r#"{"pothole": 0, "garbage": 1}"#, vec![2.0, 0.5]);
        let result = engine.predict(&any_image()).unwrap();
        assert_eq!(result.label, "pothole");
        assert!((result.confidence - 0.8176).abs() < 1e-4);
    }

    #[test]
    fn tied_scores_pick_first_class() {
        let engine = engine(r#"{"a": 0, "b": 1, "c": 2}"#, vec![1.0, 3.0, 3.0]);
        assert_eq!(engine.predict(&any_image()).unwrap().label, "b");
    }

    #[test]
    fn non_finite_scores_are_inference_errors() {
        let engine = engine(r#"{"a": 0, "b": 1}"#, vec![f32::NAN, 0.0]);
        assert!(matches!(
            engine.predict(&any_image()),
            Err(InferenceError::NonFinite)
        ));
    }

    #[test]
    fn mismatched_model_width_is_rejected_at_construction() {
        let classes = Arc::new(ClassIndex::from_json_str(r#"{"a": 0, "b": 1}"#).unwrap());
        let err = InferenceEngine::new(Arc::new(FixedLogits(vec![0.0; 3])), classes)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ModelLoadError::ClassCountMismatch { model: 3, classes: 2 }
        ));
    }

    #[test]
    fn classify_bytes_reports_decode_failures() {
        let engine = engine(r#"{"pothole": 0, "garbage": 1}"#, vec![2.0, 0.5]);
        let err = engine.classify_bytes(b"GIF89a-but-not-really").unwrap_err();
        assert!(matches!(err, PredictError::Decode(_)));
    }
}
