//! Request-to-prediction pipeline: label table, weights, preprocessing and
//! the engine that ties them together.

pub mod class_index;
pub mod engine;
pub mod model;
pub mod preprocess;
pub mod resnet;

pub use class_index::ClassIndex;
pub use engine::{InferenceEngine, argmax, softmax};
pub use model::{Classifier, TorchClassifier};
pub use preprocess::{PreprocessedImage, decode_image, preprocess};
