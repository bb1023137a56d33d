use std::path::PathBuf;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use shared::{ErrorKind, ErrorResponse};

/// Startup failure in the class mapping or service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed class mapping: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Malformed config file: {0}")]
    MalformedConfig(#[from] serde_yaml::Error),
    #[error("Class mapping is empty")]
    Empty,
    #[error("Label '{0}' appears more than once in the class mapping")]
    DuplicateLabel(String),
    #[error("Index {index} is assigned to both '{first}' and '{second}'")]
    DuplicateIndex {
        index: usize,
        first: String,
        second: String,
    },
    #[error("Class indices must cover 0..{count}, but index {missing} has no label")]
    NonContiguous { count: usize, missing: usize },
    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model weights not found at {0}")]
    MissingFile(PathBuf),
    #[error(
        "{0} looks like a pickled PyTorch state dict, which libtorch cannot read; \
         export it with safetensors.torch.save_file(model.state_dict(), \"<name>.safetensors\") \
         and point model_path at the .safetensors file"
    )]
    PickledStateDict(PathBuf),
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),
    #[error("Classifier needs at least one output class")]
    ZeroClasses,
    #[error("Parameter '{0}' is missing from the weights file")]
    MissingParameter(String),
    #[error("Parameter '{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },
    #[error("Model produces {model} classes but the class index has {classes}")]
    ClassCountMismatch { model: usize, classes: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Uploaded file is empty")]
    EmptyPayload,
    #[error("No 'file' field in the upload")]
    MissingFile,
    #[error("Invalid multipart payload: {0}")]
    Multipart(String),
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("Cannot decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Cannot read image data: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image has zero width or height")]
    ZeroArea,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),
    #[error("Model returned {found} scores, expected {expected}")]
    OutputWidth { expected: usize, found: usize },
    #[error("Model returned non-finite scores")]
    NonFinite,
    #[error("No label for class index {0}")]
    UnknownClass(usize),
    #[error("Inference worker failed: {0}")]
    Worker(String),
}

/// Per-request failure; the only error type that reaches the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::Decode(_) => ErrorKind::DecodeError,
            PredictError::Inference(_) => ErrorKind::InferenceError,
        }
    }
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        log::error!("Prediction error ({}): {}", self.kind(), self);
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
        })
    }
}

/// Anything that stops the service before it binds its port.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
