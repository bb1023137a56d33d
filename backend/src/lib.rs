pub mod config;
pub mod error;
pub mod inference;
pub mod routes;

use std::sync::Arc;

use config::{DeviceChoice, ServiceConfig};
use error::{ConfigurationError, StartupError};
use inference::{ClassIndex, InferenceEngine, TorchClassifier};

/// Loads the class mapping and weights named in `config`. Any failure here
/// must stop the process before it binds.
pub fn build_engine(config: &ServiceConfig) -> Result<InferenceEngine, StartupError> {
    if config.device == DeviceChoice::Cuda && !tch::Cuda::is_available() {
        return Err(ConfigurationError::InvalidSetting {
            key: "device".into(),
            reason: "cuda requested but no CUDA device is available".into(),
        }
        .into());
    }

    log::info!("Loading class mapping from: {}", config.class_map_path.display());
    let classes = ClassIndex::load(&config.class_map_path)?;
    log::info!("Loaded {} classes: {:?}", classes.len(), classes.labels());

    log::info!("Loading model from: {}", config.model_path.display());
    let model = TorchClassifier::load(
        &config.model_path,
        classes.len(),
        config.device.to_device(),
    )?;

    Ok(InferenceEngine::new(Arc::new(model), Arc::new(classes))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_indices_stop_startup() {
        let dir = tempfile::tempdir().unwrap();
        let class_map_path = dir.path().join("class_mapping.json");
        std::fs::write(&class_map_path, r#"{"pothole": 0, "garbage": 0}"#).unwrap();

        let config = ServiceConfig {
            class_map_path,
            model_path: dir.path().join("missing.ot"),
            ..Default::default()
        };
        let err = build_engine(&config).err().unwrap();
        assert!(matches!(
            err,
            StartupError::Configuration(ConfigurationError::DuplicateIndex { .. })
        ));
    }

    #[test]
    fn missing_weights_stop_startup() {
        let dir = tempfile::tempdir().unwrap();
        let class_map_path = dir.path().join("class_mapping.json");
        std::fs::write(&class_map_path, r#"{"pothole": 0, "garbage": 1}"#).unwrap();

        let config = ServiceConfig {
            class_map_path,
            model_path: dir.path().join("missing.ot"),
            ..Default::default()
        };
        assert!(matches!(
            build_engine(&config).err().unwrap(),
            StartupError::ModelLoad(_)
        ));
    }
}
