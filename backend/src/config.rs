use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;

pub const DEFAULT_CONFIG_PATH: &str = "config/inference.yaml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    #[default]
    Cpu,
    Cuda,
    Auto,
}

impl DeviceChoice {
    pub fn to_device(self) -> tch::Device {
        match self {
            DeviceChoice::Cpu => tch::Device::Cpu,
            DeviceChoice::Cuda => tch::Device::Cuda(0),
            DeviceChoice::Auto => tch::Device::cuda_if_available(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub class_map_path: PathBuf,
    pub device: DeviceChoice,
    pub max_upload_bytes: usize,
    pub workers: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            model_path: PathBuf::from("model/grievance_classifier.safetensors"),
            class_map_path: PathBuf::from("model/class_mapping.json"),
            device: DeviceChoice::Cpu,
            max_upload_bytes: 10 * 1024 * 1024,
            workers: None,
        }
    }
}

impl ServiceConfig {
    /// Reads `explicit` if given, else `config/inference.yaml` when present,
    /// else defaults. `HOST` and `PORT` from the environment win.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigurationError> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if default_path.is_file() => Self::from_file(default_path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Relative model and class-map paths resolve against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&config_str)?;
        if let Some(base) = path.parent() {
            config.model_path = resolve(base, &config.model_path);
            config.class_map_path = resolve(base, &config.class_map_path);
        }
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.parse().map_err(|e| ConfigurationError::InvalidSetting {
                key: "PORT".into(),
                reason: format!("{port:?}: {e}"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if self.max_upload_bytes == 0 {
            return Err(invalid("max_upload_bytes", "must be greater than zero"));
        }
        if self.workers == Some(0) {
            return Err(invalid("workers", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
