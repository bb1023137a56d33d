use std::collections::HashMap;
use std::path::Path;

use tch::nn::{self, ModuleT};
use tch::{Device, Kind, Tensor};

use super::preprocess::{CHANNELS, INPUT_SIZE, PreprocessedImage};
use super::resnet::ResNet18;
use crate::error::{InferenceError, ModelLoadError};

/// Anything that turns a preprocessed image into one raw score per class.
pub trait Classifier: Send + Sync {
    fn num_classes(&self) -> usize;

    fn logits(&self, image: &PreprocessedImage) -> Result<Vec<f32>, InferenceError>;
}

/// Frozen ResNet-18 evaluated with libtorch.
#[derive(Debug)]
pub struct TorchClassifier {
    net: ResNet18,
    // Owns the parameters `net` points into.
    _vs: nn::VarStore,
    device: Device,
}

// SAFETY: `Tensor` is only `Send` in tch. After `load` returns, the parameters
// are frozen and only read by `forward_t(.., false)` under `no_grad`; nothing
// mutates them or the store for the lifetime of the classifier.
unsafe impl Sync for TorchClassifier {}

impl TorchClassifier {
    pub fn load(path: &Path, num_classes: usize, device: Device) -> Result<Self, ModelLoadError> {
        if num_classes == 0 {
            return Err(ModelLoadError::ZeroClasses);
        }
        if !path.is_file() {
            return Err(ModelLoadError::MissingFile(path.to_path_buf()));
        }
        if has_extension(path, "pth") {
            return Err(ModelLoadError::PickledStateDict(path.to_path_buf()));
        }

        let mut vs = nn::VarStore::new(device);
        let net = ResNet18::new(&vs.root(), num_classes as i64);
        let named = read_named_tensors(path, device)?;
        copy_parameters(&vs, named)?;
        vs.freeze();

        log::info!(
            "Loaded ResNet-18 ({} classes) from {} on {:?}",
            net.num_classes(),
            path.display(),
            device
        );
        Ok(Self {
            net,
            _vs: vs,
            device,
        })
    }

    fn to_input(&self, image: &PreprocessedImage) -> Result<Tensor, InferenceError> {
        let side = INPUT_SIZE as i64;
        let input = Tensor::from_slice(&image.to_vec())
            .f_view([1, CHANNELS as i64, side, side])?
            .f_to_device(self.device)?;
        Ok(input)
    }
}

impl Classifier for TorchClassifier {
    fn num_classes(&self) -> usize {
        self.net.num_classes() as usize
    }

    fn logits(&self, image: &PreprocessedImage) -> Result<Vec<f32>, InferenceError> {
        let input = self.to_input(image)?;
        let output = tch::no_grad(|| self.net.forward_t(&input, false));
        let flat = output
            .f_to_kind(Kind::Float)?
            .f_to_device(Device::Cpu)?
            .f_view([-1])?;
        Ok(Vec::<f32>::try_from(flat)?)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|found| found.eq_ignore_ascii_case(ext))
}

fn read_named_tensors(path: &Path, device: Device) -> Result<Vec<(String, Tensor)>, ModelLoadError> {
    let named = if has_extension(path, "safetensors") {
        Tensor::read_safetensors(path)?
    } else {
        Tensor::load_multi_with_device(path, device)?
    };
    Ok(named)
}

/// Copies every architecture parameter from `named`, checking shapes first.
/// Entries the architecture does not declare are ignored.
fn copy_parameters(vs: &nn::VarStore, named: Vec<(String, Tensor)>) -> Result<(), ModelLoadError> {
    let mut source: HashMap<String, Tensor> = named.into_iter().collect();
    let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
    variables.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, mut var) in variables {
        let Some(src) = source.remove(&name) else {
            return Err(ModelLoadError::MissingParameter(name));
        };
        let (expected, found) = (var.size(), src.size());
        if expected != found {
            return Err(ModelLoadError::ShapeMismatch {
                name,
                expected,
                found,
            });
        }
        tch::no_grad(|| var.f_copy_(&src))?;
    }

    if !source.is_empty() {
        log::debug!("Ignoring {} unused entries in weights file", source.len());
    }
    Ok(())
}
