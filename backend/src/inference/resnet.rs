//! ResNet-18 with torchvision parameter names, so exported state dicts map
//! one-to-one onto the variables created here.

use tch::nn::{self, ConvConfig, ModuleT};
use tch::Tensor;

/// Width of the feature vector feeding the final linear layer.
pub const FEATURES: i64 = 512;

const STAGES: [(i64, i64); 4] = [(64, 1), (128, 2), (256, 2), (512, 2)];
const BLOCKS_PER_STAGE: usize = 2;

fn conv(p: nn::Path, c_in: i64, c_out: i64, ksize: i64, stride: i64, padding: i64) -> nn::Conv2D {
    let config = ConvConfig {
        stride,
        padding,
        bias: false,
        ..Default::default()
    };
    nn::conv2d(p, c_in, c_out, ksize, config)
}

#[derive(Debug)]
struct BasicBlock {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    conv2: nn::Conv2D,
    bn2: nn::BatchNorm,
    downsample: Option<(nn::Conv2D, nn::BatchNorm)>,
}

impl BasicBlock {
    fn new(p: &nn::Path, c_in: i64, c_out: i64, stride: i64) -> Self {
        let downsample = (stride != 1 || c_in != c_out).then(|| {
            let ds = p / "downsample";
            (
                conv(&ds / "0", c_in, c_out, 1, stride, 0),
                nn::batch_norm2d(&ds / "1", c_out, Default::default()),
            )
        });
        Self {
            conv1: conv(p / "conv1", c_in, c_out, 3, stride, 1),
            bn1: nn::batch_norm2d(p / "bn1", c_out, Default::default()),
            conv2: conv(p / "conv2", c_out, c_out, 3, 1, 1),
            bn2: nn::batch_norm2d(p / "bn2", c_out, Default::default()),
            downsample,
        }
    }
}

impl ModuleT for BasicBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = xs
            .apply(&self.conv1)
            .apply_t(&self.bn1, train)
            .relu()
            .apply(&self.conv2)
            .apply_t(&self.bn2, train);
        let shortcut = match &self.downsample {
            Some((conv, bn)) => xs.apply(conv).apply_t(bn, train),
            None => xs.shallow_clone(),
        };
        (ys + shortcut).relu()
    }
}

#[derive(Debug)]
pub struct ResNet18 {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    layers: Vec<BasicBlock>,
    fc: nn::Linear,
    num_classes: i64,
}

impl ResNet18 {
    pub fn new(p: &nn::Path, num_classes: i64) -> Self {
        let mut layers = Vec::with_capacity(STAGES.len() * BLOCKS_PER_STAGE);
        let mut c_in = 64;
        for (stage, (c_out, stride)) in STAGES.into_iter().enumerate() {
            let stage_path = p / format!("layer{}", stage + 1);
            for block in 0..BLOCKS_PER_STAGE {
                let stride = if block == 0 { stride } else { 1 };
                layers.push(BasicBlock::new(&(&stage_path / block), c_in, c_out, stride));
                c_in = c_out;
            }
        }
        Self {
            conv1: conv(p / "conv1", 3, 64, 7, 2, 3),
            bn1: nn::batch_norm2d(p / "bn1", 64, Default::default()),
            layers,
            fc: nn::linear(p / "fc", FEATURES, num_classes, Default::default()),
            num_classes,
        }
    }

    pub fn num_classes(&self) -> i64 {
        self.num_classes
    }
}

impl ModuleT for ResNet18 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let stem = xs
            .apply(&self.conv1)
            .apply_t(&self.bn1, train)
            .relu()
            .max_pool2d([3, 3], [2, 2], [1, 1], [1, 1], false);
        self.layers
            .iter()
            .fold(stem, |ys, block| ys.apply_t(block, train))
            .adaptive_avg_pool2d([1, 1])
            .flatten(1, -1)
            .apply(&self.fc)
    }
}
