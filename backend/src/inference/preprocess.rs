//! Image decoding and the fixed preprocessing the classifier was trained with.
//!
//! The resize filter and the normalization statistics are part of the model
//! contract: weights trained under different values still load and run, they
//! just classify worse.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use ndarray::Array3;

use crate::error::DecodeError;

pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

/// Bilinear with support scaled to the downsampling factor.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized, channel-major `3 x 224 x 224` input.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage(Array3<f32>);

impl PreprocessedImage {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.0
    }

    /// Values in channel-major, row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }
}

/// Decodes uploaded bytes into an RGB image, sniffing the format from content.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::ZeroArea);
    }
    Ok(image.to_rgb8())
}

pub fn preprocess(image: &RgbImage) -> PreprocessedImage {
    let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, RESIZE_FILTER);
    let side = INPUT_SIZE as usize;
    let tensor = Array3::from_shape_fn((CHANNELS, side, side), |(c, y, x)| {
        let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (value - MEAN[c]) / STD[c]
    });
    PreprocessedImage(tensor)
}
