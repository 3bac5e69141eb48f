use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array4;

use super::config::PreprocessConfig;
use super::model::InferenceError;

/// Model-ready views of one image. `features` is the row-major flatten of `tensor`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    /// Shape `(1, size, size, 1)`: one sample, one channel, NHWC.
    pub tensor: Array4<f32>,
    pub features: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    size: u32,
    filter: FilterType,
}

impl Preprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            size: config.size,
            filter: config.resize_method.filter(),
        }
    }

    pub fn input_size(&self) -> u32 {
        self.size
    }

    pub fn feature_len(&self) -> usize {
        (self.size as usize) * (self.size as usize)
    }

    /// Grayscale, resize to `size x size`, scale to [0, 1].
    pub fn prepare(&self, image: &DynamicImage) -> Result<PreparedImage, InferenceError> {
        let gray = to_grayscale(image);
        if gray.width() == 0 || gray.height() == 0 {
            return Err(InferenceError::Preprocessing(
                "cannot resize an empty image".to_string(),
            ));
        }
        let resized = imageops::resize(&gray, self.size, self.size, self.filter);
        let features: Vec<f32> = resized
            .as_raw()
            .iter()
            .map(|&p| f32::from(p) / 255.0)
            .collect();

        let side = self.size as usize;
        let tensor = Array4::from_shape_vec((1, side, side, 1), features.clone())
            .map_err(|e| InferenceError::Preprocessing(e.to_string()))?;

        Ok(PreparedImage { tensor, features })
    }

    /// Feature vector for stored image bytes, through the same path as inference.
    pub fn features_from_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>, InferenceError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| InferenceError::Preprocessing(format!("Failed to decode image: {}", e)))?;
        Ok(self.prepare(&image)?.features)
    }
}

/// Single-channel 8-bit view. Colour input is reduced with the Rec.601 weights
/// (0.299, 0.587, 0.114); grey input keeps its intensities.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            image.to_luma8()
        }
        _ => {
            let rgb = image.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
                Luma([luma.round().clamp(0.0, 255.0) as u8])
            })
        }
    }
}
