use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;

use super::config::ValidationThresholds;
use super::preprocess::to_grayscale;

/// Canny needs a 3x3 neighbourhood around every pixel.
pub const MIN_EDGE_SIDE: u32 = 3;

/// Reasons an upload is turned away before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowContrast,
    NoRidgePattern,
    TooNoisy,
    TooSmall,
    TooUniform,
}

impl Rejection {
    pub fn reason(self) -> &'static str {
        match self {
            Rejection::LowContrast => {
                "Image has low contrast. Please upload a clearer fingerprint image."
            }
            Rejection::NoRidgePattern => {
                "No clear fingerprint patterns detected. Please upload a proper fingerprint image."
            }
            Rejection::TooNoisy => {
                "Image appears to be too noisy. Please upload a clearer fingerprint image."
            }
            Rejection::TooSmall => "Image is too small. Please upload a larger fingerprint image.",
            Rejection::TooUniform => {
                "Image appears to be too uniform. Please upload a proper fingerprint image."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub reason: String,
}

impl ValidationOutcome {
    fn passed() -> Self {
        Self {
            accepted: true,
            reason: "Image validation passed.".to_string(),
        }
    }

    fn rejected(rejection: Rejection) -> Self {
        Self {
            accepted: false,
            reason: rejection.reason().to_string(),
        }
    }

    fn fault(detail: &str) -> Self {
        Self {
            accepted: false,
            reason: format!("Error validating image: {}", detail),
        }
    }
}

/// Measured quality of a grayscale image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMetrics {
    pub contrast: f64,
    /// `None` when the image is narrower than the Canny window.
    pub edge_density: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub entropy: f64,
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    thresholds: ValidationThresholds,
}

impl ImageValidator {
    pub fn new(thresholds: ValidationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    /// Runs the checks in order (contrast, edge density, size, entropy) and
    /// stops at the first failure. Edge detection only runs once contrast passed.
    pub fn validate(&self, image: &DynamicImage) -> ValidationOutcome {
        let gray = to_grayscale(image);
        if gray.width() == 0 || gray.height() == 0 {
            return ValidationOutcome::fault("image has no pixels");
        }

        if let Some(rejection) = self.check_contrast(contrast(&gray)) {
            return ValidationOutcome::rejected(rejection);
        }

        if let Some(rejection) = self.check_edge_density(self.edge_density(&gray)) {
            return ValidationOutcome::rejected(rejection);
        }

        if let Some(rejection) = self.check_size(gray.width(), gray.height()) {
            return ValidationOutcome::rejected(rejection);
        }

        if let Some(rejection) = self.check_entropy(histogram_entropy(&gray)) {
            return ValidationOutcome::rejected(rejection);
        }

        ValidationOutcome::passed()
    }

    pub fn measure(&self, image: &DynamicImage) -> Result<QualityMetrics, String> {
        let gray = to_grayscale(image);
        if gray.width() == 0 || gray.height() == 0 {
            return Err("image has no pixels".to_string());
        }
        Ok(QualityMetrics {
            contrast: contrast(&gray),
            edge_density: self.edge_density(&gray),
            width: gray.width(),
            height: gray.height(),
            entropy: histogram_entropy(&gray),
        })
    }

    /// The decision rule over already-measured metrics.
    pub fn judge(&self, metrics: &QualityMetrics) -> Option<Rejection> {
        self.check_contrast(metrics.contrast)
            .or_else(|| self.check_edge_density(metrics.edge_density))
            .or_else(|| self.check_size(metrics.width, metrics.height))
            .or_else(|| self.check_entropy(metrics.entropy))
    }

    fn check_contrast(&self, contrast: f64) -> Option<Rejection> {
        (contrast < self.thresholds.min_contrast).then_some(Rejection::LowContrast)
    }

    /// Unmeasurable density defers to the size check, which always rejects such images.
    fn check_edge_density(&self, density: Option<f64>) -> Option<Rejection> {
        let density = density?;
        if density < self.thresholds.min_edge_density {
            Some(Rejection::NoRidgePattern)
        } else if density > self.thresholds.max_edge_density {
            Some(Rejection::TooNoisy)
        } else {
            None
        }
    }

    fn check_size(&self, width: u32, height: u32) -> Option<Rejection> {
        let min = self.thresholds.min_dimension;
        (width < min || height < min).then_some(Rejection::TooSmall)
    }

    fn check_entropy(&self, entropy: f64) -> Option<Rejection> {
        (entropy < self.thresholds.min_entropy).then_some(Rejection::TooUniform)
    }

    fn edge_density(&self, gray: &GrayImage) -> Option<f64> {
        if gray.width() < MIN_EDGE_SIDE || gray.height() < MIN_EDGE_SIDE {
            return None;
        }
        let edges = canny(gray, self.thresholds.canny_low, self.thresholds.canny_high);
        let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();
        Some(edge_pixels as f64 / (edges.width() as f64 * edges.height() as f64))
    }
}

/// Population standard deviation of the intensities.
pub fn contrast(gray: &GrayImage) -> f64 {
    let count = (gray.width() as f64) * (gray.height() as f64);
    if count == 0.0 {
        return 0.0;
    }
    let (sum, sum_sq) = gray.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = p[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / count;
    ((sum_sq / count) - mean * mean).max(0.0).sqrt()
}

/// Shannon entropy in bits of the normalized 256-bin intensity histogram.
pub fn histogram_entropy(gray: &GrayImage) -> f64 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}
