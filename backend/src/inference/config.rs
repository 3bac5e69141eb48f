use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::validator::MIN_EDGE_SIDE;
use crate::config::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub validation: ValidationThresholds,
    pub preprocessing: PreprocessConfig,
}

/// Quality gates applied to an upload before any model runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// Minimum standard deviation of grayscale intensities.
    pub min_contrast: f64,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Accepted range for the fraction of edge pixels.
    pub min_edge_density: f64,
    pub max_edge_density: f64,
    /// Both width and height must be at least this many pixels.
    pub min_dimension: u32,
    /// Minimum Shannon entropy of the 256-bin histogram, in bits.
    pub min_entropy: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_contrast: 30.0,
            canny_low: 50.0,
            canny_high: 150.0,
            min_edge_density: 0.01,
            max_edge_density: 0.3,
            min_dimension: 100,
            min_entropy: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Side of the square the image is resized to.
    pub size: u32,
    pub resize_method: ResizeMethod,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            size: 96,
            resize_method: ResizeMethod::CatmullRom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMethod {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeMethod {
    pub fn filter(self) -> FilterType {
        match self {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Triangle => FilterType::Triangle,
            ResizeMethod::CatmullRom => FilterType::CatmullRom,
            ResizeMethod::Gaussian => FilterType::Gaussian,
            ResizeMethod::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    /// Falls back to the built-in defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            log::info!("Loading pipeline config from {}", path.display());
            Self::load(path)
        } else {
            log::info!(
                "No pipeline config at {}, using built-in thresholds",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(config_str)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let v = &self.validation;
        if v.min_contrast < 0.0 || v.min_entropy < 0.0 {
            return Err(ConfigError::Invalid(
                "contrast and entropy thresholds must be non-negative".into(),
            ));
        }
        if v.canny_low > v.canny_high {
            return Err(ConfigError::Invalid(format!(
                "canny_low ({}) exceeds canny_high ({})",
                v.canny_low, v.canny_high
            )));
        }
        if !(0.0..=1.0).contains(&v.min_edge_density)
            || !(0.0..=1.0).contains(&v.max_edge_density)
            || v.min_edge_density > v.max_edge_density
        {
            return Err(ConfigError::Invalid(format!(
                "edge density bounds [{}, {}] must be an ordered range within [0, 1]",
                v.min_edge_density, v.max_edge_density
            )));
        }
        if v.min_dimension < MIN_EDGE_SIDE {
            return Err(ConfigError::Invalid(format!(
                "min_dimension must be at least {}",
                MIN_EDGE_SIDE
            )));
        }
        if self.preprocessing.size == 0 {
            return Err(ConfigError::Invalid("preprocessing.size must be positive".into()));
        }
        Ok(())
    }
}
