#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use backend::db::SqliteRepository;
use backend::inference::config::PipelineConfig;
use backend::inference::{Classifier, InferenceError, InferencePipeline, ModelEnsemble, PreparedImage};
use backend::records::{FeedbackCollector, PredictionStore};
use backend::storage::LocalImageStore;
use backend::AppContext;
use image::{DynamicImage, GrayImage, Luma};
use shared::BloodGroup;

pub const BOUNDARY: &str = "----fingerprint-boundary";

pub struct Fixed(pub &'static str, pub BloodGroup);

impl Classifier for Fixed {
    fn name(&self) -> &'static str {
        self.0
    }

    fn predict(&self, _input: &PreparedImage) -> Result<BloodGroup, InferenceError> {
        Ok(self.1)
    }
}

pub struct Broken;

impl Classifier for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn predict(&self, _input: &PreparedImage) -> Result<BloodGroup, InferenceError> {
        Err(InferenceError::InvalidClassIndex {
            model: "broken",
            index: 12,
        })
    }
}

pub fn voting(votes: [BloodGroup; 3]) -> ModelEnsemble {
    let [a, b, c] = votes;
    ModelEnsemble::new(
        Arc::new(Fixed("forest", a)),
        Arc::new(Fixed("margin", b)),
        Arc::new(Fixed("conv", c)),
    )
}

pub async fn context(ensemble: ModelEnsemble, upload_dir: &Path, max_upload_bytes: usize) -> AppContext {
    let pipeline = InferencePipeline::new(&PipelineConfig::default(), ensemble);
    let repository = Arc::new(SqliteRepository::connect("sqlite::memory:").await.unwrap());
    let images = Arc::new(LocalImageStore::new(upload_dir, max_upload_bytes).unwrap());
    let predictions = PredictionStore::new(images.clone(), repository.clone());
    let capture = Some(pipeline.preprocessor().clone());
    let feedback = FeedbackCollector::new(repository, images, capture);
    AppContext::new(pipeline, predictions, feedback, max_upload_bytes)
}

/// Vertical sinusoidal stripes that pass every quality gate.
pub fn ridge_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, _| {
        Luma([(128.0 + 100.0 * (x as f32 / 3.0).sin()).round() as u8])
    });
    png(DynamicImage::ImageLuma8(img))
}

pub fn flat_png(width: u32, height: u32) -> Vec<u8> {
    png(DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([120]))))
}

fn png(image: DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

/// Hand-built multipart/form-data body and its content type.
pub fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
