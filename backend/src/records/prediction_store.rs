use std::sync::Arc;

use shared::BloodGroup;

use super::models::{NewPrediction, PredictionRecord};
use crate::db::{PredictionRepository, RepositoryError};
use crate::storage::{ImageStore, ImageStoreError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Image(#[from] ImageStoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Image {0} does not exist")]
    MissingImage(String),
}

/// Durable prediction records. Every record points at an image that existed
/// when the record was written.
#[derive(Clone)]
pub struct PredictionStore {
    images: Arc<dyn ImageStore>,
    repository: Arc<dyn PredictionRepository>,
}

impl PredictionStore {
    pub fn new(images: Arc<dyn ImageStore>, repository: Arc<dyn PredictionRepository>) -> Self {
        Self { images, repository }
    }

    pub fn images(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    pub async fn save_image(&self, data: &[u8], file_name: &str) -> Result<String, StoreError> {
        Ok(self.images.save(data, file_name).await?)
    }

    pub async fn record(
        &self,
        subject_ref: Option<String>,
        image_ref: &str,
        label: BloodGroup,
        confidence: f32,
    ) -> Result<i64, StoreError> {
        if !self.images.exists(image_ref).await {
            return Err(StoreError::MissingImage(image_ref.to_string()));
        }
        let id = self
            .repository
            .insert_prediction(&NewPrediction {
                subject_ref,
                image_path: image_ref.to_string(),
                predicted_label: label,
                confidence,
            })
            .await?;
        log::info!("Recorded prediction {} ({}, {:.2})", id, label, confidence);
        Ok(id)
    }

    /// Saves the image, then inserts the record. A failed insert removes the
    /// freshly saved file so nothing is left orphaned.
    pub async fn save_and_record(
        &self,
        subject_ref: Option<String>,
        data: &[u8],
        file_name: &str,
        label: BloodGroup,
        confidence: f32,
    ) -> Result<i64, StoreError> {
        let image_ref = self.save_image(data, file_name).await?;
        match self.record(subject_ref, &image_ref, label, confidence).await {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Err(cleanup) = self.images.remove(&image_ref).await {
                    log::warn!("Failed to remove orphaned upload {}: {}", image_ref, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<PredictionRecord>, StoreError> {
        Ok(self.repository.get_prediction(id).await?)
    }
}
