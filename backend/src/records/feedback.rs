use actix_web::web;
use shared::BloodGroup;
use std::str::FromStr;
use std::sync::Arc;

use super::models::{CorrectionOutcome, RecordState, TrainingSample};
use crate::db::{PredictionRepository, RepositoryError};
use crate::inference::Preprocessor;
use crate::storage::ImageStore;

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("Invalid blood group label: {0}")]
    InvalidLabel(String),
    #[error("Prediction {0} not found")]
    NotFound(i64),
    #[error("Prediction {0} has already been corrected")]
    AlreadyCorrected(i64),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub fn parse_label(token: &str) -> Result<BloodGroup, FeedbackError> {
    BloodGroup::from_str(token).map_err(|_| FeedbackError::InvalidLabel(token.to_string()))
}

/// Applies user corrections and captures training samples. The first
/// correction of a record wins; later ones are refused.
#[derive(Clone)]
pub struct FeedbackCollector {
    repository: Arc<dyn PredictionRepository>,
    images: Arc<dyn ImageStore>,
    capture: Option<Preprocessor>,
}

impl FeedbackCollector {
    /// `capture` is the preprocessor used for feature vectors; `None` disables capture.
    pub fn new(
        repository: Arc<dyn PredictionRepository>,
        images: Arc<dyn ImageStore>,
        capture: Option<Preprocessor>,
    ) -> Self {
        Self {
            repository,
            images,
            capture,
        }
    }

    pub async fn correct(
        &self,
        record_id: i64,
        actual_label: BloodGroup,
    ) -> Result<TrainingSample, FeedbackError> {
        let record = self
            .repository
            .get_prediction(record_id)
            .await?
            .ok_or(FeedbackError::NotFound(record_id))?;

        if record.state() == RecordState::Corrected {
            log::warn!(
                "Rejected correction of prediction {}: already labelled {:?}",
                record_id,
                record.actual_label
            );
            return Err(FeedbackError::AlreadyCorrected(record_id));
        }

        let features = match &self.capture {
            Some(preprocessor) => self.capture_features(preprocessor, &record.image_path).await,
            None => None,
        };

        match self
            .repository
            .apply_correction(record_id, actual_label, features.as_deref())
            .await?
        {
            CorrectionOutcome::Applied(sample) => {
                log::info!(
                    "Prediction {} corrected to {} (was {}), training sample {}",
                    record_id,
                    actual_label,
                    record.predicted_label,
                    sample.id
                );
                Ok(sample)
            }
            CorrectionOutcome::AlreadyCorrected => {
                log::warn!("Concurrent correction of prediction {} lost", record_id);
                Err(FeedbackError::AlreadyCorrected(record_id))
            }
            CorrectionOutcome::NotFound => Err(FeedbackError::NotFound(record_id)),
        }
    }

    /// Best effort: a sample without features is still worth keeping.
    async fn capture_features(&self, preprocessor: &Preprocessor, image_ref: &str) -> Option<Vec<f32>> {
        let bytes = match self.images.load(image_ref).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Feature capture skipped for {}: {}", image_ref, e);
                return None;
            }
        };
        let preprocessor = preprocessor.clone();
        match web::block(move || preprocessor.features_from_bytes(&bytes)).await {
            Ok(Ok(features)) => Some(features),
            Ok(Err(e)) => {
                log::warn!("Feature capture failed for {}: {}", image_ref, e);
                None
            }
            Err(e) => {
                log::warn!("Feature capture task failed for {}: {}", image_ref, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;
    use crate::inference::config::PreprocessConfig;
    use crate::inference::test_images::{png_bytes, ridges};
    use crate::records::PredictionStore;
    use crate::storage::LocalImageStore;
    use strum::IntoEnumIterator;
    use tempfile::TempDir;

    struct Fixture {
        store: PredictionStore,
        repository: Arc<SqliteRepository>,
        images: Arc<LocalImageStore>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        fixture_at(|_| "sqlite::memory:".to_string()).await
    }

    async fn fixture_at(database_url: impl FnOnce(&std::path::Path) -> String) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let images = Arc::new(LocalImageStore::new(dir.path(), 1 << 20).unwrap());
        let url = database_url(dir.path());
        let repository = Arc::new(SqliteRepository::connect(&url).await.unwrap());
        let store = PredictionStore::new(images.clone(), repository.clone());
        Fixture {
            store,
            repository,
            images,
            _dir: dir,
        }
    }

    impl Fixture {
        fn collector(&self, capture: bool) -> FeedbackCollector {
            let preprocessor = capture.then(|| Preprocessor::new(&PreprocessConfig::default()));
            FeedbackCollector::new(self.repository.clone(), self.images.clone(), preprocessor)
        }

        async fn prediction(&self) -> i64 {
            self.store
                .save_and_record(
                    None,
                    &png_bytes(&ridges(120, 120)),
                    "print.png",
                    BloodGroup::OPositive,
                    2.0 / 3.0,
                )
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn correction_moves_record_to_corrected_and_captures_sample() {
        let fx = fixture().await;
        let id = fx.prediction().await;

        let sample = fx.collector(true).correct(id, BloodGroup::AbNegative).await.unwrap();
        let record = fx.store.get(id).await.unwrap().unwrap();

        assert_eq!(record.state(), RecordState::Corrected);
        assert_eq!(record.actual_label, Some(BloodGroup::AbNegative));
        assert_eq!(sample.image_path, record.image_path);
        assert_eq!(sample.actual_label, BloodGroup::AbNegative);
        assert_eq!(sample.features.as_ref().map(Vec::len), Some(96 * 96));

        let samples = fx.repository.list_training_samples().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].features, sample.features);
    }

    #[tokio::test]
    async fn second_correction_is_rejected() {
        let fx = fixture().await;
        let id = fx.prediction().await;
        let collector = fx.collector(false);

        collector.correct(id, BloodGroup::APositive).await.unwrap();
        let err = collector.correct(id, BloodGroup::BPositive).await.unwrap_err();
        assert!(matches!(err, FeedbackError::AlreadyCorrected(i) if i == id));

        let record = fx.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.actual_label, Some(BloodGroup::APositive));
        assert_eq!(fx.repository.list_training_samples().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .collector(true)
            .correct(77, BloodGroup::APositive)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::NotFound(77)));
    }

    #[tokio::test]
    async fn capture_disabled_stores_no_features() {
        let fx = fixture().await;
        let id = fx.prediction().await;
        let sample = fx.collector(false).correct(id, BloodGroup::ONegative).await.unwrap();
        assert!(sample.features.is_none());
    }

    #[tokio::test]
    async fn missing_image_still_records_the_correction() {
        let fx = fixture().await;
        let id = fx.prediction().await;
        let record = fx.store.get(id).await.unwrap().unwrap();
        std::fs::remove_file(&record.image_path).unwrap();

        let sample = fx.collector(true).correct(id, BloodGroup::BNegative).await.unwrap();
        assert!(sample.features.is_none());
        assert_eq!(
            fx.store.get(id).await.unwrap().unwrap().state(),
            RecordState::Corrected
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_corrections_have_one_winner() {
        let fx = fixture_at(|dir| {
            format!("sqlite://{}?mode=rwc", dir.join("feedback.db").display())
        })
        .await;
        let id = fx.prediction().await;
        let collector = fx.collector(false);

        let labels: Vec<BloodGroup> = BloodGroup::iter().cycle().take(16).collect();
        let handles: Vec<_> = labels
            .into_iter()
            .map(|label| {
                let collector = collector.clone();
                tokio::spawn(async move { collector.correct(id, label).await })
            })
            .collect();

        let mut winners = Vec::new();
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(sample) => winners.push(sample),
                Err(FeedbackError::AlreadyCorrected(i)) if i == id => conflicts += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, 15);

        let record = fx.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.actual_label, Some(winners[0].actual_label));
        assert_eq!(fx.repository.list_training_samples().await.unwrap().len(), 1);
    }

    #[test]
    fn labels_parse_exactly() {
        assert_eq!(parse_label("AB+").unwrap(), BloodGroup::AbPositive);
        assert!(parse_label(" O-").is_err());
        assert!(matches!(parse_label("C+"), Err(FeedbackError::InvalidLabel(_))));
        assert!(parse_label("ab+").is_err());
    }
}
