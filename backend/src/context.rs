use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::SqliteRepository;
use crate::error::StartupError;
use crate::inference::config::PipelineConfig;
use crate::inference::{InferencePipeline, ModelEnsemble};
use crate::records::{FeedbackCollector, PredictionStore};
use crate::storage::LocalImageStore;

/// Everything a request handler needs, built once at startup and shared
/// through `web::Data`.
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<InferencePipeline>,
    pub predictions: PredictionStore,
    pub feedback: FeedbackCollector,
    pub max_upload_bytes: usize,
}

impl AppContext {
    pub fn new(
        pipeline: InferencePipeline,
        predictions: PredictionStore,
        feedback: FeedbackCollector,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            predictions,
            feedback,
            max_upload_bytes,
        }
    }

    /// Loads config, models, database and upload directory. Any failure is fatal.
    pub async fn initialize(config: &AppConfig) -> Result<Self, StartupError> {
        let pipeline_config = PipelineConfig::load_or_default(&config.pipeline_config)?;

        log::info!("Loading models from {}", config.model_dir.display());
        let ensemble = ModelEnsemble::load(&config.model_dir, pipeline_config.preprocessing.size)?;
        let pipeline = InferencePipeline::new(&pipeline_config, ensemble);

        let repository = Arc::new(SqliteRepository::connect(&config.database_url).await?);
        log::info!("Database ready at {}", config.database_url);

        let images = Arc::new(LocalImageStore::new(&config.upload_dir, config.max_upload_bytes)?);
        log::info!("Uploads stored under {}", config.upload_dir.display());

        let capture = config
            .capture_features
            .then(|| pipeline.preprocessor().clone());
        let predictions = PredictionStore::new(images.clone(), repository.clone());
        let feedback = FeedbackCollector::new(repository, images, capture);

        Ok(Self::new(pipeline, predictions, feedback, config.max_upload_bytes))
    }
}
