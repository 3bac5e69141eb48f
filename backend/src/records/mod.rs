pub mod feedback;
pub mod models;
pub mod prediction_store;

pub use feedback::{FeedbackCollector, FeedbackError};
pub use models::{CorrectionOutcome, NewPrediction, PredictionRecord, RecordState, TrainingSample};
pub use prediction_store::{PredictionStore, StoreError};
