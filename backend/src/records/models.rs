use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::BloodGroup;

/// One served prediction. `actual_label` is filled in at most once, by feedback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub subject_ref: Option<String>,
    pub image_path: String,
    pub predicted_label: BloodGroup,
    pub confidence: f32,
    pub actual_label: Option<BloodGroup>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordState {
    Created,
    Corrected,
}

impl PredictionRecord {
    pub fn state(&self) -> RecordState {
        match self.actual_label {
            Some(_) => RecordState::Corrected,
            None => RecordState::Created,
        }
    }
}

/// A corrected example captured for offline retraining. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSample {
    pub id: i64,
    pub image_path: String,
    pub actual_label: BloodGroup,
    pub features: Option<Vec<f32>>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub subject_ref: Option<String>,
    pub image_path: String,
    pub predicted_label: BloodGroup,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionOutcome {
    Applied(TrainingSample),
    AlreadyCorrected,
    NotFound,
}
