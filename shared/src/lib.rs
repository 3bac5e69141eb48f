use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The eight blood-group classes, in the index order the classifiers were trained with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    AsRefStr,
)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    #[strum(serialize = "A+")]
    APositive = 0,
    #[serde(rename = "A-")]
    #[strum(serialize = "A-")]
    ANegative = 1,
    #[serde(rename = "B+")]
    #[strum(serialize = "B+")]
    BPositive = 2,
    #[serde(rename = "B-")]
    #[strum(serialize = "B-")]
    BNegative = 3,
    #[serde(rename = "O+")]
    #[strum(serialize = "O+")]
    OPositive = 4,
    #[serde(rename = "O-")]
    #[strum(serialize = "O-")]
    ONegative = 5,
    #[serde(rename = "AB+")]
    #[strum(serialize = "AB+")]
    AbPositive = 6,
    #[serde(rename = "AB-")]
    #[strum(serialize = "AB-")]
    AbNegative = 7,
}

impl BloodGroup {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns `None` for anything outside `0..8`.
    pub fn from_index(index: usize) -> Option<Self> {
        BloodGroup::iter().find(|group| group.index() == index)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PredictResponse {
    pub label: BloodGroup,
    pub confidence: f32,
    pub message: String,
    pub prediction_id: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FeedbackRequest {
    pub prediction_id: i64,
    pub actual_label: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FeedbackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedbackResponse {
    pub fn recorded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub message: String,
}
