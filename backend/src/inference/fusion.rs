use shared::BloodGroup;
use strum::IntoEnumIterator;

/// Outcome of combining the three votes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedPrediction {
    pub label: BloodGroup,
    /// `agreeing / 3`.
    pub confidence: f32,
    pub votes: [BloodGroup; 3],
    pub agreeing: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FusionDecider;

impl FusionDecider {
    /// Majority vote over three labels. With no repeated label the smallest
    /// class index wins.
    pub fn fuse(&self, a: BloodGroup, b: BloodGroup, c: BloodGroup) -> FusedPrediction {
        let votes = [a, b, c];
        let mut label = BloodGroup::APositive;
        let mut agreeing = 0;
        for candidate in BloodGroup::iter() {
            let count = votes.iter().filter(|&&v| v == candidate).count();
            if count > agreeing {
                label = candidate;
                agreeing = count;
            }
        }

        FusedPrediction {
            label,
            confidence: agreeing as f32 / votes.len() as f32,
            votes,
            agreeing,
        }
    }
}

/// Two-decimal rounding used in responses: 0.33, 0.67, 1.0.
pub fn round_confidence(confidence: f32) -> f32 {
    (confidence * 100.0).round() / 100.0
}
