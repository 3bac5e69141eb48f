use image::DynamicImage;

use super::config::PipelineConfig;
use super::fusion::{FusedPrediction, FusionDecider};
use super::model::{InferenceError, ModelEnsemble};
use super::preprocess::Preprocessor;
use super::validator::ImageValidator;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Undecodable(String),
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// validate -> prepare -> predict -> fuse, for one uploaded image.
#[derive(Clone)]
pub struct InferencePipeline {
    validator: ImageValidator,
    preprocessor: Preprocessor,
    ensemble: ModelEnsemble,
    fusion: FusionDecider,
}

impl InferencePipeline {
    pub fn new(config: &PipelineConfig, ensemble: ModelEnsemble) -> Self {
        Self {
            validator: ImageValidator::new(config.validation.clone()),
            preprocessor: Preprocessor::new(&config.preprocessing),
            ensemble,
            fusion: FusionDecider,
        }
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn run(&self, bytes: &[u8]) -> Result<FusedPrediction, PipelineError> {
        let image = decode_upload(bytes)?;

        let outcome = self.validator.validate(&image);
        if !outcome.accepted {
            log::warn!("Image rejected: {}", outcome.reason);
            return Err(PipelineError::Rejected(outcome.reason));
        }

        let prepared = self.preprocessor.prepare(&image)?;
        let [a, b, c] = self.ensemble.predict_all(&prepared)?;
        for (name, vote) in self.ensemble.names().iter().zip([a, b, c]) {
            log::info!("{} predicted {}", name, vote);
        }

        let fused = self.fusion.fuse(a, b, c);
        log::info!(
            "Fused prediction {} ({} of 3 agree)",
            fused.label,
            fused.agreeing
        );
        Ok(fused)
    }
}

pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    image::load_from_memory(bytes).map_err(|e| PipelineError::Undecodable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::stub::ensemble_of;
    use crate::inference::test_images::{flat, png_bytes, ridges};
    use crate::inference::validator::Rejection;
    use shared::BloodGroup;

    fn pipeline(votes: [BloodGroup; 3]) -> InferencePipeline {
        InferencePipeline::new(&PipelineConfig::default(), ensemble_of(votes))
    }

    #[test]
    fn accepted_image_is_fused() {
        let p = pipeline([BloodGroup::OPositive, BloodGroup::OPositive, BloodGroup::BPositive]);
        let fused = p.run(&png_bytes(&ridges(200, 200))).unwrap();
        assert_eq!(fused.label, BloodGroup::OPositive);
        assert_eq!(fused.agreeing, 2);
    }

    #[test]
    fn rejection_carries_the_reason() {
        let p = pipeline([BloodGroup::APositive; 3]);
        match p.run(&png_bytes(&flat(200, 200, 90))) {
            Err(PipelineError::Rejected(reason)) => {
                assert_eq!(reason, Rejection::LowContrast.reason())
            }
            other => panic!("expected rejection, got {:?}", other.map(|f| f.label)),
        }
    }

    #[test]
    fn garbage_is_undecodable() {
        let p = pipeline([BloodGroup::APositive; 3]);
        assert!(matches!(
            p.run(b"definitely not a png"),
            Err(PipelineError::Undecodable(_))
        ));
    }
}
