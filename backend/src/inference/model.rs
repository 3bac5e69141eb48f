use shared::BloodGroup;
use std::path::Path;
use std::sync::Arc;

use super::onnx::{ModelInput, OnnxClassifier};
use super::preprocess::PreparedImage;

pub const FOREST_MODEL_FILE: &str = "random_forest.onnx";
pub const MARGIN_MODEL_FILE: &str = "svm.onnx";
pub const CONV_MODEL_FILE: &str = "cnn.onnx";

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("{model} received malformed input: {detail}")]
    MalformedInput { model: &'static str, detail: String },
    #[error("{model} failed to run: {detail}")]
    Runtime { model: &'static str, detail: String },
    #[error("{model} produced malformed output: {detail}")]
    MalformedOutput { model: &'static str, detail: String },
    #[error("{model} produced invalid class index {index}")]
    InvalidClassIndex { model: &'static str, index: usize },
    #[error("{0} classifier panicked")]
    Panicked(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load ONNX model {path}: {detail}")]
    Onnx { path: String, detail: String },
}

/// A trained, read-only classifier. Implementations hold no per-request state.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn predict(&self, input: &PreparedImage) -> Result<BloodGroup, InferenceError>;
}

/// Index of the largest score; the lowest index wins ties and NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

pub fn class_for_index(model: &'static str, index: usize) -> Result<BloodGroup, InferenceError> {
    BloodGroup::from_index(index).ok_or(InferenceError::InvalidClassIndex { model, index })
}

/// The three voters: tree ensemble, linear margin model and CNN, in that order.
#[derive(Clone)]
pub struct ModelEnsemble {
    forest: Arc<dyn Classifier>,
    margin: Arc<dyn Classifier>,
    conv: Arc<dyn Classifier>,
}

impl std::fmt::Debug for ModelEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEnsemble")
            .field("forest", &self.forest.name())
            .field("margin", &self.margin.name())
            .field("conv", &self.conv.name())
            .finish()
    }
}

impl ModelEnsemble {
    pub fn new(
        forest: Arc<dyn Classifier>,
        margin: Arc<dyn Classifier>,
        conv: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            forest,
            margin,
            conv,
        }
    }

    /// Loads all three ONNX graphs from `model_dir`. Any failure aborts.
    ///
    /// The forest and margin models take the flat feature row; the CNN takes the NHWC tensor.
    pub fn load(model_dir: &Path, input_size: u32) -> Result<Self, ModelLoadError> {
        let size = input_size as usize;
        let load = |name: &'static str, file: &str, input: ModelInput| {
            let classifier = OnnxClassifier::load(name, &model_dir.join(file), input, size)?;
            log::info!("Loaded {} from {}", name, file);
            Ok::<_, ModelLoadError>(Arc::new(classifier))
        };

        let forest = load("random_forest", FOREST_MODEL_FILE, ModelInput::Features)?;
        let margin = load("svm", MARGIN_MODEL_FILE, ModelInput::Features)?;
        let conv = load("cnn", CONV_MODEL_FILE, ModelInput::Tensor)?;

        Ok(Self::new(forest, margin, conv))
    }

    pub fn names(&self) -> [&'static str; 3] {
        [self.forest.name(), self.margin.name(), self.conv.name()]
    }

    /// Runs the three classifiers in parallel on scoped threads.
    pub fn predict_all(&self, input: &PreparedImage) -> Result<[BloodGroup; 3], InferenceError> {
        let models = [&self.forest, &self.margin, &self.conv];
        std::thread::scope(|scope| -> Result<[BloodGroup; 3], InferenceError> {
            let handles =
                models.map(|model| (model.name(), scope.spawn(move || model.predict(input))));

            let mut votes = [BloodGroup::APositive; 3];
            for (slot, (name, handle)) in votes.iter_mut().zip(handles) {
                *slot = handle
                    .join()
                    .map_err(|_| InferenceError::Panicked(name))??;
            }
            Ok(votes)
        })
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;

    /// Always answers with the same class.
    pub struct FixedClassifier {
        pub name: &'static str,
        pub answer: BloodGroup,
    }

    impl Classifier for FixedClassifier {
        fn name(&self) -> &'static str {
            self.name
        }

        fn predict(&self, _input: &PreparedImage) -> Result<BloodGroup, InferenceError> {
            Ok(self.answer)
        }
    }

    pub struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn predict(&self, _input: &PreparedImage) -> Result<BloodGroup, InferenceError> {
            Err(class_for_index(self.name(), 11).unwrap_err())
        }
    }

    pub fn ensemble_of(answers: [BloodGroup; 3]) -> ModelEnsemble {
        let [a, b, c] = answers;
        ModelEnsemble::new(
            Arc::new(FixedClassifier { name: "forest", answer: a }),
            Arc::new(FixedClassifier { name: "margin", answer: b }),
            Arc::new(FixedClassifier { name: "conv", answer: c }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::stub::*;
    use super::*;
    use crate::inference::config::PreprocessConfig;
    use crate::inference::preprocess::Preprocessor;
    use crate::inference::test_images::ridges;

    fn input() -> PreparedImage {
        Preprocessor::new(&PreprocessConfig::default())
            .prepare(&ridges(120, 120))
            .unwrap()
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.3, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn class_index_outside_range_is_an_error() {
        assert_eq!(class_for_index("m", 4).unwrap(), BloodGroup::OPositive);
        assert!(matches!(
            class_for_index("m", 8),
            Err(InferenceError::InvalidClassIndex { index: 8, .. })
        ));
    }

    #[test]
    fn predict_all_keeps_model_order() {
        let ensemble = ensemble_of([
            BloodGroup::BPositive,
            BloodGroup::ONegative,
            BloodGroup::AbNegative,
        ]);
        let votes = ensemble.predict_all(&input()).unwrap();
        assert_eq!(
            votes,
            [BloodGroup::BPositive, BloodGroup::ONegative, BloodGroup::AbNegative]
        );
        assert_eq!(ensemble.names(), ["forest", "margin", "conv"]);
    }

    #[test]
    fn one_failing_model_fails_the_ensemble() {
        let ensemble = ModelEnsemble::new(
            Arc::new(FixedClassifier {
                name: "forest",
                answer: BloodGroup::APositive,
            }),
            Arc::new(FailingClassifier),
            Arc::new(FixedClassifier {
                name: "conv",
                answer: BloodGroup::APositive,
            }),
        );
        assert!(matches!(
            ensemble.predict_all(&input()),
            Err(InferenceError::InvalidClassIndex { model: "failing", .. })
        ));
    }

    #[test]
    fn load_fails_when_any_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelEnsemble::load(dir.path(), 4).unwrap_err();
        assert!(matches!(err, ModelLoadError::Io { .. }));
    }
}
