pub mod config;
pub mod fusion;
pub mod model;
pub mod onnx;
pub mod pipeline;
pub mod preprocess;
pub mod validator;

pub use fusion::{FusedPrediction, FusionDecider};
pub use model::{Classifier, InferenceError, ModelEnsemble, ModelLoadError};
pub use onnx::{ModelInput, OnnxClassifier};
pub use pipeline::{InferencePipeline, PipelineError};
pub use preprocess::{PreparedImage, Preprocessor};
pub use validator::{ImageValidator, ValidationOutcome};
