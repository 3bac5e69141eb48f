use shared::BloodGroup;
use std::fs::File;
use std::path::Path;
use tract_onnx::prelude::*;

use super::model::{argmax, class_for_index, Classifier, InferenceError, ModelLoadError};
use super::preprocess::PreparedImage;

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Which view of the prepared image a model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelInput {
    /// Flat feature row, shape `[1, size * size]`.
    Features,
    /// NHWC tensor, shape `[1, size, size, 1]`.
    Tensor,
}

impl ModelInput {
    pub fn shape(self, size: usize) -> Vec<usize> {
        match self {
            ModelInput::Features => vec![1, size * size],
            ModelInput::Tensor => vec![1, size, size, 1],
        }
    }
}

/// An ONNX graph optimized once at load and run read-only per request.
pub struct OnnxClassifier {
    name: &'static str,
    input: ModelInput,
    shape: Vec<usize>,
    plan: OnnxPlan,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("shape", &self.shape)
            .finish()
    }
}

impl OnnxClassifier {
    /// Reads `path`, pins input 0 to `f32` of the given view's shape and optimizes the graph.
    pub fn load(
        name: &'static str,
        path: &Path,
        input: ModelInput,
        size: usize,
    ) -> Result<Self, ModelLoadError> {
        let mut file = File::open(path).map_err(|source| ModelLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let shape = input.shape(size);

        let plan = tract_onnx::onnx()
            .model_for_read(&mut file)
            .and_then(|model| model.with_input_fact(0, f32::fact(shape.clone()).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| ModelLoadError::Onnx {
                path: path.display().to_string(),
                detail: format!("{:#}", e),
            })?;

        log::debug!("{} expects {:?} input of shape {:?}", name, input, shape);
        Ok(Self::from_plan(name, input, shape, plan))
    }

    pub(crate) fn from_plan(
        name: &'static str,
        input: ModelInput,
        shape: Vec<usize>,
        plan: OnnxPlan,
    ) -> Self {
        Self {
            name,
            input,
            shape,
            plan,
        }
    }

    fn input_tensor(&self, prepared: &PreparedImage) -> Result<Tensor, InferenceError> {
        let malformed = |detail: String| InferenceError::MalformedInput {
            model: self.name,
            detail,
        };
        let values: &[f32] = match self.input {
            ModelInput::Features => &prepared.features,
            ModelInput::Tensor => prepared
                .tensor
                .as_slice()
                .ok_or_else(|| malformed("tensor is not in standard layout".to_string()))?,
        };
        let expected: usize = self.shape.iter().product();
        if values.len() != expected {
            return Err(malformed(format!(
                "expected {} values for shape {:?}, got {}",
                expected,
                self.shape,
                values.len()
            )));
        }
        Tensor::from_shape(&self.shape, values).map_err(|e| malformed(e.to_string()))
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn predict(&self, input: &PreparedImage) -> Result<BloodGroup, InferenceError> {
        let tensor = self.input_tensor(input)?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Runtime {
                model: self.name,
                detail: format!("{:#}", e),
            })?;
        let first = outputs.first().ok_or_else(|| InferenceError::MalformedOutput {
            model: self.name,
            detail: "graph produced no outputs".to_string(),
        })?;
        class_from_output(self.name, first)
    }
}

/// Reads a class from a model's first output.
///
/// Integer outputs are predicted labels (sklearn exports put the label first); float
/// outputs are one score per class and the argmax wins.
pub fn class_from_output(model: &'static str, output: &Tensor) -> Result<BloodGroup, InferenceError> {
    let malformed = |detail: String| InferenceError::MalformedOutput { model, detail };

    match output.datum_type() {
        DatumType::I64 => {
            let labels = output
                .as_slice::<i64>()
                .map_err(|e| malformed(e.to_string()))?;
            let &label = labels
                .first()
                .ok_or_else(|| malformed("empty label output".to_string()))?;
            let index = usize::try_from(label)
                .map_err(|_| malformed(format!("negative label {}", label)))?;
            class_for_index(model, index)
        }
        DatumType::F32 => {
            let scores = output
                .as_slice::<f32>()
                .map_err(|e| malformed(e.to_string()))?;
            if scores.len() != BloodGroup::COUNT {
                return Err(malformed(format!(
                    "expected {} class scores, got {}",
                    BloodGroup::COUNT,
                    scores.len()
                )));
            }
            let index = argmax(scores).ok_or_else(|| malformed("all scores are NaN".to_string()))?;
            class_for_index(model, index)
        }
        other => Err(malformed(format!("unsupported output type {:?}", other))),
    }
}
