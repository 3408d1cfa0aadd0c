//! Inference backend abstraction.
//!
//! Model runtimes (ONNX Runtime, candle, burn, ...) implement
//! [`InferenceSession`]. Tensors cross the boundary as flat vectors with a
//! shape, so no framework type leaks into the renderer.

use crate::{Error, Result};
use std::any::Any;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense row-major tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    pub fn f32(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Self {
        Self {
            shape: shape.into(),
            data: TensorData::F32(data),
        }
    }

    pub fn i64(shape: impl Into<Vec<usize>>, data: Vec<i64>) -> Self {
        Self {
            shape: shape.into(),
            data: TensorData::I64(data),
        }
    }

    pub fn bool(shape: impl Into<Vec<usize>>, data: Vec<bool>) -> Self {
        Self {
            shape: shape.into(),
            data: TensorData::Bool(data),
        }
    }

    /// `[1, n]` row of f32 values.
    pub fn row_f32(data: Vec<f32>) -> Self {
        Self::f32([1, data.len()], data)
    }

    /// `[1, n]` row of i64 values.
    pub fn row_i64(data: Vec<i64>) -> Self {
        Self::i64([1, data.len()], data)
    }

    /// `[1]` scalar.
    pub fn scalar_i64(value: i64) -> Self {
        Self::i64([1], vec![value])
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_f32(self) -> Result<Vec<f32>> {
        match self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(Error::Inference(format!(
                "expected f32 tensor, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn type_name(data: &TensorData) -> &'static str {
    match data {
        TensorData::F32(_) => "f32",
        TensorData::I64(_) => "i64",
        TensorData::Bool(_) => "bool",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub tensor: Tensor,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            name: name.into(),
            tensor,
        }
    }
}

/// Take the output called `name` from a session's outputs.
pub fn take_output(outputs: &mut Vec<NamedTensor>, name: &str) -> Result<Tensor> {
    let idx = outputs
        .iter()
        .position(|o| o.name == name)
        .ok_or_else(|| Error::Inference(format!("model produced no \"{name}\" output")))?;
    Ok(outputs.swap_remove(idx).tensor)
}

/// Take the first output, whatever its name.
pub fn take_first_output(outputs: Vec<NamedTensor>) -> Result<Tensor> {
    outputs
        .into_iter()
        .next()
        .map(|o| o.tensor)
        .ok_or_else(|| Error::Inference("model produced no outputs".into()))
}

/// One loaded model.
///
/// Sessions are not assumed to be reentrant: callers hold them behind a lock
/// and never run two inferences on the same session at once.
pub trait InferenceSession: Send {
    /// Names of the inputs the model declares.
    fn input_names(&self) -> Vec<String>;

    fn run(&mut self, inputs: Vec<NamedTensor>) -> Result<Vec<NamedTensor>>;

    /// Downcast to the concrete session type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Creates sessions for model files.
pub trait SessionFactory: Send + Sync {
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceSession>>;
}

impl<F> SessionFactory for F
where
    F: Fn(&Path) -> Result<Box<dyn InferenceSession>> + Send + Sync,
{
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceSession>> {
        self(model_path)
    }
}

/// Reject inputs the model does not declare.
pub fn verify_input_names(session: &dyn InferenceSession, inputs: &[NamedTensor]) -> Result<()> {
    let declared = session.input_names();
    let unknown: Vec<&str> = inputs
        .iter()
        .map(|i| i.name.as_str())
        .filter(|name| !declared.iter().any(|d| d == name))
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(Error::ModelMismatch(format!(
            "model does not accept inputs [{}]; it declares [{}]",
            unknown.join(", "),
            declared.join(", ")
        )))
    }
}
