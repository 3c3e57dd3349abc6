//! Named parameter tensors.
//!
//! Every network parameter can be listed as a flat tensor (logical
//! row-major order) and loaded back in the same order. Export, import and
//! seeded initialisation all go through this form.

use burn::module::Param;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::ArrayView3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl NamedTensor {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TensorError {
    #[error("missing tensor '{0}'")]
    Missing(String),

    #[error("tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{0} unexpected trailing tensors")]
    Trailing(usize),
}

pub(crate) fn push<B: Backend, const D: usize>(
    out: &mut Vec<NamedTensor>,
    name: String,
    param: &Param<Tensor<B, D>>,
) {
    let tensor = param.val();
    let shape = tensor.dims().to_vec();
    let values = tensor.into_data().iter::<f64>().collect();
    out.push(NamedTensor {
        name,
        shape,
        values,
    });
}

/// Replace `param` with the next tensor, which must have the same shape.
pub(crate) fn load_param<B, I, const D: usize>(
    tensors: &mut I,
    name: &str,
    param: Param<Tensor<B, D>>,
) -> Result<Param<Tensor<B, D>>, TensorError>
where
    B: Backend,
    I: Iterator<Item = NamedTensor>,
{
    let current = param.val();
    let expected = current.dims().to_vec();
    let next = tensors
        .next()
        .ok_or_else(|| TensorError::Missing(name.to_string()))?;
    if next.shape != expected || next.values.len() != expected.iter().product::<usize>() {
        return Err(TensorError::Shape {
            name: name.to_string(),
            expected,
            actual: next.shape,
        });
    }

    let values: Vec<f32> = next.values.iter().map(|&v| v as f32).collect();
    let data = TensorData::new(values, next.shape);
    Ok(Param::from_tensor(Tensor::from_data(data, &current.device())))
}

pub(crate) fn load_optional<B, I, const D: usize>(
    tensors: &mut I,
    name: &str,
    param: Option<Param<Tensor<B, D>>>,
) -> Result<Option<Param<Tensor<B, D>>>, TensorError>
where
    B: Backend,
    I: Iterator<Item = NamedTensor>,
{
    param.map(|p| load_param(tensors, name, p)).transpose()
}

/// Glorot-uniform values for a weight of `shape`.
///
/// Dense weights are `[fan_in, fan_out]`; convolution kernels are
/// `[out, in, kernel]`.
pub(crate) fn glorot_uniform<R: Rng>(shape: &[usize], rng: &mut R) -> Vec<f64> {
    let (fan_in, fan_out) = match *shape {
        [fan_in, fan_out] => (fan_in, fan_out),
        [out, input, kernel] => (input * kernel, out * kernel),
        _ => (1, 1),
    };
    let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    let count = shape.iter().product();
    (0..count).map(|_| dist.sample(&mut *rng)).collect()
}

/// A `(count × steps × features)` block of sequences as a float tensor.
pub(crate) fn sequences_tensor<B: Backend>(
    sequences: ArrayView3<'_, f64>,
    device: &B::Device,
) -> Tensor<B, 3> {
    let (count, steps, features) = sequences.dim();
    let values: Vec<f32> = sequences.iter().map(|&v| v as f32).collect();
    Tensor::from_data(TensorData::new(values, [count, steps, features]), device)
}
