//! Quantized model export.
//!
//! Every parameter tensor is stored in the requested precision and the
//! whole artifact is serialized with bincode. `FullInt8` additionally
//! calibrates uint8 input quantization from a representative dataset.
//! [`QuantizedModel::predictor`] dequantizes the weights back into a
//! runnable classifier so an export can be smoke-tested.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use half::f16;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::classifier::{ModelSpec, SequenceClassifier};
use crate::tensor::{NamedTensor, TensorError};
use crate::TrainError;
use signalab_core::{Label, SequenceDataset};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("deserialization error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("full int8 export needs a representative dataset")]
    MissingRepresentativeDataset,

    #[error("representative dataset produced no samples")]
    EmptyRepresentativeDataset,

    #[error("sample shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown precision '{0}' (expected f32, f16, dynamic or int8)")]
    UnknownPrecision(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Model(#[from] TrainError),
}

/// Target precision of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[serde(alias = "f32")]
    Float32,
    #[serde(alias = "f16")]
    Float16,
    /// int8 weights, float inputs.
    #[serde(alias = "dynamic")]
    DynamicInt8,
    /// int8 weights, uint8-calibrated inputs.
    #[serde(alias = "int8")]
    FullInt8,
}

impl Precision {
    pub fn requires_calibration(self) -> bool {
        self == Precision::FullInt8
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Precision::Float32 => "f32",
            Precision::Float16 => "f16",
            Precision::DynamicInt8 => "dynamic",
            Precision::FullInt8 => "int8",
        })
    }
}

impl FromStr for Precision {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float32" | "basic" => Ok(Precision::Float32),
            "f16" | "float16" => Ok(Precision::Float16),
            "dynamic" | "dynamic-int8" | "dynamic_int8" => Ok(Precision::DynamicInt8),
            "int8" | "full-int8" | "full_int8" => Ok(Precision::FullInt8),
            other => Err(ExportError::UnknownPrecision(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuantizedValues {
    F32(Vec<f32>),
    F16(Vec<f16>),
    /// Symmetric per-tensor: value = q * scale.
    Int8 { values: Vec<i8>, scale: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: QuantizedValues,
}

impl QuantizedTensor {
    pub fn quantize(tensor: &NamedTensor, precision: Precision) -> Self {
        let values = match precision {
            Precision::Float32 => {
                QuantizedValues::F32(tensor.values.iter().map(|&v| v as f32).collect())
            }
            Precision::Float16 => {
                QuantizedValues::F16(tensor.values.iter().map(|&v| f16::from_f64(v)).collect())
            }
            Precision::DynamicInt8 | Precision::FullInt8 => {
                let max_abs = tensor.values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
                let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 1.0 };
                QuantizedValues::Int8 {
                    values: tensor
                        .values
                        .iter()
                        .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
                        .collect(),
                    scale: scale as f32,
                }
            }
        };
        Self {
            name: tensor.name.clone(),
            shape: tensor.shape.clone(),
            values,
        }
    }

    pub fn dequantize(&self) -> NamedTensor {
        let values = match &self.values {
            QuantizedValues::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            QuantizedValues::F16(v) => v.iter().map(|x| x.to_f64()).collect(),
            QuantizedValues::Int8 { values, scale } => values
                .iter()
                .map(|&q| f64::from(q) * f64::from(*scale))
                .collect(),
        };
        NamedTensor {
            name: self.name.clone(),
            shape: self.shape.clone(),
            values,
        }
    }
}

/// Affine uint8 input quantization: real = (q - zero_point) * scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputQuantization {
    pub scale: f32,
    pub zero_point: u8,
}

impl InputQuantization {
    /// Parameters covering `[min, max]`; the range is widened to include 0.
    pub fn from_range(min: f64, max: f64) -> Self {
        let (min, max) = (min.min(0.0), max.max(0.0));
        let scale = if max > min { (max - min) / 255.0 } else { 1.0 };
        let zero_point = (-min / scale).round().clamp(0.0, 255.0) as u8;
        Self {
            scale: scale as f32,
            zero_point,
        }
    }

    pub fn quantize(&self, value: f64) -> u8 {
        (value / f64::from(self.scale) + f64::from(self.zero_point))
            .round()
            .clamp(0.0, 255.0) as u8
    }

    pub fn dequantize(&self, q: u8) -> f64 {
        (f64::from(q) - f64::from(self.zero_point)) * f64::from(self.scale)
    }
}

/// Source of calibration samples shaped like the model input.
pub trait RepresentativeDataset {
    fn next_sample(&mut self) -> Option<Array2<f64>>;
}

/// Standard-normal samples of a fixed shape.
pub struct RandomNormalSamples {
    shape: (usize, usize),
    remaining: usize,
    rng: StdRng,
}

impl RandomNormalSamples {
    pub fn new(shape: (usize, usize), count: usize, seed: u64) -> Self {
        Self {
            shape,
            remaining: count,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RepresentativeDataset for RandomNormalSamples {
    fn next_sample(&mut self) -> Option<Array2<f64>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let rng = &mut self.rng;
        Some(Array2::from_shape_simple_fn(self.shape, || {
            StandardNormal.sample(&mut *rng)
        }))
    }
}

/// The first `limit` sequences of a real dataset.
pub struct DatasetSamples<'a> {
    dataset: &'a SequenceDataset,
    next: usize,
    limit: usize,
}

impl<'a> DatasetSamples<'a> {
    pub fn new(dataset: &'a SequenceDataset, limit: usize) -> Self {
        Self {
            dataset,
            next: 0,
            limit: limit.min(dataset.len()),
        }
    }
}

impl RepresentativeDataset for DatasetSamples<'_> {
    fn next_sample(&mut self) -> Option<Array2<f64>> {
        if self.next >= self.limit {
            return None;
        }
        let sample = self.dataset.sequences.index_axis(Axis(0), self.next).to_owned();
        self.next += 1;
        Some(sample)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedModel {
    pub format_version: u32,
    pub precision: Precision,
    pub spec: ModelSpec,
    pub tensors: Vec<QuantizedTensor>,
    pub input_quantization: Option<InputQuantization>,
}

impl QuantizedModel {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn quantize(
        model: &SequenceClassifier,
        precision: Precision,
        representative: Option<&mut dyn RepresentativeDataset>,
    ) -> Result<Self, ExportError> {
        let input_quantization = match (precision.requires_calibration(), representative) {
            (false, _) => None,
            (true, None) => return Err(ExportError::MissingRepresentativeDataset),
            (true, Some(samples)) => Some(calibrate(model.spec(), samples)?),
        };
        Ok(Self {
            format_version: Self::FORMAT_VERSION,
            precision,
            spec: model.spec().clone(),
            tensors: model
                .tensors()
                .par_iter()
                .map(|t| QuantizedTensor::quantize(t, precision))
                .collect(),
            input_quantization,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        Ok(bincode::serde::encode_to_vec(self, bincode_config())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExportError> {
        let (model, _): (QuantizedModel, usize) =
            bincode::serde::decode_from_slice(bytes, bincode_config())?;
        if model.format_version != Self::FORMAT_VERSION {
            return Err(ExportError::UnsupportedVersion(model.format_version));
        }
        Ok(model)
    }

    /// Write the artifact, returning its size in bytes.
    pub fn save(&self, path: &Path) -> Result<u64, ExportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    pub fn load(path: &Path) -> Result<Self, ExportError> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Rebuild a runnable model with dequantized weights.
    pub fn predictor(&self) -> Result<QuantizedPredictor, ExportError> {
        let mut classifier = SequenceClassifier::new(self.spec.clone())?;
        classifier.load_tensors(self.tensors.iter().map(QuantizedTensor::dequantize).collect())?;
        Ok(QuantizedPredictor {
            classifier,
            input_quantization: self.input_quantization,
        })
    }
}

/// Fixed-width integers keep f16 payloads at two bytes per value.
fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

fn calibrate(
    spec: &ModelSpec,
    samples: &mut dyn RepresentativeDataset,
) -> Result<InputQuantization, ExportError> {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    let mut seen = 0usize;
    while let Some(sample) = samples.next_sample() {
        if sample.dim() != spec.input_shape() {
            return Err(ExportError::ShapeMismatch {
                expected: spec.input_shape(),
                actual: sample.dim(),
            });
        }
        for &v in sample.iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
        seen += 1;
    }
    if seen == 0 {
        return Err(ExportError::EmptyRepresentativeDataset);
    }
    let params = InputQuantization::from_range(min, max);
    info!(
        samples = seen,
        min,
        max,
        scale = params.scale,
        zero_point = params.zero_point,
        "calibrated input range"
    );
    Ok(params)
}

/// Dequantized model ready for inference.
pub struct QuantizedPredictor {
    classifier: SequenceClassifier,
    input_quantization: Option<InputQuantization>,
}

impl QuantizedPredictor {
    pub fn predict_proba(
        &self,
        sequence: ArrayView2<'_, f64>,
    ) -> Result<[f64; Label::COUNT], ExportError> {
        match &self.input_quantization {
            None => Ok(self.classifier.predict_proba(sequence)?),
            Some(q) => {
                let quantized = sequence.mapv(|v| q.dequantize(q.quantize(v)));
                Ok(self.classifier.predict_proba(quantized.view())?)
            }
        }
    }

    pub fn predict(&self, sequence: ArrayView2<'_, f64>) -> Result<Label, ExportError> {
        let probs = self.predict_proba(sequence)?;
        let best = (0..Label::COUNT)
            .fold(0, |best, i| if probs[i] > probs[best] { i } else { best });
        Ok(Label::from_class_index(best).unwrap_or(Label::Hold))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub precision: Precision,
    pub path: PathBuf,
    pub bytes: u64,
    pub parameters: usize,
    /// Largest absolute weight change introduced by quantization.
    pub max_weight_error: f64,
}

impl ExportReport {
    pub fn kilobytes(&self) -> f64 {
        self.bytes as f64 / 1024.0
    }
}

/// Quantize `model`, write it to `path` and report the artifact size.
pub fn export_model(
    model: &SequenceClassifier,
    precision: Precision,
    representative: Option<&mut dyn RepresentativeDataset>,
    path: &Path,
) -> Result<ExportReport, ExportError> {
    let quantized = QuantizedModel::quantize(model, precision, representative)?;
    let bytes = quantized.save(path)?;

    let original = model.tensors();
    let max_weight_error = original
        .iter()
        .zip(&quantized.tensors)
        .flat_map(|(o, q)| {
            o.values
                .iter()
                .zip(q.dequantize().values)
                .map(|(a, b)| (a - b).abs())
                .collect::<Vec<_>>()
        })
        .fold(0.0, f64::max);

    let report = ExportReport {
        precision,
        path: path.to_path_buf(),
        bytes,
        parameters: model.parameter_count(),
        max_weight_error,
    };
    info!(
        precision = %precision,
        path = %path.display(),
        size_kb = %format!("{:.2}", report.kilobytes()),
        "exported model"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int8_error_is_within_half_a_step() {
        let t = NamedTensor {
            name: "w".into(),
            shape: vec![5],
            values: vec![-1.0, -0.3, 0.0, 0.42, 0.9],
        };
        let q = QuantizedTensor::quantize(&t, Precision::DynamicInt8);
        let back = q.dequantize();
        let step = 1.0 / 127.0;
        for (a, b) in t.values.iter().zip(&back.values) {
            assert!((a - b).abs() <= step / 2.0 + 1e-7, "{a} vs {b}");
        }
    }

    #[test]
    fn zero_tensor_keeps_unit_scale() {
        let t = NamedTensor {
            name: "b".into(),
            shape: vec![3],
            values: vec![0.0; 3],
        };
        match QuantizedTensor::quantize(&t, Precision::FullInt8).values {
            QuantizedValues::Int8 { values, scale } => {
                assert_eq!(values, vec![0, 0, 0]);
                assert_eq!(scale, 1.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn input_quantization_covers_range() {
        let q = InputQuantization::from_range(-2.0, 3.1);
        assert_eq!(q.quantize(-2.0), 0);
        assert_eq!(q.quantize(3.1), 255);
        assert_eq!(q.quantize(100.0), 255);
        assert!((q.dequantize(q.quantize(0.0))).abs() < f64::from(q.scale));
        assert!((q.dequantize(q.quantize(1.234)) - 1.234).abs() <= f64::from(q.scale));
    }

    #[test]
    fn parse_precisions() {
        assert_eq!("f32".parse::<Precision>().unwrap(), Precision::Float32);
        assert_eq!("float16".parse::<Precision>().unwrap(), Precision::Float16);
        assert_eq!("dynamic".parse::<Precision>().unwrap(), Precision::DynamicInt8);
        assert_eq!("INT8".parse::<Precision>().unwrap(), Precision::FullInt8);
        assert!("int4".parse::<Precision>().is_err());
        for p in [
            Precision::Float32,
            Precision::Float16,
            Precision::DynamicInt8,
            Precision::FullInt8,
        ] {
            assert_eq!(p.to_string().parse::<Precision>().unwrap(), p);
        }
    }

    #[test]
    fn random_samples_have_requested_shape_and_count() {
        let mut samples = RandomNormalSamples::new((4, 2), 3, 1);
        let mut n = 0;
        while let Some(s) = samples.next_sample() {
            assert_eq!(s.dim(), (4, 2));
            n += 1;
        }
        assert_eq!(n, 3);
    }
}
