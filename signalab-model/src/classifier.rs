//! Trained sequence classifier on the inference backend.

use burn::tensor::activation::softmax;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::backend::{self, InferenceBackend};
use crate::config::{ModelKind, TrainConfig};
use crate::network::SequenceNet;
use crate::tensor::{self, NamedTensor, TensorError};
use crate::TrainError;
use signalab_core::Label;

/// Everything needed to rebuild a classifier's architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: ModelKind,
    pub sequence_length: usize,
    pub feature_count: usize,
    pub lstm_units: Vec<usize>,
    pub conv_filters: Vec<usize>,
    pub kernel_size: usize,
    pub head_units: usize,
    pub dropout: f64,
    pub seed: u64,
}

impl ModelSpec {
    pub fn from_config(config: &TrainConfig, sequence_length: usize, feature_count: usize) -> Self {
        Self {
            kind: config.model,
            sequence_length,
            feature_count,
            lstm_units: config.lstm_units.clone(),
            conv_filters: config.conv_filters.clone(),
            kernel_size: config.kernel_size,
            head_units: config.head_units(),
            dropout: config.dropout,
            seed: config.seed,
        }
    }

    pub fn input_shape(&self) -> (usize, usize) {
        (self.sequence_length, self.feature_count)
    }
}

/// On-disk form: the spec plus every parameter as a named tensor.
#[derive(Serialize, Deserialize)]
struct SavedClassifier {
    spec: ModelSpec,
    tensors: Vec<NamedTensor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "SavedClassifier", try_from = "SavedClassifier")]
pub struct SequenceClassifier {
    spec: ModelSpec,
    net: SequenceNet<InferenceBackend>,
}

impl SequenceClassifier {
    /// Seeded initialisation. The same spec always yields the same weights.
    pub fn new(spec: ModelSpec) -> Result<Self, TrainError> {
        let net = SequenceNet::seeded(&spec, &backend::device())?;
        Ok(Self { spec, net })
    }

    pub(crate) fn from_net(spec: ModelSpec, net: SequenceNet<InferenceBackend>) -> Self {
        Self { spec, net }
    }

    pub(crate) fn net(&self) -> &SequenceNet<InferenceBackend> {
        &self.net
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn kind(&self) -> ModelKind {
        self.spec.kind
    }

    fn check_shape(&self, rows: usize, cols: usize) -> Result<(), TrainError> {
        if (rows, cols) != self.spec.input_shape() {
            return Err(TrainError::ShapeMismatch {
                expected: self.spec.input_shape(),
                actual: (rows, cols),
            });
        }
        Ok(())
    }

    /// Class probabilities indexed by `Label::class_index`.
    pub fn predict_proba(
        &self,
        sequence: ArrayView2<'_, f64>,
    ) -> Result<[f64; Label::COUNT], TrainError> {
        let batch = sequence.insert_axis(Axis(0));
        let mut probs = self.probabilities(batch.view())?;
        Ok(probs.pop().unwrap_or([1.0 / Label::COUNT as f64; Label::COUNT]))
    }

    pub fn predict(&self, sequence: ArrayView2<'_, f64>) -> Result<Label, TrainError> {
        let probs = self.predict_proba(sequence)?;
        Ok(Label::from_class_index(argmax(&probs)).unwrap_or(Label::Hold))
    }

    /// Probabilities for every sequence of a (count × length × features) batch.
    pub fn predict_batch(
        &self,
        sequences: &Array3<f64>,
    ) -> Result<Vec<[f64; Label::COUNT]>, TrainError> {
        self.probabilities(sequences.view())
    }

    fn probabilities(
        &self,
        sequences: ndarray::ArrayView3<'_, f64>,
    ) -> Result<Vec<[f64; Label::COUNT]>, TrainError> {
        let (count, length, features) = sequences.dim();
        self.check_shape(length, features)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let input = tensor::sequences_tensor(sequences, &backend::device());
        Ok(probability_rows(softmax(self.net.forward(input), 1)))
    }

    /// All parameters in a fixed order: encoder layers, then head.
    pub fn tensors(&self) -> Vec<NamedTensor> {
        self.net.tensors()
    }

    /// Replace all parameters; `tensors` must come from a classifier with the
    /// same spec.
    pub fn load_tensors(&mut self, tensors: Vec<NamedTensor>) -> Result<(), TensorError> {
        self.net = self.net.clone().load_tensors(tensors)?;
        Ok(())
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(NamedTensor::len).sum()
    }
}

impl From<SequenceClassifier> for SavedClassifier {
    fn from(model: SequenceClassifier) -> Self {
        Self {
            tensors: model.tensors(),
            spec: model.spec,
        }
    }
}

impl TryFrom<SavedClassifier> for SequenceClassifier {
    type Error = TrainError;

    fn try_from(saved: SavedClassifier) -> Result<Self, Self::Error> {
        let mut model = SequenceClassifier::new(saved.spec)?;
        model.load_tensors(saved.tensors)?;
        Ok(model)
    }
}

/// Split a `[batch, 3]` probability tensor into per-sample rows.
pub(crate) fn probability_rows(
    probs: burn::tensor::Tensor<InferenceBackend, 2>,
) -> Vec<[f64; Label::COUNT]> {
    let values: Vec<f64> = probs.into_data().iter::<f64>().collect();
    values
        .chunks_exact(Label::COUNT)
        .map(|row| [row[0], row[1], row[2]])
        .collect()
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
