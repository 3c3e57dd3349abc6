//! Signalab Model: sequence classifiers, training and quantized export.
//!
//! A classifier is a sequence encoder (stacked LSTM or Conv1D blocks) and a
//! dense softmax head over the three trading labels, built on burn. The
//! whole network trains end-to-end with Adam and dropout, early stopping on
//! validation loss and learning-rate reduction on plateau.

pub mod backend;
pub mod classifier;
pub mod config;
pub mod export;
pub mod lstm;
pub mod network;
pub mod tensor;
pub mod trainer;

pub use classifier::{ModelSpec, SequenceClassifier};
pub use config::{ModelKind, TrainConfig};
pub use export::{
    export_model, DatasetSamples, ExportError, ExportReport, InputQuantization, Precision,
    QuantizedModel, QuantizedPredictor, RandomNormalSamples, RepresentativeDataset,
};
pub use network::SequenceNet;
pub use tensor::{NamedTensor, TensorError};
pub use trainer::{ConfusionMatrix, EpochMetrics, Evaluation, TrainReport, Trainer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    #[error("training dataset is empty")]
    EmptyDataset,

    #[error("input shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("sequence length {length} is below the encoder minimum of {minimum}")]
    SequenceTooShort { length: usize, minimum: usize },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}
