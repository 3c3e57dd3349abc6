//! The trainable network.
//!
//! - LSTM: stacked [`LstmLayer`]s, each followed by dropout; the last hidden
//!   state feeds Dense(head, ReLU) → Dense(3).
//! - CNN: Conv1D(valid, ReLU) → MaxPool(2) per block, flattened time-major,
//!   then Dense(head, ReLU) → Dropout → Dense(3).
//!
//! The network outputs logits. Input is `[batch, steps, features]`.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{MaxPool1d, MaxPool1dConfig};
use burn::nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig1d, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classifier::ModelSpec;
use crate::config::ModelKind;
use crate::lstm::LstmLayer;
use crate::tensor::{self, NamedTensor, TensorError};
use crate::TrainError;
use signalab_core::Label;

#[derive(Module, Debug)]
pub struct SequenceNet<B: Backend> {
    recurrent: Vec<LstmLayer<B>>,
    convolutions: Vec<Conv1d<B>>,
    pool: MaxPool1d,
    hidden: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

/// Shortest sequence that leaves at least one step after every conv block.
pub fn minimum_cnn_length(blocks: usize, kernel: usize) -> usize {
    (0..blocks).fold(1, |m, _| m * 2 + kernel.saturating_sub(1))
}

fn cnn_output_steps(length: usize, blocks: usize, kernel: usize) -> usize {
    (0..blocks).fold(length, |t, _| (t + 1).saturating_sub(kernel) / 2)
}

impl<B: Backend> SequenceNet<B> {
    /// Zero-initialised network for `spec`.
    pub fn new(spec: &ModelSpec, device: &B::Device) -> Result<Self, TrainError> {
        let minimum = match spec.kind {
            ModelKind::Lstm => 1,
            ModelKind::Cnn => minimum_cnn_length(spec.conv_filters.len(), spec.kernel_size),
        };
        if spec.sequence_length < minimum {
            return Err(TrainError::SequenceTooShort {
                length: spec.sequence_length,
                minimum,
            });
        }

        let mut recurrent = Vec::new();
        let mut convolutions = Vec::new();
        let mut width = spec.feature_count;
        match spec.kind {
            ModelKind::Lstm => {
                for &units in &spec.lstm_units {
                    recurrent.push(LstmLayer::new(width, units, device));
                    width = units;
                }
            }
            ModelKind::Cnn => {
                for &filters in &spec.conv_filters {
                    convolutions.push(
                        Conv1dConfig::new(width, filters, spec.kernel_size)
                            .with_padding(PaddingConfig1d::Valid)
                            .with_initializer(Initializer::Zeros)
                            .init(device),
                    );
                    width = filters;
                }
                width *= cnn_output_steps(
                    spec.sequence_length,
                    spec.conv_filters.len(),
                    spec.kernel_size,
                );
            }
        }

        Ok(Self {
            recurrent,
            convolutions,
            pool: MaxPool1dConfig::new(2).with_stride(2).init(),
            hidden: LinearConfig::new(width, spec.head_units)
                .with_initializer(Initializer::Zeros)
                .init(device),
            output: LinearConfig::new(spec.head_units, Label::COUNT)
                .with_initializer(Initializer::Zeros)
                .init(device),
            dropout: DropoutConfig::new(spec.dropout).init(),
            activation: Relu::new(),
        })
    }

    /// Network with Glorot-uniform weights drawn from `spec.seed`. Biases
    /// start at zero except the LSTM forget gate, which starts at one.
    pub fn seeded(spec: &ModelSpec, device: &B::Device) -> Result<Self, TrainError> {
        let net = Self::new(spec, device)?;
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let initial = net
            .tensors()
            .into_iter()
            .map(|mut t| {
                if t.shape.len() > 1 {
                    t.values = tensor::glorot_uniform(&t.shape, &mut rng);
                } else if t.name.ends_with(".input.bias") {
                    let hidden = t.values.len() / 4;
                    t.values[hidden..2 * hidden].fill(1.0);
                }
                t
            })
            .collect();
        Ok(net.load_tensors(initial)?)
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let is_cnn = !self.convolutions.is_empty();
        let encoded = if is_cnn {
            self.encode_cnn(x)
        } else {
            self.encode_lstm(x)
        };

        let hidden = self.activation.forward(self.hidden.forward(encoded));
        let hidden = if is_cnn {
            self.dropout.forward(hidden)
        } else {
            hidden
        };
        self.output.forward(hidden)
    }

    fn encode_lstm(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let mut states = x;
        for layer in &self.recurrent {
            states = self.dropout.forward(layer.forward(states));
        }
        let [batch, steps, width] = states.dims();
        states
            .slice([0..batch, steps - 1..steps, 0..width])
            .reshape([batch, width])
    }

    fn encode_cnn(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        // Conv1d wants [batch, channels, steps].
        let mut x = x.swap_dims(1, 2);
        for conv in &self.convolutions {
            x = self.pool.forward(self.activation.forward(conv.forward(x)));
        }
        x.swap_dims(1, 2).flatten(1, 2)
    }

    /// All parameters in a fixed order: encoder layers, then the head.
    pub fn tensors(&self) -> Vec<NamedTensor> {
        let mut out = Vec::new();
        for (i, layer) in self.recurrent.iter().enumerate() {
            layer.tensors(&format!("lstm{i}"), &mut out);
        }
        for (i, conv) in self.convolutions.iter().enumerate() {
            tensor::push(&mut out, format!("conv{i}.weight"), &conv.weight);
            if let Some(bias) = &conv.bias {
                tensor::push(&mut out, format!("conv{i}.bias"), bias);
            }
        }
        linear_tensors("hidden", &self.hidden, &mut out);
        linear_tensors("output", &self.output, &mut out);
        out
    }

    /// Replace every parameter, in [`SequenceNet::tensors`] order.
    pub fn load_tensors(mut self, tensors: Vec<NamedTensor>) -> Result<Self, TensorError> {
        let mut iter = tensors.into_iter();

        self.recurrent = self
            .recurrent
            .into_iter()
            .enumerate()
            .map(|(i, layer)| layer.load_tensors(&format!("lstm{i}"), &mut iter))
            .collect::<Result<_, _>>()?;

        self.convolutions = self
            .convolutions
            .into_iter()
            .enumerate()
            .map(|(i, mut conv)| {
                conv.weight =
                    tensor::load_param(&mut iter, &format!("conv{i}.weight"), conv.weight)?;
                conv.bias = tensor::load_optional(&mut iter, &format!("conv{i}.bias"), conv.bias)?;
                Ok(conv)
            })
            .collect::<Result<_, TensorError>>()?;

        self.hidden = load_linear(&mut iter, "hidden", self.hidden)?;
        self.output = load_linear(&mut iter, "output", self.output)?;

        match iter.count() {
            0 => Ok(self),
            extra => Err(TensorError::Trailing(extra)),
        }
    }
}

fn linear_tensors<B: Backend>(prefix: &str, linear: &Linear<B>, out: &mut Vec<NamedTensor>) {
    tensor::push(out, format!("{prefix}.weight"), &linear.weight);
    if let Some(bias) = &linear.bias {
        tensor::push(out, format!("{prefix}.bias"), bias);
    }
}

fn load_linear<B: Backend, I: Iterator<Item = NamedTensor>>(
    tensors: &mut I,
    prefix: &str,
    mut linear: Linear<B>,
) -> Result<Linear<B>, TensorError> {
    linear.weight = tensor::load_param(tensors, &format!("{prefix}.weight"), linear.weight)?;
    linear.bias = tensor::load_optional(tensors, &format!("{prefix}.bias"), linear.bias)?;
    Ok(linear)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{device, InferenceBackend};

    type Net = SequenceNet<InferenceBackend>;

    fn spec(kind: ModelKind, sequence_length: usize) -> ModelSpec {
        ModelSpec {
            kind,
            sequence_length,
            feature_count: 17,
            lstm_units: vec![16, 8],
            conv_filters: vec![64, 32],
            kernel_size: 3,
            head_units: 8,
            dropout: 0.2,
            seed: 7,
        }
    }

    #[test]
    fn cnn_reference_shapes() {
        let net = Net::seeded(&spec(ModelKind::Cnn, 60), &device()).unwrap();
        // 60 → conv 58 → pool 29 → conv 27 → pool 13; 13 × 32 = 416
        let tensors = net.tensors();
        let hidden = tensors.iter().find(|t| t.name == "hidden.weight").unwrap();
        assert_eq!(hidden.shape, vec![416, 8]);

        let x = Tensor::<InferenceBackend, 3>::ones([3, 60, 17], &device());
        assert_eq!(net.forward(x).dims(), [3, 3]);
    }

    #[test]
    fn lstm_forward_gives_logits_per_sample() {
        let net = Net::seeded(&spec(ModelKind::Lstm, 12), &device()).unwrap();
        let x = Tensor::<InferenceBackend, 3>::ones([4, 12, 17], &device());
        assert_eq!(net.forward(x).dims(), [4, 3]);
    }

    #[test]
    fn too_short_sequence_is_rejected() {
        assert_eq!(minimum_cnn_length(2, 3), 10);
        assert!(matches!(
            Net::new(&spec(ModelKind::Cnn, 9), &device()),
            Err(TrainError::SequenceTooShort { length: 9, minimum: 10 })
        ));
        assert!(Net::new(&spec(ModelKind::Cnn, 10), &device()).is_ok());
        assert!(matches!(
            Net::new(&spec(ModelKind::Lstm, 0), &device()),
            Err(TrainError::SequenceTooShort { length: 0, minimum: 1 })
        ));
    }

    #[test]
    fn seeded_weights_depend_only_on_seed() {
        let a = Net::seeded(&spec(ModelKind::Lstm, 5), &device()).unwrap();
        let b = Net::seeded(&spec(ModelKind::Lstm, 5), &device()).unwrap();
        assert_eq!(a.tensors(), b.tensors());

        let other = ModelSpec {
            seed: 8,
            ..spec(ModelKind::Lstm, 5)
        };
        let c = Net::seeded(&other, &device()).unwrap();
        assert_ne!(a.tensors(), c.tensors());

        let bias = a
            .tensors()
            .into_iter()
            .find(|t| t.name == "lstm0.input.bias")
            .unwrap();
        assert!(bias.values[16..32].iter().all(|v| *v == 1.0));
        assert!(bias.values[..16].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn load_rejects_trailing_tensors() {
        let source = Net::seeded(&spec(ModelKind::Cnn, 20), &device()).unwrap();
        let mut extra = source.tensors();
        extra.push(extra[0].clone());
        let target = Net::new(&spec(ModelKind::Cnn, 20), &device()).unwrap();
        assert!(matches!(target.load_tensors(extra), Err(TensorError::Trailing(1))));
    }
}
