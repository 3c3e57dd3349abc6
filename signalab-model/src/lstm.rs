//! LSTM layer built from two dense projections.
//!
//! Gate pre-activations are fused in (input, forget, cell, output) order:
//! `z_t = x_t · W + h_{t-1} · U + b`. The layer returns every hidden state so
//! layers can be stacked.

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::tensor::{self, NamedTensor, TensorError};

#[derive(Module, Debug)]
pub struct LstmLayer<B: Backend> {
    input: Linear<B>,
    recurrent: Linear<B>,
}

impl<B: Backend> LstmLayer<B> {
    /// Zero-initialised layer; weights are loaded afterwards.
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            input: LinearConfig::new(input_size, 4 * hidden_size)
                .with_initializer(Initializer::Zeros)
                .init(device),
            recurrent: LinearConfig::new(hidden_size, 4 * hidden_size)
                .with_bias(false)
                .with_initializer(Initializer::Zeros)
                .init(device),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.recurrent.weight.val().dims()[0]
    }

    /// `[batch, steps, input]` → `[batch, steps, hidden]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, steps, _] = x.dims();
        let hidden = self.hidden_size();
        let device = x.device();

        let projected = self.input.forward(x);
        let mut h = Tensor::<B, 2>::zeros([batch, hidden], &device);
        let mut c = Tensor::<B, 2>::zeros([batch, hidden], &device);
        let mut outputs = Vec::with_capacity(steps);

        for t in 0..steps {
            let z = projected
                .clone()
                .slice([0..batch, t..t + 1, 0..4 * hidden])
                .reshape([batch, 4 * hidden])
                + self.recurrent.forward(h);

            let i = sigmoid(z.clone().slice([0..batch, 0..hidden]));
            let f = sigmoid(z.clone().slice([0..batch, hidden..2 * hidden]));
            let g = z.clone().slice([0..batch, 2 * hidden..3 * hidden]).tanh();
            let o = sigmoid(z.slice([0..batch, 3 * hidden..4 * hidden]));

            c = f * c + i * g;
            h = o * c.clone().tanh();
            outputs.push(h.clone());
        }

        Tensor::stack(outputs, 1)
    }

    pub(crate) fn tensors(&self, prefix: &str, out: &mut Vec<NamedTensor>) {
        tensor::push(out, format!("{prefix}.input.weight"), &self.input.weight);
        if let Some(bias) = &self.input.bias {
            tensor::push(out, format!("{prefix}.input.bias"), bias);
        }
        tensor::push(out, format!("{prefix}.recurrent.weight"), &self.recurrent.weight);
    }

    pub(crate) fn load_tensors<I: Iterator<Item = NamedTensor>>(
        mut self,
        prefix: &str,
        tensors: &mut I,
    ) -> Result<Self, TensorError> {
        self.input.weight =
            tensor::load_param(tensors, &format!("{prefix}.input.weight"), self.input.weight)?;
        self.input.bias =
            tensor::load_optional(tensors, &format!("{prefix}.input.bias"), self.input.bias)?;
        self.recurrent.weight = tensor::load_param(
            tensors,
            &format!("{prefix}.recurrent.weight"),
            self.recurrent.weight,
        )?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{device, InferenceBackend};
    use burn::tensor::TensorData;

    #[test]
    fn returns_one_state_per_step() {
        let layer = LstmLayer::<InferenceBackend>::new(3, 5, &device());
        assert_eq!(layer.hidden_size(), 5);
        let x = Tensor::<InferenceBackend, 3>::ones([2, 7, 3], &device());
        assert_eq!(layer.forward(x).dims(), [2, 7, 5]);
    }

    #[test]
    fn zero_weights_keep_the_cell_empty() {
        // g = tanh(0) = 0, so c and h stay at zero.
        let layer = LstmLayer::<InferenceBackend>::new(2, 3, &device());
        let x = Tensor::<InferenceBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, -2.0, 0.5, 4.0], [1, 2, 2]),
            &device(),
        );
        let out = layer.forward(x);
        assert!(out.into_data().iter::<f32>().all(|v| v == 0.0));
    }

    #[test]
    fn tensors_are_listed_in_load_order() {
        let layer = LstmLayer::<InferenceBackend>::new(2, 3, &device());
        let mut out = Vec::new();
        layer.tensors("lstm0", &mut out);
        let names: Vec<&str> = out.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["lstm0.input.weight", "lstm0.input.bias", "lstm0.recurrent.weight"]);
        assert_eq!(out[0].shape, vec![2, 12]);
        assert_eq!(out[2].shape, vec![3, 12]);

        let fresh = LstmLayer::<InferenceBackend>::new(2, 3, &device());
        assert!(fresh.load_tensors("lstm0", &mut out.into_iter()).is_ok());
    }
}
