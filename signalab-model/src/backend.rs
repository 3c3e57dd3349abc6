//! Burn backends: CPU ndarray for inference, wrapped in autodiff for training.

use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};

pub type InferenceBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<InferenceBackend>;

pub fn device() -> NdArrayDevice {
    NdArrayDevice::default()
}
