//! Property tests for weight and input quantization.

use proptest::prelude::*;
use signalab_model::export::{InputQuantization, QuantizedTensor, QuantizedValues};
use signalab_model::{NamedTensor, Precision};

fn tensor(values: Vec<f64>) -> NamedTensor {
    NamedTensor {
        name: "w".into(),
        shape: vec![values.len()],
        values,
    }
}

proptest! {
    #[test]
    fn int8_error_bounded_by_half_step(values in prop::collection::vec(-10.0f64..10.0, 1..64)) {
        let max_abs = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let t = tensor(values);
        let back = QuantizedTensor::quantize(&t, Precision::DynamicInt8).dequantize();
        let step = if max_abs > 0.0 { max_abs / 127.0 } else { 1.0 };
        for (a, b) in t.values.iter().zip(&back.values) {
            prop_assert!((a - b).abs() <= step / 2.0 + 1e-5 * step.max(1.0));
        }
    }

    #[test]
    fn f16_relative_error_is_small(values in prop::collection::vec(-100.0f64..100.0, 1..64)) {
        let t = tensor(values);
        let back = QuantizedTensor::quantize(&t, Precision::Float16).dequantize();
        for (a, b) in t.values.iter().zip(&back.values) {
            prop_assert!((a - b).abs() <= a.abs() * 1e-3 + 1e-4);
        }
    }

    #[test]
    fn quantization_keeps_names_and_shapes(values in prop::collection::vec(-1.0f64..1.0, 0..32)) {
        let t = tensor(values);
        for precision in [Precision::Float32, Precision::Float16, Precision::DynamicInt8] {
            let back = QuantizedTensor::quantize(&t, precision).dequantize();
            prop_assert_eq!(&back.name, &t.name);
            prop_assert_eq!(&back.shape, &t.shape);
            prop_assert_eq!(back.values.len(), t.values.len());
        }
    }

    #[test]
    fn input_quantization_error_within_one_step(
        lo in -50.0f64..0.0,
        span in 0.1f64..100.0,
        frac in 0.0f64..1.0,
    ) {
        let hi = lo + span;
        let q = InputQuantization::from_range(lo, hi);
        let x = lo + frac * span;
        let back = q.dequantize(q.quantize(x));
        prop_assert!((back - x).abs() <= f64::from(q.scale) * 1.01);
    }

    #[test]
    fn int8_uses_the_full_symmetric_range(values in prop::collection::vec(-5.0f64..5.0, 1..64)) {
        let max_abs = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        prop_assume!(max_abs > 0.0);
        match QuantizedTensor::quantize(&tensor(values), Precision::FullInt8).values {
            QuantizedValues::Int8 { values, .. } => {
                prop_assert!(values.iter().all(|q| (-127..=127).contains(q)));
                prop_assert_eq!(values.iter().map(|q| q.unsigned_abs()).max(), Some(127));
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
