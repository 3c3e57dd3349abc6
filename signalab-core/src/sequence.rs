//! Sequence windower.
//!
//! Slides a fixed-length window over the aligned feature/label rows.
//! Sequence k spans rows `[k, k + L)` and carries `labels[k + L - 1]`.
//! Windows run over positions in the filtered dataset, so gaps left by
//! dropped bars are never bridged by a special case.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use tracing::debug;

use crate::domain::Label;

/// Sequences (count × length × features) with one label each.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    pub sequences: Array3<f64>,
    pub labels: Vec<Label>,
}

impl SequenceDataset {
    /// Build `M - L` windows from `M` aligned rows. `M <= L` gives an empty set.
    pub fn window(features: &Array2<f64>, labels: &[Label], length: usize) -> Self {
        let rows = features.nrows().min(labels.len());
        let width = features.ncols();
        let count = if length == 0 { 0 } else { rows.saturating_sub(length) };

        let mut sequences = Array3::zeros((count, length, width));
        let mut out_labels = Vec::with_capacity(count);
        for k in 0..count {
            sequences
                .index_axis_mut(Axis(0), k)
                .assign(&features.slice(s![k..k + length, ..]));
            out_labels.push(labels[k + length - 1]);
        }

        debug!(rows, length, count, "windowed sequences");
        Self {
            sequences,
            labels: out_labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.sequences.dim().1
    }

    pub fn feature_count(&self) -> usize {
        self.sequences.dim().2
    }

    pub fn sequence(&self, index: usize) -> ArrayView2<'_, f64> {
        self.sequences.index_axis(Axis(0), index)
    }

    /// Labels as class ids in {0, 1, 2}.
    pub fn label_ids(&self) -> Vec<u8> {
        self.labels.iter().map(|l| *l as u8).collect()
    }

    /// Positional split: the trailing `ceil(len * test_fraction)` sequences
    /// become the test set. No shuffling.
    pub fn split_chronological(&self, test_fraction: f64) -> (SequenceDataset, SequenceDataset) {
        let n = self.len();
        let fraction = test_fraction.clamp(0.0, 1.0);
        let test_len = ((n as f64) * fraction).ceil() as usize;
        let train_len = n - test_len.min(n);
        (self.range(0, train_len), self.range(train_len, n))
    }

    fn range(&self, start: usize, end: usize) -> SequenceDataset {
        SequenceDataset {
            sequences: self.sequences.slice(s![start..end, .., ..]).to_owned(),
            labels: self.labels[start..end].to_vec(),
        }
    }
}
