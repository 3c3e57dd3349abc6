//! Feature/label builder.
//!
//! A bar becomes a row only if every selected field is defined AND it has a
//! label. This is a filter, not an interpolation: rows are never
//! synthesized, and empty input gives an empty dataset.

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FeatureField, LabelRule};
use crate::domain::{Bar, Label};
use crate::indicators::IndicatorSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBuilder {
    pub fields: Vec<FeatureField>,
    pub label_rule: LabelRule,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self {
            fields: FeatureField::REFERENCE.to_vec(),
            label_rule: LabelRule::default(),
        }
    }
}

impl FeatureBuilder {
    pub fn new(fields: Vec<FeatureField>, label_rule: LabelRule) -> Self {
        Self { fields, label_rule }
    }

    /// Width of every emitted feature vector.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Feature vector for one bar, or `None` if any field is missing.
    pub fn row(&self, bars: &[Bar], indicators: &IndicatorSet, index: usize) -> Option<Vec<f64>> {
        self.fields
            .iter()
            .map(|field| field.value(bars, indicators, index))
            .collect()
    }

    /// Build the aligned (features, labels) dataset.
    pub fn build(&self, bars: &[Bar], indicators: &IndicatorSet) -> FeatureDataset {
        let labels = self.label_rule.labels(bars);
        let n = bars.len().min(indicators.len());

        let mut flat = Vec::new();
        let mut kept_labels = Vec::new();
        let mut bar_indices = Vec::new();

        for (i, label) in labels.iter().enumerate().take(n) {
            let Some(label) = label else { continue };
            let Some(row) = self.row(bars, indicators, i) else {
                continue;
            };
            flat.extend(row);
            kept_labels.push(*label);
            bar_indices.push(i);
        }

        let mut features = Array2::zeros((kept_labels.len(), self.width()));
        for (dst, src) in features.iter_mut().zip(flat) {
            *dst = src;
        }

        debug!(
            bars = bars.len(),
            rows = kept_labels.len(),
            width = self.width(),
            "built feature dataset"
        );

        FeatureDataset {
            fields: self.fields.clone(),
            features,
            labels: kept_labels,
            bar_indices,
        }
    }
}

/// Aligned feature rows and labels. Row i of `features` pairs with `labels[i]`.
#[derive(Debug, Clone)]
pub struct FeatureDataset {
    pub fields: Vec<FeatureField>,
    /// rows × fields
    pub features: Array2<f64>,
    pub labels: Vec<Label>,
    /// Source bar index of each row.
    pub bar_indices: Vec<usize>,
}

impl FeatureDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.index_axis(Axis(0), index)
    }

    /// True if any feature value is NaN or infinite.
    pub fn has_missing(&self) -> bool {
        self.features.iter().any(|v| !v.is_finite())
    }

    /// Row counts per class, indexed by `Label::class_index`.
    pub fn label_counts(&self) -> [usize; Label::COUNT] {
        let mut counts = [0; Label::COUNT];
        for label in &self.labels {
            counts[label.class_index()] += 1;
        }
        counts
    }

    /// Replace the feature matrix (e.g. with its scaled version).
    pub fn with_features(mut self, features: Array2<f64>) -> Self {
        self.features = features;
        self
    }
}
