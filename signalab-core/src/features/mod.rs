//! Feature/label building and scaling.
//!
//! Bars + indicator set → aligned, gap-free (features, labels) rows.

pub mod builder;
pub mod field;
pub mod labels;
pub mod scaler;

pub use builder::{FeatureBuilder, FeatureDataset};
pub use field::FeatureField;
pub use labels::LabelRule;
pub use scaler::{ScalerError, StandardScaler};
