//! Domain types for Signalab

pub mod bar;
pub mod label;

pub use bar::{sort_and_dedup, Bar};
pub use label::Label;

/// Symbol type alias
pub type Symbol = String;
