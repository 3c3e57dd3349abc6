//! Three-class trading label.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Action label derived from the forward return of a step.
///
/// The discriminants are the class indices fed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Label {
    Sell = 0,
    Hold = 1,
    Buy = 2,
}

impl Label {
    /// Number of classes.
    pub const COUNT: usize = 3;

    pub const ALL: [Label; 3] = [Label::Sell, Label::Hold, Label::Buy];

    /// Class index in `0..Label::COUNT`.
    pub fn class_index(self) -> usize {
        self as usize
    }

    pub fn from_class_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Sell),
            1 => Some(Label::Hold),
            2 => Some(Label::Buy),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Label::Sell => "sell",
            Label::Hold => "hold",
            Label::Buy => "buy",
        };
        f.write_str(name)
    }
}
