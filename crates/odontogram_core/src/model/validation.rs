//! Input validation errors shared by model constructors and services.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected input, detected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tooth code is not a valid FDI two-digit code.
    InvalidToothCode(String),
    /// Surface name is outside the closed surface enumeration.
    UnknownSurface(String),
    /// Descriptor has an empty catalog key.
    BlankCatalogKey,
    /// Attribute map contains an empty key.
    BlankAttributeKey,
    /// Priority override outside `1..=5`.
    PriorityOutOfRange(i64),
    /// Batch operation received no ids.
    EmptyBatch,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToothCode(value) => write!(f, "invalid FDI tooth code `{value}`"),
            Self::UnknownSurface(value) => write!(f, "unknown surface `{value}`"),
            Self::BlankCatalogKey => write!(f, "catalog key must not be blank"),
            Self::BlankAttributeKey => write!(f, "attribute keys must not be blank"),
            Self::PriorityOutOfRange(value) => {
                write!(f, "priority override {value} is outside 1..=5")
            }
            Self::EmptyBatch => write!(f, "batch must contain at least one id"),
        }
    }
}

impl Error for ValidationError {}
