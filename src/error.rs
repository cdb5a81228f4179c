//! Central error handling for mapstyle
//!
//! Provides the style-level `StyleError` enum used when loading layers and
//! compiling their properties, plus the placement invariant errors.

use crate::style::expression::ParseError;

/// Centralized error type for style loading and property compilation
#[derive(thiserror::Error, Debug)]
pub enum StyleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid style: {0}")]
    Invalid(String),

    #[error("Unknown property \"{0}\"")]
    UnknownProperty(String),

    #[error("{property}: {}", join_errors(.errors))]
    Expression {
        property: String,
        errors: Vec<ParseError>,
    },
}

impl StyleError {
    /// Convenience constructor for invalid-style errors
    pub fn invalid<T: ToString>(msg: T) -> Self {
        StyleError::Invalid(msg.to_string())
    }

    /// Wrap expression compile errors for a named property
    pub fn expression<T: ToString>(property: T, errors: Vec<ParseError>) -> Self {
        StyleError::Expression {
            property: property.to_string(),
            errors,
        }
    }
}

fn join_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Invariant violations detected while placing symbols
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("symbol instance {0} has no cross-tile id")]
    UnassignedCrossTileId(usize),

    #[error("bucket for tile {0} has no bucket instance id")]
    UnassignedBucketId(String),
}

/// Result type alias for style operations
pub type StyleResult<T> = Result<T, StyleError>;
