//! Engine error taxonomy.

use std::fmt;

/// Errors surfaced synchronously by the simulation core.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Empty or malformed dataset where time bounds are required.
    InvalidInput { reason: String },
    /// Rejected configuration value, raised before the clock starts.
    Configuration { field: &'static str, reason: String },
}

impl SimError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "invalid input: {}", reason),
            Self::Configuration { field, reason } => {
                write!(f, "invalid configuration for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SimError {}

pub type Result<T> = std::result::Result<T, SimError>;
