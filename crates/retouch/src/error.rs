use serde::Serialize;
use strum::Display;
use thiserror::Error;

/// What went wrong while an operation was running against an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingErrorKind {
    /// The operation addressed pixels outside the image.
    OutOfBounds,
    /// The operation would produce (or was given) an empty image.
    InvalidDimensions,
    /// The operation panicked on a worker thread.
    Panicked,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetouchError {
    #[error("Invalid parameters for '{operation}': {message}")]
    Validation {
        operation: String,
        parameter: Option<String>,
        message: String,
    },

    #[error("'{operation}' failed ({kind}): {message}")]
    Processing {
        operation: String,
        kind: ProcessingErrorKind,
        message: String,
    },

    #[error("Operation '{operation}' is not supported yet")]
    UnsupportedOperation { operation: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl RetouchError {
    pub(crate) fn validation(
        operation: impl Into<String>,
        parameter: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            operation: operation.into(),
            parameter: parameter.map(str::to_string),
            message: message.into(),
        }
    }

    pub(crate) fn processing(
        operation: impl Into<String>,
        kind: ProcessingErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Processing {
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }

    /// The operation tag or name the error refers to, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Validation { operation, .. }
            | Self::Processing { operation, .. }
            | Self::UnsupportedOperation { operation } => Some(operation),
            Self::IllegalState(_) => None,
        }
    }

    /// The offending parameter name for validation failures.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::Validation { parameter, .. } => parameter.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RetouchError>;
