//! Error types for the stage proxy library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for stage proxy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Layer file does not exist or cannot be accessed
    #[error("Layer not found: {0}")]
    LayerNotFound(PathBuf),

    /// Layer file exists but its contents could not be parsed
    #[error("Failed to parse layer '{identifier}': {source}")]
    LayerParse {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },

    /// Anonymous layers have no backing file
    #[error("Layer '{0}' is anonymous and cannot be saved")]
    AnonymousLayerSave(String),

    /// Text is not a valid absolute scene path
    #[error("Invalid scene path: '{0}'")]
    InvalidPath(String),

    /// No prim exists at the given path on the composed stage
    #[error("Prim not found: {0}")]
    PrimNotFound(String),

    /// The layer is not part of the stage's layer stack
    #[error("Layer '{0}' is not in the stage's layer stack")]
    LayerNotInStack(String),

    /// Stage handle is missing or expired
    #[error("Stage is invalid")]
    StageInvalid,

    /// Attribute is locked on the node
    #[error("Attribute '{0}' is locked")]
    AttributeLocked(&'static str),

    /// Property descriptor is null or otherwise unusable
    #[error("Invalid property descriptor: {0}")]
    InvalidPropertyDescriptor(String),

    /// Value text does not parse as the requested type
    #[error("Cannot parse '{text}' as {value_type}")]
    ValueParse { text: String, value_type: String },

    /// Compute was entered again on a node that is already computing
    #[error("Re-entrant compute on node '{0}'")]
    ReentrantCompute(String),

    /// Host node does not exist
    #[error("Host node {0} not found")]
    NodeNotFound(u64),

    /// Reparenting would create a cycle in the host graph
    #[error("Cannot parent node {child} under its descendant {parent}")]
    CyclicParent { child: u64, parent: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid path error.
    pub fn invalid_path(text: impl Into<String>) -> Self {
        Self::InvalidPath(text.into())
    }
}

/// Result type alias for stage proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::StageInvalid;
        assert!(e.to_string().contains("invalid"));

        let e = Error::CyclicParent { child: 5, parent: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
