//! Error types for the autosave core
//!
//! Exactly one failure kind reaches a saver: the write failed. It is kept in
//! the saver snapshot and never returned to the caller that bound the field.
//! The remaining types cover path parsing, configuration and the image
//! upload pipeline.

/// Failure reported by a [`PersistenceAdapter`](crate::PersistenceAdapter)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Backend could not be reached
    #[error("content store unavailable: {0}")]
    Unavailable(String),

    /// Caller is not allowed to write the document
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Target document does not exist
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Path traverses a value that is not an object
    #[error("invalid field path: {0}")]
    InvalidPath(String),

    /// Anything else the backend rejected
    #[error("write rejected: {0}")]
    Rejected(String),
}

impl AdapterError {
    /// Whether a manual retry can reasonably succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Rejected(_))
    }
}

/// Write failure retained by a saver in the `error` state
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// The persistence adapter rejected the write
    #[error("write failed: {0}")]
    Adapter(#[from] AdapterError),

    /// The value could not be encoded as a document value
    #[error("value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    /// The array element owned by the saver no longer exists
    #[error("array item {index} no longer exists (length {len})")]
    ItemRemoved { index: usize, len: usize },

    /// A sub-key was set on an array element that is not an object
    #[error("array item {index} is not an object")]
    NotAnObject { index: usize },
}

impl SaveError {
    /// Whether the failure came from the backend rather than local state
    #[inline]
    #[must_use]
    pub fn is_adapter_failure(&self) -> bool {
        matches!(self, Self::Adapter(_))
    }
}

/// Field path parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path string was empty
    #[error("field path is empty")]
    Empty,

    /// A dotted segment was empty (`a..b`, `.a`, `a.`)
    #[error("field path `{0}` has an empty segment")]
    EmptySegment(String),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A duration was configured as zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Image pipeline errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Operation is not valid in the current pipeline state
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    /// Nothing has been selected or edited yet
    #[error("no {0} image to upload")]
    NothingToUpload(&'static str),

    /// Edited image payload could not be decoded
    #[error("edited image is not valid base64: {0}")]
    Decode(String),

    /// Image store rejected the upload
    #[error("upload failed: {0}")]
    Upload(String),
}
