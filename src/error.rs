//! Crate-wide error type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TseError>;

/// Errors raised by the traversal kernel, its processors, and the metric store.
///
/// Per the error handling design, `IncompleteTraversal` and `UnknownProcessor`
/// are recoverable outcomes: callers that construct them are expected to log
/// and discard rather than propagate them across a processor boundary. The
/// remaining variants represent genuine failures of an operation and are
/// returned from public `Result`-returning APIs.
#[derive(Debug, Error)]
pub enum TseError {
    /// A traversal lacked the previous/following context or sample count
    /// required for interpolation. Normal at the first connection of a
    /// vehicle's life.
    #[error("traversal is incomplete and cannot be interpolated")]
    IncompleteTraversal,

    /// The connection length fell outside the interpolant's domain.
    #[error("connection length {length} m exceeds interpolation range (max offset {max_offset} m)")]
    InterpolationOutOfRange { length: f64, max_offset: f64 },

    /// A metric store operation failed.
    #[error("metric store error: {0}")]
    Storage(String),

    /// I/O failure from a persistent store backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record or row failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Startup configuration was invalid or a required resource was missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tick or message named a processor identifier with no registered handler.
    #[error("unknown processor identifier: {0}")]
    UnknownProcessor(String),
}
