//! Error types for the core data model.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building plans or converting archive values.
#[derive(Error, Debug)]
pub enum Error {
    /// A range was constructed with `from` above `to`.
    #[error("invalid block range: from {from} is above to {to}")]
    InvalidRange {
        /// First block of the range.
        from: i64,
        /// Last block of the range.
        to: i64,
    },

    /// A hex quantity could not be parsed into an integer.
    #[error("invalid hex quantity '{value}'")]
    InvalidQuantity {
        /// The offending string as received from the archive.
        value: String,
    },
}
