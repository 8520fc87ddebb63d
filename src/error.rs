//! Primary error type used by the library.
//!
//! Every fallible operation in `carbon` returns `Result<T, CarbonError>`.
//! The variants correspond one-to-one with the closed error-kind set of
//! the wire format specification; reaching a container's end marker is
//! *not* one of them — that is reported through an explicit `bool`/`Option`
//! return, never through `Err`.

use thiserror::Error;

/// Errors produced while reading, writing or revising a [`crate::Record`].
///
/// Variants are grouped, in doc comments, by whether the affected record
/// can be retried after the error (`Outdated`, `Oom`, `NotFound`) or is
/// permanently unusable (`Corrupted`, `BadType`, `TypeMismatch`,
/// `InternalError`).
#[derive(Debug, Error)]
pub enum CarbonError {
    /// A required pointer/offset was unexpectedly absent.
    #[error("null pointer")]
    NullPtr,

    /// The buffer could not grow past its configured maximum size.
    ///
    /// Locally recoverable: shrink the record (or raise `max_size`) and retry.
    #[error("out of memory: buffer would exceed max_size ({max_size} bytes)")]
    Oom {
        /// The configured ceiling that was hit.
        max_size: usize,
    },

    /// A read was attempted past the end of the buffer.
    #[error("read out of bounds at offset {offset} (buffer len {len})")]
    OutOfBounds {
        /// Offset that was read.
        offset: usize,
        /// Length of the buffer at the time of the read.
        len: usize,
    },

    /// A dot-path or key lookup found nothing. Not fatal — a normal miss.
    #[error("not found: {0}")]
    NotFound(String),

    /// The field under the cursor does not have the marker the caller
    /// expected (e.g. calling `as_i64` on a string field).
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the caller expected.
        expected: &'static str,
        /// What was actually under the cursor.
        found: &'static str,
    },

    /// A marker byte does not belong to the closed marker set.
    #[error("bad type: unrecognized marker byte 0x{marker:02x}")]
    BadType {
        /// The offending byte.
        marker: u8,
    },

    /// The buffer violates a structural invariant (missing end marker,
    /// non-zero/non-end byte between the last element and the end marker,
    /// column payload shorter than `capacity * element_size`, ...).
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// A revision was attempted on a [`crate::Record`] that is no longer
    /// `is_latest` (a newer revision has already superseded it).
    ///
    /// Locally recoverable: re-fetch the latest record and retry.
    #[error("record is outdated, a newer revision already exists")]
    Outdated,

    /// A dot-path string failed to parse.
    #[error("dot-path parse error: {0}")]
    DotPathParseError(String),

    /// The operation is not supported for the field's type (e.g. inserting
    /// a container marker into a column).
    #[error("unsupported type for this operation: {0}")]
    UnsupportedType(String),

    /// An invariant the implementation itself is responsible for
    /// maintaining was violated. Always a bug, never a user error.
    #[error("internal error: {0}")]
    InternalError(String),

    /// The operation is not legal in the current state (e.g. revising a
    /// record whose `commit_lock` is already held, or changing a key's
    /// kind through `key_set_*`).
    #[error("illegal operation: {0}")]
    IllegalOp(String),
}

impl CarbonError {
    /// `true` for errors that are permanently fatal to the affected record —
    /// callers should not retry these, only discard the record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CarbonError::Corrupted(_)
                | CarbonError::BadType { .. }
                | CarbonError::TypeMismatch { .. }
                | CarbonError::InternalError(_)
        )
    }
}
