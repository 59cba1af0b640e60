//! Error types for document operations.

use thiserror::Error;

use crate::path::Path;

/// Result type alias for document operations.
pub type DocResult<T> = Result<T, DocError>;

/// Errors raised synchronously by document writes and delta handling.
///
/// Reads never fail: a missing path reads as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocError {
    /// A write targeted a derived document outside its own recomputation.
    ///
    /// Mutate the source document the derived value is computed from instead.
    #[error("cannot mutate derived document at {path}")]
    Mutation {
        /// Path of the attempted write, relative to the document value.
        path: Path,
    },

    /// An array write addressed an index past the end of the array.
    #[error("index {index} out of bounds (len: {len}) at {path}")]
    IndexOutOfBounds {
        /// Path of the array.
        path: Path,
        /// The index that was written.
        index: usize,
        /// Length of the array at the time of the write.
        len: usize,
    },

    /// A write addressed a property of a value that is neither object nor array.
    #[error("value at {path} is not an object or array")]
    NotAContainer {
        /// Path of the scalar value.
        path: Path,
    },

    /// A write addressed an array with a key that is not an index.
    #[error("key {key:?} is not an array index at {path}")]
    InvalidKey {
        /// Path of the array.
        path: Path,
        /// The offending key.
        key: String,
    },

    /// A delta does not fit the shape of the value it is applied to.
    #[error("delta does not match target at {path}")]
    PatchMismatch {
        /// Path where the delta and target diverged.
        path: Path,
    },

    /// A JSON value could not be read as a delta.
    #[error("invalid delta: {message}")]
    InvalidDelta {
        /// Description of what went wrong.
        message: String,
    },
}

impl DocError {
    /// Create a mutation error.
    #[inline]
    pub fn mutation(path: Path) -> Self {
        DocError::Mutation { path }
    }

    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        DocError::IndexOutOfBounds { path, index, len }
    }

    /// Create a not-a-container error.
    #[inline]
    pub fn not_a_container(path: Path) -> Self {
        DocError::NotAContainer { path }
    }

    /// Create an invalid key error.
    #[inline]
    pub fn invalid_key(path: Path, key: impl Into<String>) -> Self {
        DocError::InvalidKey {
            path,
            key: key.into(),
        }
    }

    /// Create a patch mismatch error.
    #[inline]
    pub fn patch_mismatch(path: Path) -> Self {
        DocError::PatchMismatch { path }
    }

    /// Create an invalid delta error.
    #[inline]
    pub fn invalid_delta(message: impl Into<String>) -> Self {
        DocError::InvalidDelta {
            message: message.into(),
        }
    }

    /// Returns true if this is a [`DocError::Mutation`].
    pub fn is_mutation(&self) -> bool {
        matches!(self, DocError::Mutation { .. })
    }

    /// Prepend `prefix` to the path carried by this error.
    ///
    /// Used when a failure deep inside a patch is reported against the
    /// document rather than the sub-value that was being patched.
    pub fn with_prefix(self, prefix: &Path) -> Self {
        match self {
            DocError::Mutation { path } => DocError::Mutation {
                path: prefix.join(&path),
            },
            DocError::IndexOutOfBounds { path, index, len } => DocError::IndexOutOfBounds {
                path: prefix.join(&path),
                index,
                len,
            },
            DocError::NotAContainer { path } => DocError::NotAContainer {
                path: prefix.join(&path),
            },
            DocError::InvalidKey { path, key } => DocError::InvalidKey {
                path: prefix.join(&path),
                key,
            },
            DocError::PatchMismatch { path } => DocError::PatchMismatch {
                path: prefix.join(&path),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = DocError::mutation(path!("b", "c"));
        assert_eq!(err.to_string(), "cannot mutate derived document at b.c");
        assert!(err.is_mutation());

        let err = DocError::index_out_of_bounds(path!("items"), 5, 2);
        assert_eq!(err.to_string(), "index 5 out of bounds (len: 2) at items");
    }

    #[test]
    fn test_with_prefix() {
        let err = DocError::patch_mismatch(path!(0, "name")).with_prefix(&path!("users"));
        assert_eq!(
            err,
            DocError::PatchMismatch {
                path: path!("users", 0, "name")
            }
        );

        let err = DocError::invalid_delta("bad").with_prefix(&path!("users"));
        assert!(matches!(err, DocError::InvalidDelta { .. }));
    }
}
