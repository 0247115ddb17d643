//! Error types for tirea-store operations.

use crate::{Path, Value};
use thiserror::Error;

/// Result type alias for tirea-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading, writing or observing a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any `get`/`set`/`subscribe` on a destroyed store or on a scope derived from one.
    #[error("can't {operation} a destroyed store")]
    DestroyedStoreAccess {
        /// The rejected operation.
        operation: &'static str,
    },

    /// `set` called with the current state itself while strict equality is disabled.
    #[error("store should never be set to its own state")]
    SelfAssignmentViolation,

    /// A property write targeted a value that cannot hold properties.
    #[error("can't set property `{key}` on {found} value at {path}")]
    InvalidScopeTarget {
        /// Path of the value that was written into.
        path: Path,
        /// The property that was written.
        key: String,
        /// Type name of the value found at `path`.
        found: &'static str,
    },

    /// An array write landed too far past the end of the array.
    #[error("can't write index {index} of array of length {len} at {path}")]
    IndexOutOfRange {
        /// Path of the array that was written into.
        path: Path,
        /// The index that was written.
        index: usize,
        /// Length of the array before the write.
        len: usize,
    },

    /// `produce`/`mutate` invoked on something other than an object or array.
    #[error("{context}: state must be a plain object or an array, found {found}")]
    NotDraftable {
        /// The operation that rejected the value.
        context: &'static str,
        /// Type name of the rejected value.
        found: &'static str,
    },

    /// A producer recipe returned a draft instead of nothing or a new value.
    #[error("produce: recipe must not return a draft object")]
    DraftReturned,

    /// Malformed configuration.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// Description of what is wrong.
        message: String,
    },

    /// Any call on a history after it was destroyed.
    #[error("can't call `{operation}` on a destroyed history")]
    HistoryDestroyed {
        /// The rejected operation.
        operation: &'static str,
    },

    /// Attempt to modify a frozen container.
    #[error("can't modify a frozen {found}")]
    FrozenValue {
        /// Type name of the frozen container.
        found: &'static str,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a destroyed store access error.
    #[inline]
    pub fn destroyed(operation: &'static str) -> Self {
        StoreError::DestroyedStoreAccess { operation }
    }

    /// Create an invalid scope target error.
    #[inline]
    pub fn invalid_scope_target(path: Path, key: impl Into<String>, found: &Value) -> Self {
        StoreError::InvalidScopeTarget {
            path,
            key: key.into(),
            found: value_type_name(found),
        }
    }

    /// Create an index out of range error.
    #[inline]
    pub fn index_out_of_range(path: Path, index: usize, len: usize) -> Self {
        StoreError::IndexOutOfRange { path, index, len }
    }

    /// Create a not draftable error.
    #[inline]
    pub fn not_draftable(context: &'static str, found: Option<&Value>) -> Self {
        StoreError::NotDraftable {
            context,
            found: found.map_or("undefined", value_type_name),
        }
    }

    /// Create an invalid options error.
    #[inline]
    pub fn invalid_options(message: impl Into<String>) -> Self {
        StoreError::InvalidOptions {
            message: message.into(),
        }
    }

    /// Create a history destroyed error.
    #[inline]
    pub fn history_destroyed(operation: &'static str) -> Self {
        StoreError::HistoryDestroyed { operation }
    }

    /// Create a frozen value error.
    #[inline]
    pub fn frozen(found: &Value) -> Self {
        StoreError::FrozenValue {
            found: value_type_name(found),
        }
    }
}

/// Get the type name of a state value.
#[inline]
pub fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Bytes(_) => "bytes",
    }
}
