use std::fmt::{self, Display};

/// The crate-wide error type, with conversions from the errors it wraps.
///
/// Only fatal and configuration failures surface as `PropkitError`;
/// expected failures (cardinality conflicts, unknown frees) are ordinary
/// return values on the operations that produce them.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum PropkitError {
    /// A pool allocator ran out of free chunks. Pools never grow.
    MemoryOverflow { pool: String },
    /// The allocator registered for a type allocates chunks of a different
    /// size than the type needs. A type must never share an allocator sized
    /// for another type.
    AllocatorMismatch {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A pool allocator was configured with zero capacity.
    InvalidCapacity { pool: String },
    /// No property factory is registered under the given name or type.
    UnregisteredProperty(String),
    /// Batch admission stalled: none of the remaining properties had their
    /// dependencies satisfied, so no further progress was possible.
    UnmetDependencies(Vec<String>),
    JsonError(serde_json::Error),
    PropkitError(String),
}

impl From<serde_json::Error> for PropkitError {
    fn from(error: serde_json::Error) -> Self {
        PropkitError::JsonError(error)
    }
}

impl From<String> for PropkitError {
    fn from(error: String) -> Self {
        PropkitError::PropkitError(error)
    }
}

impl From<&str> for PropkitError {
    fn from(error: &str) -> Self {
        PropkitError::PropkitError(error.to_string())
    }
}

impl std::error::Error for PropkitError {}

impl Display for PropkitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PropkitError::MemoryOverflow { pool } => {
                write!(f, "memory overflow in pool '{pool}'")
            }
            PropkitError::AllocatorMismatch {
                type_name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "allocator registered for {type_name} allocates chunks of {actual} bytes, \
                     but the type needs {expected}"
                )
            }
            PropkitError::InvalidCapacity { pool } => {
                write!(f, "pool '{pool}' cannot have zero capacity")
            }
            PropkitError::UnregisteredProperty(name) => {
                write!(f, "no property factory is registered for \"{name}\"")
            }
            PropkitError::UnmetDependencies(names) => {
                write!(
                    f,
                    "properties could not be added because their dependencies were never met: {}",
                    names.join(", ")
                )
            }
            PropkitError::JsonError(error) => write!(f, "content error: {error}"),
            PropkitError::PropkitError(message) => write!(f, "Error: {message}"),
        }
    }
}
