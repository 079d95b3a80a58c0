use std::fmt;

/// Error taxonomy for the storage engine (spec §7).
///
/// `InvalidArgument`, `NotFound` and `CapacityConflict` are ordinary
/// control-flow values a caller is expected to match on. `Abort` carries the
/// same meaning as the `abort_error` output parameter threaded through every
/// walker in the design: once observed, a caller must stop initiating new
/// work and unwind releasing whatever locks it holds. Programmer errors
/// (acquiring a lock after an abort, double-upgrading a lock, freeing a page
/// after an abort) are not represented here at all — per §7 they are fatal
/// and surface as a panic, not a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    InvalidArgument(String),
    NotFound,
    CapacityConflict(String),
    Abort,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::InvalidArgument(msg) => {
                write!(f, "invalid argument: {}", msg)
            }
            StoreError::NotFound => write!(f, "not found"),
            StoreError::CapacityConflict(msg) => {
                write!(f, "capacity conflict: {}", msg)
            }
            StoreError::Abort => write!(f, "transaction aborted"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;
