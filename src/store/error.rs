use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(Ulid),
    /// The requested interval overlaps this existing appointment.
    SlotConflict(Ulid),
    Invalid(&'static str),
    LimitExceeded(&'static str),
    /// The write could not be made durable; nothing was applied.
    WriteFailed(String),
    /// The backing store could not be read.
    ReadFailed(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::SlotConflict(id) => write!(f, "slot already taken by appointment {id}"),
            StoreError::Invalid(msg) => write!(f, "invalid record: {msg}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WriteFailed(e) => write!(f, "write failed: {e}"),
            StoreError::ReadFailed(e) => write!(f, "read failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
