use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    /// The write would put an appointment inside a schedule block.
    #[error("excluded by schedule block {block_id}: {reason}")]
    Excluded { block_id: Ulid, reason: String },
    /// A checked-out appointment can only stay done.
    #[error("appointment {0} is checked out")]
    CheckedOut(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    Wal(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Ulid) -> Self {
        StoreError::NotFound { entity, id }
    }
}
