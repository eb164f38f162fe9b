use serde::Serialize;
use thiserror::Error;
use ulid::Ulid;

use crate::provisioning::IdentityError;
use crate::store::StoreError;

/// A malformed or missing field. Always detected before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("start must be before end: [{start}, {end})")]
    InvalidRange { start: String, end: String },
    #[error("malformed timestamp: {0:?}")]
    MalformedTimestamp(String),
    #[error("{field} too long (max {max})")]
    TooLong { field: &'static str, max: usize },
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),
    #[error("working hours out of order")]
    InvalidWorkingHours,
    #[error("boarding stay needs check_in_date <= check_out_date")]
    InvalidStayDates,
    #[error("appointment {0} is checked out and stays done")]
    InvalidTransition(Ulid),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("no profile for principal {0}")]
    ProfileNotFound(Ulid),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },
    #[error("scheduling conflict with block {block_id}: {reason}")]
    Conflict { block_id: Ulid, reason: String },
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
    #[error("identity provider error: {0}")]
    Identity(#[from] IdentityError),
}

impl CoreError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden(reason.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated => "unauthenticated",
            CoreError::ProfileNotFound(_) => "profile_not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::Validation(_) => "validation",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Conflict { .. } => "conflict",
            CoreError::Storage(_) => "storage",
            CoreError::Identity(_) => "identity",
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::CheckedOut(id) => CoreError::Validation(ValidationError::InvalidTransition(id)),
            StoreError::Excluded { block_id, reason } => CoreError::Conflict { block_id, reason },
            other => CoreError::Storage(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// The `(success, message)` pair handed back to callers of mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }

    pub fn from_result<T>(result: &CoreResult<T>, success_message: &str) -> Self {
        match result {
            Ok(_) => Self::ok(success_message),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}
