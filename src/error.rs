use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

// Everything here is recoverable by retrying the user action;
// nothing in the core treats a store error as fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write store: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("task not found: {0}")]
    NotFound(Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::WriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}
