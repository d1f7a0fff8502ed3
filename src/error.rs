use thiserror::Error;

use crate::types::SubjectRef;

#[derive(Error, Debug)]
pub enum PermError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to load subject {subject}: {message}")]
    Loading { subject: SubjectRef, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PermError>;
