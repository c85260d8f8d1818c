use std::io;
use thiserror::Error;

use crate::file::FileError;
use crate::index::IndexError;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("table meta error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("schema field missing: {0}")]
    FieldMissing(String),

    #[error("field type mismatch: field {field} expects {expected}, got {actual}")]
    FieldTypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("index already exists: {0}")]
    IndexExists(String),
}

pub type TableResult<T> = Result<T, TableError>;
