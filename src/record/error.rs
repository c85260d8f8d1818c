use thiserror::Error;

use super::Rid;
use crate::file::FileError;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error("no more records")]
    Eof,

    #[error("no record at {0}")]
    InvalidRid(Rid),

    #[error("invalid slot: {0}")]
    InvalidSlot(usize),

    #[error("record size {0} does not fit in a page")]
    RecordTooLarge(usize),

    #[error("record size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("corrupted record page: {0}")]
    Corrupted(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
