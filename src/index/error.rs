use thiserror::Error;

use crate::file::FileError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error("index entry not found")]
    KeyNotFound,

    #[error("corrupted index page: {0}")]
    Corrupted(String),
}

pub type IndexResult<T> = Result<T, IndexError>;
