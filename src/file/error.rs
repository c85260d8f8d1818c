use std::io;
use thiserror::Error;

use super::PageNum;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to seek: {0}")]
    Seek(#[source] io::Error),

    #[error("failed to read page: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write page: {0}")]
    Write(#[source] io::Error),

    #[error("failed to access file: {0}")]
    Access(#[source] io::Error),

    #[error("failed to close file: {0}")]
    Close(#[source] io::Error),

    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("file handle limit reached")]
    TooManyOpenFiles,

    #[error("invalid file id: {0}")]
    InvalidFileId(usize),

    #[error("invalid page num: {0}")]
    InvalidPageNum(PageNum),

    #[error("all frames are in use and pinned")]
    NoFreeFrames,

    #[error("page {page_num} is pinned ({pin_count} pins)")]
    PagePinned { page_num: PageNum, pin_count: u32 },
}

pub type FileResult<T> = Result<T, FileError>;
