mod buffer_pool;
mod error;
mod frame;

pub use buffer_pool::{DiskBufferPool, FileId, PageHandle};
pub use error::{FileError, FileResult};

/// Page size in bytes (8KB), the atomic unit of disk I/O
pub const PAGE_SIZE: usize = 8192;

/// Bytes of payload per page (the first 4 bytes store the page number)
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - 4;

/// Maximum number of files that may be open at once
pub const MAX_OPEN_FILE: usize = 128;

/// Default number of frames in the shared buffer pool
pub const POOL_NUM: usize = MAX_OPEN_FILE / 4;

/// Page number type; page 0 of every file is the header page
pub type PageNum = u32;
