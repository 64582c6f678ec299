use std::io;
use thiserror::Error;

use super::PageId;
use super::codec::CodecError;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Buffer pool exhausted: all frames pinned")]
    PoolExhausted,

    #[error("Invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Database file is full")]
    DiskFull,

    #[error("Corrupted disk meta page: magic mismatch")]
    MagicMismatch,

    #[error("Disk manager is closed")]
    Closed,
}

pub type FileResult<T> = Result<T, FileError>;
