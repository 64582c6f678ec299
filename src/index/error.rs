use thiserror::Error;

use crate::file::{CodecError, FileError, PageId};
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Corrupted index roots page: magic mismatch")]
    MagicMismatch,

    #[error("Corrupted tree node at page {0}: unknown page type")]
    CorruptedNode(PageId),

    #[error("Index key of {size} bytes exceeds the {max}-byte key image")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Key value of {actual} bytes exceeds CHAR({max})")]
    KeyValueTooLong { actual: usize, max: usize },

    #[error("Cannot build an index key from a NULL field")]
    NullKey,
}

pub type IndexResult<T> = Result<T, IndexError>;
