use thiserror::Error;

use crate::file::{CodecError, FileError};
use crate::index::IndexError;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Corrupted catalog metadata: magic mismatch")]
    MagicMismatch,

    #[error("Table {0} does not exist")]
    TableNotFound(String),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Index {0} does not exist")]
    IndexNotFound(String),

    #[error("Index {0} already exists")]
    IndexAlreadyExists(String),

    #[error("Column {0} does not exist")]
    ColumnNotFound(String),

    #[error("Column {0} is not unique and cannot be indexed")]
    ColumnNotUnique(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
