use thiserror::Error;

use crate::file::{CodecError, FileError};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Corrupted metadata: magic mismatch")]
    MagicMismatch,

    #[error("Unknown column type code: {0}")]
    InvalidTypeCode(u32),

    #[error("Schema has too many columns: {0} (max 64)")]
    TooManyColumns(usize),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("NULL value for non-nullable column {0}")]
    NullViolation(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("String length {actual} exceeds CHAR({max})")]
    CharTooLong { actual: usize, max: u32 },

    #[error("Tuple does not fit in a page")]
    TupleTooLarge,

    #[error("No tuple at page {page_id} slot {slot}")]
    TupleNotFound { page_id: u32, slot: u32 },
}

pub type RecordResult<T> = Result<T, RecordError>;
