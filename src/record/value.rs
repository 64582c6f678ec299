use std::cmp::Ordering;
use std::fmt;

use crate::file::{PageReader, PageWriter};

use super::error::{RecordError, RecordResult};

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 32-bit signed integer
    Int,
    /// 32-bit IEEE-754 float
    Float,
    /// Fixed maximum length character string
    Char(u32),
}

impl DataType {
    /// Wire code used in serialized columns
    pub fn type_code(&self) -> u32 {
        match self {
            DataType::Int => 1,
            DataType::Float => 2,
            DataType::Char(_) => 3,
        }
    }

    /// Declared length: the value width for fixed types, the maximum
    /// character count for CHAR
    pub fn length(&self) -> u32 {
        match self {
            DataType::Int => 4,
            DataType::Float => 4,
            DataType::Char(n) => *n,
        }
    }

    pub fn from_code(code: u32, length: u32) -> RecordResult<Self> {
        match code {
            1 => Ok(DataType::Int),
            2 => Ok(DataType::Float),
            3 => Ok(DataType::Char(length)),
            _ => Err(RecordError::InvalidTypeCode(code)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Char(n) => write!(f, "char({})", n),
        }
    }
}

/// A single tuple field: a typed value or NULL
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i32),
    Float(f32),
    Chars(String),
    Null,
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Whether the value is storable under the given column type
    pub fn matches_type(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Field::Int(_), DataType::Int)
                | (Field::Float(_), DataType::Float)
                | (Field::Chars(_), DataType::Char(_))
                | (Field::Null, _)
        )
    }

    /// Bytes this field contributes to a serialized row. NULL fields are
    /// carried by the bitmap alone and contribute nothing.
    pub fn serialized_size(&self) -> usize {
        match self {
            Field::Int(_) => 4,
            Field::Float(_) => 4,
            Field::Chars(s) => 4 + s.len(),
            Field::Null => 0,
        }
    }

    pub fn serialize_to(&self, writer: &mut PageWriter<'_>) -> RecordResult<()> {
        match self {
            Field::Int(value) => writer.write_i32(*value)?,
            Field::Float(value) => writer.write_f32(*value)?,
            Field::Chars(value) => writer.write_string(value)?,
            Field::Null => {}
        }
        Ok(())
    }

    pub fn deserialize_from(
        reader: &mut PageReader<'_>,
        data_type: &DataType,
    ) -> RecordResult<Self> {
        let field = match data_type {
            DataType::Int => Field::Int(reader.read_i32()?),
            DataType::Float => Field::Float(reader.read_f32()?),
            DataType::Char(_) => Field::Chars(reader.read_string()?),
        };
        Ok(field)
    }

    /// Typed comparison. None when either side is NULL or the types
    /// disagree; predicates treat that as no match.
    pub fn compare(&self, other: &Field) -> Option<Ordering> {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => Some(a.cmp(b)),
            (Field::Float(a), Field::Float(b)) => a.partial_cmp(b),
            (Field::Chars(a), Field::Chars(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(value) => write!(f, "{}", value),
            Field::Float(value) => write!(f, "{}", value),
            Field::Chars(value) => write!(f, "{}", value),
            Field::Null => write!(f, "NULL"),
        }
    }
}
