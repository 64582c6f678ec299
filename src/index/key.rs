//! Fixed-width, order-preserving key images.
//!
//! Tree nodes store every key as a 32-byte image whose byte-wise ordering
//! equals the typed ordering of the source fields, so node-local searches
//! are plain `Ord` comparisons. Integers are stored sign-flipped big-endian,
//! floats through the IEEE-754 total-order transform, strings zero-padded
//! to their declared column length.

use crate::record::{Column, DataType, Field, Row};

use super::error::{IndexError, IndexResult};

/// Width of a key image in node entries
pub const INDEX_KEY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    data: [u8; INDEX_KEY_SIZE],
}

impl IndexKey {
    pub fn zeroed() -> Self {
        Self {
            data: [0u8; INDEX_KEY_SIZE],
        }
    }

    pub fn from_bytes(data: [u8; INDEX_KEY_SIZE]) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8; INDEX_KEY_SIZE] {
        &self.data
    }

    /// Build a key image from fields and their column declarations
    pub fn from_fields(fields: &[&Field], columns: &[&Column]) -> IndexResult<Self> {
        let mut data = [0u8; INDEX_KEY_SIZE];
        let mut offset = 0;
        for (field, column) in fields.iter().zip(columns) {
            let width = match column.data_type() {
                DataType::Int | DataType::Float => 4,
                DataType::Char(n) => *n as usize,
            };
            if offset + width > INDEX_KEY_SIZE {
                return Err(IndexError::KeyTooLarge {
                    size: offset + width,
                    max: INDEX_KEY_SIZE,
                });
            }
            match field {
                Field::Int(value) => {
                    let image = (*value as u32) ^ 0x8000_0000;
                    data[offset..offset + 4].copy_from_slice(&image.to_be_bytes());
                }
                Field::Float(value) => {
                    let bits = value.to_bits();
                    let image = if bits & 0x8000_0000 != 0 {
                        !bits
                    } else {
                        bits | 0x8000_0000
                    };
                    data[offset..offset + 4].copy_from_slice(&image.to_be_bytes());
                }
                Field::Chars(value) => {
                    let bytes = value.as_bytes();
                    if bytes.len() > width {
                        return Err(IndexError::KeyValueTooLong {
                            actual: bytes.len(),
                            max: width,
                        });
                    }
                    data[offset..offset + bytes.len()].copy_from_slice(bytes);
                }
                Field::Null => return Err(IndexError::NullKey),
            }
            offset += width;
        }
        Ok(Self { data })
    }

    /// Key image for the columns of `row` selected by `key_columns`
    pub fn from_row(row: &Row, key_columns: &[u32], columns: &[Column]) -> IndexResult<Self> {
        let mut fields = Vec::with_capacity(key_columns.len());
        let mut cols = Vec::with_capacity(key_columns.len());
        for &index in key_columns {
            let field = row
                .field(index as usize)
                .ok_or(IndexError::NullKey)?;
            fields.push(field);
            cols.push(&columns[index as usize]);
        }
        Self::from_fields(&fields, &cols)
    }
}
