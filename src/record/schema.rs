use crate::file::{PageReader, PageWriter};

use super::error::{RecordError, RecordResult};
use super::value::{DataType, Field};

/// Magic number guarding serialized columns ("COL")
pub const COLUMN_MAGIC: u32 = 0x0043_4F4C;

/// Magic number guarding serialized schemas ("SCH")
pub const SCHEMA_MAGIC: u32 = 0x0053_4348;

/// A schema may not exceed the width of the row null bitmap
pub const MAX_COLUMNS: usize = 64;

/// Column definition with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data_type: DataType,
    table_index: u32,
    nullable: bool,
    unique: bool,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            table_index,
            nullable,
            unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn table_index(&self) -> u32 {
        self.table_index
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn serialize_to(&self, writer: &mut PageWriter<'_>) -> RecordResult<()> {
        writer.write_u32(COLUMN_MAGIC)?;
        writer.write_string(&self.name)?;
        writer.write_u32(self.data_type.type_code())?;
        writer.write_u32(self.data_type.length())?;
        writer.write_u32(self.table_index)?;
        writer.write_u8(self.nullable as u8)?;
        writer.write_u8(self.unique as u8)?;
        Ok(())
    }

    pub fn deserialize_from(reader: &mut PageReader<'_>) -> RecordResult<Self> {
        if reader.read_u32()? != COLUMN_MAGIC {
            return Err(RecordError::MagicMismatch);
        }
        let name = reader.read_string()?;
        let type_code = reader.read_u32()?;
        let length = reader.read_u32()?;
        let table_index = reader.read_u32()?;
        let nullable = reader.read_u8()? != 0;
        let unique = reader.read_u8()? != 0;
        Ok(Self {
            name,
            data_type: DataType::from_code(type_code, length)?,
            table_index,
            nullable,
            unique,
        })
    }
}

/// Ordered sequence of columns
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> RecordResult<Self> {
        if columns.len() > MAX_COLUMNS {
            return Err(RecordError::TooManyColumns(columns.len()));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Find a column index by name
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Check a field list against column count, NOT NULL flags, type
    /// compatibility, and CHAR length declarations.
    pub fn validate_row(&self, fields: &[Field]) -> RecordResult<()> {
        if fields.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                self.columns.len(),
                fields.len()
            )));
        }
        for (field, column) in fields.iter().zip(&self.columns) {
            if field.is_null() {
                if !column.nullable {
                    return Err(RecordError::NullViolation(column.name.clone()));
                }
                continue;
            }
            if !field.matches_type(&column.data_type) {
                return Err(RecordError::TypeMismatch {
                    expected: column.data_type.to_string(),
                    actual: format!("{:?}", field),
                });
            }
            if let (Field::Chars(s), DataType::Char(max)) = (field, &column.data_type)
                && s.len() > *max as usize
            {
                return Err(RecordError::CharTooLong {
                    actual: s.len(),
                    max: *max,
                });
            }
        }
        Ok(())
    }

    pub fn serialize_to(&self, writer: &mut PageWriter<'_>) -> RecordResult<()> {
        writer.write_u32(SCHEMA_MAGIC)?;
        writer.write_u32(self.columns.len() as u32)?;
        for column in &self.columns {
            column.serialize_to(writer)?;
        }
        Ok(())
    }

    pub fn deserialize_from(reader: &mut PageReader<'_>) -> RecordResult<Self> {
        if reader.read_u32()? != SCHEMA_MAGIC {
            return Err(RecordError::MagicMismatch);
        }
        let count = reader.read_u32()? as usize;
        if count > MAX_COLUMNS {
            return Err(RecordError::TooManyColumns(count));
        }
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(Column::deserialize_from(reader)?);
        }
        Ok(Self { columns })
    }
}
