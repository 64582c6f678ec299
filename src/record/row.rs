use crate::file::{INVALID_PAGE_ID, PageId, PageReader, PageWriter};

use super::error::{RecordError, RecordResult};
use super::schema::Schema;
use super::value::Field;

/// Physical identifier of a tuple: owning page plus slot number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RowId {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn is_valid(&self) -> bool {
        self.page_id != INVALID_PAGE_ID
    }
}

pub const INVALID_ROW_ID: RowId = RowId {
    page_id: INVALID_PAGE_ID,
    slot: 0,
};

/// A tuple: its row id (assigned on insert) and one field per schema column.
///
/// Wire format: `u32 field_count | u64 null_bitmap | non-null field bytes`,
/// bit i of the bitmap set iff field i is non-null.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    rid: RowId,
    fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            rid: INVALID_ROW_ID,
            fields,
        }
    }

    /// A row shell carrying only a rid, to be populated by `GetTuple`
    pub fn with_rid(rid: RowId) -> Self {
        Self {
            rid,
            fields: Vec::new(),
        }
    }

    pub fn rid(&self) -> RowId {
        self.rid
    }

    pub fn set_rid(&mut self, rid: RowId) {
        self.rid = rid;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn set_fields(&mut self, fields: Vec<Field>) {
        self.fields = fields;
    }

    pub fn serialized_size(&self) -> usize {
        4 + 8 + self
            .fields
            .iter()
            .map(|f| f.serialized_size())
            .sum::<usize>()
    }

    pub fn serialize_to(&self, writer: &mut PageWriter<'_>, schema: &Schema) -> RecordResult<()> {
        schema.validate_row(&self.fields)?;
        writer.write_u32(self.fields.len() as u32)?;
        let mut bitmap = 0u64;
        for (i, field) in self.fields.iter().enumerate() {
            if !field.is_null() {
                bitmap |= 1 << i;
            }
        }
        writer.write_u64(bitmap)?;
        for field in &self.fields {
            field.serialize_to(writer)?;
        }
        Ok(())
    }

    pub fn deserialize_from(reader: &mut PageReader<'_>, schema: &Schema) -> RecordResult<Row> {
        let count = reader.read_u32()? as usize;
        if count != schema.column_count() {
            return Err(RecordError::SchemaMismatch(format!(
                "stored tuple has {} fields, schema has {}",
                count,
                schema.column_count()
            )));
        }
        let bitmap = reader.read_u64()?;
        let mut fields = Vec::with_capacity(count);
        for (i, column) in schema.columns().iter().enumerate() {
            if bitmap & (1 << i) != 0 {
                fields.push(Field::deserialize_from(reader, column.data_type())?);
            } else {
                fields.push(Field::Null);
            }
        }
        Ok(Row::new(fields))
    }
}
