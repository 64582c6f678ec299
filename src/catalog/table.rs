use std::rc::Rc;

use crate::file::{PageId, PageReader, PageWriter};
use crate::record::{Schema, TableHeap};

use super::error::{CatalogError, CatalogResult};
use super::meta::TableId;

/// Magic number guarding table metadata pages ("TBL")
pub const TABLE_META_MAGIC: u32 = 0x0054_424C;

/// Persisted description of a table
#[derive(Debug)]
pub struct TableMetadata {
    table_id: TableId,
    table_name: String,
    first_page_id: PageId,
    schema: Rc<Schema>,
}

impl TableMetadata {
    pub fn new(
        table_id: TableId,
        table_name: impl Into<String>,
        first_page_id: PageId,
        schema: Rc<Schema>,
    ) -> Self {
        Self {
            table_id,
            table_name: table_name.into(),
            first_page_id,
            schema,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Refreshed from the live heap when the catalog is flushed
    pub fn set_first_page_id(&mut self, first_page_id: PageId) {
        self.first_page_id = first_page_id;
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn serialize_to(&self, writer: &mut PageWriter<'_>) -> CatalogResult<()> {
        writer.write_u32(TABLE_META_MAGIC)?;
        writer.write_u32(self.table_id)?;
        writer.write_string(&self.table_name)?;
        writer.write_u32(self.first_page_id)?;
        self.schema.serialize_to(writer)?;
        Ok(())
    }

    pub fn deserialize_from(reader: &mut PageReader<'_>) -> CatalogResult<Self> {
        if reader.read_u32()? != TABLE_META_MAGIC {
            return Err(CatalogError::MagicMismatch);
        }
        let table_id = reader.read_u32()?;
        let table_name = reader.read_string()?;
        let first_page_id = reader.read_u32()?;
        let schema = Rc::new(Schema::deserialize_from(reader)?);
        Ok(Self {
            table_id,
            table_name,
            first_page_id,
            schema,
        })
    }
}

/// A table's metadata paired with its live heap
pub struct TableInfo {
    meta: TableMetadata,
    heap: TableHeap,
}

impl TableInfo {
    pub fn new(meta: TableMetadata, heap: TableHeap) -> Self {
        Self { meta, heap }
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id()
    }

    pub fn table_name(&self) -> &str {
        self.meta.table_name()
    }

    pub fn schema(&self) -> &Rc<Schema> {
        self.meta.schema()
    }

    pub fn meta(&self) -> &TableMetadata {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TableMetadata {
        &mut self.meta
    }

    pub fn heap(&self) -> &TableHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut TableHeap {
        &mut self.heap
    }
}
