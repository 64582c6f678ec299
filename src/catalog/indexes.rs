use crate::file::{BufferPoolManager, PageId, PageReader, PageWriter};
use crate::index::{BPlusTree, IndexKey, IndexResult};
use crate::record::{Row, Schema};

use super::error::{CatalogError, CatalogResult};
use super::meta::{IndexId, TableId};

/// Magic number guarding index metadata pages ("IDX")
pub const INDEX_META_MAGIC: u32 = 0x0049_4458;

/// Persisted description of an index
#[derive(Debug)]
pub struct IndexMetadata {
    index_id: IndexId,
    index_name: String,
    table_id: TableId,
    root_page_id: PageId,
    key_columns: Vec<u32>,
}

impl IndexMetadata {
    pub fn new(
        index_id: IndexId,
        index_name: impl Into<String>,
        table_id: TableId,
        root_page_id: PageId,
        key_columns: Vec<u32>,
    ) -> Self {
        Self {
            index_id,
            index_name: index_name.into(),
            table_id,
            root_page_id,
            key_columns,
        }
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn key_columns(&self) -> &[u32] {
        &self.key_columns
    }

    pub fn serialize_to(&self, writer: &mut PageWriter<'_>) -> CatalogResult<()> {
        writer.write_u32(INDEX_META_MAGIC)?;
        writer.write_u32(self.index_id)?;
        writer.write_string(&self.index_name)?;
        writer.write_u32(self.table_id)?;
        writer.write_u32(self.root_page_id)?;
        writer.write_u32(self.key_columns.len() as u32)?;
        for column in &self.key_columns {
            writer.write_u32(*column)?;
        }
        Ok(())
    }

    pub fn deserialize_from(reader: &mut PageReader<'_>) -> CatalogResult<Self> {
        if reader.read_u32()? != INDEX_META_MAGIC {
            return Err(CatalogError::MagicMismatch);
        }
        let index_id = reader.read_u32()?;
        let index_name = reader.read_string()?;
        let table_id = reader.read_u32()?;
        let root_page_id = reader.read_u32()?;
        let key_count = reader.read_u32()? as usize;
        let mut key_columns = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            key_columns.push(reader.read_u32()?);
        }
        Ok(Self {
            index_id,
            index_name,
            table_id,
            root_page_id,
            key_columns,
        })
    }
}

/// An index's metadata paired with its live tree
pub struct IndexInfo {
    meta: IndexMetadata,
    tree: BPlusTree,
}

impl IndexInfo {
    pub fn new(meta: IndexMetadata, tree: BPlusTree) -> Self {
        Self { meta, tree }
    }

    pub fn index_id(&self) -> IndexId {
        self.meta.index_id()
    }

    pub fn index_name(&self) -> &str {
        self.meta.index_name()
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id()
    }

    pub fn key_columns(&self) -> &[u32] {
        self.meta.key_columns()
    }

    pub fn meta(&self) -> &IndexMetadata {
        &self.meta
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut BPlusTree {
        &mut self.tree
    }

    /// Key image for this index built from a full table row
    pub fn key_for_row(&self, row: &Row, schema: &Schema) -> IndexResult<IndexKey> {
        IndexKey::from_row(row, self.meta.key_columns(), schema.columns())
    }

    /// Insert an entry for a row. False on a duplicate key.
    pub fn insert_entry(
        &mut self,
        pool: &mut BufferPoolManager,
        row: &Row,
        schema: &Schema,
    ) -> CatalogResult<bool> {
        let key = self.key_for_row(row, schema)?;
        let inserted = self.tree.insert(pool, &key, row.rid())?;
        self.sync_root();
        Ok(inserted)
    }

    /// Remove the entry for a row, if present
    pub fn remove_entry(
        &mut self,
        pool: &mut BufferPoolManager,
        row: &Row,
        schema: &Schema,
    ) -> CatalogResult<()> {
        let key = self.key_for_row(row, schema)?;
        self.tree.remove(pool, &key)?;
        self.sync_root();
        Ok(())
    }

    /// Insert entries for a batch of rows, as index population does after a
    /// full table scan. Entries whose key already maps to the same row are
    /// skipped, so replaying a batch is harmless. Returns false when a key
    /// is taken by a different row.
    pub fn batch_insert(
        &mut self,
        pool: &mut BufferPoolManager,
        rows: &[Row],
        schema: &Schema,
    ) -> CatalogResult<bool> {
        for row in rows {
            let key = self.key_for_row(row, schema)?;
            match self.tree.get_value(pool, &key)? {
                Some(rid) if rid == row.rid() => {}
                Some(_) => {
                    self.sync_root();
                    return Ok(false);
                }
                None => {
                    self.tree.insert(pool, &key, row.rid())?;
                }
            }
        }
        self.sync_root();
        Ok(true)
    }

    /// Mirror the live root into the metadata so a flush persists it
    pub fn sync_root(&mut self) {
        self.meta.root_page_id = self.tree.root_page_id();
    }
}
