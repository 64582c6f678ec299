//! Catalog: persists schemas, table headers, and index headers so a
//! database survives restarts.
//!
//! The catalog meta page (logical page 0) records where every table's and
//! index's metadata page lives; each of those pages carries a magic-guarded
//! serialized `TableMetadata` or `IndexMetadata`.

mod error;
mod indexes;
mod meta;
mod table;

#[cfg(test)]
mod tests;

pub use error::{CatalogError, CatalogResult};
pub use indexes::{INDEX_META_MAGIC, IndexInfo, IndexMetadata};
pub use meta::{CATALOG_META_MAGIC, CatalogMeta, IndexId, TableId};
pub use table::{TABLE_META_MAGIC, TableInfo, TableMetadata};

use std::collections::HashMap;
use std::rc::Rc;

use crate::file::{
    BufferPoolManager, CATALOG_META_PAGE_ID, INVALID_PAGE_ID, PageId, PageReader, PageWriter,
};
use crate::index::{BPlusTree, load_root};
use crate::record::{Schema, TableHeap};

pub struct CatalogManager {
    meta: CatalogMeta,
    table_names: HashMap<String, TableId>,
    tables: HashMap<TableId, TableInfo>,
    /// table name -> index name -> index id
    index_names: HashMap<String, HashMap<String, IndexId>>,
    indexes: HashMap<IndexId, IndexInfo>,
    next_table_id: TableId,
    next_index_id: IndexId,
}

impl CatalogManager {
    /// Set up the catalog. `init` writes a fresh meta page; otherwise every
    /// table and index is loaded from its persisted metadata.
    pub fn new(pool: &mut BufferPoolManager, init: bool) -> CatalogResult<Self> {
        let mut catalog = Self {
            meta: CatalogMeta::default(),
            table_names: HashMap::new(),
            tables: HashMap::new(),
            index_names: HashMap::new(),
            indexes: HashMap::new(),
            next_table_id: 0,
            next_index_id: 0,
        };

        if init {
            catalog.write_meta_page(pool)?;
            return Ok(catalog);
        }

        let page_ref = pool.fetch_page(CATALOG_META_PAGE_ID)?;
        let meta = {
            let guard = page_ref.borrow();
            CatalogMeta::deserialize_from(guard.data())
        };
        pool.unpin_page(CATALOG_META_PAGE_ID, false);
        catalog.meta = meta?;
        catalog.next_table_id = catalog.meta.next_table_id();
        catalog.next_index_id = catalog.meta.next_index_id();

        let table_pages: Vec<(TableId, PageId)> = catalog
            .meta
            .table_meta_pages
            .iter()
            .map(|(id, page)| (*id, *page))
            .collect();
        for (table_id, page_id) in table_pages {
            catalog.load_table(pool, table_id, page_id)?;
        }

        let index_pages: Vec<(IndexId, PageId)> = catalog
            .meta
            .index_meta_pages
            .iter()
            .map(|(id, page)| (*id, *page))
            .collect();
        for (index_id, page_id) in index_pages {
            catalog.load_index(pool, index_id, page_id)?;
        }

        Ok(catalog)
    }

    pub fn create_table(
        &mut self,
        pool: &mut BufferPoolManager,
        table_name: &str,
        schema: Schema,
    ) -> CatalogResult<TableId> {
        if self.table_names.contains_key(table_name) {
            return Err(CatalogError::TableAlreadyExists(table_name.to_string()));
        }

        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let schema = Rc::new(schema);
        let heap = TableHeap::create(pool, Rc::clone(&schema))?;
        let table_meta = TableMetadata::new(table_id, table_name, heap.first_page_id(), schema);

        let (meta_page_id, page_ref) = pool.new_page()?;
        let written = {
            let mut guard = page_ref.borrow_mut();
            let mut writer = PageWriter::new(guard.data_mut());
            table_meta.serialize_to(&mut writer)
        };
        pool.unpin_page(meta_page_id, written.is_ok());
        written?;

        self.meta.table_meta_pages.insert(table_id, meta_page_id);
        self.write_meta_page(pool)?;

        self.table_names.insert(table_name.to_string(), table_id);
        self.index_names
            .insert(table_name.to_string(), HashMap::new());
        self.tables
            .insert(table_id, TableInfo::new(table_meta, heap));
        Ok(table_id)
    }

    pub fn get_table(&self, table_name: &str) -> CatalogResult<&TableInfo> {
        let table_id = self.table_id_of(table_name)?;
        self.tables
            .get(&table_id)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))
    }

    pub fn get_table_mut(&mut self, table_name: &str) -> CatalogResult<&mut TableInfo> {
        let table_id = self.table_id_of(table_name)?;
        self.tables
            .get_mut(&table_id)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))
    }

    pub fn get_table_by_id(&self, table_id: TableId) -> CatalogResult<&TableInfo> {
        self.tables
            .get(&table_id)
            .ok_or_else(|| CatalogError::TableNotFound(format!("#{}", table_id)))
    }

    pub fn get_tables(&self) -> Vec<&TableInfo> {
        let mut tables: Vec<&TableInfo> = self.tables.values().collect();
        tables.sort_by_key(|info| info.table_id());
        tables
    }

    /// Drop a table, its heap pages, its metadata page, and every index on
    /// it
    pub fn drop_table(&mut self, pool: &mut BufferPoolManager, table_name: &str) -> CatalogResult<()> {
        let table_id = self.table_id_of(table_name)?;
        self.remove_indexes_on_table(pool, table_name)?;

        if let Some(info) = self.tables.get_mut(&table_id) {
            info.heap_mut().free_heap(pool)?;
        }
        if let Some(meta_page_id) = self.meta.table_meta_pages.remove(&table_id) {
            pool.delete_page(meta_page_id)?;
        }
        self.tables.remove(&table_id);
        self.table_names.remove(table_name);
        self.index_names.remove(table_name);
        self.write_meta_page(pool)
    }

    /// Create an index over `key_column_names`. Every named column must
    /// exist and be declared unique.
    pub fn create_index(
        &mut self,
        pool: &mut BufferPoolManager,
        table_name: &str,
        index_name: &str,
        key_column_names: &[String],
    ) -> CatalogResult<IndexId> {
        let table_id = self.table_id_of(table_name)?;
        if self
            .index_names
            .get(table_name)
            .is_some_and(|names| names.contains_key(index_name))
        {
            return Err(CatalogError::IndexAlreadyExists(index_name.to_string()));
        }

        let schema = Rc::clone(self.get_table_by_id(table_id)?.schema());
        let mut key_columns = Vec::with_capacity(key_column_names.len());
        for name in key_column_names {
            let position = schema
                .find_column(name)
                .ok_or_else(|| CatalogError::ColumnNotFound(name.clone()))?;
            if !schema.columns()[position].is_unique() {
                return Err(CatalogError::ColumnNotUnique(name.clone()));
            }
            key_columns.push(position as u32);
        }

        let index_id = self.next_index_id;
        self.next_index_id += 1;

        let index_meta =
            IndexMetadata::new(index_id, index_name, table_id, INVALID_PAGE_ID, key_columns);
        let tree = BPlusTree::with_default_sizes(index_id, INVALID_PAGE_ID);

        let (meta_page_id, page_ref) = pool.new_page()?;
        let written = {
            let mut guard = page_ref.borrow_mut();
            let mut writer = PageWriter::new(guard.data_mut());
            index_meta.serialize_to(&mut writer)
        };
        pool.unpin_page(meta_page_id, written.is_ok());
        written?;

        self.meta.index_meta_pages.insert(index_id, meta_page_id);
        self.write_meta_page(pool)?;

        self.index_names
            .entry(table_name.to_string())
            .or_default()
            .insert(index_name.to_string(), index_id);
        self.indexes
            .insert(index_id, IndexInfo::new(index_meta, tree));
        Ok(index_id)
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> CatalogResult<&IndexInfo> {
        let index_id = self.index_id_of(table_name, index_name)?;
        self.indexes
            .get(&index_id)
            .ok_or_else(|| CatalogError::IndexNotFound(index_name.to_string()))
    }

    pub fn get_index_mut(
        &mut self,
        table_name: &str,
        index_name: &str,
    ) -> CatalogResult<&mut IndexInfo> {
        let index_id = self.index_id_of(table_name, index_name)?;
        self.indexes
            .get_mut(&index_id)
            .ok_or_else(|| CatalogError::IndexNotFound(index_name.to_string()))
    }

    pub fn get_index_by_id(&self, index_id: IndexId) -> CatalogResult<&IndexInfo> {
        self.indexes
            .get(&index_id)
            .ok_or_else(|| CatalogError::IndexNotFound(format!("#{}", index_id)))
    }

    pub fn get_index_by_id_mut(&mut self, index_id: IndexId) -> CatalogResult<&mut IndexInfo> {
        self.indexes
            .get_mut(&index_id)
            .ok_or_else(|| CatalogError::IndexNotFound(format!("#{}", index_id)))
    }

    pub fn get_table_indexes(&self, table_name: &str) -> CatalogResult<Vec<&IndexInfo>> {
        let mut infos: Vec<&IndexInfo> = self
            .table_index_ids(table_name)?
            .into_iter()
            .filter_map(|id| self.indexes.get(&id))
            .collect();
        infos.sort_by_key(|info| info.index_id());
        Ok(infos)
    }

    /// Index ids on a table; the executor iterates these while mutating
    pub fn table_index_ids(&self, table_name: &str) -> CatalogResult<Vec<IndexId>> {
        self.table_id_of(table_name)?;
        Ok(self
            .index_names
            .get(table_name)
            .map(|names| names.values().copied().collect())
            .unwrap_or_default())
    }

    pub fn drop_index(
        &mut self,
        pool: &mut BufferPoolManager,
        table_name: &str,
        index_name: &str,
    ) -> CatalogResult<()> {
        let index_id = self.index_id_of(table_name, index_name)?;

        if let Some(info) = self.indexes.get_mut(&index_id) {
            info.tree_mut().destroy(pool)?;
        }
        if let Some(meta_page_id) = self.meta.index_meta_pages.remove(&index_id) {
            pool.delete_page(meta_page_id)?;
        }
        self.indexes.remove(&index_id);
        if let Some(names) = self.index_names.get_mut(table_name) {
            names.remove(index_name);
        }
        self.write_meta_page(pool)
    }

    /// Drop every index on a table. A no-op for tables without indexes.
    pub fn remove_indexes_on_table(
        &mut self,
        pool: &mut BufferPoolManager,
        table_name: &str,
    ) -> CatalogResult<()> {
        let names: Vec<String> = self
            .index_names
            .get(table_name)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default();
        for index_name in names {
            self.drop_index(pool, table_name, &index_name)?;
        }
        Ok(())
    }

    /// Rewrite the catalog meta page, every table meta page (with the live
    /// heap head), every index meta page (with the live root), and flush
    /// the pool.
    pub fn flush_all(&mut self, pool: &mut BufferPoolManager) -> CatalogResult<()> {
        for (table_id, info) in &mut self.tables {
            let first_page_id = info.heap().first_page_id();
            info.meta_mut().set_first_page_id(first_page_id);
            if let Some(&meta_page_id) = self.meta.table_meta_pages.get(table_id) {
                let page_ref = pool.fetch_page(meta_page_id)?;
                let written = {
                    let mut guard = page_ref.borrow_mut();
                    guard.data_mut().fill(0);
                    let mut writer = PageWriter::new(guard.data_mut());
                    info.meta().serialize_to(&mut writer)
                };
                pool.unpin_page(meta_page_id, true);
                written?;
            }
        }
        for (index_id, info) in &mut self.indexes {
            info.sync_root();
            if let Some(&meta_page_id) = self.meta.index_meta_pages.get(index_id) {
                let page_ref = pool.fetch_page(meta_page_id)?;
                let written = {
                    let mut guard = page_ref.borrow_mut();
                    guard.data_mut().fill(0);
                    let mut writer = PageWriter::new(guard.data_mut());
                    info.meta().serialize_to(&mut writer)
                };
                pool.unpin_page(meta_page_id, true);
                written?;
            }
        }
        self.write_meta_page(pool)?;
        pool.flush_all()?;
        Ok(())
    }

    fn table_id_of(&self, table_name: &str) -> CatalogResult<TableId> {
        self.table_names
            .get(table_name)
            .copied()
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))
    }

    fn index_id_of(&self, table_name: &str, index_name: &str) -> CatalogResult<IndexId> {
        self.table_id_of(table_name)?;
        self.index_names
            .get(table_name)
            .and_then(|names| names.get(index_name))
            .copied()
            .ok_or_else(|| CatalogError::IndexNotFound(index_name.to_string()))
    }

    fn load_table(
        &mut self,
        pool: &mut BufferPoolManager,
        table_id: TableId,
        page_id: PageId,
    ) -> CatalogResult<()> {
        let page_ref = pool.fetch_page(page_id)?;
        let table_meta = {
            let guard = page_ref.borrow();
            let mut reader = PageReader::new(guard.data());
            TableMetadata::deserialize_from(&mut reader)
        };
        pool.unpin_page(page_id, false);
        let table_meta = table_meta?;

        let heap = TableHeap::open(
            pool,
            table_meta.first_page_id(),
            Rc::clone(table_meta.schema()),
        )?;
        self.table_names
            .insert(table_meta.table_name().to_string(), table_id);
        self.index_names
            .entry(table_meta.table_name().to_string())
            .or_default();
        self.tables
            .insert(table_id, TableInfo::new(table_meta, heap));
        Ok(())
    }

    fn load_index(
        &mut self,
        pool: &mut BufferPoolManager,
        index_id: IndexId,
        page_id: PageId,
    ) -> CatalogResult<()> {
        let page_ref = pool.fetch_page(page_id)?;
        let index_meta = {
            let guard = page_ref.borrow();
            let mut reader = PageReader::new(guard.data());
            IndexMetadata::deserialize_from(&mut reader)
        };
        pool.unpin_page(page_id, false);
        let index_meta = index_meta?;

        // The roots page sees every root change; the metadata page only the
        // last flush. Prefer the former.
        let root = load_root(pool, index_id)?.unwrap_or(index_meta.root_page_id());
        let tree = BPlusTree::with_default_sizes(index_id, root);

        let table_name = self
            .get_table_by_id(index_meta.table_id())?
            .table_name()
            .to_string();
        self.index_names
            .entry(table_name)
            .or_default()
            .insert(index_meta.index_name().to_string(), index_id);
        self.indexes
            .insert(index_id, IndexInfo::new(index_meta, tree));
        Ok(())
    }

    fn write_meta_page(&self, pool: &mut BufferPoolManager) -> CatalogResult<()> {
        let page_ref = pool.fetch_page(CATALOG_META_PAGE_ID)?;
        let written = {
            let mut guard = page_ref.borrow_mut();
            guard.data_mut().fill(0);
            self.meta.serialize_to(guard.data_mut())
        };
        pool.unpin_page(CATALOG_META_PAGE_ID, true);
        written
    }
}
