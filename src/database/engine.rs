use std::path::Path;

use crate::catalog::CatalogManager;
use crate::file::{BufferPoolManager, CATALOG_META_PAGE_ID, DiskManager, INDEX_ROOTS_PAGE_ID};

use super::{DatabaseError, DatabaseResult};

/// One database: its backing file, buffer pool, and catalog
pub struct StorageEngine {
    pub(crate) pool: BufferPoolManager,
    pub(crate) catalog: CatalogManager,
}

impl StorageEngine {
    /// Open or create the database file at `path`. A fresh file gets the
    /// two reserved pages (catalog meta, index roots) allocated up front.
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let disk = DiskManager::open(path)?;
        let fresh = disk.num_allocated_pages() == 0;
        let mut pool = BufferPoolManager::new(disk);

        if fresh {
            let catalog_page = pool.allocate_page()?;
            let roots_page = pool.allocate_page()?;
            if catalog_page != CATALOG_META_PAGE_ID || roots_page != INDEX_ROOTS_PAGE_ID {
                return Err(DatabaseError::Corrupted(
                    "reserved pages not at the start of the file".to_string(),
                ));
            }
        }

        let catalog = CatalogManager::new(&mut pool, fresh)?;
        Ok(Self { pool, catalog })
    }

    /// Flush all metadata and data pages and close the backing file
    pub fn close(&mut self) -> DatabaseResult<()> {
        self.catalog.flush_all(&mut self.pool)?;
        self.pool.close()?;
        Ok(())
    }

    pub fn pool_mut(&mut self) -> &mut BufferPoolManager {
        &mut self.pool
    }

    pub fn catalog(&self) -> &CatalogManager {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogManager {
        &mut self.catalog
    }
}
