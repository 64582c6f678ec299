//! Directory of index roots on a reserved page.
//!
//! Logical page 1 maps `index_id -> root_page_id` so trees can be reopened
//! after a restart. Every root change goes through `set_root`.

use crate::file::{BufferPoolManager, INDEX_ROOTS_PAGE_ID, PageId, PageReader, PageWriter};

use super::error::{IndexError, IndexResult};

/// Magic number guarding the roots page ("RTS")
pub const INDEX_ROOTS_MAGIC: u32 = 0x0052_5453;

fn read_entries(buf: &[u8]) -> IndexResult<Vec<(u32, PageId)>> {
    let mut reader = PageReader::new(buf);
    let magic = reader.read_u32()?;
    if magic == 0 {
        // Never written: implicitly an empty directory
        return Ok(Vec::new());
    }
    if magic != INDEX_ROOTS_MAGIC {
        return Err(IndexError::MagicMismatch);
    }
    let count = reader.read_u32()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let index_id = reader.read_u32()?;
        let root = reader.read_u32()?;
        entries.push((index_id, root));
    }
    Ok(entries)
}

fn write_entries(buf: &mut [u8], entries: &[(u32, PageId)]) -> IndexResult<()> {
    let mut writer = PageWriter::new(buf);
    writer.write_u32(INDEX_ROOTS_MAGIC)?;
    writer.write_u32(entries.len() as u32)?;
    for (index_id, root) in entries {
        writer.write_u32(*index_id)?;
        writer.write_u32(*root)?;
    }
    Ok(())
}

/// Root page id recorded for an index, if any
pub fn load_root(pool: &mut BufferPoolManager, index_id: u32) -> IndexResult<Option<PageId>> {
    let page_ref = pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
    let entries = {
        let guard = page_ref.borrow();
        read_entries(guard.data())
    };
    pool.unpin_page(INDEX_ROOTS_PAGE_ID, false);
    Ok(entries?
        .iter()
        .find(|(id, _)| *id == index_id)
        .map(|(_, root)| *root))
}

/// Insert or update the root entry for an index
pub fn set_root(pool: &mut BufferPoolManager, index_id: u32, root: PageId) -> IndexResult<()> {
    let page_ref = pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
    let result = {
        let mut guard = page_ref.borrow_mut();
        read_entries(guard.data()).and_then(|mut entries| {
            match entries.iter_mut().find(|(id, _)| *id == index_id) {
                Some(entry) => entry.1 = root,
                None => entries.push((index_id, root)),
            }
            write_entries(guard.data_mut(), &entries)
        })
    };
    pool.unpin_page(INDEX_ROOTS_PAGE_ID, result.is_ok());
    result
}

/// Drop the root entry for an index
pub fn remove_root(pool: &mut BufferPoolManager, index_id: u32) -> IndexResult<()> {
    let page_ref = pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
    let result = {
        let mut guard = page_ref.borrow_mut();
        read_entries(guard.data()).and_then(|mut entries| {
            entries.retain(|(id, _)| *id != index_id);
            guard.data_mut().fill(0);
            write_entries(guard.data_mut(), &entries)
        })
    };
    pool.unpin_page(INDEX_ROOTS_PAGE_ID, result.is_ok());
    result
}
