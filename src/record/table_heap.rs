//! A heap-organized table: a doubly linked list of slotted pages plus an
//! in-memory map from remaining free space to page ids, so inserts can go
//! to the emptiest page that still fits.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;

use crate::file::{BufferPoolManager, INVALID_PAGE_ID, PageId, PageReader, PageWriter};

use super::error::{RecordError, RecordResult};
use super::row::{Row, RowId};
use super::schema::Schema;
use super::table_page::{SLOT_SIZE, TablePage};
use super::value::Field;

pub struct TableHeap {
    first_page_id: PageId,
    schema: Rc<Schema>,
    /// remaining free space -> pages with that much room
    pages: BTreeMap<u32, BTreeSet<PageId>>,
}

impl TableHeap {
    /// Create a heap with one empty page
    pub fn create(pool: &mut BufferPoolManager, schema: Rc<Schema>) -> RecordResult<Self> {
        let (first_page_id, page_ref) = pool.new_page()?;
        let remaining = {
            let mut guard = page_ref.borrow_mut();
            let mut page = TablePage::new(guard.data_mut());
            page.init(INVALID_PAGE_ID, INVALID_PAGE_ID);
            page.remaining_space() as u32
        };
        pool.unpin_page(first_page_id, true);

        let mut heap = Self {
            first_page_id,
            schema,
            pages: BTreeMap::new(),
        };
        heap.insert_bucket(remaining, first_page_id);
        Ok(heap)
    }

    /// Load an existing heap by walking the page chain from its head
    pub fn open(
        pool: &mut BufferPoolManager,
        first_page_id: PageId,
        schema: Rc<Schema>,
    ) -> RecordResult<Self> {
        let mut heap = Self {
            first_page_id,
            schema,
            pages: BTreeMap::new(),
        };
        let mut page_id = first_page_id;
        while page_id != INVALID_PAGE_ID {
            let page_ref = pool.fetch_page(page_id)?;
            let (remaining, next) = {
                let mut guard = page_ref.borrow_mut();
                let page = TablePage::new(guard.data_mut());
                (page.remaining_space() as u32, page.next_page_id())
            };
            pool.unpin_page(page_id, false);
            heap.insert_bucket(remaining, page_id);
            page_id = next;
        }
        Ok(heap)
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Insert a tuple; the assigned rid is stored into `row`. Tuples that
    /// can never fit in a page are refused.
    pub fn insert_tuple(&mut self, pool: &mut BufferPoolManager, row: &mut Row) -> RecordResult<()> {
        self.schema.validate_row(row.fields())?;
        let size = row.serialized_size();
        if size > TablePage::max_tuple_size() {
            return Err(RecordError::TupleTooLarge);
        }
        let mut bytes = vec![0u8; size];
        row.serialize_to(&mut PageWriter::new(&mut bytes), &self.schema)?;

        let page_id = match self.pick_page(size + SLOT_SIZE) {
            Some(page_id) => page_id,
            None => self.grow(pool)?,
        };

        let page_ref = pool.fetch_page(page_id)?;
        let (slot, old_remaining, new_remaining) = {
            let mut guard = page_ref.borrow_mut();
            let mut page = TablePage::new(guard.data_mut());
            let old_remaining = page.remaining_space() as u32;
            // The chosen page was keyed by at least size + slot bytes
            let slot = page.insert_tuple(&bytes);
            (slot, old_remaining, page.remaining_space() as u32)
        };
        pool.unpin_page(page_id, slot.is_some());
        let Some(slot) = slot else {
            return Err(RecordError::TupleTooLarge);
        };

        self.erase_bucket(old_remaining, page_id);
        self.insert_bucket(new_remaining, page_id);
        row.set_rid(RowId::new(page_id, slot));
        Ok(())
    }

    /// Overwrite the tuple at `rid` in place. `Ok(false)` means the new
    /// encoding does not fit and the caller falls back to delete + insert.
    pub fn update_tuple(
        &mut self,
        pool: &mut BufferPoolManager,
        row: &Row,
        rid: RowId,
    ) -> RecordResult<bool> {
        self.schema.validate_row(row.fields())?;
        let size = row.serialized_size();
        let mut bytes = vec![0u8; size];
        row.serialize_to(&mut PageWriter::new(&mut bytes), &self.schema)?;

        let page_ref = pool.fetch_page(rid.page_id)?;
        let (outcome, old_remaining, new_remaining) = {
            let mut guard = page_ref.borrow_mut();
            let mut page = TablePage::new(guard.data_mut());
            let old_remaining = page.remaining_space() as u32;
            let outcome = page.update_tuple(rid.slot, &bytes);
            (outcome, old_remaining, page.remaining_space() as u32)
        };
        match outcome {
            None => {
                pool.unpin_page(rid.page_id, false);
                Err(RecordError::TupleNotFound {
                    page_id: rid.page_id,
                    slot: rid.slot,
                })
            }
            Some(false) => {
                pool.unpin_page(rid.page_id, false);
                Ok(false)
            }
            Some(true) => {
                pool.unpin_page(rid.page_id, true);
                self.erase_bucket(old_remaining, rid.page_id);
                self.insert_bucket(new_remaining, rid.page_id);
                Ok(true)
            }
        }
    }

    /// Remove the tuple's bytes from its page. The slot becomes reusable.
    pub fn apply_delete(&mut self, pool: &mut BufferPoolManager, rid: RowId) -> RecordResult<()> {
        let page_ref = pool.fetch_page(rid.page_id)?;
        let (deleted, old_remaining, new_remaining) = {
            let mut guard = page_ref.borrow_mut();
            let mut page = TablePage::new(guard.data_mut());
            let old_remaining = page.remaining_space() as u32;
            let deleted = page.apply_delete(rid.slot);
            (deleted, old_remaining, page.remaining_space() as u32)
        };
        pool.unpin_page(rid.page_id, deleted);
        if !deleted {
            return Err(RecordError::TupleNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            });
        }
        self.erase_bucket(old_remaining, rid.page_id);
        self.insert_bucket(new_remaining, rid.page_id);
        Ok(())
    }

    /// Tombstone a tuple; bytes stay until `apply_delete`
    pub fn mark_delete(&mut self, pool: &mut BufferPoolManager, rid: RowId) -> RecordResult<()> {
        let page_ref = pool.fetch_page(rid.page_id)?;
        let marked = {
            let mut guard = page_ref.borrow_mut();
            TablePage::new(guard.data_mut()).mark_delete(rid.slot)
        };
        pool.unpin_page(rid.page_id, marked);
        if !marked {
            return Err(RecordError::TupleNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            });
        }
        Ok(())
    }

    /// Undo a pending delete
    pub fn rollback_delete(
        &mut self,
        pool: &mut BufferPoolManager,
        rid: RowId,
    ) -> RecordResult<()> {
        let page_ref = pool.fetch_page(rid.page_id)?;
        let restored = {
            let mut guard = page_ref.borrow_mut();
            TablePage::new(guard.data_mut()).rollback_delete(rid.slot)
        };
        pool.unpin_page(rid.page_id, restored);
        if !restored {
            return Err(RecordError::TupleNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            });
        }
        Ok(())
    }

    /// Populate `row` from its embedded rid
    pub fn get_tuple(&self, pool: &mut BufferPoolManager, row: &mut Row) -> RecordResult<()> {
        let rid = row.rid();
        let page_ref = pool.fetch_page(rid.page_id)?;
        let decoded = {
            let mut guard = page_ref.borrow_mut();
            let page = TablePage::new(guard.data_mut());
            page.get_tuple(rid.slot).map(|bytes| {
                let mut reader = PageReader::new(bytes);
                Row::deserialize_from(&mut reader, &self.schema)
            })
        };
        pool.unpin_page(rid.page_id, false);
        match decoded {
            Some(result) => {
                row.set_fields(result?.fields().to_vec());
                Ok(())
            }
            None => Err(RecordError::TupleNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            }),
        }
    }

    /// Collect the rids of every live tuple
    pub fn fetch_all_ids(
        &self,
        pool: &mut BufferPoolManager,
        out: &mut HashSet<RowId>,
    ) -> RecordResult<()> {
        for page_id in self.page_ids() {
            let page_ref = pool.fetch_page(page_id)?;
            {
                let mut guard = page_ref.borrow_mut();
                let page = TablePage::new(guard.data_mut());
                let mut slot = page.first_tuple_slot();
                while let Some(s) = slot {
                    out.insert(RowId::new(page_id, s));
                    slot = page.next_tuple_slot(s);
                }
            }
            pool.unpin_page(page_id, false);
        }
        Ok(())
    }

    /// Collect the rids of tuples whose decoded field at `column_index`
    /// satisfies `predicate` against `key`
    pub fn fetch_ids_matching<F>(
        &self,
        pool: &mut BufferPoolManager,
        column_index: usize,
        key: &Field,
        predicate: F,
        out: &mut HashSet<RowId>,
    ) -> RecordResult<()>
    where
        F: Fn(&Field, &Field) -> bool,
    {
        for page_id in self.page_ids() {
            let page_ref = pool.fetch_page(page_id)?;
            let matched: RecordResult<Vec<u32>> = {
                let mut guard = page_ref.borrow_mut();
                let page = TablePage::new(guard.data_mut());
                let mut slots = Vec::new();
                let mut slot = page.first_tuple_slot();
                while let Some(s) = slot {
                    let bytes = page.get_tuple(s).ok_or(RecordError::TupleNotFound {
                        page_id,
                        slot: s,
                    })?;
                    let row = Row::deserialize_from(&mut PageReader::new(bytes), &self.schema)?;
                    if let Some(field) = row.field(column_index)
                        && predicate(field, key)
                    {
                        slots.push(s);
                    }
                    slot = page.next_tuple_slot(s);
                }
                Ok(slots)
            };
            pool.unpin_page(page_id, false);
            for slot in matched? {
                out.insert(RowId::new(page_id, slot));
            }
        }
        Ok(())
    }

    /// Delete every page of the heap from the pool and disk
    pub fn free_heap(&mut self, pool: &mut BufferPoolManager) -> RecordResult<()> {
        for page_id in self.page_ids() {
            pool.delete_page(page_id)?;
        }
        self.pages.clear();
        self.first_page_id = INVALID_PAGE_ID;
        Ok(())
    }

    fn page_ids(&self) -> Vec<PageId> {
        self.pages.values().flatten().copied().collect()
    }

    /// Emptiest page that still has room for `required` bytes
    fn pick_page(&self, required: usize) -> Option<PageId> {
        self.pages.iter().next_back().and_then(|(remaining, ids)| {
            if *remaining as usize >= required {
                ids.iter().next().copied()
            } else {
                None
            }
        })
    }

    /// Allocate a page and prepend it to the chain
    fn grow(&mut self, pool: &mut BufferPoolManager) -> RecordResult<PageId> {
        let (new_page_id, page_ref) = pool.new_page()?;
        let remaining = {
            let mut guard = page_ref.borrow_mut();
            let mut page = TablePage::new(guard.data_mut());
            page.init(INVALID_PAGE_ID, self.first_page_id);
            page.remaining_space() as u32
        };
        pool.unpin_page(new_page_id, true);

        if self.first_page_id != INVALID_PAGE_ID {
            let old_ref = pool.fetch_page(self.first_page_id)?;
            {
                let mut guard = old_ref.borrow_mut();
                TablePage::new(guard.data_mut()).set_prev_page_id(new_page_id);
            }
            pool.unpin_page(self.first_page_id, true);
        }

        self.first_page_id = new_page_id;
        self.insert_bucket(remaining, new_page_id);
        Ok(new_page_id)
    }

    fn insert_bucket(&mut self, remaining: u32, page_id: PageId) {
        self.pages.entry(remaining).or_default().insert(page_id);
    }

    fn erase_bucket(&mut self, remaining: u32, page_id: PageId) {
        if let Some(bucket) = self.pages.get_mut(&remaining) {
            bucket.remove(&page_id);
            if bucket.is_empty() {
                self.pages.remove(&remaining);
            }
        }
    }
}
