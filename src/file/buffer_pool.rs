//! Fixed pool of in-memory frames caching disk pages, with pin counts and
//! dirty tracking. Every page access goes fetch/new followed by exactly one
//! unpin carrying the dirty flag; frames with pin count zero become eviction
//! candidates.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::disk_manager::DiskManager;
use super::error::{FileError, FileResult};
use super::lru_replacer::LruReplacer;
use super::{BUFFER_POOL_SIZE, INVALID_PAGE_ID, PAGE_SIZE, PageId};

/// One frame's content: a page's bytes plus residency metadata
pub struct Page {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
    data: Vec<u8>,
}

impl Page {
    fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
            data: vec![0u8; PAGE_SIZE],
        }
    }

    pub fn id(&self) -> PageId {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Shared handle to a pinned page. Valid until the matching unpin.
pub type PageRef = Rc<RefCell<Page>>;

pub struct BufferPoolManager {
    disk: DiskManager,
    frames: Vec<PageRef>,
    page_table: HashMap<PageId, usize>,
    free_list: VecDeque<usize>,
    replacer: LruReplacer,
}

impl BufferPoolManager {
    pub fn new(disk: DiskManager) -> Self {
        Self::with_capacity(disk, BUFFER_POOL_SIZE)
    }

    pub fn with_capacity(disk: DiskManager, pool_size: usize) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            frames.push(Rc::new(RefCell::new(Page::new())));
            free_list.push_back(i);
        }
        Self {
            disk,
            frames,
            page_table: HashMap::new(),
            free_list,
            replacer: LruReplacer::new(pool_size),
        }
    }

    /// Pin a page, reading it from disk when not resident. Fails with
    /// `PoolExhausted` when every frame is pinned.
    pub fn fetch_page(&mut self, page_id: PageId) -> FileResult<PageRef> {
        if page_id == INVALID_PAGE_ID {
            return Err(FileError::InvalidPageId(page_id));
        }
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            self.frames[frame_id].borrow_mut().pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(Rc::clone(&self.frames[frame_id]));
        }

        let frame_id = self.take_frame()?;
        let read = {
            let mut page = self.frames[frame_id].borrow_mut();
            let read = self.disk.read_page(page_id, &mut page.data);
            if read.is_ok() {
                page.page_id = page_id;
                page.pin_count = 1;
                page.is_dirty = false;
            }
            read
        };
        if let Err(err) = read {
            self.free_list.push_front(frame_id);
            return Err(err);
        }
        self.page_table.insert(page_id, frame_id);
        Ok(Rc::clone(&self.frames[frame_id]))
    }

    /// Allocate a fresh page on disk and pin a zeroed frame for it
    pub fn new_page(&mut self) -> FileResult<(PageId, PageRef)> {
        let frame_id = self.take_frame()?;
        let page_id = match self.disk.allocate() {
            Ok(id) => id,
            Err(err) => {
                self.free_list.push_front(frame_id);
                return Err(err);
            }
        };
        {
            let mut page = self.frames[frame_id].borrow_mut();
            page.data.fill(0);
            page.page_id = page_id;
            page.pin_count = 1;
            page.is_dirty = false;
        }
        self.page_table.insert(page_id, frame_id);
        Ok((page_id, Rc::clone(&self.frames[frame_id])))
    }

    /// Drop one pin and OR the dirty flag in. When the pin count reaches
    /// zero the frame becomes an eviction candidate. Returns false for
    /// non-resident or unpinned pages.
    pub fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> bool {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return false;
        };
        let mut page = self.frames[frame_id].borrow_mut();
        if page.pin_count == 0 {
            return false;
        }
        if is_dirty {
            page.is_dirty = true;
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Write a resident page's current bytes to disk, whatever the dirty
    /// flag or pin count, and clear the flag. Returns false when not
    /// resident.
    pub fn flush_page(&mut self, page_id: PageId) -> FileResult<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        let mut page = self.frames[frame_id].borrow_mut();
        self.disk.write_page(page_id, &page.data)?;
        page.is_dirty = false;
        Ok(true)
    }

    /// Write every dirty resident page back and sync the file
    pub fn flush_all(&mut self) -> FileResult<()> {
        for (&page_id, &frame_id) in &self.page_table {
            let mut page = self.frames[frame_id].borrow_mut();
            if page.is_dirty {
                self.disk.write_page(page_id, &page.data)?;
                page.is_dirty = false;
            }
        }
        self.disk.sync()
    }

    /// Remove a page from the pool and release its id on disk. Fails (false)
    /// when the page is resident with a non-zero pin count.
    pub fn delete_page(&mut self, page_id: PageId) -> FileResult<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            self.disk.deallocate(page_id)?;
            return Ok(true);
        };
        {
            let mut page = self.frames[frame_id].borrow_mut();
            if page.pin_count > 0 {
                return Ok(false);
            }
            page.page_id = INVALID_PAGE_ID;
            page.is_dirty = false;
            page.data.fill(0);
        }
        self.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        self.free_list.push_back(frame_id);
        self.disk.deallocate(page_id)?;
        Ok(true)
    }

    pub fn is_page_free(&mut self, page_id: PageId) -> FileResult<bool> {
        self.disk.is_free(page_id)
    }

    pub fn allocate_page(&mut self) -> FileResult<PageId> {
        self.disk.allocate()
    }

    /// True when no frame carries an outstanding pin. Checked at points of
    /// quiescence by tests and the engine teardown.
    pub fn check_all_unpinned(&self) -> bool {
        self.frames.iter().all(|frame| frame.borrow().pin_count == 0)
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Flush everything and close the underlying file
    pub fn close(&mut self) -> FileResult<()> {
        self.flush_all()?;
        self.disk.close()
    }

    /// Free list first, then a replacer victim; dirty victims are written
    /// back before the frame is reused.
    fn take_frame(&mut self) -> FileResult<usize> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }
        let frame_id = self.replacer.victim().ok_or(FileError::PoolExhausted)?;
        {
            let mut page = self.frames[frame_id].borrow_mut();
            if page.page_id != INVALID_PAGE_ID {
                if page.is_dirty {
                    self.disk.write_page(page.page_id, &page.data)?;
                    page.is_dirty = false;
                }
                self.page_table.remove(&page.page_id);
            }
        }
        Ok(frame_id)
    }
}
