//! B+ tree driver: tree-wide search, insert with splitting, delete with
//! redistribute/coalesce rebalancing, range scans, and root bookkeeping.
//!
//! Nodes reference each other only by logical page id; every page access is
//! bracketed by fetch/unpin against the buffer pool.

use std::collections::HashSet;

use crate::file::{BufferPoolManager, INVALID_PAGE_ID, PageId, PageRef};
use crate::record::RowId;

use super::cursor::IndexCursor;
use super::error::{IndexError, IndexResult};
use super::key::IndexKey;
use super::node::{
    NodePage, PAGE_TYPE_INTERNAL, PAGE_TYPE_LEAF, default_internal_max_size,
    default_leaf_max_size,
};
use super::roots;

pub struct BPlusTree {
    index_id: u32,
    root_page_id: PageId,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl BPlusTree {
    pub fn new(
        index_id: u32,
        root_page_id: PageId,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Self {
        Self {
            index_id,
            root_page_id,
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn with_default_sizes(index_id: u32, root_page_id: PageId) -> Self {
        Self::new(
            index_id,
            root_page_id,
            default_leaf_max_size(),
            default_internal_max_size(),
        )
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    /// Point lookup
    pub fn get_value(
        &self,
        pool: &mut BufferPoolManager,
        key: &IndexKey,
    ) -> IndexResult<Option<RowId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (leaf_id, leaf_ref) = self.find_leaf(pool, Some(key))?;
        let found = {
            let mut guard = leaf_ref.borrow_mut();
            let leaf = NodePage::new(guard.data_mut());
            match leaf.leaf_search(key) {
                Ok(position) => Some(leaf.leaf_rid(position)),
                Err(_) => None,
            }
        };
        pool.unpin_page(leaf_id, false);
        Ok(found)
    }

    /// Insert a key/value pair. False iff the key already exists.
    pub fn insert(
        &mut self,
        pool: &mut BufferPoolManager,
        key: &IndexKey,
        rid: RowId,
    ) -> IndexResult<bool> {
        if self.is_empty() {
            self.start_new_tree(pool, key, rid)?;
            return Ok(true);
        }

        let (leaf_id, leaf_ref) = self.find_leaf(pool, Some(key))?;
        let outcome = {
            let mut guard = leaf_ref.borrow_mut();
            let mut leaf = NodePage::new(guard.data_mut());
            leaf.leaf_insert(key, rid)
                .map(|new_size| new_size > leaf.max_size())
        };
        match outcome {
            None => {
                pool.unpin_page(leaf_id, false);
                Ok(false)
            }
            Some(false) => {
                pool.unpin_page(leaf_id, true);
                Ok(true)
            }
            Some(true) => {
                let (new_leaf_id, new_leaf_ref) = pool.new_page()?;
                let middle_key = {
                    let mut old_guard = leaf_ref.borrow_mut();
                    let mut new_guard = new_leaf_ref.borrow_mut();
                    let mut old_leaf = NodePage::new(old_guard.data_mut());
                    let mut new_leaf = NodePage::new(new_guard.data_mut());
                    new_leaf.init_leaf(
                        new_leaf_id,
                        old_leaf.parent_page_id(),
                        self.leaf_max_size,
                    );
                    old_leaf.leaf_move_half_to(&mut new_leaf);
                    new_leaf.leaf_key(0)
                };
                self.insert_into_parent(pool, leaf_id, &middle_key, new_leaf_id)?;
                pool.unpin_page(leaf_id, true);
                pool.unpin_page(new_leaf_id, true);
                Ok(true)
            }
        }
    }

    /// Delete a key. Absent keys are ignored.
    pub fn remove(&mut self, pool: &mut BufferPoolManager, key: &IndexKey) -> IndexResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let (leaf_id, leaf_ref) = self.find_leaf(pool, Some(key))?;
        let removed = {
            let mut guard = leaf_ref.borrow_mut();
            let mut leaf = NodePage::new(guard.data_mut());
            leaf.leaf_remove(key)
        };
        pool.unpin_page(leaf_id, removed);
        if !removed {
            return Ok(());
        }
        self.handle_underflow(pool, leaf_id)
    }

    /// Collect values on one side of `key`, per the four
    /// `(to_left, key_included)` quadrants
    pub fn range_scan(
        &self,
        pool: &mut BufferPoolManager,
        key: &IndexKey,
        out: &mut HashSet<RowId>,
        to_left: bool,
        key_included: bool,
    ) -> IndexResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let include = |k: &IndexKey| match (to_left, k.cmp(key)) {
            (true, std::cmp::Ordering::Less) => true,
            (true, std::cmp::Ordering::Equal) => key_included,
            (true, std::cmp::Ordering::Greater) => false,
            (false, std::cmp::Ordering::Less) => false,
            (false, std::cmp::Ordering::Equal) => key_included,
            (false, std::cmp::Ordering::Greater) => true,
        };

        // Left scans start at the leftmost leaf and stop once a key falls
        // past the bound; right scans start at the target leaf and run to
        // the end of the chain.
        let (mut leaf_id, mut leaf_ref) = if to_left {
            self.find_leaf(pool, None)?
        } else {
            self.find_leaf(pool, Some(key))?
        };
        loop {
            let (next, past_bound) = {
                let mut guard = leaf_ref.borrow_mut();
                let leaf = NodePage::new(guard.data_mut());
                let mut past_bound = false;
                for position in 0..leaf.size() {
                    let entry_key = leaf.leaf_key(position);
                    if include(&entry_key) {
                        out.insert(leaf.leaf_rid(position));
                    } else if to_left && entry_key > *key {
                        past_bound = true;
                        break;
                    }
                }
                (leaf.next_page_id(), past_bound)
            };
            pool.unpin_page(leaf_id, false);
            if past_bound || next == INVALID_PAGE_ID {
                return Ok(());
            }
            leaf_id = next;
            leaf_ref = pool.fetch_page(leaf_id)?;
        }
    }

    /// Forward cursor over the whole tree
    pub fn cursor(&self, pool: &mut BufferPoolManager) -> IndexResult<IndexCursor> {
        if self.is_empty() {
            return Ok(IndexCursor::end());
        }
        let (leaf_id, _leaf_ref) = self.find_leaf(pool, None)?;
        pool.unpin_page(leaf_id, false);
        Ok(IndexCursor::at(leaf_id, 0))
    }

    /// Forward cursor positioned at the first entry >= key
    pub fn cursor_at(
        &self,
        pool: &mut BufferPoolManager,
        key: &IndexKey,
    ) -> IndexResult<IndexCursor> {
        if self.is_empty() {
            return Ok(IndexCursor::end());
        }
        let (leaf_id, leaf_ref) = self.find_leaf(pool, Some(key))?;
        let position = {
            let mut guard = leaf_ref.borrow_mut();
            let leaf = NodePage::new(guard.data_mut());
            match leaf.leaf_search(key) {
                Ok(position) | Err(position) => position,
            }
        };
        pool.unpin_page(leaf_id, false);
        Ok(IndexCursor::at(leaf_id, position))
    }

    /// Recursively delete every page of the tree and drop the root entry
    pub fn destroy(&mut self, pool: &mut BufferPoolManager) -> IndexResult<()> {
        if !self.is_empty() {
            self.destroy_node(pool, self.root_page_id)?;
        }
        roots::remove_root(pool, self.index_id)?;
        self.root_page_id = INVALID_PAGE_ID;
        Ok(())
    }

    fn destroy_node(&self, pool: &mut BufferPoolManager, page_id: PageId) -> IndexResult<()> {
        let page_ref = pool.fetch_page(page_id)?;
        let children = {
            let mut guard = page_ref.borrow_mut();
            let node = NodePage::new(guard.data_mut());
            if node.is_leaf() {
                Vec::new()
            } else {
                node.children()
            }
        };
        pool.unpin_page(page_id, false);
        for child in children {
            self.destroy_node(pool, child)?;
        }
        pool.delete_page(page_id)?;
        Ok(())
    }

    fn start_new_tree(
        &mut self,
        pool: &mut BufferPoolManager,
        key: &IndexKey,
        rid: RowId,
    ) -> IndexResult<()> {
        let (page_id, page_ref) = pool.new_page()?;
        {
            let mut guard = page_ref.borrow_mut();
            let mut leaf = NodePage::new(guard.data_mut());
            leaf.init_leaf(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.leaf_insert(key, rid);
        }
        pool.unpin_page(page_id, true);
        self.root_page_id = page_id;
        roots::set_root(pool, self.index_id, page_id)
    }

    /// Walk from the root to the leaf responsible for `key`, or to the
    /// leftmost leaf when no key is given. The returned leaf is pinned.
    fn find_leaf(
        &self,
        pool: &mut BufferPoolManager,
        key: Option<&IndexKey>,
    ) -> IndexResult<(PageId, PageRef)> {
        let mut page_id = self.root_page_id;
        loop {
            let page_ref = pool.fetch_page(page_id)?;
            let next = {
                let mut guard = page_ref.borrow_mut();
                let node = NodePage::new(guard.data_mut());
                match node.page_type() {
                    PAGE_TYPE_LEAF => Ok(None),
                    PAGE_TYPE_INTERNAL => Ok(Some(match key {
                        Some(key) => node.internal_lookup(key),
                        None => node.internal_child(0),
                    })),
                    _ => Err(IndexError::CorruptedNode(page_id)),
                }
            };
            match next {
                Ok(None) => return Ok((page_id, page_ref)),
                Ok(Some(child)) => {
                    pool.unpin_page(page_id, false);
                    page_id = child;
                }
                Err(err) => {
                    pool.unpin_page(page_id, false);
                    return Err(err);
                }
            }
        }
    }

    /// Register `right` (split off `left` under `middle_key`) with the
    /// parent, splitting upward as needed
    fn insert_into_parent(
        &mut self,
        pool: &mut BufferPoolManager,
        left_id: PageId,
        middle_key: &IndexKey,
        right_id: PageId,
    ) -> IndexResult<()> {
        let parent_id = self.parent_of(pool, left_id)?;

        if parent_id == INVALID_PAGE_ID {
            // Root split: grow the tree by one level
            let (new_root_id, root_ref) = pool.new_page()?;
            {
                let mut guard = root_ref.borrow_mut();
                let mut root = NodePage::new(guard.data_mut());
                root.init_internal(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(left_id, middle_key, right_id);
            }
            pool.unpin_page(new_root_id, true);
            self.set_parent(pool, left_id, new_root_id)?;
            self.set_parent(pool, right_id, new_root_id)?;
            self.root_page_id = new_root_id;
            return roots::set_root(pool, self.index_id, new_root_id);
        }

        let parent_ref = pool.fetch_page(parent_id)?;
        let overflow = {
            let mut guard = parent_ref.borrow_mut();
            let mut parent = NodePage::new(guard.data_mut());
            parent.internal_insert_after(left_id, middle_key, right_id);
            parent.size() > parent.max_size()
        };
        self.set_parent(pool, right_id, parent_id)?;

        if overflow {
            let (new_node_id, new_node_ref) = pool.new_page()?;
            let (split_key, moved_children) = {
                let mut parent_guard = parent_ref.borrow_mut();
                let mut new_guard = new_node_ref.borrow_mut();
                let mut parent = NodePage::new(parent_guard.data_mut());
                let mut new_node = NodePage::new(new_guard.data_mut());
                new_node.init_internal(
                    new_node_id,
                    parent.parent_page_id(),
                    self.internal_max_size,
                );
                parent.internal_move_half_to(&mut new_node);
                (new_node.internal_key(0), new_node.children())
            };
            for child in moved_children {
                self.set_parent(pool, child, new_node_id)?;
            }
            self.insert_into_parent(pool, parent_id, &split_key, new_node_id)?;
            pool.unpin_page(new_node_id, true);
        }
        pool.unpin_page(parent_id, true);
        Ok(())
    }

    /// Rebalance after a deletion left `node_id` under its minimum size
    fn handle_underflow(&mut self, pool: &mut BufferPoolManager, node_id: PageId) -> IndexResult<()> {
        if node_id == self.root_page_id {
            return self.adjust_root(pool);
        }

        let node_ref = pool.fetch_page(node_id)?;
        let (size, min_size, is_leaf, parent_id) = {
            let mut guard = node_ref.borrow_mut();
            let node = NodePage::new(guard.data_mut());
            (
                node.size(),
                node.min_size(),
                node.is_leaf(),
                node.parent_page_id(),
            )
        };
        if size >= min_size {
            pool.unpin_page(node_id, false);
            return Ok(());
        }

        // Immediate left sibling when there is one, else the right one
        let parent_ref = pool.fetch_page(parent_id)?;
        let siblings = {
            let mut guard = parent_ref.borrow_mut();
            let parent = NodePage::new(guard.data_mut());
            parent.internal_child_index(node_id).map(|node_index| {
                if node_index == 0 {
                    (node_index, parent.internal_child(1), true)
                } else {
                    (node_index, parent.internal_child(node_index - 1), false)
                }
            })
        };
        let Some((node_index, sibling_id, sibling_is_right)) = siblings else {
            pool.unpin_page(node_id, false);
            pool.unpin_page(parent_id, false);
            return Err(IndexError::CorruptedNode(parent_id));
        };

        let sibling_ref = pool.fetch_page(sibling_id)?;
        let sibling_has_spare = {
            let mut guard = sibling_ref.borrow_mut();
            let sibling = NodePage::new(guard.data_mut());
            sibling.size() > sibling.min_size()
        };

        if sibling_has_spare {
            let mut reparent = None;
            {
                let mut node_guard = node_ref.borrow_mut();
                let mut sibling_guard = sibling_ref.borrow_mut();
                let mut parent_guard = parent_ref.borrow_mut();
                let mut node = NodePage::new(node_guard.data_mut());
                let mut sibling = NodePage::new(sibling_guard.data_mut());
                let mut parent = NodePage::new(parent_guard.data_mut());

                if sibling_is_right {
                    if is_leaf {
                        sibling.leaf_move_first_to_end_of(&mut node);
                        parent.internal_set_key(1, &sibling.leaf_key(0));
                    } else {
                        let middle_key = parent.internal_key(1);
                        let new_separator = sibling.internal_key(1);
                        reparent = Some(sibling.internal_child(0));
                        sibling.internal_move_first_to_end_of(&mut node, &middle_key);
                        parent.internal_set_key(1, &new_separator);
                    }
                } else if is_leaf {
                    sibling.leaf_move_last_to_front_of(&mut node);
                    parent.internal_set_key(node_index, &node.leaf_key(0));
                } else {
                    let middle_key = parent.internal_key(node_index);
                    let last = sibling.size() - 1;
                    let new_separator = sibling.internal_key(last);
                    reparent = Some(sibling.internal_child(last));
                    sibling.internal_move_last_to_front_of(&mut node, &middle_key);
                    parent.internal_set_key(node_index, &new_separator);
                }
            }
            if let Some(child) = reparent {
                self.set_parent(pool, child, node_id)?;
            }
            pool.unpin_page(node_id, true);
            pool.unpin_page(sibling_id, true);
            pool.unpin_page(parent_id, true);
            return Ok(());
        }

        // Coalesce: the right node empties into the left one and dies
        let (left_id, right_id, separator_index) = if sibling_is_right {
            (node_id, sibling_id, 1)
        } else {
            (sibling_id, node_id, node_index)
        };
        let moved_children = {
            let (left_ref, right_ref) = if sibling_is_right {
                (&node_ref, &sibling_ref)
            } else {
                (&sibling_ref, &node_ref)
            };
            let mut left_guard = left_ref.borrow_mut();
            let mut right_guard = right_ref.borrow_mut();
            let mut parent_guard = parent_ref.borrow_mut();
            let mut left = NodePage::new(left_guard.data_mut());
            let mut right = NodePage::new(right_guard.data_mut());
            let mut parent = NodePage::new(parent_guard.data_mut());

            let moved = if is_leaf {
                right.leaf_move_all_to(&mut left);
                Vec::new()
            } else {
                let middle_key = parent.internal_key(separator_index);
                let moved = right.children();
                right.internal_move_all_to(&mut left, &middle_key);
                moved
            };
            parent.internal_remove(separator_index);
            moved
        };
        for child in moved_children {
            self.set_parent(pool, child, left_id)?;
        }
        pool.unpin_page(node_id, true);
        pool.unpin_page(sibling_id, true);
        pool.unpin_page(parent_id, true);
        pool.delete_page(right_id)?;

        self.handle_underflow(pool, parent_id)
    }

    /// Shrink at the top: an empty root leaf stays (empty tree keeps its
    /// root page); an internal root with a single child promotes the child
    /// and frees itself.
    fn adjust_root(&mut self, pool: &mut BufferPoolManager) -> IndexResult<()> {
        let root_id = self.root_page_id;
        let root_ref = pool.fetch_page(root_id)?;
        let only_child = {
            let mut guard = root_ref.borrow_mut();
            let root = NodePage::new(guard.data_mut());
            if !root.is_leaf() && root.size() == 1 {
                Some(root.internal_child(0))
            } else {
                None
            }
        };
        pool.unpin_page(root_id, false);

        if let Some(child) = only_child {
            self.set_parent(pool, child, INVALID_PAGE_ID)?;
            self.root_page_id = child;
            roots::set_root(pool, self.index_id, child)?;
            pool.delete_page(root_id)?;
        }
        Ok(())
    }

    fn parent_of(&self, pool: &mut BufferPoolManager, page_id: PageId) -> IndexResult<PageId> {
        let page_ref = pool.fetch_page(page_id)?;
        let parent = {
            let mut guard = page_ref.borrow_mut();
            NodePage::new(guard.data_mut()).parent_page_id()
        };
        pool.unpin_page(page_id, false);
        Ok(parent)
    }

    fn set_parent(
        &self,
        pool: &mut BufferPoolManager,
        page_id: PageId,
        parent: PageId,
    ) -> IndexResult<()> {
        let page_ref = pool.fetch_page(page_id)?;
        {
            let mut guard = page_ref.borrow_mut();
            NodePage::new(guard.data_mut()).set_parent_page_id(parent);
        }
        pool.unpin_page(page_id, true);
        Ok(())
    }
}
