//! Integration tests for the B+ tree index layer

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::file::{BufferPoolManager, DiskManager, INVALID_PAGE_ID};
    use crate::index::{BPlusTree, IndexKey, load_root};
    use crate::record::{Column, DataType, Field, RowId};
    use tempfile::TempDir;

    fn setup(pool_size: usize) -> (TempDir, BufferPoolManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::open(temp_dir.path().join("test.db")).unwrap();
        let mut pool = BufferPoolManager::with_capacity(disk, pool_size);
        // Reserve the catalog and index-roots pages
        pool.allocate_page().unwrap();
        pool.allocate_page().unwrap();
        (temp_dir, pool)
    }

    fn key(value: i32) -> IndexKey {
        let column = Column::new("k", DataType::Int, 0, false, true);
        IndexKey::from_fields(&[&Field::Int(value)], &[&column]).unwrap()
    }

    fn rid(value: i32) -> RowId {
        RowId::new((value / 10) as u32 + 2, (value % 10) as u32)
    }

    /// Deterministic shuffle: i -> (i * step) % n for a step coprime to n
    fn shuffled(n: i32, step: i32) -> Vec<i32> {
        (0..n).map(|i| (i * step) % n).collect()
    }

    #[test]
    fn test_insert_and_get_with_splits() {
        let (_temp_dir, mut pool) = setup(256);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        assert!(tree.is_empty());

        for value in shuffled(200, 61) {
            assert!(tree.insert(&mut pool, &key(value), rid(value)).unwrap());
        }
        assert!(!tree.is_empty());
        for value in 0..200 {
            assert_eq!(
                tree.get_value(&mut pool, &key(value)).unwrap(),
                Some(rid(value))
            );
        }
        assert_eq!(tree.get_value(&mut pool, &key(777)).unwrap(), None);
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_duplicate_insert_refused() {
        let (_temp_dir, mut pool) = setup(64);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        assert!(tree.insert(&mut pool, &key(5), rid(5)).unwrap());
        assert!(!tree.insert(&mut pool, &key(5), rid(6)).unwrap());
        // Original value untouched
        assert_eq!(tree.get_value(&mut pool, &key(5)).unwrap(), Some(rid(5)));
    }

    #[test]
    fn test_leaf_chain_is_sorted_traversal() {
        let (_temp_dir, mut pool) = setup(256);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        for value in shuffled(150, 77) {
            tree.insert(&mut pool, &key(value), rid(value)).unwrap();
        }
        let mut cursor = tree.cursor(&mut pool).unwrap();
        let mut seen = Vec::new();
        while let Some((entry_key, _)) = cursor.next(&mut pool).unwrap() {
            seen.push(entry_key);
        }
        assert_eq!(seen.len(), 150);
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_cursor_at_key() {
        let (_temp_dir, mut pool) = setup(64);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        for value in [10, 20, 30, 40, 50] {
            tree.insert(&mut pool, &key(value), rid(value)).unwrap();
        }
        let mut cursor = tree.cursor_at(&mut pool, &key(25)).unwrap();
        let (first, _) = cursor.next(&mut pool).unwrap().unwrap();
        assert_eq!(first, key(30));

        let mut cursor = tree.cursor_at(&mut pool, &key(30)).unwrap();
        let (first, _) = cursor.next(&mut pool).unwrap().unwrap();
        assert_eq!(first, key(30));
    }

    // Shuffled insert of 0..600, shuffled removal of half, membership and
    // stored values checked both ways.
    #[test]
    fn test_churn_insert_then_remove_half() {
        let (_temp_dir, mut pool) = setup(256);
        let mut tree = BPlusTree::with_default_sizes(1, INVALID_PAGE_ID);

        for value in shuffled(600, 337) {
            assert!(tree.insert(&mut pool, &key(value), rid(value)).unwrap());
        }
        for value in 0..600 {
            assert_eq!(
                tree.get_value(&mut pool, &key(value)).unwrap(),
                Some(rid(value))
            );
        }

        let removed: Vec<i32> = shuffled(600, 211).into_iter().take(300).collect();
        for value in &removed {
            tree.remove(&mut pool, &key(*value)).unwrap();
        }
        let removed_set: HashSet<i32> = removed.iter().copied().collect();
        for value in 0..600 {
            let found = tree.get_value(&mut pool, &key(value)).unwrap();
            if removed_set.contains(&value) {
                assert_eq!(found, None);
            } else {
                assert_eq!(found, Some(rid(value)));
            }
        }
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_remove_with_deep_rebalance() {
        let (_temp_dir, mut pool) = setup(256);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        for value in shuffled(120, 49) {
            tree.insert(&mut pool, &key(value), rid(value)).unwrap();
        }
        // Remove everything in a different shuffled order; every removal
        // path (redistribute, coalesce, root collapse) gets exercised.
        for value in shuffled(120, 91) {
            tree.remove(&mut pool, &key(value)).unwrap();
            assert_eq!(tree.get_value(&mut pool, &key(value)).unwrap(), None);
        }
        // Tree drained down to an empty root leaf
        assert!(!tree.is_empty());
        let mut cursor = tree.cursor(&mut pool).unwrap();
        assert!(cursor.next(&mut pool).unwrap().is_none());

        // And it still accepts new keys
        assert!(tree.insert(&mut pool, &key(7), rid(7)).unwrap());
        assert_eq!(tree.get_value(&mut pool, &key(7)).unwrap(), Some(rid(7)));
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let (_temp_dir, mut pool) = setup(64);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        tree.remove(&mut pool, &key(1)).unwrap();
        tree.insert(&mut pool, &key(1), rid(1)).unwrap();
        tree.remove(&mut pool, &key(2)).unwrap();
        assert_eq!(tree.get_value(&mut pool, &key(1)).unwrap(), Some(rid(1)));
    }

    #[test]
    fn test_range_scan_quadrants() {
        let (_temp_dir, mut pool) = setup(128);
        let mut tree = BPlusTree::new(1, INVALID_PAGE_ID, 4, 4);
        for value in 0..50 {
            tree.insert(&mut pool, &key(value), rid(value)).unwrap();
        }
        let expect = |range: Vec<i32>| -> HashSet<RowId> { range.into_iter().map(rid).collect() };

        let mut out = HashSet::new();
        tree.range_scan(&mut pool, &key(25), &mut out, true, false)
            .unwrap();
        assert_eq!(out, expect((0..25).collect()));

        out.clear();
        tree.range_scan(&mut pool, &key(25), &mut out, true, true)
            .unwrap();
        assert_eq!(out, expect((0..=25).collect()));

        out.clear();
        tree.range_scan(&mut pool, &key(25), &mut out, false, false)
            .unwrap();
        assert_eq!(out, expect((26..50).collect()));

        out.clear();
        tree.range_scan(&mut pool, &key(25), &mut out, false, true)
            .unwrap();
        assert_eq!(out, expect((25..50).collect()));
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_root_recorded_in_roots_page() {
        let (_temp_dir, mut pool) = setup(128);
        let mut tree = BPlusTree::new(9, INVALID_PAGE_ID, 4, 4);
        tree.insert(&mut pool, &key(1), rid(1)).unwrap();
        assert_eq!(load_root(&mut pool, 9).unwrap(), Some(tree.root_page_id()));

        // Enough inserts to split the root a few times
        for value in 2..60 {
            tree.insert(&mut pool, &key(value), rid(value)).unwrap();
        }
        assert_eq!(load_root(&mut pool, 9).unwrap(), Some(tree.root_page_id()));
    }

    #[test]
    fn test_reopen_from_recorded_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");
        {
            let disk = DiskManager::open(&path).unwrap();
            let mut pool = BufferPoolManager::with_capacity(disk, 128);
            pool.allocate_page().unwrap();
            pool.allocate_page().unwrap();
            let mut tree = BPlusTree::new(4, INVALID_PAGE_ID, 4, 4);
            for value in 0..40 {
                tree.insert(&mut pool, &key(value), rid(value)).unwrap();
            }
            pool.close().unwrap();
        }

        let disk = DiskManager::open(&path).unwrap();
        let mut pool = BufferPoolManager::with_capacity(disk, 128);
        let root = load_root(&mut pool, 4).unwrap().unwrap();
        let tree = BPlusTree::new(4, root, 4, 4);
        for value in 0..40 {
            assert_eq!(
                tree.get_value(&mut pool, &key(value)).unwrap(),
                Some(rid(value))
            );
        }
    }

    #[test]
    fn test_destroy_frees_pages() {
        let (_temp_dir, mut pool) = setup(128);
        let mut tree = BPlusTree::new(2, INVALID_PAGE_ID, 4, 4);
        for value in 0..80 {
            tree.insert(&mut pool, &key(value), rid(value)).unwrap();
        }
        let root = tree.root_page_id();
        tree.destroy(&mut pool).unwrap();
        assert!(tree.is_empty());
        assert!(pool.is_page_free(root).unwrap());
        assert_eq!(load_root(&mut pool, 2).unwrap(), None);
        assert!(pool.check_all_unpinned());
    }
}
