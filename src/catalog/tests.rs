//! Integration tests for catalog persistence

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::rc::Rc;

    use crate::catalog::{CatalogError, CatalogManager};
    use crate::file::{BufferPoolManager, DiskManager, PageId};
    use crate::record::{Column, DataType, Field, Row, RowId, Schema};
    use tempfile::TempDir;

    fn fresh_pool(path: &Path) -> BufferPoolManager {
        let disk = DiskManager::open(path).unwrap();
        let fresh = disk.num_allocated_pages() == 0;
        let mut pool = BufferPoolManager::with_capacity(disk, 128);
        if fresh {
            // Reserve the catalog meta and index-roots pages
            assert_eq!(pool.allocate_page().unwrap(), 0);
            assert_eq!(pool.allocate_page().unwrap(), 1);
        }
        pool
    }

    fn setup() -> (TempDir, BufferPoolManager, CatalogManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut pool = fresh_pool(&temp_dir.path().join("test.db"));
        let catalog = CatalogManager::new(&mut pool, true).unwrap();
        (temp_dir, pool, catalog)
    }

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int, 0, false, true),
            Column::new("name", DataType::Char(16), 1, true, false),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_and_get_table() {
        let (_temp_dir, mut pool, mut catalog) = setup();
        let table_id = catalog
            .create_table(&mut pool, "users", sample_schema())
            .unwrap();
        assert_eq!(table_id, 0);

        let info = catalog.get_table("users").unwrap();
        assert_eq!(info.table_name(), "users");
        assert_eq!(info.schema().column_count(), 2);
        assert!(matches!(
            catalog.get_table("missing"),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.create_table(&mut pool, "users", sample_schema()),
            Err(CatalogError::TableAlreadyExists(_))
        ));
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_create_index_validation() {
        let (_temp_dir, mut pool, mut catalog) = setup();
        catalog
            .create_table(&mut pool, "users", sample_schema())
            .unwrap();

        assert!(matches!(
            catalog.create_index(&mut pool, "users", "ix", &["nope".to_string()]),
            Err(CatalogError::ColumnNotFound(_))
        ));
        // Only unique columns may be indexed
        assert!(matches!(
            catalog.create_index(&mut pool, "users", "ix", &["name".to_string()]),
            Err(CatalogError::ColumnNotUnique(_))
        ));

        catalog
            .create_index(&mut pool, "users", "ix", &["id".to_string()])
            .unwrap();
        assert!(matches!(
            catalog.create_index(&mut pool, "users", "ix", &["id".to_string()]),
            Err(CatalogError::IndexAlreadyExists(_))
        ));
        assert_eq!(catalog.get_table_indexes("users").unwrap().len(), 1);
    }

    #[test]
    fn test_catalog_survives_restart() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");
        let mut rids = HashSet::new();

        {
            let mut pool = fresh_pool(&path);
            let mut catalog = CatalogManager::new(&mut pool, true).unwrap();
            catalog
                .create_table(&mut pool, "users", sample_schema())
                .unwrap();
            catalog
                .create_index(&mut pool, "users", "ix_id", &["id".to_string()])
                .unwrap();

            for i in 0..10 {
                let mut row = Row::new(vec![
                    Field::Int(i),
                    Field::Chars(format!("user{}", i)),
                ]);
                let info = catalog.get_table_mut("users").unwrap();
                info.heap_mut().insert_tuple(&mut pool, &mut row).unwrap();
                rids.insert(row.rid());

                let schema = Rc::clone(catalog.get_table("users").unwrap().schema());
                let index = catalog.get_index_mut("users", "ix_id").unwrap();
                assert!(index.insert_entry(&mut pool, &row, &schema).unwrap());
            }

            catalog.flush_all(&mut pool).unwrap();
            pool.close().unwrap();
        }

        let mut pool = fresh_pool(&path);
        let mut catalog = CatalogManager::new(&mut pool, false).unwrap();

        // Heap contents came back
        let mut found = HashSet::new();
        catalog
            .get_table("users")
            .unwrap()
            .heap()
            .fetch_all_ids(&mut pool, &mut found)
            .unwrap();
        assert_eq!(found, rids);

        // The index still answers point lookups
        let schema = Rc::clone(catalog.get_table("users").unwrap().schema());
        let probe = Row::new(vec![Field::Int(7), Field::Null]);
        let index = catalog.get_index("users", "ix_id").unwrap();
        let key = index.key_for_row(&probe, &schema).unwrap();
        let rid = index.tree().get_value(&mut pool, &key).unwrap();
        assert!(rid.is_some_and(|rid| rids.contains(&rid)));

        // Ids keep growing after the restart
        let table_id = catalog
            .create_table(
                &mut pool,
                "other",
                Schema::new(vec![Column::new("k", DataType::Int, 0, false, true)]).unwrap(),
            )
            .unwrap();
        assert_eq!(table_id, 1);
        let index_id = catalog
            .create_index(&mut pool, "other", "ix_k", &["k".to_string()])
            .unwrap();
        assert_eq!(index_id, 1);
    }

    // Dropping a table frees its meta page and both index meta pages, and
    // the index names stop resolving.
    #[test]
    fn test_drop_table_cascades() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");
        let mut pool = fresh_pool(&path);
        let mut catalog = CatalogManager::new(&mut pool, true).unwrap();

        let schema = Schema::new(vec![
            Column::new("a", DataType::Int, 0, false, true),
            Column::new("b", DataType::Char(8), 1, false, true),
        ])
        .unwrap();
        catalog.create_table(&mut pool, "t", schema).unwrap();
        catalog
            .create_index(&mut pool, "t", "ix_a", &["a".to_string()])
            .unwrap();
        catalog
            .create_index(&mut pool, "t", "ix_b", &["b".to_string()])
            .unwrap();

        // Meta pages are 3 (table), 4 (ix_a), 5 (ix_b): allocated right
        // after the two reserved pages and the first heap page
        let meta_pages: Vec<PageId> = vec![3, 4, 5];
        for page_id in &meta_pages {
            assert!(!pool.is_page_free(*page_id).unwrap());
        }

        catalog.drop_table(&mut pool, "t").unwrap();

        for page_id in &meta_pages {
            assert!(pool.is_page_free(*page_id).unwrap());
        }
        assert!(matches!(
            catalog.get_index("t", "ix_a"),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.get_table("t"),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_drop_index_frees_tree() {
        let (_temp_dir, mut pool, mut catalog) = setup();
        catalog
            .create_table(&mut pool, "users", sample_schema())
            .unwrap();
        catalog
            .create_index(&mut pool, "users", "ix_id", &["id".to_string()])
            .unwrap();

        let schema = Rc::clone(catalog.get_table("users").unwrap().schema());
        for i in 0..50 {
            let mut row = Row::new(vec![Field::Int(i), Field::Null]);
            row.set_rid(RowId::new(2, i as u32));
            let index = catalog.get_index_mut("users", "ix_id").unwrap();
            index.insert_entry(&mut pool, &row, &schema).unwrap();
        }
        let root = catalog
            .get_index("users", "ix_id")
            .unwrap()
            .tree()
            .root_page_id();

        catalog.drop_index(&mut pool, "users", "ix_id").unwrap();
        assert!(pool.is_page_free(root).unwrap());
        assert!(matches!(
            catalog.get_index("users", "ix_id"),
            Err(CatalogError::IndexNotFound(_))
        ));
    }
}
