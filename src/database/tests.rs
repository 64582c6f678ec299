use super::*;
use tempfile::TempDir;

fn setup() -> (TempDir, DatabaseManager) {
    let temp_dir = TempDir::new().unwrap();
    let manager = DatabaseManager::new(temp_dir.path()).unwrap();
    (temp_dir, manager)
}

fn exec(manager: &mut DatabaseManager, sql: &str) -> DatabaseResult<QueryResult> {
    let mut statements = crate::parser::parse(sql).unwrap();
    assert_eq!(statements.len(), 1, "exec takes a single statement");
    manager.execute(statements.remove(0))
}

fn result_rows(result: QueryResult) -> Vec<Vec<String>> {
    match result {
        QueryResult::ResultSet { rows, .. } => rows,
        other => panic!("expected a result set, got {:?}", other),
    }
}

fn row_set(result: QueryResult) -> HashSet<Vec<String>> {
    result_rows(result).into_iter().collect()
}

#[test]
fn test_database_lifecycle() {
    let (_temp_dir, mut manager) = setup();

    assert_eq!(
        exec(&mut manager, "show databases;").unwrap(),
        QueryResult::List(vec![])
    );

    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "create database blog;").unwrap();
    assert_eq!(
        exec(&mut manager, "show databases;").unwrap(),
        QueryResult::List(vec!["blog".into(), "shop".into()])
    );

    assert!(matches!(
        exec(&mut manager, "create database shop;"),
        Err(DatabaseError::DatabaseExists(_))
    ));
    assert!(matches!(
        exec(&mut manager, "use missing;"),
        Err(DatabaseError::DatabaseNotFound(_))
    ));
    assert!(matches!(
        exec(&mut manager, "show tables;"),
        Err(DatabaseError::NoDatabaseSelected)
    ));

    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "drop database blog;").unwrap();
    assert_eq!(
        exec(&mut manager, "show databases;").unwrap(),
        QueryResult::List(vec!["shop".into()])
    );
    assert!(matches!(
        exec(&mut manager, "drop database blog;"),
        Err(DatabaseError::DatabaseNotFound(_))
    ));
}

#[test]
fn test_create_insert_select() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(
        &mut manager,
        "create table items(id int unique not null, name char(16), price float);",
    )
    .unwrap();
    assert_eq!(
        exec(&mut manager, "show tables;").unwrap(),
        QueryResult::List(vec!["items".into()])
    );

    let result = exec(
        &mut manager,
        "insert into items values (1, 'apple', 1.5), (2, 'pear', 2.25), (3, null, 0.5);",
    )
    .unwrap();
    assert_eq!(result, QueryResult::RowsAffected(3));

    let rows = row_set(exec(&mut manager, "select * from items;").unwrap());
    let expected: HashSet<Vec<String>> = [
        vec!["1".to_string(), "apple".to_string(), "1.5".to_string()],
        vec!["2".to_string(), "pear".to_string(), "2.25".to_string()],
        vec!["3".to_string(), "NULL".to_string(), "0.5".to_string()],
    ]
    .into_iter()
    .collect();
    assert_eq!(rows, expected);

    // Projection keeps the requested column order
    let result = exec(&mut manager, "select name, id from items where id = 1;").unwrap();
    assert_eq!(
        result,
        QueryResult::ResultSet {
            headers: vec!["name".into(), "id".into()],
            rows: vec![vec!["apple".into(), "1".into()]],
        }
    );
}

#[test]
fn test_insert_validation() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(
        &mut manager,
        "create table t(a int unique not null, b char(4));",
    )
    .unwrap();

    assert!(matches!(
        exec(&mut manager, "insert into t values (1);"),
        Err(DatabaseError::ColumnCountMismatch { .. })
    ));
    assert!(matches!(
        exec(&mut manager, "insert into t values ('x', 'y');"),
        Err(DatabaseError::TypeMismatch { .. })
    ));
    assert!(matches!(
        exec(&mut manager, "insert into t values (null, 'y');"),
        Err(DatabaseError::Record(RecordError::NullViolation(_)))
    ));
    assert!(matches!(
        exec(&mut manager, "insert into t values (1, 'toolong');"),
        Err(DatabaseError::Record(RecordError::CharTooLong { .. }))
    ));

    exec(&mut manager, "insert into t values (1, 'ok');").unwrap();
    // Unique enforced by heap scan (no index yet)
    assert!(matches!(
        exec(&mut manager, "insert into t values (1, 'no');"),
        Err(DatabaseError::KeyConstraintViolated(_))
    ));
}

// Index-backed lookup: point query and >= range over a unique column
#[test]
fn test_index_backed_select() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(a int unique, b char(8));").unwrap();
    exec(
        &mut manager,
        "insert into t values (1, 'x'), (2, 'y'), (3, 'z');",
    )
    .unwrap();
    exec(&mut manager, "create index ix on t(a);").unwrap();
    assert_eq!(
        exec(&mut manager, "show indexes;").unwrap(),
        QueryResult::List(vec!["t.ix (a)".into()])
    );

    let rows = result_rows(exec(&mut manager, "select * from t where a = 2;").unwrap());
    assert_eq!(rows, vec![vec!["2".to_string(), "y".to_string()]]);

    let rows = row_set(exec(&mut manager, "select * from t where a >= 2;").unwrap());
    let expected: HashSet<Vec<String>> = [
        vec!["2".to_string(), "y".to_string()],
        vec!["3".to_string(), "z".to_string()],
    ]
    .into_iter()
    .collect();
    assert_eq!(rows, expected);

    let rows = result_rows(exec(&mut manager, "select * from t where a < 2;").unwrap());
    assert_eq!(rows, vec![vec!["1".to_string(), "x".to_string()]]);

    // A unique-key collision is now caught by the index
    assert!(matches!(
        exec(&mut manager, "insert into t values (2, 'dup');"),
        Err(DatabaseError::KeyConstraintViolated(_))
    ));

    // Only unique columns may be indexed
    exec(&mut manager, "create table u(a int unique, b int);").unwrap();
    assert!(matches!(
        exec(&mut manager, "create index bad on u(b);"),
        Err(DatabaseError::Catalog(CatalogError::ColumnNotUnique(_)))
    ));
}

// A CHAR literal wider than the column matches nothing, with or without an
// index, and never reaches the index as a truncated key
#[test]
fn test_overlong_char_literal() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(b char(4) unique);").unwrap();
    exec(&mut manager, "create index ix on t(b);").unwrap();
    exec(&mut manager, "insert into t values ('tool');").unwrap();

    let rows = result_rows(exec(&mut manager, "select * from t where b = 'toolongstring';").unwrap());
    assert!(rows.is_empty());
    // Range comparisons agree with plain string ordering
    let rows = result_rows(exec(&mut manager, "select * from t where b < 'toolongstring';").unwrap());
    assert_eq!(rows, vec![vec!["tool".to_string()]]);

    // An over-length value is a length violation, not a key collision
    assert!(matches!(
        exec(&mut manager, "insert into t values ('toolongstring');"),
        Err(DatabaseError::Record(RecordError::CharTooLong { .. }))
    ));
    assert!(matches!(
        exec(&mut manager, "update t set b = 'toolongstring';"),
        Err(DatabaseError::Record(RecordError::CharTooLong { .. }))
    ));
}

#[test]
fn test_delete_maintains_indexes() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(a int unique, b char(8));").unwrap();
    exec(&mut manager, "create index ix on t(a);").unwrap();
    exec(
        &mut manager,
        "insert into t values (1, 'x'), (2, 'y'), (3, 'z');",
    )
    .unwrap();

    assert_eq!(
        exec(&mut manager, "delete from t where a = 2;").unwrap(),
        QueryResult::RowsAffected(1)
    );
    let rows = result_rows(exec(&mut manager, "select * from t where a = 2;").unwrap());
    assert!(rows.is_empty());

    // The index entry is gone, so the key can be reused
    exec(&mut manager, "insert into t values (2, 'back');").unwrap();
    let rows = result_rows(exec(&mut manager, "select * from t where a = 2;").unwrap());
    assert_eq!(rows, vec![vec!["2".to_string(), "back".to_string()]]);

    assert_eq!(
        exec(&mut manager, "delete from t;").unwrap(),
        QueryResult::RowsAffected(3)
    );
    let rows = result_rows(exec(&mut manager, "select * from t;").unwrap());
    assert!(rows.is_empty());
}

#[test]
fn test_update_indexed_column() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(a int unique, b char(8));").unwrap();
    exec(&mut manager, "create index ix on t(a);").unwrap();
    exec(
        &mut manager,
        "insert into t values (1, 'x'), (2, 'y');",
    )
    .unwrap();

    assert_eq!(
        exec(&mut manager, "update t set a = 9 where a = 2;").unwrap(),
        QueryResult::RowsAffected(1)
    );

    // Old key gone, new key resolves through the index
    assert!(result_rows(exec(&mut manager, "select * from t where a = 2;").unwrap()).is_empty());
    let rows = result_rows(exec(&mut manager, "select * from t where a = 9;").unwrap());
    assert_eq!(rows, vec![vec!["9".to_string(), "y".to_string()]]);

    // Updating into an existing key is refused
    assert!(matches!(
        exec(&mut manager, "update t set a = 1 where a = 9;"),
        Err(DatabaseError::KeyConstraintViolated(_))
    ));
    // Updating a row onto its own key is fine
    exec(&mut manager, "update t set a = 9 where a = 9;").unwrap();
}

#[test]
fn test_update_grows_tuple_across_pages() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(
        &mut manager,
        "create table t(id int unique, blob char(2000));",
    )
    .unwrap();

    // Fill the first page almost to the brim
    for i in 0..20 {
        exec(
            &mut manager,
            &format!("insert into t values ({}, '{}');", i, "v".repeat(180)),
        )
        .unwrap();
    }

    // Growing one tuple past the page's free space falls back to
    // delete + insert; the row survives with its new contents
    exec(
        &mut manager,
        &format!("update t set blob = '{}' where id = 0;", "w".repeat(1500)),
    )
    .unwrap();

    let rows = result_rows(exec(&mut manager, "select * from t where id = 0;").unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], "w".repeat(1500));
    // Nothing else was disturbed
    let rows = result_rows(exec(&mut manager, "select * from t;").unwrap());
    assert_eq!(rows.len(), 20);
}

#[test]
fn test_predicates_without_index() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(a int, b char(8));").unwrap();
    exec(
        &mut manager,
        "insert into t values (1, 'x'), (2, 'y'), (3, null), (2, 'yy');",
    )
    .unwrap();

    let rows = row_set(exec(&mut manager, "select b from t where a = 2;").unwrap());
    let expected: HashSet<Vec<String>> =
        [vec!["y".to_string()], vec!["yy".to_string()]].into_iter().collect();
    assert_eq!(rows, expected);

    // NULL never matches a comparison, <> included
    let rows = result_rows(exec(&mut manager, "select b from t where b <> 'x';").unwrap());
    assert_eq!(rows.len(), 2);

    let rows = result_rows(exec(&mut manager, "select a from t where a <= 1;").unwrap());
    assert_eq!(rows, vec![vec!["1".to_string()]]);
}

#[test]
fn test_drop_index_falls_back_to_scan() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(a int unique, b char(8));").unwrap();
    exec(&mut manager, "create index ix on t(a);").unwrap();
    exec(&mut manager, "insert into t values (1, 'x'), (2, 'y');").unwrap();

    exec(&mut manager, "drop index ix;").unwrap();
    assert_eq!(
        exec(&mut manager, "show indexes;").unwrap(),
        QueryResult::List(vec![])
    );
    assert!(matches!(
        exec(&mut manager, "drop index ix;"),
        Err(DatabaseError::Catalog(CatalogError::IndexNotFound(_)))
    ));

    let rows = result_rows(exec(&mut manager, "select * from t where a = 2;").unwrap());
    assert_eq!(rows, vec![vec!["2".to_string(), "y".to_string()]]);
}

#[test]
fn test_drop_table_cascades_indexes() {
    let (_temp_dir, mut manager) = setup();
    exec(&mut manager, "create database shop;").unwrap();
    exec(&mut manager, "use shop;").unwrap();
    exec(&mut manager, "create table t(a int unique, b char(8) unique);").unwrap();
    exec(&mut manager, "create index ix_a on t(a);").unwrap();
    exec(&mut manager, "create index ix_b on t(b);").unwrap();

    exec(&mut manager, "drop table t;").unwrap();
    assert_eq!(
        exec(&mut manager, "show tables;").unwrap(),
        QueryResult::List(vec![])
    );
    assert_eq!(
        exec(&mut manager, "show indexes;").unwrap(),
        QueryResult::List(vec![])
    );
    assert!(matches!(
        exec(&mut manager, "drop index ix_a;"),
        Err(DatabaseError::Catalog(CatalogError::IndexNotFound(_)))
    ));
}

// Rows and indexes survive a full shutdown and reopen
#[test]
fn test_durability_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let mut expected = HashSet::new();

    {
        let mut manager = DatabaseManager::new(temp_dir.path()).unwrap();
        exec(&mut manager, "create database shop;").unwrap();
        exec(&mut manager, "use shop;").unwrap();
        exec(&mut manager, "create table t(i int unique, b char(8));").unwrap();
        exec(&mut manager, "create index ix on t(i);").unwrap();
        for i in 0..10 {
            exec(
                &mut manager,
                &format!("insert into t values ({}, 'r{}');", i, i),
            )
            .unwrap();
            expected.insert(vec![i.to_string(), format!("r{}", i)]);
        }
        manager.shutdown().unwrap();
    }

    let mut manager = DatabaseManager::new(temp_dir.path()).unwrap();
    assert_eq!(
        exec(&mut manager, "show databases;").unwrap(),
        QueryResult::List(vec!["shop".into()])
    );
    exec(&mut manager, "use shop;").unwrap();

    let rows = row_set(exec(&mut manager, "select * from t;").unwrap());
    assert_eq!(rows, expected);

    // The reopened index answers point queries
    let rows = result_rows(exec(&mut manager, "select * from t where i = 7;").unwrap());
    assert_eq!(rows, vec![vec!["7".to_string(), "r7".to_string()]]);

    // And keeps enforcing uniqueness
    assert!(matches!(
        exec(&mut manager, "insert into t values (7, 'dup');"),
        Err(DatabaseError::KeyConstraintViolated(_))
    ));
    manager.shutdown().unwrap();
}
