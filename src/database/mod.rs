//! Top-level engine and statement executor.
//!
//! `DatabaseManager` owns one `StorageEngine` per open database file (all
//! under a single data directory) and walks parsed statements against the
//! current database. Index maintenance follows the storage contract: an
//! index is populated from a full scan at creation, updates touch every
//! affected index as delete-entry then insert-entry, and deletes remove
//! index entries before the heap tuple.

mod engine;

#[cfg(test)]
mod tests;

pub use engine::StorageEngine;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::catalog::{CatalogError, CatalogManager, IndexId};
use crate::file::{BufferPoolManager, FileError};
use crate::index::{IndexError, IndexKey};
use crate::parser::{ColumnSpec, CompareOp, Literal, Predicate, Statement, TypeName};
use crate::record::{Column, DataType, Field, RecordError, Row, RowId, Schema};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database {0} already exists")]
    DatabaseExists(String),

    #[error("Database {0} not found")]
    DatabaseNotFound(String),

    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("Database file is corrupted: {0}")]
    Corrupted(String),

    #[error("Column {0} not found in table {1}")]
    ColumnNotFound(String, String),

    #[error("Value for column {column} has the wrong type: expected {expected}")]
    TypeMismatch { column: String, expected: String },

    #[error("Expected {expected} values, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("Duplicate value for unique column {0}")]
    KeyConstraintViolated(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, PartialEq)]
pub enum QueryResult {
    Empty,
    RowsAffected(usize),
    ResultSet {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    List(Vec<String>),
}

/// All open databases plus the currently selected one
pub struct DatabaseManager {
    data_dir: PathBuf,
    databases: HashMap<String, StorageEngine>,
    current: Option<String>,
}

impl DatabaseManager {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> DatabaseResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            databases: HashMap::new(),
            current: None,
        })
    }

    pub fn execute(&mut self, statement: Statement) -> DatabaseResult<QueryResult> {
        match statement {
            Statement::CreateDatabase(name) => self.create_database(&name),
            Statement::DropDatabase(name) => self.drop_database(&name),
            Statement::ShowDatabases => self.show_databases(),
            Statement::UseDatabase(name) => self.use_database(&name),
            Statement::ShowTables => self.show_tables(),
            Statement::ShowIndexes => self.show_indexes(),
            Statement::CreateTable(name, columns) => self.create_table(&name, &columns),
            Statement::DropTable(name) => self.drop_table(&name),
            Statement::CreateIndex {
                index_name,
                table_name,
                columns,
            } => self.create_index(&index_name, &table_name, &columns),
            Statement::DropIndex(name) => self.drop_index(&name),
            Statement::Select {
                table_name,
                columns,
                predicate,
            } => self.select(&table_name, columns.as_deref(), predicate.as_ref()),
            Statement::Insert { table_name, rows } => self.insert(&table_name, &rows),
            Statement::Delete {
                table_name,
                predicate,
            } => self.delete(&table_name, predicate.as_ref()),
            Statement::Update {
                table_name,
                assignments,
                predicate,
            } => self.update(&table_name, &assignments, predicate.as_ref()),
            // The shell intercepts these; treat them as no-ops here
            Statement::Quit | Statement::ExecFile(_) => Ok(QueryResult::Empty),
        }
    }

    /// Flush and close every open database
    pub fn shutdown(&mut self) -> DatabaseResult<()> {
        for engine in self.databases.values_mut() {
            engine.close()?;
        }
        self.databases.clear();
        self.current = None;
        Ok(())
    }

    fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.db", name))
    }

    fn create_database(&mut self, name: &str) -> DatabaseResult<QueryResult> {
        let path = self.database_path(name);
        if path.exists() {
            return Err(DatabaseError::DatabaseExists(name.to_string()));
        }
        let engine = StorageEngine::open(&path)?;
        self.databases.insert(name.to_string(), engine);
        Ok(QueryResult::Empty)
    }

    fn drop_database(&mut self, name: &str) -> DatabaseResult<QueryResult> {
        let path = self.database_path(name);
        if !path.exists() {
            return Err(DatabaseError::DatabaseNotFound(name.to_string()));
        }
        // Dropped without flushing: the file is going away anyway
        self.databases.remove(name);
        std::fs::remove_file(path)?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Ok(QueryResult::Empty)
    }

    fn show_databases(&self) -> DatabaseResult<QueryResult> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "db")
                && let Some(stem) = path.file_stem()
            {
                names.push(stem.to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(QueryResult::List(names))
    }

    fn use_database(&mut self, name: &str) -> DatabaseResult<QueryResult> {
        if !self.databases.contains_key(name) {
            let path = self.database_path(name);
            if !path.exists() {
                return Err(DatabaseError::DatabaseNotFound(name.to_string()));
            }
            let engine = StorageEngine::open(&path)?;
            self.databases.insert(name.to_string(), engine);
        }
        self.current = Some(name.to_string());
        Ok(QueryResult::Empty)
    }

    fn engine_mut(&mut self) -> DatabaseResult<&mut StorageEngine> {
        let name = self
            .current
            .clone()
            .ok_or(DatabaseError::NoDatabaseSelected)?;
        self.databases
            .get_mut(&name)
            .ok_or(DatabaseError::DatabaseNotFound(name))
    }

    fn show_tables(&mut self) -> DatabaseResult<QueryResult> {
        let engine = self.engine_mut()?;
        let names = engine
            .catalog
            .get_tables()
            .iter()
            .map(|info| info.table_name().to_string())
            .collect();
        Ok(QueryResult::List(names))
    }

    fn show_indexes(&mut self) -> DatabaseResult<QueryResult> {
        let engine = self.engine_mut()?;
        let mut lines = Vec::new();
        for table in engine.catalog.get_tables() {
            for index in engine.catalog.get_table_indexes(table.table_name())? {
                let columns: Vec<String> = index
                    .key_columns()
                    .iter()
                    .filter_map(|i| table.schema().column(*i as usize))
                    .map(|column| column.name().to_string())
                    .collect();
                lines.push(format!(
                    "{}.{} ({})",
                    table.table_name(),
                    index.index_name(),
                    columns.join(", ")
                ));
            }
        }
        Ok(QueryResult::List(lines))
    }

    fn create_table(&mut self, name: &str, specs: &[ColumnSpec]) -> DatabaseResult<QueryResult> {
        let engine = self.engine_mut()?;
        let columns = specs
            .iter()
            .enumerate()
            .map(|(position, spec)| {
                let data_type = match spec.type_name {
                    TypeName::Int => DataType::Int,
                    TypeName::Float => DataType::Float,
                    TypeName::Char(length) => DataType::Char(length),
                };
                Column::new(
                    spec.name.as_str(),
                    data_type,
                    position as u32,
                    spec.nullable,
                    spec.unique,
                )
            })
            .collect();
        let schema = Schema::new(columns)?;
        engine.catalog.create_table(&mut engine.pool, name, schema)?;
        Ok(QueryResult::Empty)
    }

    fn drop_table(&mut self, name: &str) -> DatabaseResult<QueryResult> {
        let engine = self.engine_mut()?;
        engine.catalog.drop_table(&mut engine.pool, name)?;
        Ok(QueryResult::Empty)
    }

    /// Create an index and populate it from a full table scan
    fn create_index(
        &mut self,
        index_name: &str,
        table_name: &str,
        columns: &[String],
    ) -> DatabaseResult<QueryResult> {
        let StorageEngine { pool, catalog } = self.engine_mut()?;
        let index_id = catalog.create_index(pool, table_name, index_name, columns)?;

        let schema = Rc::clone(catalog.get_table(table_name)?.schema());
        let mut rids = HashSet::new();
        catalog
            .get_table(table_name)?
            .heap()
            .fetch_all_ids(pool, &mut rids)?;

        let mut rows = Vec::with_capacity(rids.len());
        for rid in rids {
            let mut row = Row::with_rid(rid);
            catalog.get_table(table_name)?.heap().get_tuple(pool, &mut row)?;
            rows.push(row);
        }
        let populated = catalog
            .get_index_by_id_mut(index_id)?
            .batch_insert(pool, &rows, &schema)?;
        if !populated {
            catalog.drop_index(pool, table_name, index_name)?;
            return Err(DatabaseError::KeyConstraintViolated(columns.join(", ")));
        }
        Ok(QueryResult::Empty)
    }

    /// Drop an index by name, whichever table owns it
    fn drop_index(&mut self, index_name: &str) -> DatabaseResult<QueryResult> {
        let StorageEngine { pool, catalog } = self.engine_mut()?;
        let table_names: Vec<String> = catalog
            .get_tables()
            .iter()
            .map(|info| info.table_name().to_string())
            .collect();
        for table_name in table_names {
            let has_index = catalog
                .get_table_indexes(&table_name)?
                .iter()
                .any(|info| info.index_name() == index_name);
            if has_index {
                catalog.drop_index(pool, &table_name, index_name)?;
                return Ok(QueryResult::Empty);
            }
        }
        Err(CatalogError::IndexNotFound(index_name.to_string()).into())
    }

    fn select(
        &mut self,
        table_name: &str,
        columns: Option<&[String]>,
        predicate: Option<&Predicate>,
    ) -> DatabaseResult<QueryResult> {
        let StorageEngine { pool, catalog } = self.engine_mut()?;
        let schema = Rc::clone(catalog.get_table(table_name)?.schema());

        let projection: Option<Vec<usize>> = match columns {
            None => None,
            Some(names) => Some(
                names
                    .iter()
                    .map(|name| {
                        schema.find_column(name).ok_or_else(|| {
                            DatabaseError::ColumnNotFound(name.clone(), table_name.to_string())
                        })
                    })
                    .collect::<DatabaseResult<_>>()?,
            ),
        };

        let rids = resolve_rids(pool, catalog, table_name, predicate)?;
        let mut rows = Vec::with_capacity(rids.len());
        for rid in rids {
            let mut row = Row::with_rid(rid);
            catalog.get_table(table_name)?.heap().get_tuple(pool, &mut row)?;
            let display = match &projection {
                None => row.fields().iter().map(|f| f.to_string()).collect(),
                Some(positions) => positions
                    .iter()
                    .filter_map(|p| row.field(*p))
                    .map(|f| f.to_string())
                    .collect(),
            };
            rows.push(display);
        }

        let headers = match &projection {
            None => schema
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Some(positions) => positions
                .iter()
                .filter_map(|p| schema.column(*p))
                .map(|c| c.name().to_string())
                .collect(),
        };
        Ok(QueryResult::ResultSet { headers, rows })
    }

    fn insert(&mut self, table_name: &str, rows: &[Vec<Literal>]) -> DatabaseResult<QueryResult> {
        let StorageEngine { pool, catalog } = self.engine_mut()?;
        let schema = Rc::clone(catalog.get_table(table_name)?.schema());
        let index_ids = catalog.table_index_ids(table_name)?;

        let mut inserted = 0;
        for literals in rows {
            if literals.len() != schema.column_count() {
                return Err(DatabaseError::ColumnCountMismatch {
                    expected: schema.column_count(),
                    actual: literals.len(),
                });
            }
            let fields: Vec<Field> = literals
                .iter()
                .zip(schema.columns())
                .map(|(literal, column)| literal_to_field(literal, column))
                .collect::<DatabaseResult<_>>()?;
            schema.validate_row(&fields)?;
            let mut row = Row::new(fields);

            check_unique(pool, catalog, table_name, &row, &schema, None)?;
            catalog
                .get_table_mut(table_name)?
                .heap_mut()
                .insert_tuple(pool, &mut row)?;

            for index_id in &index_ids {
                let ok = catalog
                    .get_index_by_id_mut(*index_id)?
                    .insert_entry(pool, &row, &schema)?;
                if !ok {
                    // The pre-check should have caught this; undo the heap
                    // insert and surface the violation
                    catalog
                        .get_table_mut(table_name)?
                        .heap_mut()
                        .apply_delete(pool, row.rid())?;
                    return Err(DatabaseError::KeyConstraintViolated(
                        describe_key_columns(catalog, *index_id, &schema),
                    ));
                }
            }
            inserted += 1;
        }
        Ok(QueryResult::RowsAffected(inserted))
    }

    fn delete(
        &mut self,
        table_name: &str,
        predicate: Option<&Predicate>,
    ) -> DatabaseResult<QueryResult> {
        let StorageEngine { pool, catalog } = self.engine_mut()?;
        let schema = Rc::clone(catalog.get_table(table_name)?.schema());
        let index_ids = catalog.table_index_ids(table_name)?;
        let rids = resolve_rids(pool, catalog, table_name, predicate)?;

        for rid in &rids {
            let mut row = Row::with_rid(*rid);
            catalog.get_table(table_name)?.heap().get_tuple(pool, &mut row)?;
            // Index entries go first, then the tuple itself
            for index_id in &index_ids {
                catalog
                    .get_index_by_id_mut(*index_id)?
                    .remove_entry(pool, &row, &schema)?;
            }
            catalog
                .get_table_mut(table_name)?
                .heap_mut()
                .apply_delete(pool, *rid)?;
        }
        Ok(QueryResult::RowsAffected(rids.len()))
    }

    fn update(
        &mut self,
        table_name: &str,
        assignments: &[(String, Literal)],
        predicate: Option<&Predicate>,
    ) -> DatabaseResult<QueryResult> {
        let StorageEngine { pool, catalog } = self.engine_mut()?;
        let schema = Rc::clone(catalog.get_table(table_name)?.schema());
        let index_ids = catalog.table_index_ids(table_name)?;

        let mut resolved: Vec<(usize, Field)> = Vec::with_capacity(assignments.len());
        for (name, literal) in assignments {
            let position = schema.find_column(name).ok_or_else(|| {
                DatabaseError::ColumnNotFound(name.clone(), table_name.to_string())
            })?;
            let field = literal_to_field(literal, &schema.columns()[position])?;
            resolved.push((position, field));
        }
        let assigned: HashSet<u32> = resolved.iter().map(|(p, _)| *p as u32).collect();

        // Indexes whose key columns overlap the assigned columns
        let mut affected_ids = Vec::new();
        for index_id in &index_ids {
            let touches = catalog
                .get_index_by_id(*index_id)?
                .key_columns()
                .iter()
                .any(|column| assigned.contains(column));
            if touches {
                affected_ids.push(*index_id);
            }
        }

        let rids = resolve_rids(pool, catalog, table_name, predicate)?;
        for rid in &rids {
            let mut old_row = Row::with_rid(*rid);
            catalog.get_table(table_name)?.heap().get_tuple(pool, &mut old_row)?;

            let mut fields = old_row.fields().to_vec();
            for (position, field) in &resolved {
                fields[*position] = field.clone();
            }
            schema.validate_row(&fields)?;
            let mut new_row = Row::new(fields);
            check_unique(pool, catalog, table_name, &new_row, &schema, Some(*rid))?;

            let in_place = catalog
                .get_table_mut(table_name)?
                .heap_mut()
                .update_tuple(pool, &new_row, *rid)?;

            if in_place {
                new_row.set_rid(*rid);
                // Delete-entry-old then insert-entry-new in each affected
                // index
                for index_id in &affected_ids {
                    catalog
                        .get_index_by_id_mut(*index_id)?
                        .remove_entry(pool, &old_row, &schema)?;
                    catalog
                        .get_index_by_id_mut(*index_id)?
                        .insert_entry(pool, &new_row, &schema)?;
                }
            } else {
                // Fall back to delete + insert; the rid changes, so every
                // index entry has to be rewritten
                for index_id in &index_ids {
                    catalog
                        .get_index_by_id_mut(*index_id)?
                        .remove_entry(pool, &old_row, &schema)?;
                }
                catalog
                    .get_table_mut(table_name)?
                    .heap_mut()
                    .apply_delete(pool, *rid)?;
                catalog
                    .get_table_mut(table_name)?
                    .heap_mut()
                    .insert_tuple(pool, &mut new_row)?;
                for index_id in &index_ids {
                    catalog
                        .get_index_by_id_mut(*index_id)?
                        .insert_entry(pool, &new_row, &schema)?;
                }
            }
        }
        Ok(QueryResult::RowsAffected(rids.len()))
    }
}

/// Row ids satisfying the predicate, sorted for stable output. A predicate
/// over a column with a single-column index uses the tree; everything else
/// scans the heap.
fn resolve_rids(
    pool: &mut BufferPoolManager,
    catalog: &CatalogManager,
    table_name: &str,
    predicate: Option<&Predicate>,
) -> DatabaseResult<Vec<RowId>> {
    let schema = Rc::clone(catalog.get_table(table_name)?.schema());
    let mut rids = HashSet::new();

    match predicate {
        None => {
            catalog
                .get_table(table_name)?
                .heap()
                .fetch_all_ids(pool, &mut rids)?;
        }
        Some(predicate) => {
            let position = schema.find_column(&predicate.column).ok_or_else(|| {
                DatabaseError::ColumnNotFound(predicate.column.clone(), table_name.to_string())
            })?;
            let column = &schema.columns()[position];
            let key_field = literal_to_field(&predicate.value, column)?;

            // A CHAR literal wider than the column cannot be turned into a
            // key image; the heap scan compares the untruncated string
            let overlong_chars = matches!(
                (&key_field, column.data_type()),
                (Field::Chars(value), DataType::Char(max)) if value.len() > *max as usize
            );
            let index_id = if predicate.op != CompareOp::Ne
                && !key_field.is_null()
                && !overlong_chars
            {
                find_index_on(catalog, table_name, position as u32)
            } else {
                None
            };

            match index_id {
                Some(index_id) => {
                    let key = IndexKey::from_fields(&[&key_field], &[column])?;
                    let tree = catalog.get_index_by_id(index_id)?.tree();
                    match predicate.op {
                        CompareOp::Eq => {
                            if let Some(rid) = tree.get_value(pool, &key)? {
                                rids.insert(rid);
                            }
                        }
                        CompareOp::Lt => tree.range_scan(pool, &key, &mut rids, true, false)?,
                        CompareOp::Le => tree.range_scan(pool, &key, &mut rids, true, true)?,
                        CompareOp::Gt => tree.range_scan(pool, &key, &mut rids, false, false)?,
                        CompareOp::Ge => tree.range_scan(pool, &key, &mut rids, false, true)?,
                        CompareOp::Ne => unreachable!("inequality never takes the index path"),
                    }
                }
                None => {
                    let matcher = field_matcher(predicate.op);
                    catalog.get_table(table_name)?.heap().fetch_ids_matching(
                        pool,
                        position,
                        &key_field,
                        matcher,
                        &mut rids,
                    )?;
                }
            }
        }
    }

    let mut sorted: Vec<RowId> = rids.into_iter().collect();
    sorted.sort_by_key(|rid| (rid.page_id, rid.slot));
    Ok(sorted)
}

/// Single-column index over exactly `column` on the table, if any
fn find_index_on(catalog: &CatalogManager, table_name: &str, column: u32) -> Option<IndexId> {
    let index_ids = catalog.table_index_ids(table_name).ok()?;
    index_ids.into_iter().find(|id| {
        catalog
            .get_index_by_id(*id)
            .is_ok_and(|info| info.key_columns() == [column])
    })
}

/// Reject rows that would duplicate a non-null value in a unique column.
/// `exclude` skips the row being updated.
fn check_unique(
    pool: &mut BufferPoolManager,
    catalog: &CatalogManager,
    table_name: &str,
    row: &Row,
    schema: &Schema,
    exclude: Option<RowId>,
) -> DatabaseResult<()> {
    for (position, column) in schema.columns().iter().enumerate() {
        if !column.is_unique() {
            continue;
        }
        let Some(field) = row.field(position) else {
            continue;
        };
        if field.is_null() {
            continue;
        }

        let existing: Option<RowId> = match find_index_on(catalog, table_name, position as u32) {
            Some(index_id) => {
                let key = IndexKey::from_fields(&[field], &[column])?;
                catalog
                    .get_index_by_id(index_id)?
                    .tree()
                    .get_value(pool, &key)?
            }
            None => {
                let mut matches = HashSet::new();
                catalog.get_table(table_name)?.heap().fetch_ids_matching(
                    pool,
                    position,
                    field,
                    field_matcher(CompareOp::Eq),
                    &mut matches,
                )?;
                matches.into_iter().next()
            }
        };
        if existing.is_some_and(|rid| Some(rid) != exclude) {
            return Err(DatabaseError::KeyConstraintViolated(
                column.name().to_string(),
            ));
        }
    }
    Ok(())
}

fn field_matcher(op: CompareOp) -> impl Fn(&Field, &Field) -> bool {
    move |field, key| {
        // NULL never compares, not even under <>
        match field.compare(key) {
            None => false,
            Some(ordering) => match op {
                CompareOp::Eq => ordering.is_eq(),
                CompareOp::Ne => ordering.is_ne(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
            },
        }
    }
}

fn literal_to_field(literal: &Literal, column: &Column) -> DatabaseResult<Field> {
    let field = match (literal, column.data_type()) {
        (Literal::Null, _) => Field::Null,
        (Literal::Int(value), DataType::Int) => {
            let value = i32::try_from(*value).map_err(|_| DatabaseError::TypeMismatch {
                column: column.name().to_string(),
                expected: column.data_type().to_string(),
            })?;
            Field::Int(value)
        }
        (Literal::Int(value), DataType::Float) => Field::Float(*value as f32),
        (Literal::Float(value), DataType::Float) => Field::Float(*value as f32),
        (Literal::Str(value), DataType::Char(_)) => Field::Chars(value.clone()),
        _ => {
            return Err(DatabaseError::TypeMismatch {
                column: column.name().to_string(),
                expected: column.data_type().to_string(),
            });
        }
    };
    Ok(field)
}

fn describe_key_columns(catalog: &CatalogManager, index_id: IndexId, schema: &Schema) -> String {
    catalog
        .get_index_by_id(index_id)
        .map(|info| {
            info.key_columns()
                .iter()
                .filter_map(|i| schema.column(*i as usize))
                .map(|column| column.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}
