mod error;
mod row;
mod schema;
mod table_heap;
mod table_page;
mod value;

pub use error::{RecordError, RecordResult};
pub use row::{INVALID_ROW_ID, Row, RowId};
pub use schema::{COLUMN_MAGIC, Column, MAX_COLUMNS, SCHEMA_MAGIC, Schema};
pub use table_heap::TableHeap;
pub use table_page::TablePage;
pub use value::{DataType, Field};
