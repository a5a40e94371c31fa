/*!
# Storage Abstraction

The windowing layer talks to its relational store through the
[`StorageBackend`] trait: table lifecycle, statement execution, queries, and
an atomic multi-statement unit used by the ingest path. The trait is
synchronous and object-safe; components receive an explicit
`Arc<dyn StorageBackend>` handle instead of reaching for process-wide state,
so multiple independent configurations can coexist and tests can run against
their own backends.

[`MemoryStorage`] is the embedded implementation shipped with the crate; it
executes exactly the statement dialect the windowing layer emits. External
database adapters implement the same trait.
*/

pub mod memory;

pub use memory::MemoryStorage;

use crate::sluice::stream::element::{DataField, FieldValue, StreamElement};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A statement referenced a table or view that does not exist
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),

    /// A table or view with this name already exists
    #[error("relation '{0}' already exists")]
    RelationExists(String),

    /// A statement could not be parsed by the backend dialect
    #[error("syntax error in '{statement}': {message}")]
    Syntax { statement: String, message: String },

    /// The backend rejected or failed to execute a statement
    #[error("execution failed for '{statement}': {message}")]
    Execution { statement: String, message: String },
}

impl StorageError {
    /// The statement associated with this error, if any.
    pub fn statement(&self) -> Option<&str> {
        match self {
            StorageError::Syntax { statement, .. } => Some(statement),
            StorageError::Execution { statement, .. } => Some(statement),
            _ => None,
        }
    }

    pub fn syntax(statement: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Syntax {
            statement: statement.into(),
            message: message.into(),
        }
    }

    pub fn execution(statement: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Execution {
            statement: statement.into(),
            message: message.into(),
        }
    }
}

/// A raw query result: column names plus rows of values, in result order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

impl ResultSet {
    /// Number of rows in the result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The value at (`row`, column named `column`) as an i64, if present
    /// and numeric.
    pub fn long(&self, row: usize, column: &str) -> Option<i64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)?.as_integer()
    }
}

/// Iterator over query results materialized as stream elements.
///
/// Rows come back in the query's result order; for window views that is
/// most-recent-first.
pub struct DataEnumerator {
    elements: std::vec::IntoIter<StreamElement>,
}

impl DataEnumerator {
    pub fn new(elements: Vec<StreamElement>) -> Self {
        DataEnumerator {
            elements: elements.into_iter(),
        }
    }

    /// Whether another element is available.
    pub fn has_more_elements(&self) -> bool {
        self.elements.len() > 0
    }
}

impl Iterator for DataEnumerator {
    type Item = StreamElement;

    fn next(&mut self) -> Option<StreamElement> {
        self.elements.next()
    }
}

/// Synchronous storage backend consumed by the windowing layer.
///
/// Every per-source raw table is created through [`create_table`] with the
/// wrapper's output format; the `timed` epoch-millisecond column is always
/// present implicitly. [`execute_atomically`] runs a statement batch as one
/// atomic unit: concurrent readers observe either none or all of its effects.
///
/// [`create_table`]: StorageBackend::create_table
/// [`execute_atomically`]: StorageBackend::execute_atomically
pub trait StorageBackend: Send + Sync {
    /// Create a table with the given fields (plus the implicit `timed`
    /// column). Fails if the table already exists.
    fn create_table(&self, name: &str, fields: &[DataField]) -> Result<(), StorageError>;

    /// Drop a table and its rows.
    fn drop_table(&self, name: &str) -> Result<(), StorageError>;

    /// Whether a table with this name exists.
    fn table_exists(&self, name: &str) -> bool;

    /// Execute a single data-definition or data-manipulation statement.
    /// Returns the number of affected rows.
    fn execute_update(&self, sql: &str) -> Result<usize, StorageError>;

    /// Execute a statement batch as one atomic unit. Either every statement
    /// applies or none does, and no reader observes a partial batch.
    fn execute_atomically(&self, statements: &[String]) -> Result<(), StorageError>;

    /// Execute a query, materializing rows as stream elements.
    fn execute_query(&self, sql: &str) -> Result<DataEnumerator, StorageError>;

    /// Execute a query, returning the raw result handle.
    fn execute_query_with_result_set(&self, sql: &str) -> Result<ResultSet, StorageError>;
}

/// Shared storage handle threaded through the windowing components.
pub type StorageHandle = Arc<dyn StorageBackend>;
