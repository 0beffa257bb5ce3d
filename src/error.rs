//! Crate-wide error types.
//!
//! Lower layers (pager, node, btree) raise `PagerError`; the execution and
//! SQL layers raise `ExecError`. Both fold into `DbError` at the `Db`
//! boundary, which is what callers of the embeddable API see. The shell
//! binary wraps `DbError` in `anyhow::Result` at its outermost boundary.

use crate::diagnostics::Report;
use crate::types::PageId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum PagerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {0} not found")]
    PageNotFound(PageId),

    #[error("page {0} has an outstanding mutable reference")]
    PageBusy(PageId),

    #[error("page {0} is not exclusively referenced (ref_count != 1)")]
    NotExclusive(PageId),

    #[error("cache exhausted: every cached page is pinned")]
    CacheExhausted,

    #[error("corrupt database file: {0}")]
    Corruption(String),

    #[error("cell of {size} bytes exceeds the maximum cell size of {max} bytes")]
    CellTooLarge { size: usize, max: usize },

    #[error("tree height exceeded the maximum of {max}")]
    TreeTooDeep { max: usize },
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Pager(#[from] PagerError),

    #[error("column `{0}` not found")]
    UnknownColumn(String),

    #[error("ambiguous column reference `{0}`")]
    AmbiguousColumn(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("NULL inserted into NOT NULL column `{0}`")]
    NullNotAllowed(String),

    #[error("table `{0}` already exists")]
    TableExists(String),

    #[error("table `{0}` does not exist")]
    UnknownTable(String),

    #[error("direct writes to CATALOG are not permitted")]
    CatalogProtected,

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    /// One or more semantic errors collected across a single statement
    /// (e.g. every bad column reference in a projection list) rather than
    /// reported one at a time.
    #[error("{0}")]
    Diagnostics(Report),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Pager(#[from] PagerError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl DbError {
    pub fn corruption(msg: impl Into<String>) -> Self {
        DbError::Pager(PagerError::Corruption(msg.into()))
    }
}
