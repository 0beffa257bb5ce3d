//! # tinydb
//!
//! A small embedded relational database: a paged B-tree storage engine
//! underneath a Volcano-style execution engine and a hand-written SQL
//! front end.
//!
//! ## Architecture
//!
//! - **Pager** (`pager`): fixed-size page cache, free-list page reuse,
//!   ref-counted mutability tracking.
//! - **Node/BTree** (`node`, `btree`): slotted-page B-tree nodes plus the
//!   cursor that walks and mutates them.
//! - **Catalog** (`catalog`): the bootstrap `CATALOG` table every other
//!   table is discovered through.
//! - **SQL** (`sql`): lexer, recursive-descent parser, and the resolver
//!   that lowers statements into the execution engine's plan tree.
//! - **Exec** (`exec`): the pull-based operator tree (`Scan`, `Filter`,
//!   `Join`, `Projection`, `Group`, `Order`, `Limit`).
//! - **Db** (`db`): the embeddable facade tying all of the above together.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tinydb::Db;
//!
//! let mut db = Db::open("my_database.db")?;
//! db.run("CREATE TABLE widgets (id INT PRIMARY KEY, name TEXT)")?;
//! db.run(r#"INSERT INTO widgets (1, "gizmo")"#)?;
//!
//! let mut cursor = db.query("SELECT id, name FROM widgets ORDER BY id")?;
//! while let Some(row) = cursor.next() {
//!     println!("{:?}", row?);
//! }
//! ```

pub mod btree;
pub mod catalog;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod hashmap;
pub mod node;
pub mod pager;
pub mod pretty;
pub mod row;
pub mod sql;
pub mod types;

pub use db::{Db, RowCursor, RunReport, StatementOutcome};
pub use error::{DbError, ExecError, PagerError, Result};
pub use types::{PageId, Value, ValueKind, PAGE_SIZE};
