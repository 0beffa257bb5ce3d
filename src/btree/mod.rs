//! A disk-based B-tree keyed on one of the engine's scalar key types.
//!
//! `Node` (in `crate::node`) owns the single-page slotted layout; this
//! module adds the pieces that span multiple pages: `rebalance` (rotation,
//! split, merge), `Cursor` (the sole mutation path, owning a bounded stack
//! of page/slot positions), and `BTree` (the table-facing handle tying a
//! pager, key type, and root page id together).

mod cursor;
pub mod rebalance;
mod tree;

pub use cursor::Cursor;
pub use tree::BTree;
