//! Volcano-style pull operators: each supports `next`/`reset`/`close` and
//! the engine drives them with a single "produce next row" method, letting
//! `?` unwind failures up through arbitrarily nested operator trees.

pub mod expr;
mod operators;
pub mod plan;
mod sorter;

pub use expr::PlanExpr;
pub use operators::*;
pub use plan::{build_operator, Plan};

use crate::error::Result;
use crate::types::{Value, ValueKind};

pub type Row = Vec<Value>;

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub table: Option<String>,
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, Default)]
pub struct RowType(pub Vec<ColumnInfo>);

impl RowType {
    pub fn resolve(&self, table: Option<&str>, name: &str) -> crate::error::Result<usize> {
        let mut hit = None;
        for (i, c) in self.0.iter().enumerate() {
            let name_matches = c.name.eq_ignore_ascii_case(name);
            let table_matches = match table {
                Some(t) => c.table.as_deref().is_some_and(|ct| ct.eq_ignore_ascii_case(t)),
                None => true,
            };
            if name_matches && table_matches {
                if hit.is_some() {
                    return Err(crate::error::ExecError::AmbiguousColumn(name.to_string()).into());
                }
                hit = Some(i);
            }
        }
        hit.ok_or_else(|| crate::error::ExecError::UnknownColumn(name.to_string()).into())
    }
}

/// Every operator pulls rows one at a time; `close` releases any pinned
/// B-tree cursor pages. Dropping an operator tree without calling `close`
/// is safe (the pager's own `Drop` impls still unref) but `close` makes
/// the teardown point explicit, matching the source's cancellation story.
pub trait Operator {
    fn next(&mut self) -> Result<Option<Row>>;
    fn reset(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
    fn row_type(&self) -> &RowType;
}
