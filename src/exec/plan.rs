//! The tagged plan tree the type checker builds and the operator
//! constructors consume directly -- one variant per operator kind, each
//! carrying already-resolved `PlanExpr`s (no name lookups left to do).

use crate::catalog::TableSchema;
use crate::exec::expr::PlanExpr;
use crate::exec::operators::{Filter, Group, GroupItem, Join, Limit, Order, Projection, Scan, ScanDummy};
use crate::exec::{Operator, RowType};
use crate::pager::Pager;
use crate::sql::ast::{AggKind, OrderDir};
use std::sync::Arc;

pub enum Plan {
    Scan { schema: Arc<TableSchema>, row_type: RowType },
    ScanDummy,
    Filter { input: Box<Plan>, predicate: PlanExpr },
    Join { outer: Box<Plan>, inner: Box<Plan>, on: Option<PlanExpr> },
    Projection { input: Box<Plan>, exprs: Vec<PlanExpr>, row_type: RowType },
    Group {
        input: Box<Plan>,
        group_keys: Vec<PlanExpr>,
        items: Vec<(Option<AggKind>, Option<PlanExpr>)>,
        row_type: RowType,
    },
    Order { input: Box<Plan>, keys: Vec<PlanExpr>, dirs: Vec<OrderDir> },
    Limit { input: Box<Plan>, offset: i64, limit: Option<i64> },
}

pub fn build_operator(plan: Plan, pager: &Pager) -> Box<dyn Operator> {
    match plan {
        Plan::Scan { schema, row_type } => Box::new(Scan::new(pager.clone(), schema, row_type)),
        Plan::ScanDummy => Box::new(ScanDummy::new()),
        Plan::Filter { input, predicate } => Box::new(Filter::new(build_operator(*input, pager), predicate)),
        Plan::Join { outer, inner, on } => {
            Box::new(Join::new(build_operator(*outer, pager), build_operator(*inner, pager), on))
        }
        Plan::Projection { input, exprs, row_type } => {
            Box::new(Projection::new(build_operator(*input, pager), exprs, row_type))
        }
        Plan::Group { input, group_keys, items, row_type } => {
            let items = items
                .into_iter()
                .map(|(agg, expr)| match agg {
                    Some(kind) => GroupItem::Agg(kind, expr),
                    None => GroupItem::Key(expr.expect("bare grouping-key item must carry an expression")),
                })
                .collect();
            Box::new(Group::new(build_operator(*input, pager), group_keys, items, row_type))
        }
        Plan::Order { input, keys, dirs } => Box::new(Order::new(build_operator(*input, pager), keys, dirs)),
        Plan::Limit { input, offset, limit } => Box::new(Limit::new(build_operator(*input, pager), offset, limit)),
    }
}
