//! Semantic resolution: binds every column reference to a row offset,
//! rejects type/arity mistakes, and lowers the parsed AST into the tagged
//! `Plan` tree the execution engine's operator constructors consume.

use crate::catalog::{Catalog, ColumnDef, TableSchema};
use crate::diagnostics::Report;
use crate::error::{DbError, ExecError, Result};
use crate::exec::expr::PlanExpr;
use crate::exec::{ColumnInfo, Plan, RowType};
use crate::sql::ast::*;
use crate::sql::parser::Parser;
use crate::types::{PageId, Value, ValueKind};
use std::sync::Arc;

/// Parse a single `CREATE TABLE` statement's text (as stored in a CATALOG
/// row, or typed fresh) into a schema. `root`/`sql` on the result are
/// placeholders the caller is expected to overwrite.
pub fn parse_create_table(sql: &str) -> Result<TableSchema> {
    let stmts = Parser::parse_statements(sql).map_err(|(msg, _)| ExecError::Syntax(msg))?;
    let Some(Stmt::CreateTable(ct)) = stmts.into_iter().next() else {
        return Err(ExecError::Syntax("expected a single CREATE TABLE statement".into()).into());
    };
    build_table_schema(ct)
}

pub fn build_table_schema(ct: CreateTableStmt) -> Result<TableSchema> {
    let mut primary_key = None;
    let columns: Vec<ColumnDef> = ct
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if c.primary_key {
                primary_key = Some(i);
            }
            ColumnDef {
                name: c.name.clone(),
                kind: c.kind,
                not_null: c.not_null,
            }
        })
        .collect();
    let primary_key = primary_key
        .ok_or_else(|| ExecError::Syntax("CREATE TABLE requires exactly one PRIMARY KEY column".into()))?;
    Ok(TableSchema {
        name: ct.name,
        columns,
        primary_key,
        root: PageId::INVALID,
        sql: String::new(),
    })
}

fn resolve_expr(expr: &Expr, row_type: &RowType) -> Result<PlanExpr> {
    match expr {
        Expr::Literal(lit, _) => Ok(PlanExpr::Literal(literal_value(lit))),
        Expr::Column { table, name, .. } => Ok(PlanExpr::Column(row_type.resolve(table.as_deref(), name)?)),
        Expr::Unary(op, e, _) => Ok(PlanExpr::Unary(*op, Box::new(resolve_expr(e, row_type)?))),
        Expr::Binary(op, l, r, _) => Ok(PlanExpr::Binary(
            *op,
            Box::new(resolve_expr(l, row_type)?),
            Box::new(resolve_expr(r, row_type)?),
        )),
        Expr::IsNull(e, negated, _) => Ok(PlanExpr::IsNull(Box::new(resolve_expr(e, row_type)?), *negated)),
        Expr::Agg(..) => Err(ExecError::Syntax("aggregate functions are only allowed in the select list".into()).into()),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Int(n) => Value::Int(*n),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Str(s) => Value::Text(s.clone()),
    }
}

fn scan_row_type(schema: &TableSchema, alias: &str) -> RowType {
    RowType(
        schema
            .columns
            .iter()
            .map(|c| ColumnInfo {
                table: Some(alias.to_string()),
                name: c.name.clone(),
                kind: c.kind,
            })
            .collect(),
    )
}

fn lookup_table(catalog: &Catalog, name: &str) -> Result<Arc<TableSchema>> {
    if name.eq_ignore_ascii_case(crate::catalog::CATALOG_NAME) {
        return Err(ExecError::CatalogProtected.into());
    }
    catalog
        .table(name)
        .cloned()
        .map(Arc::new)
        .ok_or_else(|| ExecError::UnknownTable(name.to_string()).into())
}

/// Resolve a `FROM`/`JOIN` item into a `Scan` plan plus its row type.
fn from_item_plan(catalog: &Catalog, item: &FromItem) -> Result<(Plan, RowType)> {
    let schema = lookup_table(catalog, &item.table)?;
    let alias = item.alias.clone().unwrap_or_else(|| item.table.clone());
    let row_type = scan_row_type(&schema, &alias);
    Ok((
        Plan::Scan {
            schema,
            row_type: row_type.clone(),
        },
        row_type,
    ))
}

fn combine(a: RowType, b: RowType) -> RowType {
    let mut cols = a.0;
    cols.extend(b.0);
    RowType(cols)
}

/// Lower a `SELECT` statement into an executable plan and its output row type.
pub fn build_select_plan(catalog: &Catalog, stmt: &SelectStmt) -> Result<(Plan, RowType)> {
    let (mut plan, mut row_type) = match &stmt.from {
        Some(item) => from_item_plan(catalog, item)?,
        None => (Plan::ScanDummy, RowType::default()),
    };

    for join in &stmt.joins {
        let (inner_plan, inner_row_type) = from_item_plan(catalog, &join.table)?;
        let combined = combine(row_type.clone(), inner_row_type);
        let on = join.on.as_ref().map(|e| resolve_expr(e, &combined)).transpose()?;
        plan = Plan::Join {
            outer: Box::new(plan),
            inner: Box::new(inner_plan),
            on,
        };
        row_type = combined;
    }

    if let Some(filter) = &stmt.filter {
        let predicate = resolve_expr(filter, &row_type)?;
        plan = Plan::Filter {
            input: Box::new(plan),
            predicate,
        };
    }

    let has_agg = stmt.items.iter().any(|i| matches!(i.expr, Expr::Agg(..)));
    let (mut out_plan, mut out_row_type) = if has_agg || !stmt.group_by.is_empty() {
        let mut report = Report::new();
        let mut group_keys = Vec::new();
        for e in &stmt.group_by {
            match resolve_expr(e, &row_type) {
                Ok(k) => group_keys.push(k),
                Err(err) => report.error(e.span(), err.to_string()),
            }
        }
        let mut items = Vec::new();
        let mut out_cols = Vec::new();
        for item in &stmt.items {
            match &item.expr {
                Expr::Agg(kind, arg) => {
                    match arg.as_ref().map(|a| resolve_expr(a, &row_type)).transpose() {
                        Ok(resolved) => {
                            items.push((Some(*kind), resolved));
                            out_cols.push(ColumnInfo {
                                table: None,
                                name: item.alias.clone().unwrap_or_else(|| agg_label(*kind)),
                                kind: ValueKind::Int,
                            });
                        }
                        Err(err) => report.error(item.expr.span(), err.to_string()),
                    }
                }
                _ => match resolve_expr(&item.expr, &row_type) {
                    Ok(resolved) => {
                        let name = item.alias.clone().unwrap_or_else(|| expr_label(&item.expr));
                        let kind = column_kind(&item.expr, &row_type);
                        items.push((None, Some(resolved)));
                        out_cols.push(ColumnInfo { table: None, name, kind });
                    }
                    Err(err) => report.error(item.expr.span(), err.to_string()),
                },
            }
        }
        if report.has_errors() {
            return Err(ExecError::Diagnostics(report).into());
        }
        let row_type = RowType(out_cols);
        (
            Plan::Group {
                input: Box::new(plan),
                group_keys,
                items,
                row_type: row_type.clone(),
            },
            row_type,
        )
    } else {
        let mut report = Report::new();
        let mut exprs = Vec::new();
        let mut out_cols = Vec::new();
        for item in &stmt.items {
            match resolve_expr(&item.expr, &row_type) {
                Ok(resolved) => {
                    let name = item.alias.clone().unwrap_or_else(|| expr_label(&item.expr));
                    let kind = column_kind(&item.expr, &row_type);
                    exprs.push(resolved);
                    out_cols.push(ColumnInfo { table: None, name, kind });
                }
                Err(err) => report.error(item.expr.span(), err.to_string()),
            }
        }
        if report.has_errors() {
            return Err(ExecError::Diagnostics(report).into());
        }
        let row_type = RowType(out_cols);
        (
            Plan::Projection {
                input: Box::new(plan),
                exprs,
                row_type: row_type.clone(),
            },
            row_type,
        )
    };

    if !stmt.order_by.is_empty() {
        let keys = stmt
            .order_by
            .iter()
            .map(|k| resolve_expr(&k.expr, &out_row_type))
            .collect::<Result<Vec<_>>>()?;
        let dirs = stmt.order_by.iter().map(|k| k.dir).collect();
        out_plan = Plan::Order {
            input: Box::new(out_plan),
            keys,
            dirs,
        };
    }

    if stmt.limit.is_some() || stmt.offset.is_some() {
        out_plan = Plan::Limit {
            input: Box::new(out_plan),
            offset: stmt.offset.unwrap_or(0),
            limit: stmt.limit,
        };
    }

    Ok((out_plan, out_row_type))
}

fn agg_label(kind: AggKind) -> String {
    match kind {
        AggKind::Count | AggKind::CountStar => "count".to_string(),
        AggKind::Sum => "sum".to_string(),
        AggKind::Avg => "avg".to_string(),
        AggKind::Min => "min".to_string(),
        AggKind::Max => "max".to_string(),
    }
}

fn expr_label(expr: &Expr) -> String {
    match expr {
        Expr::Column { name, .. } => name.clone(),
        _ => "?column?".to_string(),
    }
}

fn column_kind(expr: &Expr, row_type: &RowType) -> ValueKind {
    match expr {
        Expr::Column { table, name, .. } => row_type
            .resolve(table.as_deref(), name)
            .ok()
            .map(|i| row_type.0[i].kind)
            .unwrap_or(ValueKind::Int),
        Expr::Literal(Literal::Str(_), _) => ValueKind::Text,
        Expr::Literal(Literal::Bool(_), _) => ValueKind::Bool,
        _ => ValueKind::Int,
    }
}

/// Resolve an `INSERT`'s value list and (optional) explicit column list
/// against a table's declared columns, in declaration order, rejecting a
/// `NULL` written into a `NOT NULL` column.
pub fn resolve_insert_values(schema: &TableSchema, stmt: &InsertStmt) -> Result<Vec<Value>> {
    let empty_row_type = RowType::default();
    let mut slots: Vec<Value> = vec![Value::Null; schema.columns.len()];
    match &stmt.columns {
        Some(names) => {
            if names.len() != stmt.values.len() {
                return Err(ExecError::Syntax("column list and VALUES arity mismatch".into()).into());
            }
            for (name, expr) in names.iter().zip(&stmt.values) {
                let idx = schema
                    .column_index(name)
                    .ok_or_else(|| ExecError::UnknownColumn(name.clone()))?;
                slots[idx] = resolve_expr(expr, &empty_row_type)?.eval(&[])?;
            }
        }
        None => {
            if stmt.values.len() != schema.columns.len() {
                return Err(ExecError::Syntax(format!(
                    "expected {} values, found {}",
                    schema.columns.len(),
                    stmt.values.len()
                ))
                .into());
            }
            for (i, expr) in stmt.values.iter().enumerate() {
                slots[i] = resolve_expr(expr, &empty_row_type)?.eval(&[])?;
            }
        }
    }
    for (col, val) in schema.columns.iter().zip(&slots) {
        if col.not_null && val.is_null() {
            return Err(ExecError::NullNotAllowed(col.name.clone()).into());
        }
    }
    Ok(slots)
}

/// Resolve an `UPDATE`'s `SET` list and `WHERE` predicate against a table's
/// row type (bare column names, no table qualification needed).
pub fn resolve_update(schema: &TableSchema, stmt: &UpdateStmt) -> Result<(Vec<(usize, PlanExpr)>, Option<PlanExpr>)> {
    let row_type = scan_row_type(schema, &schema.name);
    let mut assignments = Vec::new();
    for (name, expr) in &stmt.assignments {
        let idx = schema
            .column_index(name)
            .ok_or_else(|| ExecError::UnknownColumn(name.clone()))?;
        assignments.push((idx, resolve_expr(expr, &row_type)?));
    }
    let filter = stmt.filter.as_ref().map(|e| resolve_expr(e, &row_type)).transpose()?;
    Ok((assignments, filter))
}

pub fn resolve_delete_filter(schema: &TableSchema, stmt: &DeleteStmt) -> Result<Option<PlanExpr>> {
    let row_type = scan_row_type(schema, &schema.name);
    stmt.filter.as_ref().map(|e| resolve_expr(e, &row_type)).transpose()
}

/// Render a canonical, re-parseable `CREATE TABLE` text for a schema, used
/// as the `sql` column of its CATALOG row so a reopen can rebuild it.
pub fn render_create_table(schema: &TableSchema) -> String {
    let cols: Vec<String> = schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let kind = match c.kind {
                ValueKind::Int => "INT",
                ValueKind::Bool => "BOOL",
                ValueKind::Text => "TEXT",
            };
            let mut s = format!("{} {}", c.name, kind);
            if i == schema.primary_key {
                s.push_str(" PRIMARY KEY");
            } else if c.not_null {
                s.push_str(" NOT NULL");
            }
            s
        })
        .collect();
    format!("CREATE TABLE {} ({})", schema.name, cols.join(", "))
}

pub fn reject_catalog_write(table: &str) -> Result<()> {
    if table.eq_ignore_ascii_case(crate::catalog::CATALOG_NAME) {
        return Err(DbError::Exec(ExecError::CatalogProtected));
    }
    Ok(())
}
