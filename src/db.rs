//! The embeddable facade: `Db::open`, `Db::run` (batched statements,
//! rows-affected/rendered-rows report) and `Db::query` (a lazy row
//! cursor over a single `SELECT`).

use crate::catalog::Catalog;
use crate::error::{ExecError, Result};
use crate::exec::{build_operator, Operator, RowType};
use crate::pager::Pager;
use crate::sql::ast::{DeleteStmt, InsertStmt, Stmt, UpdateStmt};
use crate::sql::{self, Parser};
use crate::types::Value;
use std::path::Path;
use tracing::{info, instrument};

pub type Row = Vec<Value>;

#[derive(Debug)]
pub enum StatementOutcome {
    RowsAffected(usize),
    Rows { row_type: RowType, rows: Vec<Row> },
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<StatementOutcome>,
}

pub struct Db {
    pager: Pager,
    catalog: Catalog,
}

impl Db {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pager = Pager::open(path, 256)?;
        let catalog = Catalog::open(pager.clone())?;
        info!("database opened");
        Ok(Self { pager, catalog })
    }

    /// Execute every statement in `sql`, separated by `;`.
    pub fn run(&mut self, sql: &str) -> Result<RunReport> {
        let stmts = Parser::parse_statements(sql).map_err(|(msg, _)| ExecError::Syntax(msg))?;
        let mut report = RunReport::default();
        for stmt in stmts {
            report.outcomes.push(self.execute(stmt)?);
        }
        self.pager.flush_all()?;
        Ok(report)
    }

    /// Run exactly one `SELECT`, returning a lazily-pulled cursor.
    pub fn query(&mut self, sql: &str) -> Result<RowCursor> {
        let mut stmts = Parser::parse_statements(sql).map_err(|(msg, _)| ExecError::Syntax(msg))?;
        if stmts.len() != 1 {
            return Err(ExecError::Syntax("query() expects exactly one statement".into()).into());
        }
        let Stmt::Select(select) = stmts.remove(0) else {
            return Err(ExecError::Syntax("query() expects a SELECT statement".into()).into());
        };
        let (plan, row_type) = sql::build_select_plan(&self.catalog, &select)?;
        let op = build_operator(plan, &self.pager);
        Ok(RowCursor { op, row_type })
    }

    #[instrument(skip_all)]
    fn execute(&mut self, stmt: Stmt) -> Result<StatementOutcome> {
        match stmt {
            Stmt::CreateTable(ct) => {
                let schema = sql::build_table_schema(ct)?;
                let sql_text = sql::render_create_table(&schema);
                self.catalog.create_table(schema, sql_text)?;
                Ok(StatementOutcome::RowsAffected(0))
            }
            Stmt::DropTable(dt) => {
                let existed = self.catalog.drop_table(&dt.name)?;
                Ok(StatementOutcome::RowsAffected(existed as usize))
            }
            Stmt::Insert(insert) => self.execute_insert(insert),
            Stmt::Update(update) => self.execute_update(update),
            Stmt::Delete(delete) => self.execute_delete(delete),
            Stmt::Select(select) => {
                let (plan, row_type) = sql::build_select_plan(&self.catalog, &select)?;
                let mut op = build_operator(plan, &self.pager);
                let mut rows = Vec::new();
                while let Some(row) = op.next()? {
                    rows.push(row);
                }
                op.close()?;
                Ok(StatementOutcome::Rows { row_type, rows })
            }
            Stmt::Explain(inner) => self.execute_explain(*inner),
        }
    }

    fn execute_insert(&mut self, insert: InsertStmt) -> Result<StatementOutcome> {
        sql::reject_catalog_write(&insert.table)?;
        let schema = self
            .catalog
            .table(&insert.table)
            .cloned()
            .ok_or_else(|| ExecError::UnknownTable(insert.table.clone()))?;
        let values = sql::resolve_insert_values(&schema, &insert)?;
        let (key, value) = schema.encode_row(&values);
        let tree = self.catalog.table_tree(&schema);
        tree.put(&key, &value)?;
        Ok(StatementOutcome::RowsAffected(1))
    }

    fn execute_update(&mut self, update: UpdateStmt) -> Result<StatementOutcome> {
        sql::reject_catalog_write(&update.table)?;
        let schema = self
            .catalog
            .table(&update.table)
            .cloned()
            .ok_or_else(|| ExecError::UnknownTable(update.table.clone()))?;
        let (assignments, filter) = sql::resolve_update(&schema, &update)?;
        for (idx, _) in &assignments {
            if *idx == schema.primary_key {
                return Err(ExecError::TypeMismatch("cannot UPDATE the primary key column".into()).into());
            }
        }
        let tree = self.catalog.table_tree(&schema);
        let mut affected = 0;
        for (key, value) in tree.scan(None, None)? {
            let mut row = schema.decode_row(&key, &value);
            let matches = match &filter {
                Some(expr) => matches!(expr.eval(&row)?, Value::Bool(true)),
                None => true,
            };
            if !matches {
                continue;
            }
            let new_values: Vec<(usize, Value)> = assignments
                .iter()
                .map(|(idx, expr)| expr.eval(&row).map(|v| (*idx, v)))
                .collect::<Result<Vec<_>>>()?;
            for (idx, value) in new_values {
                row[idx] = value;
            }
            let (new_key, new_value) = schema.encode_row(&row);
            debug_assert_eq!(new_key, key, "UPDATE never changes the primary key");
            tree.put(&new_key, &new_value)?;
            affected += 1;
        }
        Ok(StatementOutcome::RowsAffected(affected))
    }

    fn execute_delete(&mut self, delete: DeleteStmt) -> Result<StatementOutcome> {
        sql::reject_catalog_write(&delete.table)?;
        let schema = self
            .catalog
            .table(&delete.table)
            .cloned()
            .ok_or_else(|| ExecError::UnknownTable(delete.table.clone()))?;
        let filter = sql::resolve_delete_filter(&schema, &delete)?;
        let tree = self.catalog.table_tree(&schema);
        let mut to_delete = Vec::new();
        for (key, value) in tree.scan(None, None)? {
            let row = schema.decode_row(&key, &value);
            let matches = match &filter {
                Some(expr) => matches!(expr.eval(&row)?, Value::Bool(true)),
                None => true,
            };
            if matches {
                to_delete.push(key);
            }
        }
        let affected = to_delete.len();
        for key in to_delete {
            tree.delete(&key)?;
        }
        Ok(StatementOutcome::RowsAffected(affected))
    }

    fn execute_explain(&mut self, inner: Stmt) -> Result<StatementOutcome> {
        let Stmt::Select(select) = inner else {
            return Err(ExecError::Syntax("EXPLAIN only supports SELECT".into()).into());
        };
        let (plan, _) = sql::build_select_plan(&self.catalog, &select)?;
        let text = describe_plan(&plan, 0);
        Ok(StatementOutcome::Rows {
            row_type: RowType(vec![crate::exec::ColumnInfo {
                table: None,
                name: "plan".to_string(),
                kind: crate::types::ValueKind::Text,
            }]),
            rows: text.lines().map(|l| vec![Value::Text(l.to_string())]).collect(),
        })
    }
}

fn describe_plan(plan: &crate::exec::Plan, depth: usize) -> String {
    use crate::exec::Plan;
    let pad = "  ".repeat(depth);
    match plan {
        Plan::Scan { schema, .. } => format!("{pad}Scan({})", schema.name),
        Plan::ScanDummy => format!("{pad}ScanDummy"),
        Plan::Filter { input, .. } => format!("{pad}Filter\n{}", describe_plan(input, depth + 1)),
        Plan::Join { outer, inner, .. } => {
            format!("{pad}Join\n{}\n{}", describe_plan(outer, depth + 1), describe_plan(inner, depth + 1))
        }
        Plan::Projection { input, .. } => format!("{pad}Projection\n{}", describe_plan(input, depth + 1)),
        Plan::Group { input, .. } => format!("{pad}Group\n{}", describe_plan(input, depth + 1)),
        Plan::Order { input, .. } => format!("{pad}Order\n{}", describe_plan(input, depth + 1)),
        Plan::Limit { input, .. } => format!("{pad}Limit\n{}", describe_plan(input, depth + 1)),
    }
}

/// A lazily-pulled `SELECT` result. Closes its plan tree on `Drop`.
pub struct RowCursor {
    op: Box<dyn Operator>,
    row_type: RowType,
}

impl RowCursor {
    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    pub fn next(&mut self) -> Option<Result<Row>> {
        self.op.next().transpose()
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        let _ = self.op.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_tmp() -> (Db, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let db = Db::open(file.path()).unwrap();
        (db, file)
    }

    #[test]
    fn create_insert_and_scan_in_order() {
        let (mut db, _f) = open_tmp();
        db.run("CREATE TABLE t (id INT PRIMARY KEY, name TEXT)").unwrap();
        db.run(r#"INSERT INTO t (1, "a")"#).unwrap();
        db.run(r#"INSERT INTO t (2, "b")"#).unwrap();
        db.run(r#"INSERT INTO t (3, "c")"#).unwrap();
        let report = db.run("SELECT id, name FROM t ORDER BY id").unwrap();
        match &report.outcomes[0] {
            StatementOutcome::Rows { rows, .. } => {
                assert_eq!(rows.len(), 3);
                assert_eq!(rows[0], vec![Value::Int(1), Value::Text("a".into())]);
                assert_eq!(rows[2], vec![Value::Int(3), Value::Text("c".into())]);
            }
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn delete_in_the_middle() {
        let (mut db, _f) = open_tmp();
        db.run("CREATE TABLE t (id INT PRIMARY KEY, name TEXT)").unwrap();
        db.run(r#"INSERT INTO t (1, "a")"#).unwrap();
        db.run(r#"INSERT INTO t (2, "b")"#).unwrap();
        db.run(r#"INSERT INTO t (3, "c")"#).unwrap();
        db.run("DELETE FROM t WHERE id = 2").unwrap();
        let report = db.run("SELECT id FROM t ORDER BY id").unwrap();
        match &report.outcomes[0] {
            StatementOutcome::Rows { rows, .. } => {
                assert_eq!(rows, &vec![vec![Value::Int(1)], vec![Value::Int(3)]]);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn update_changing_text_length() {
        let (mut db, _f) = open_tmp();
        db.run("CREATE TABLE t (id INT PRIMARY KEY, name TEXT)").unwrap();
        db.run(r#"INSERT INTO t (1, "a")"#).unwrap();
        db.run(r#"UPDATE t SET name = "longer-than-before" WHERE id = 1"#).unwrap();
        let report = db.run("SELECT name FROM t WHERE id = 1").unwrap();
        match &report.outcomes[0] {
            StatementOutcome::Rows { rows, .. } => {
                assert_eq!(rows[0], vec![Value::Text("longer-than-before".into())]);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn group_by_with_aggregates() {
        let (mut db, _f) = open_tmp();
        db.run("CREATE TABLE g (id INT PRIMARY KEY, k INT)").unwrap();
        db.run("INSERT INTO g (1, 10)").unwrap();
        db.run("INSERT INTO g (2, 20)").unwrap();
        db.run("INSERT INTO g (3, 10)").unwrap();
        let report = db.run("SELECT k, count(id), sum(id) FROM g GROUP BY k ORDER BY k").unwrap();
        match &report.outcomes[0] {
            StatementOutcome::Rows { rows, .. } => {
                assert_eq!(
                    rows,
                    &vec![
                        vec![Value::Int(10), Value::Int(2), Value::Int(4)],
                        vec![Value::Int(20), Value::Int(1), Value::Int(2)],
                    ]
                );
            }
            _ => panic!(),
        }
    }

    #[test]
    fn group_by_key_keeps_its_own_column_kind() {
        let (mut db, _f) = open_tmp();
        db.run("CREATE TABLE g (id INT PRIMARY KEY, category TEXT)").unwrap();
        db.run(r#"INSERT INTO g (1, "fruit")"#).unwrap();
        db.run(r#"INSERT INTO g (2, "veg")"#).unwrap();
        let mut cursor = db.query("SELECT category, count(id) FROM g GROUP BY category").unwrap();
        assert_eq!(cursor.row_type().0[0].kind, crate::types::ValueKind::Text);
        assert_eq!(cursor.row_type().0[1].kind, crate::types::ValueKind::Int);
        while cursor.next().is_some() {}
    }

    #[test]
    fn null_propagation_scenarios() {
        let (mut db, _f) = open_tmp();
        let report = db.run("SELECT 1 + NULL IS NULL").unwrap();
        assert_rows_eq(&report.outcomes[0], vec![vec![Value::Bool(true)]]);
        let report = db.run("SELECT NULL OR TRUE").unwrap();
        assert_rows_eq(&report.outcomes[0], vec![vec![Value::Bool(true)]]);
        let report = db.run("SELECT NULL AND FALSE").unwrap();
        assert_rows_eq(&report.outcomes[0], vec![vec![Value::Bool(false)]]);
    }

    fn assert_rows_eq(outcome: &StatementOutcome, expected: Vec<Vec<Value>>) {
        match outcome {
            StatementOutcome::Rows { rows, .. } => assert_eq!(rows, &expected),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn persists_across_reopen() {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        {
            let mut db = Db::open(file.path()).unwrap();
            db.run("CREATE TABLE t (id INT PRIMARY KEY, name TEXT)").unwrap();
            db.run(r#"INSERT INTO t (1, "a")"#).unwrap();
            db.run(r#"INSERT INTO t (2, "b")"#).unwrap();
        }
        let mut db = Db::open(file.path()).unwrap();
        let report = db.run("SELECT id FROM t ORDER BY id").unwrap();
        assert_rows_eq(&report.outcomes[0], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    }

    #[test]
    fn direct_catalog_writes_are_rejected() {
        let (mut db, _f) = open_tmp();
        assert!(db.run(r#"INSERT INTO CATALOG ("x", "y", 1)"#).is_err());
    }

    #[test]
    fn select_list_reports_every_bad_column_at_once() {
        let (mut db, _f) = open_tmp();
        db.run("CREATE TABLE t (id INT PRIMARY KEY, name TEXT)").unwrap();
        let err = db.run("SELECT missing_one, missing_two FROM t").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("missing_one"), "missing first bad column in: {text}");
        assert!(text.contains("missing_two"), "missing second bad column in: {text}");
    }
}
