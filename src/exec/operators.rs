use crate::btree::Cursor;
use crate::catalog::TableSchema;
use crate::error::Result;
use crate::exec::expr::PlanExpr;
use crate::exec::sorter::Sorter;
use crate::exec::{Operator, Row, RowType};
use crate::pager::Pager;
use crate::sql::ast::{AggKind, OrderDir};
use crate::types::{key_type_for, Value};
use std::sync::Arc;

/// Streams every row of a table in ascending primary-key order.
pub struct Scan {
    cursor: Cursor,
    schema: Arc<TableSchema>,
    row_type: RowType,
    started: bool,
}

impl Scan {
    pub fn new(pager: Pager, schema: Arc<TableSchema>, row_type: RowType) -> Self {
        let key_type = key_type_for(schema.key_kind()).into();
        let root = schema.root;
        Self {
            cursor: Cursor::new(pager, key_type, root),
            schema,
            row_type,
            started: false,
        }
    }

    fn decode(&self, key: &[u8], value: &[u8]) -> Row {
        self.schema.decode_row(key, value)
    }
}

impl Operator for Scan {
    fn next(&mut self) -> Result<Option<Row>> {
        let has = if !self.started {
            self.started = true;
            self.cursor.goto_first()?
        } else {
            self.cursor.goto_next()?
        };
        if !has {
            return Ok(None);
        }
        Ok(self.cursor.current()?.map(|(k, v)| self.decode(&k, &v)))
    }

    fn reset(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

/// Yields exactly one empty row, for `SELECT` without a `FROM` clause.
pub struct ScanDummy {
    row_type: RowType,
    done: bool,
}

impl ScanDummy {
    pub fn new() -> Self {
        Self {
            row_type: RowType::default(),
            done: false,
        }
    }
}

impl Operator for ScanDummy {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Vec::new()))
    }

    fn reset(&mut self) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

pub struct Filter {
    child: Box<dyn Operator>,
    predicate: PlanExpr,
}

impl Filter {
    pub fn new(child: Box<dyn Operator>, predicate: PlanExpr) -> Self {
        Self { child, predicate }
    }
}

impl Operator for Filter {
    fn next(&mut self) -> Result<Option<Row>> {
        while let Some(row) = self.child.next()? {
            if matches!(self.predicate.eval(&row)?, Value::Bool(true)) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.child.reset()
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn row_type(&self) -> &RowType {
        self.child.row_type()
    }
}

/// Nested-loop join: for every outer row, iterate the inner child fully
/// (reset on roll-over). `on`, when present, additionally filters
/// combinations; when absent this is a plain cross join.
pub struct Join {
    outer: Box<dyn Operator>,
    inner: Box<dyn Operator>,
    on: Option<PlanExpr>,
    current_outer: Option<Row>,
    row_type: RowType,
    started: bool,
}

impl Join {
    pub fn new(outer: Box<dyn Operator>, inner: Box<dyn Operator>, on: Option<PlanExpr>) -> Self {
        let mut cols = outer.row_type().0.clone();
        cols.extend(inner.row_type().0.iter().cloned());
        Self {
            outer,
            inner,
            on,
            current_outer: None,
            row_type: RowType(cols),
            started: false,
        }
    }
}

impl Operator for Join {
    fn next(&mut self) -> Result<Option<Row>> {
        if !self.started {
            self.started = true;
            self.current_outer = self.outer.next()?;
        }
        loop {
            let Some(outer_row) = self.current_outer.clone() else {
                return Ok(None);
            };
            match self.inner.next()? {
                Some(inner_row) => {
                    let mut combined = outer_row;
                    combined.extend(inner_row);
                    if let Some(on) = &self.on {
                        if !matches!(on.eval(&combined)?, Value::Bool(true)) {
                            continue;
                        }
                    }
                    return Ok(Some(combined));
                }
                None => {
                    self.inner.reset()?;
                    self.current_outer = self.outer.next()?;
                    if self.current_outer.is_none() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.started = false;
        self.current_outer = None;
        self.inner.reset()?;
        self.outer.reset()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        self.outer.close()
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

pub struct Projection {
    child: Box<dyn Operator>,
    exprs: Vec<PlanExpr>,
    row_type: RowType,
}

impl Projection {
    pub fn new(child: Box<dyn Operator>, exprs: Vec<PlanExpr>, row_type: RowType) -> Self {
        Self { child, exprs, row_type }
    }
}

impl Operator for Projection {
    fn next(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.child.next()? else {
            return Ok(None);
        };
        Ok(Some(self.exprs.iter().map(|e| e.eval(&row)).collect::<Result<Vec<_>>>()?))
    }

    fn reset(&mut self) -> Result<()> {
        self.child.reset()
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

struct Accumulator {
    kind: AggKind,
    operand: Option<PlanExpr>,
    sum: i64,
    count: i64,
    extremum: Option<Value>,
}

impl Accumulator {
    fn new(kind: AggKind, operand: Option<PlanExpr>) -> Self {
        Self {
            kind,
            operand,
            sum: 0,
            count: 0,
            extremum: None,
        }
    }

    fn feed(&mut self, row: &[Value]) -> Result<()> {
        if self.kind == AggKind::CountStar {
            self.count += 1;
            return Ok(());
        }
        let v = self.operand.as_ref().unwrap().eval(row)?;
        if v.is_null() {
            return Ok(());
        }
        self.count += 1;
        match self.kind {
            AggKind::Count => {}
            AggKind::Sum | AggKind::Avg => {
                if let Value::Int(n) = v {
                    self.sum += n;
                }
            }
            AggKind::Min => {
                if self.extremum.as_ref().is_none_or(|cur| v.compare(cur) == std::cmp::Ordering::Less) {
                    self.extremum = Some(v);
                }
            }
            AggKind::Max => {
                // Deliberately the inverted-vs-MIN comparison direction
                // (replacing the extremum whenever the new value compares
                // Greater) -- the distilled source had this backwards for
                // MAX, always keeping the *first* value seen.
                if self.extremum.as_ref().is_none_or(|cur| v.compare(cur) == std::cmp::Ordering::Greater) {
                    self.extremum = Some(v);
                }
            }
            AggKind::CountStar => unreachable!(),
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        match self.kind {
            AggKind::Count | AggKind::CountStar => Value::Int(self.count),
            AggKind::Sum => Value::Int(self.sum),
            AggKind::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Int(self.sum / self.count)
                }
            }
            AggKind::Min | AggKind::Max => self.extremum.clone().unwrap_or(Value::Null),
        }
    }
}

/// One aggregate or bare grouping-key expression in a `GROUP BY`'s select list.
pub enum GroupItem {
    Key(PlanExpr),
    Agg(AggKind, Option<PlanExpr>),
}

pub struct Group {
    child: Box<dyn Operator>,
    group_keys: Vec<PlanExpr>,
    items: Vec<GroupItem>,
    row_type: RowType,
    sorter: Option<Sorter>,
    /// One-row lookahead: the first row of the *next* group, already
    /// pulled off the sorter while closing out the current one.
    peeked: Option<(Vec<Value>, Vec<Value>)>,
    /// Whether the single no-`GROUP BY` aggregate row has been emitted yet.
    ungrouped_done: bool,
}

impl Group {
    pub fn new(child: Box<dyn Operator>, group_keys: Vec<PlanExpr>, items: Vec<GroupItem>, row_type: RowType) -> Self {
        Self {
            child,
            group_keys,
            items,
            row_type,
            sorter: None,
            peeked: None,
            ungrouped_done: false,
        }
    }

    fn materialize(&mut self) -> Result<()> {
        let mut sorter = Sorter::new(self.group_keys.iter().map(|_| OrderDir::Asc).collect());
        while let Some(row) = self.child.next()? {
            let keys: Vec<Value> = self.group_keys.iter().map(|k| k.eval(&row)).collect::<Result<Vec<_>>>()?;
            sorter.push(keys, row);
        }
        self.peeked = sorter.next().cloned();
        self.sorter = Some(sorter);
        Ok(())
    }

    fn keys_equal(a: &[Value], b: &[Value]) -> bool {
        a.iter().zip(b).all(|(x, y)| match (x.is_null(), y.is_null()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => x.compare(y) == std::cmp::Ordering::Equal,
        })
    }

    fn new_accumulators(&self) -> Vec<Accumulator> {
        self.items
            .iter()
            .filter_map(|it| match it {
                GroupItem::Agg(k, o) => Some(Accumulator::new(*k, o.clone())),
                GroupItem::Key(_) => None,
            })
            .collect()
    }

    fn build_row(&self, keys_row: &[Value], accs: &[Accumulator]) -> Result<Row> {
        let mut out = Vec::new();
        let mut ai = 0;
        for item in &self.items {
            match item {
                GroupItem::Key(k) => out.push(k.eval(keys_row)?),
                GroupItem::Agg(..) => {
                    out.push(accs[ai].finish());
                    ai += 1;
                }
            }
        }
        Ok(out)
    }
}

impl Operator for Group {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.sorter.is_none() {
            self.materialize()?;
        }

        if self.group_keys.is_empty() {
            if self.ungrouped_done {
                return Ok(None);
            }
            self.ungrouped_done = true;
            let mut accs = self.new_accumulators();
            let sorter = self.sorter.as_mut().unwrap();
            if let Some((_, row)) = self.peeked.take() {
                for a in accs.iter_mut() {
                    a.feed(&row)?;
                }
            }
            while let Some((_, row)) = sorter.next() {
                for a in accs.iter_mut() {
                    a.feed(row)?;
                }
            }
            return Ok(Some(self.build_row(&[], &accs)?));
        }

        let Some((first_keys, first_row)) = self.peeked.take() else {
            return Ok(None);
        };
        let mut accs = self.new_accumulators();
        for a in accs.iter_mut() {
            a.feed(&first_row)?;
        }
        let sorter = self.sorter.as_mut().unwrap();
        loop {
            match sorter.next() {
                Some((keys, row)) if Self::keys_equal(keys, &first_keys) => {
                    for a in accs.iter_mut() {
                        a.feed(row)?;
                    }
                }
                Some((keys, row)) => {
                    self.peeked = Some((keys.clone(), row.clone()));
                    break;
                }
                None => {
                    self.peeked = None;
                    break;
                }
            }
        }
        Ok(Some(self.build_row(&first_row, &accs)?))
    }

    fn reset(&mut self) -> Result<()> {
        if let Some(s) = &mut self.sorter {
            s.reset();
            self.peeked = s.next().cloned();
        }
        self.ungrouped_done = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn row_type(&self) -> &RowType {
        &self.row_type
    }
}

pub struct Order {
    child: Box<dyn Operator>,
    keys: Vec<PlanExpr>,
    dirs: Vec<OrderDir>,
    sorter: Option<Sorter>,
}

impl Order {
    pub fn new(child: Box<dyn Operator>, keys: Vec<PlanExpr>, dirs: Vec<OrderDir>) -> Self {
        Self {
            child,
            keys,
            dirs,
            sorter: None,
        }
    }
}

impl Operator for Order {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.sorter.is_none() {
            let mut sorter = Sorter::new(self.dirs.clone());
            while let Some(row) = self.child.next()? {
                let keys: Vec<Value> = self.keys.iter().map(|k| k.eval(&row)).collect::<Result<Vec<_>>>()?;
                sorter.push(keys, row);
            }
            self.sorter = Some(sorter);
        }
        Ok(self.sorter.as_mut().unwrap().next().map(|(_, row)| row.clone()))
    }

    fn reset(&mut self) -> Result<()> {
        if let Some(s) = &mut self.sorter {
            s.reset();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn row_type(&self) -> &RowType {
        self.child.row_type()
    }
}

enum LimitState {
    Offsetting,
    Emitting,
    Done,
}

pub struct Limit {
    child: Box<dyn Operator>,
    offset: i64,
    limit: Option<i64>,
    remaining_offset: i64,
    remaining_limit: Option<i64>,
    state: LimitState,
}

impl Limit {
    pub fn new(child: Box<dyn Operator>, offset: i64, limit: Option<i64>) -> Self {
        Self {
            child,
            offset,
            limit,
            remaining_offset: offset,
            remaining_limit: limit,
            state: if offset > 0 { LimitState::Offsetting } else { LimitState::Emitting },
        }
    }
}

impl Operator for Limit {
    fn next(&mut self) -> Result<Option<Row>> {
        if let LimitState::Offsetting = self.state {
            while self.remaining_offset > 0 {
                if self.child.next()?.is_none() {
                    self.state = LimitState::Done;
                    return Ok(None);
                }
                self.remaining_offset -= 1;
            }
            self.state = LimitState::Emitting;
        }
        if let LimitState::Done = self.state {
            return Ok(None);
        }
        if let Some(remaining) = self.remaining_limit {
            if remaining <= 0 {
                self.state = LimitState::Done;
                return Ok(None);
            }
        }
        match self.child.next()? {
            Some(row) => {
                if let Some(remaining) = &mut self.remaining_limit {
                    *remaining -= 1;
                }
                Ok(Some(row))
            }
            None => {
                self.state = LimitState::Done;
                Ok(None)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.remaining_offset = self.offset;
        self.remaining_limit = self.limit;
        self.state = if self.offset > 0 { LimitState::Offsetting } else { LimitState::Emitting };
        self.child.reset()
    }

    fn close(&mut self) -> Result<()> {
        self.child.close()
    }

    fn row_type(&self) -> &RowType {
        self.child.row_type()
    }
}
