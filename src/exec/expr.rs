//! Resolved expression tree the operators evaluate directly, each `Column`
//! already lowered to a flat offset into the row it will be evaluated
//! against -- name resolution happened once, in the type checker.

use crate::error::{ExecError, Result};
use crate::sql::ast::{AggKind, BinOp, UnOp};
use crate::types::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub enum PlanExpr {
    Literal(Value),
    Column(usize),
    Unary(UnOp, Box<PlanExpr>),
    Binary(BinOp, Box<PlanExpr>, Box<PlanExpr>),
    IsNull(Box<PlanExpr>, bool),
    /// Only valid inside a `Group` operator's aggregate list; evaluated
    /// against the row codec's per-row operand column, not via `eval`.
    Agg(AggKind, Option<Box<PlanExpr>>),
}

impl PlanExpr {
    /// Evaluated against a fully-materialized row. Arithmetic failures
    /// (division by zero, overflow) surface as `ExecError::Arithmetic`
    /// rather than panicking, since there is no transaction to roll back
    /// mid-expression -- the caller just aborts the one statement.
    pub fn eval(&self, row: &[Value]) -> Result<Value> {
        match self {
            PlanExpr::Literal(v) => Ok(v.clone()),
            PlanExpr::Column(i) => Ok(row[*i].clone()),
            PlanExpr::Unary(op, e) => eval_unary(*op, e.eval(row)?),
            PlanExpr::Binary(op, l, r) => eval_binary(*op, l, r, row),
            PlanExpr::IsNull(e, negated) => {
                let is_null = e.eval(row)?.is_null();
                Ok(Value::Bool(is_null != *negated))
            }
            PlanExpr::Agg(..) => unreachable!("aggregate expressions are evaluated by Group, not PlanExpr::eval"),
        }
    }
}

fn eval_unary(op: UnOp, v: Value) -> Result<Value> {
    match (op, v) {
        (_, Value::Null) => Ok(Value::Null),
        (UnOp::Neg, Value::Int(n)) => Ok(Value::Int(n.checked_neg().ok_or_else(|| {
            ExecError::Arithmetic(format!("negation of {n} overflows"))
        })?)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, v) => Err(ExecError::TypeMismatch(format!("unary {op:?} not applicable to {v:?}")).into()),
    }
}

fn eval_binary(op: BinOp, l: &PlanExpr, r: &PlanExpr, row: &[Value]) -> Result<Value> {
    // AND/OR short-circuit on a boolean-determining operand even when the
    // other operand is null.
    if op == BinOp::And {
        let lv = l.eval(row)?;
        if matches!(lv, Value::Bool(false)) {
            return Ok(Value::Bool(false));
        }
        let rv = r.eval(row)?;
        if matches!(rv, Value::Bool(false)) {
            return Ok(Value::Bool(false));
        }
        return Ok(if lv.is_null() || rv.is_null() {
            Value::Null
        } else {
            Value::Bool(true)
        });
    }
    if op == BinOp::Or {
        let lv = l.eval(row)?;
        if matches!(lv, Value::Bool(true)) {
            return Ok(Value::Bool(true));
        }
        let rv = r.eval(row)?;
        if matches!(rv, Value::Bool(true)) {
            return Ok(Value::Bool(true));
        }
        return Ok(if lv.is_null() || rv.is_null() {
            Value::Null
        } else {
            Value::Bool(false)
        });
    }

    let lv = l.eval(row)?;
    let rv = r.eval(row)?;
    if op == BinOp::Eq {
        return Ok(if lv.is_null() || rv.is_null() {
            Value::Null
        } else {
            Value::Bool(lv.compare(&rv) == Ordering::Equal)
        });
    }
    if op == BinOp::NotEq {
        return Ok(if lv.is_null() || rv.is_null() {
            Value::Null
        } else {
            Value::Bool(lv.compare(&rv) != Ordering::Equal)
        });
    }
    if lv.is_null() || rv.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinOp::Lt => Ok(Value::Bool(lv.compare(&rv) == Ordering::Less)),
        BinOp::LtEq => Ok(Value::Bool(lv.compare(&rv) != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(lv.compare(&rv) == Ordering::Greater)),
        BinOp::GtEq => Ok(Value::Bool(lv.compare(&rv) != Ordering::Less)),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let (Value::Int(a), Value::Int(b)) = (lv, rv) else {
                return Err(ExecError::TypeMismatch("arithmetic on non-integer operands".into()).into());
            };
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => {
                    if b == 0 {
                        return Err(ExecError::Arithmetic(format!("division of {a} by zero")).into());
                    }
                    a.checked_div(b)
                }
                _ => unreachable!(),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| ExecError::Arithmetic(format!("{a} {op:?} {b} overflows")).into())
        }
        BinOp::And | BinOp::Or | BinOp::Eq | BinOp::NotEq => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_short_circuits_on_false_even_with_null() {
        let e = PlanExpr::Binary(
            BinOp::And,
            Box::new(PlanExpr::Literal(Value::Null)),
            Box::new(PlanExpr::Literal(Value::Bool(false))),
        );
        assert_eq!(e.eval(&[]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn or_short_circuits_on_true_even_with_null() {
        let e = PlanExpr::Binary(
            BinOp::Or,
            Box::new(PlanExpr::Literal(Value::Bool(true))),
            Box::new(PlanExpr::Literal(Value::Null)),
        );
        assert_eq!(e.eval(&[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn is_null_is_never_itself_null() {
        let e = PlanExpr::IsNull(
            Box::new(PlanExpr::Binary(
                BinOp::Add,
                Box::new(PlanExpr::Literal(Value::Int(1))),
                Box::new(PlanExpr::Literal(Value::Null)),
            )),
            false,
        );
        assert_eq!(e.eval(&[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn equality_propagates_null() {
        let e = PlanExpr::Binary(
            BinOp::Eq,
            Box::new(PlanExpr::Literal(Value::Null)),
            Box::new(PlanExpr::Literal(Value::Int(1))),
        );
        assert_eq!(e.eval(&[]).unwrap(), Value::Null);
    }

    #[test]
    fn division_by_zero_is_an_arithmetic_error_not_a_panic() {
        let e = PlanExpr::Binary(
            BinOp::Div,
            Box::new(PlanExpr::Literal(Value::Int(1))),
            Box::new(PlanExpr::Literal(Value::Int(0))),
        );
        assert!(matches!(e.eval(&[]), Err(crate::error::DbError::Exec(ExecError::Arithmetic(_)))));
    }
}
