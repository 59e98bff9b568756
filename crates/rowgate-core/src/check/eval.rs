use serde_json::Value;

use crate::auth::Auth;
use crate::change::Record;

use super::EvalError;
use super::parser::{CmpOp, Expr};

pub(crate) fn evaluate(expr: &Expr, record: &Record, auth: &Auth) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Row(column) => record
            .get(column)
            .cloned()
            .ok_or_else(|| EvalError::MissingColumn {
                column: column.clone(),
            }),
        Expr::Auth(claim) => Ok(auth.claim(claim)),
        Expr::Not(inner) => {
            let value = evaluate(inner, record, auth)?;
            Ok(Value::Bool(!truthy(&value)?))
        }
        Expr::And(children) => {
            for child in children {
                let value = evaluate(child, record, auth)?;
                if !truthy(&value)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(children) => {
            for child in children {
                let value = evaluate(child, record, auth)?;
                if truthy(&value)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = evaluate(lhs, record, auth)?;
            let rhs = evaluate(rhs, record, auth)?;
            compare(*op, &lhs, &rhs).map(Value::Bool)
        }
        Expr::IsNull { operand, negated } => {
            let value = evaluate(operand, record, auth)?;
            let is_null = value.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }
    }
}

fn truthy(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::NotBoolean {
            expression: other.to_string(),
        }),
    }
}

/// SQL-flavoured comparison: any null operand makes the comparison false,
/// numbers compare numerically, strings lexicographically.
fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(false);
    }
    match op {
        CmpOp::Eq => Ok(values_equal(lhs, rhs)),
        CmpOp::Ne => Ok(!values_equal(lhs, rhs)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(lhs, rhs)?;
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn order(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, EvalError> {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return a.partial_cmp(&b).ok_or_else(|| uncomparable(lhs, rhs));
    }
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Ok(a.cmp(b));
    }
    Err(uncomparable(lhs, rhs))
}

fn uncomparable(lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::Uncomparable {
        lhs: lhs.to_string(),
        rhs: rhs.to_string(),
    }
}
