mod eval;
mod parser;

use std::fmt;
use std::sync::Arc;

use crate::auth::Auth;
use crate::change::Record;
use crate::schema::TableInfo;

pub use parser::CheckError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("check references missing column '{column}'")]
    MissingColumn { column: String },

    #[error("check expression '{expression}' did not produce a boolean")]
    NotBoolean { expression: String },

    #[error("values {lhs} and {rhs} cannot be ordered")]
    Uncomparable { lhs: String, rhs: String },
}

/// A compiled CHECK clause: a deterministic predicate over a change record
/// and the session auth.
#[derive(Clone)]
pub struct Predicate {
    source: String,
    expr: Arc<parser::Expr>,
}

impl Predicate {
    /// Compiles `source` under the target table's metadata. Row references
    /// to columns the table does not declare are rejected here rather than
    /// at evaluation time.
    pub fn compile(source: &str, table: Option<&TableInfo>) -> Result<Self, CheckError> {
        let expr = parser::parse_expression(source)?;
        if let Some(table) = table {
            expr.visit_row_columns(&mut |column| {
                if table.columns.iter().any(|c| c == column) {
                    Ok(())
                } else {
                    Err(CheckError::UnknownColumn {
                        relation: table.relation.to_string(),
                        column: column.to_string(),
                    })
                }
            })?;
        }
        Ok(Self {
            source: source.to_string(),
            expr: Arc::new(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Row columns the predicate reads, deduplicated.
    pub fn row_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let _ = self
            .expr
            .visit_row_columns(&mut |column: &str| -> Result<(), ()> {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
                Ok(())
            });
        columns
    }

    pub fn evaluate(&self, record: &Record, auth: &Auth) -> Result<bool, EvalError> {
        match eval::evaluate(&self.expr, record, auth)? {
            serde_json::Value::Bool(b) => Ok(b),
            _ => Err(EvalError::NotBoolean {
                expression: self.source.clone(),
            }),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.source)
    }
}
