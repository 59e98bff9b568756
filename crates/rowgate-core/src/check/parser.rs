use pest::Parser;
use pest_derive::Parser;
use serde_json::Value;

#[derive(Parser)]
#[grammar = "check/grammar.pest"]
struct CheckParser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("syntax error in check expression: {0}")]
    Syntax(String),

    #[error("check references unknown column '{column}' on {relation}")]
    UnknownColumn { relation: String, column: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Row(String),
    Auth(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    pub(crate) fn visit_row_columns<E>(
        &self,
        f: &mut impl FnMut(&str) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Expr::Row(column) => f(column),
            Expr::Literal(_) | Expr::Auth(_) => Ok(()),
            Expr::Not(inner) => inner.visit_row_columns(f),
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.visit_row_columns(f)?;
                }
                Ok(())
            }
            Expr::Cmp { lhs, rhs, .. } => {
                lhs.visit_row_columns(f)?;
                rhs.visit_row_columns(f)
            }
            Expr::IsNull { operand, .. } => operand.visit_row_columns(f),
        }
    }
}

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

pub(crate) fn parse_expression(input: &str) -> Result<Expr, CheckError> {
    let mut pairs = CheckParser::parse(Rule::expression, input)
        .map_err(|e| CheckError::Syntax(e.to_string()))?;
    let expression = pairs
        .next()
        .ok_or_else(|| CheckError::Syntax("empty expression".to_string()))?;
    let disjunction = expression
        .into_inner()
        .find(|p| p.as_rule() == Rule::disjunction)
        .ok_or_else(|| CheckError::Syntax("empty expression".to_string()))?;
    build_disjunction(disjunction)
}

fn unexpected(pair: &Pair<'_>) -> CheckError {
    CheckError::Syntax(format!("unexpected rule: {:?}", pair.as_rule()))
}

fn missing(context: &str) -> CheckError {
    CheckError::Syntax(format!("missing token: {context}"))
}

fn build_disjunction(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let mut children = pair
        .into_inner()
        .map(build_conjunction)
        .collect::<Result<Vec<_>, _>>()?;
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Expr::Or(children))
    }
}

fn build_conjunction(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let mut children = pair
        .into_inner()
        .map(build_negation)
        .collect::<Result<Vec<_>, _>>()?;
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Expr::And(children))
    }
}

fn build_negation(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or_else(|| missing("negation operand"))?;
    match first.as_rule() {
        Rule::not_kw => {
            let nested = inner.next().ok_or_else(|| missing("negated expression"))?;
            Ok(Expr::Not(Box::new(build_negation(nested)?)))
        }
        Rule::predicate => build_predicate(first),
        _ => Err(unexpected(&first)),
    }
}

fn build_predicate(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let mut inner = pair.into_inner();
    let operand = build_operand(inner.next().ok_or_else(|| missing("operand"))?)?;
    match inner.next() {
        None => Ok(operand),
        Some(tail) => match tail.as_rule() {
            Rule::comparison => {
                let mut parts = tail.into_inner();
                let op_pair = parts.next().ok_or_else(|| missing("comparison operator"))?;
                let rhs = build_operand(parts.next().ok_or_else(|| missing("right operand"))?)?;
                Ok(Expr::Cmp {
                    op: parse_cmp_op(op_pair.as_str())?,
                    lhs: Box::new(operand),
                    rhs: Box::new(rhs),
                })
            }
            Rule::null_test => {
                let negated = tail.into_inner().any(|p| p.as_rule() == Rule::not_kw);
                Ok(Expr::IsNull {
                    operand: Box::new(operand),
                    negated,
                })
            }
            _ => Err(unexpected(&tail)),
        },
    }
}

fn parse_cmp_op(text: &str) -> Result<CmpOp, CheckError> {
    match text {
        "=" => Ok(CmpOp::Eq),
        "!=" | "<>" => Ok(CmpOp::Ne),
        "<" => Ok(CmpOp::Lt),
        "<=" => Ok(CmpOp::Le),
        ">" => Ok(CmpOp::Gt),
        ">=" => Ok(CmpOp::Ge),
        other => Err(CheckError::Syntax(format!(
            "unknown comparison operator: {other}"
        ))),
    }
}

fn build_operand(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| missing("operand body"))?;
    match inner.as_rule() {
        Rule::literal => build_literal(inner),
        Rule::reference => build_reference(inner),
        Rule::disjunction => build_disjunction(inner),
        _ => Err(unexpected(&inner)),
    }
}

fn build_reference(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let mut inner = pair.into_inner();
    let base = inner.next().ok_or_else(|| missing("reference base"))?;
    let ident = inner
        .next()
        .ok_or_else(|| missing("reference identifier"))?
        .as_str()
        .to_string();
    match base.as_str().to_ascii_lowercase().as_str() {
        "row" | "new" | "this" => Ok(Expr::Row(ident)),
        "auth" => Ok(Expr::Auth(ident)),
        other => Err(CheckError::Syntax(format!(
            "unknown reference base: {other}"
        ))),
    }
}

fn build_literal(pair: Pair<'_>) -> Result<Expr, CheckError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| missing("literal body"))?;
    let value = match inner.as_rule() {
        Rule::string => {
            let raw = inner
                .into_inner()
                .next()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            Value::String(raw.replace("''", "'"))
        }
        Rule::number => {
            let text = inner.as_str();
            if text.contains('.') {
                let parsed: f64 = text
                    .parse()
                    .map_err(|_| CheckError::Syntax(format!("invalid number: {text}")))?;
                serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| CheckError::Syntax(format!("invalid number: {text}")))?
            } else {
                let parsed: i64 = text
                    .parse()
                    .map_err(|_| CheckError::Syntax(format!("invalid number: {text}")))?;
                Value::Number(parsed.into())
            }
        }
        Rule::boolean => {
            let is_true = inner
                .into_inner()
                .next()
                .is_some_and(|p| p.as_rule() == Rule::true_kw);
            Value::Bool(is_true)
        }
        Rule::null_lit => Value::Null,
        _ => return Err(unexpected(&inner)),
    };
    Ok(Expr::Literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_simple_equality() {
        let expr = parse_expression("row.owner = auth.user_id").unwrap();

        assert_eq!(
            expr,
            Expr::Cmp {
                op: CmpOp::Eq,
                lhs: Box::new(Expr::Row("owner".to_string())),
                rhs: Box::new(Expr::Auth("user_id".to_string())),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse_expression("row.a OR row.b AND row.c").unwrap();

        match expr {
            Expr::Or(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0], Expr::Row("a".to_string()));
                assert!(matches!(children[1], Expr::And(_)));
            }
            other => panic!("expected Or, got: {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse_expression("(row.a OR row.b) AND row.c").unwrap();

        match expr {
            Expr::And(children) => {
                assert!(matches!(children[0], Expr::Or(_)));
                assert_eq!(children[1], Expr::Row("c".to_string()));
            }
            other => panic!("expected And, got: {other:?}"),
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let upper = parse_expression("row.a AND NOT row.b").unwrap();
        let lower = parse_expression("row.a and not row.b").unwrap();

        assert_eq!(upper, lower);
    }

    #[test]
    fn new_and_this_alias_row() {
        assert_eq!(
            parse_expression("new.owner = 'x'").unwrap(),
            parse_expression("row.owner = 'x'").unwrap()
        );
        assert_eq!(
            parse_expression("this.owner = 'x'").unwrap(),
            parse_expression("row.owner = 'x'").unwrap()
        );
    }

    #[test]
    fn parses_is_not_null() {
        let expr = parse_expression("row.deleted_at IS NOT NULL").unwrap();

        assert_eq!(
            expr,
            Expr::IsNull {
                operand: Box::new(Expr::Row("deleted_at".to_string())),
                negated: true,
            }
        );
    }

    #[test]
    fn parses_literals() {
        assert_eq!(
            parse_expression("row.x = 'text'").unwrap(),
            Expr::Cmp {
                op: CmpOp::Eq,
                lhs: Box::new(Expr::Row("x".to_string())),
                rhs: Box::new(Expr::Literal(json!("text"))),
            }
        );
        assert!(matches!(
            parse_expression("row.x = -12").unwrap(),
            Expr::Cmp { .. }
        ));
        assert!(matches!(
            parse_expression("row.x = 1.5").unwrap(),
            Expr::Cmp { .. }
        ));
    }

    #[test]
    fn rejects_bare_identifier() {
        assert!(parse_expression("owner = 'x'").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_expression("row.x = 1 garbage").is_err());
    }
}
