//! Evaluation of parsed expressions against an event detail.
//!
//! Field access is null-safe: absent or null fields read as [`Value::Null`],
//! which compares equal to the zero value of the other operand's type. This
//! lets rule conditions like `change.file.id == ""` hold when the change
//! carries no file object at all.

use regex::Regex;

use crate::types::Detail;

use super::parser::{BinOp, Expr, Method};
use super::EvalError;

/// Runtime value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent or null field.
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// A present sub-object (compared against `null`, never manipulated).
    Obj(serde_json::Value),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Obj(_) => "object",
        }
    }

    /// String view for methods and concatenation; null reads as "".
    fn as_str_lossy(&self) -> Result<String, EvalError> {
        match self {
            Value::Null => Ok(String::new()),
            Value::Str(s) => Ok(s.clone()),
            other => Err(EvalError::Type(format!(
                "expected string, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Numeric view for ordering comparisons; numeric strings coerce so the
    /// string-typed `size` field in event details stays comparable. Null and
    /// non-numeric strings read as 0.
    fn as_int_lossy(&self) -> Result<i64, EvalError> {
        match self {
            Value::Null => Ok(0),
            Value::Int(n) => Ok(*n),
            Value::Str(s) => Ok(s.parse().unwrap_or(0)),
            other => Err(EvalError::Type(format!(
                "expected number, got {}",
                other.kind_name()
            ))),
        }
    }

    fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(EvalError::Type(format!(
                "expected bool, got {}",
                other.kind_name()
            ))),
        }
    }
}

/// Variable scope for one evaluation: the event detail rendered to JSON once,
/// with the conventional top-level roots.
#[derive(Debug)]
pub struct Scope {
    detail: serde_json::Value,
}

impl Scope {
    pub fn from_detail(detail: &Detail) -> Self {
        Scope {
            // The detail type serializes infallibly: it is a tree of strings,
            // bools, ints and options thereof.
            detail: serde_json::to_value(detail).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Resolves a dotted path. The first segment selects the root: `detail`
    /// addresses the whole payload; `subject`, `entity`, `actor` and
    /// `change` address the corresponding sub-tree. Anything missing along
    /// the way is null.
    fn resolve(&self, path: &[String]) -> Value {
        let mut node = match path.first().map(String::as_str) {
            Some("detail") => &self.detail,
            Some(root @ ("subject" | "entity" | "actor" | "change")) => {
                match self.detail.get(root) {
                    Some(v) => v,
                    None => return Value::Null,
                }
            }
            _ => return Value::Null,
        };
        for segment in &path[1..] {
            match node.get(segment) {
                Some(next) => node = next,
                None => return Value::Null,
            }
        }
        json_to_value(node)
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Int(n.as_i64().unwrap_or(0)),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        other => Value::Obj(other.clone()),
    }
}

/// Evaluates `expr` in `scope`.
pub fn eval(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Field(path) => Ok(scope.resolve(path)),
        Expr::Env(name) => {
            let name = eval(name, scope)?.as_str_lossy()?;
            Ok(Value::Str(std::env::var(&name).unwrap_or_default()))
        }
        Expr::Not(inner) => {
            let value = eval(inner, scope)?.as_bool()?;
            Ok(Value::Bool(!value))
        }
        Expr::Method(method, recv, arg) => {
            let recv = eval(recv, scope)?.as_str_lossy()?;
            let arg = eval(arg, scope)?.as_str_lossy()?;
            let result = match method {
                Method::StartsWith => recv.starts_with(&arg),
                Method::EndsWith => recv.ends_with(&arg),
                Method::Contains => recv.contains(&arg),
                Method::Matches => {
                    let re = Regex::new(&arg).map_err(|e| EvalError::BadRegex(e.to_string()))?;
                    re.is_match(&recv)
                }
            };
            Ok(Value::Bool(result))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, scope),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match op {
        // Short-circuiting combinators.
        BinOp::And => {
            if !eval(lhs, scope)?.as_bool()? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, scope)?.as_bool()?))
        }
        BinOp::Or => {
            if eval(lhs, scope)?.as_bool()? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, scope)?.as_bool()?))
        }
        BinOp::Eq => Ok(Value::Bool(values_equal(
            &eval(lhs, scope)?,
            &eval(rhs, scope)?,
        ))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(
            &eval(lhs, scope)?,
            &eval(rhs, scope)?,
        ))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let a = eval(lhs, scope)?.as_int_lossy()?;
            let b = eval(rhs, scope)?.as_int_lossy()?;
            Ok(Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }))
        }
        BinOp::Add => {
            let a = eval(lhs, scope)?;
            let b = eval(rhs, scope)?;
            match (&a, &b) {
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
                _ => Ok(Value::Str(format!(
                    "{}{}",
                    a.as_str_lossy()?,
                    b.as_str_lossy()?
                ))),
            }
        }
    }
}

/// Equality with null-as-zero-value semantics: null equals the empty string,
/// false, and zero, so null-safe field access behaves like reading a zero
/// value from an absent sub-object.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::Str(s)) | (Value::Str(s), Value::Null) => s.is_empty(),
        (Value::Null, Value::Bool(v)) | (Value::Bool(v), Value::Null) => !v,
        (Value::Null, Value::Int(n)) | (Value::Int(n), Value::Null) => *n == 0,
        (Value::Null, Value::Obj(_)) | (Value::Obj(_), Value::Null) => false,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        // Numeric strings compare with ints so `size` stays usable.
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            s.parse::<i64>().map(|v| v == *n).unwrap_or(false)
        }
        (Value::Obj(x), Value::Obj(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use crate::types::{Change, Detail};

    fn scope_of(detail: &Detail) -> Scope {
        Scope::from_detail(detail)
    }

    fn eval_str(input: &str, detail: &Detail) -> Value {
        eval(&parse(input).unwrap(), &scope_of(detail)).unwrap()
    }

    #[test]
    fn null_equals_empty_string() {
        let detail = Detail::default();
        assert_eq!(
            eval_str(r#"change.file.id == """#, &detail),
            Value::Bool(true)
        );
    }

    #[test]
    fn null_equals_false() {
        let detail = Detail::default();
        assert_eq!(eval_str("change.removed == false", &detail), Value::Bool(true));
    }

    #[test]
    fn present_object_is_not_null() {
        let detail = Detail {
            change: Some(Change {
                change_type: "file".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(eval_str("change != null", &detail), Value::Bool(true));
        assert_eq!(eval_str("change.file == null", &detail), Value::Bool(true));
    }

    #[test]
    fn not_on_null_field_reads_false() {
        let detail = Detail::default();
        assert_eq!(eval_str("!change.removed", &detail), Value::Bool(true));
    }

    #[test]
    fn combinators_short_circuit() {
        // The rhs (a bare string used as a bool) would be a type error if
        // evaluated; short-circuiting skips it.
        let detail = Detail {
            subject: "s".to_string(),
            ..Default::default()
        };
        assert_eq!(eval_str("false && subject", &detail), Value::Bool(false));
        assert_eq!(eval_str("true || subject", &detail), Value::Bool(true));
        // Without short-circuiting the same operand is a type error.
        let result = eval(&parse("true && subject").unwrap(), &scope_of(&detail));
        assert!(matches!(result, Err(EvalError::Type(_))));
    }

    #[test]
    fn int_addition_and_string_concat() {
        let detail = Detail::default();
        assert_eq!(eval_str("1 + 2", &detail), Value::Int(3));
        assert_eq!(
            eval_str(r#""a" + "b""#, &detail),
            Value::Str("ab".to_string())
        );
    }

    #[test]
    fn numeric_string_equality_with_int() {
        let detail = Detail {
            change: Some(Change {
                file: Some(crate::types::File {
                    size: "1500".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(eval_str("change.file.size == 1500", &detail), Value::Bool(true));
        assert_eq!(eval_str("change.file.size >= 1000", &detail), Value::Bool(true));
    }

    #[test]
    fn unknown_root_is_null() {
        let detail = Detail::default();
        assert_eq!(eval_str("bogus == null", &detail), Value::Bool(true));
    }

    #[test]
    fn bad_regex_is_an_error() {
        let detail = Detail::default();
        let result = eval(
            &parse(r#"subject.matches("[unclosed")"#).unwrap(),
            &scope_of(&detail),
        );
        assert!(matches!(result, Err(EvalError::BadRegex(_))));
    }

    #[test]
    fn string_comparison_with_object_is_type_error() {
        let detail = Detail {
            change: Some(Change::default()),
            ..Default::default()
        };
        let result = eval(&parse("change > 1").unwrap(), &scope_of(&detail));
        assert!(matches!(result, Err(EvalError::Type(_))));
    }
}
