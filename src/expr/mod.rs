//! Expression language for copy-rule conditions and templates.
//!
//! A small, hand-rolled language evaluated against the event detail. The
//! surface covers what rule documents need and nothing more:
//!
//! - literals: strings (single or double quoted), integers, `true`/`false`,
//!   `null`
//! - null-safe dotted field access rooted at `detail`, `subject`, `entity`,
//!   `actor` or `change` (absent sub-objects read as zero values)
//! - operators: `==` `!=` `<` `<=` `>` `>=` `&&` `||` `!` and string `+`
//! - string methods: `startsWith`, `endsWith`, `contains`, `matches` (regex)
//! - `env("VAR")`, returning the empty string for undefined variables
//!
//! Expressions are parsed once ([`Expression::parse`]) and evaluated many
//! times against [`Scope`]s built from event details.

pub mod eval;
pub mod parser;

pub use eval::{Scope, Value};
pub use parser::ParseError;

use thiserror::Error;

use crate::types::Detail;

/// Error produced when evaluating a compiled expression.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A `matches()` pattern failed to compile.
    #[error("invalid regex in matches(): {0}")]
    BadRegex(String),

    /// An operator was applied to operands it does not support.
    #[error("type error: {0}")]
    Type(String),
}

/// Statically inferable result kind of an expression.
///
/// Used at bind time to decide whether a raw config string is a usable
/// expression for a string- or bool-typed field, before the validation
/// corpus is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int,
    Str,
    /// Depends on runtime data (field access).
    Dynamic,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: parser::Expr,
}

impl Expression {
    /// Parses `input` into an expression.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Ok(Expression {
            root: parser::parse(input)?,
        })
    }

    /// The statically inferable result kind.
    pub fn kind(&self) -> Kind {
        self.root.kind()
    }

    /// Evaluates against an event detail.
    pub fn eval(&self, detail: &Detail) -> Result<Value, EvalError> {
        let scope = Scope::from_detail(detail);
        eval::eval(&self.root, &scope)
    }

    /// Evaluates and requires a boolean result. A null result (an absent
    /// field read directly) is the zero value `false`.
    pub fn eval_bool(&self, detail: &Detail) -> Result<bool, EvalError> {
        match self.eval(detail)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(EvalError::Type(format!(
                "expression returned {} instead of bool",
                other.kind_name()
            ))),
        }
    }

    /// Evaluates and requires a string result. A null result (an absent
    /// field read directly) is the zero value `""`.
    pub fn eval_string(&self, detail: &Detail) -> Result<String, EvalError> {
        match self.eval(detail)? {
            Value::Str(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(EvalError::Type(format!(
                "expression returned {} instead of string",
                other.kind_name()
            ))),
        }
    }
}
