//! Model formula language.
//!
//! - `parse`: lexer + recursive-descent parser for `response ~ predictor`
//! - `expr`: expression tree, printing and symbol collection
//! - `bind`: expressions resolved against a table, with parameter gradients
//! - `spec`: `ModelSpec` plus the linear design expansion

use thiserror::Error;

pub mod bind;
pub mod expr;
pub mod parse;
pub mod spec;

pub use bind::BoundExpr;
pub use expr::{BinOp, Expr, Func};
pub use parse::{parse_expr, parse_formula};
pub use spec::{Design, INTERCEPT, LinearTerms, ModelSpec};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("invalid number '{text}' at position {pos}")]
    InvalidNumber { text: String, pos: usize },

    #[error("unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("formula must contain exactly one '~' between response and predictor")]
    Tilde,

    #[error("formula has no {0} side")]
    MissingSide(&'static str),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("term '{0}' appears more than once")]
    DuplicateTerm(String),

    #[error("unsupported term '{term}': {reason}")]
    UnsupportedTerm { term: String, reason: &'static str },

    #[error("model has no terms")]
    NoTerms,
}
