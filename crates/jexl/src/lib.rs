//! A small, embeddable expression language: a pure evaluator over a
//! host-supplied variable environment.
//!
//! Input is a source string; output is a dynamically-typed [`Value`]. The
//! pipeline is a context-sensitive lexer, a streaming state-machine parser
//! driven by a pluggable operator table, and a tree-walking evaluator with
//! short-circuiting, filter semantics, and host-registered functions and
//! transforms.
//!
//! # Example
//! ```
//! use jexl::{Context, Jexl, Value};
//!
//! let jexl = Jexl::new();
//! let mut context = Context::new();
//! assert_eq!(
//!     jexl.evaluate("(2 + 3) * 4", &mut context).unwrap(),
//!     Value::Number(20.0),
//! );
//!
//! context.insert("name".to_owned(), Value::from("World"));
//! assert_eq!(
//!     jexl.evaluate("`Hello, ${name}!`", &mut context).unwrap(),
//!     Value::from("Hello, World!"),
//! );
//! ```
//!
//! # Extensibility
//!
//! The grammar is data: operators (strict or on-demand/short-circuit),
//! functions, and transforms are registered on a [`Jexl`] (or a raw
//! [`Grammar`]) and consumed by all three pipeline stages. Registration
//! takes `&mut self`, so compiled [`Expression`]s — which borrow the
//! grammar — must be rebuilt after the grammar changes; the borrow checker
//! enforces this.
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is range-checked first")]
#![expect(clippy::cast_sign_loss, reason = "sign is checked before index casts")]

mod error;
mod evaluate;
mod expressions;
mod grammar;
mod lex;
mod parse;
mod run;
mod tracer;
mod value;

pub use crate::{
    error::{Error, ErrorKind, ExprResult},
    evaluate::Operands,
    expressions::{Ast, CallPool, Expr, NodeId, TemplatePart},
    grammar::{BinaryEval, BinaryFn, Element, ExpressionFn, Grammar, OnDemandFn, UnaryFn},
    lex::{Lexer, RawTemplatePart, Token, TokenKind, TokenValue},
    parse::Parser,
    run::{Expression, Jexl},
    tracer::{EvalTracer, NoopTracer, RecordingTracer},
    value::{Context, Value, context_from_json},
};
