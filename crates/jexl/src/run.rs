//! Public interface for compiling and evaluating expressions.
//!
//! [`Jexl`] bundles a grammar with the registration API and convenience
//! methods; [`Expression`] is the compile-once, evaluate-many handle. An
//! `Expression` borrows its grammar immutably, so the borrow checker itself
//! enforces the contract that mutating the grammar (registering operators,
//! functions, or transforms) invalidates compiled expressions.

use crate::{
    error::ExprResult,
    evaluate::{Evaluator, Operands},
    expressions::Ast,
    grammar::{ExpressionFn, Grammar},
    parse::Parser,
    tracer::{EvalTracer, NoopTracer},
    value::{Context, Value},
};

/// The expression engine: a grammar plus convenience methods.
///
/// # Example
/// ```
/// use jexl::{Context, Jexl, Value};
///
/// let jexl = Jexl::new();
/// let mut context = Context::new();
/// context.insert("age".to_owned(), Value::from(20));
/// let result = jexl
///     .evaluate(r#"age >= 18 ? "adult" : "minor""#, &mut context)
///     .unwrap();
/// assert_eq!(result, Value::from("adult"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Jexl {
    grammar: Grammar,
}

impl Jexl {
    /// Creates an engine with the default grammar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine around an existing grammar.
    #[must_use]
    pub fn with_grammar(grammar: Grammar) -> Self {
        Self { grammar }
    }

    /// The underlying grammar.
    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Compiles a source string into a reusable [`Expression`].
    pub fn compile(&self, source: &str) -> ExprResult<Expression<'_>> {
        Expression::compile(&self.grammar, source)
    }

    /// Compiles and evaluates in one step.
    pub fn evaluate(&self, source: &str, context: &mut Context) -> ExprResult<Value> {
        self.compile(source)?.evaluate(context)
    }

    /// Registers an expression function callable as `name(args…)`.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.grammar.add_function(name, f);
    }

    /// Registers several expression functions at once.
    pub fn add_functions(&mut self, entries: impl IntoIterator<Item = (String, ExpressionFn)>) {
        self.grammar.add_functions(entries);
    }

    /// Looks up an expression function.
    #[must_use]
    pub fn get_function(&self, name: &str) -> Option<&ExpressionFn> {
        self.grammar.get_function(name)
    }

    /// Registers a transform usable as `value | name(args…)`.
    pub fn add_transform(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.grammar.add_transform(name, f);
    }

    /// Registers several transforms at once.
    pub fn add_transforms(&mut self, entries: impl IntoIterator<Item = (String, ExpressionFn)>) {
        self.grammar.add_transforms(entries);
    }

    /// Looks up a transform.
    #[must_use]
    pub fn get_transform(&self, name: &str) -> Option<&ExpressionFn> {
        self.grammar.get_transform(name)
    }

    /// Registers a strict binary operator.
    pub fn add_binary_op(
        &mut self,
        lexeme: impl Into<String>,
        precedence: u32,
        eval: impl Fn(Value, Value) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.grammar.add_binary_op(lexeme, precedence, eval);
    }

    /// Registers an on-demand binary operator that evaluates its own
    /// operands through thunks.
    pub fn add_binary_op_on_demand(
        &mut self,
        lexeme: impl Into<String>,
        precedence: u32,
        eval: impl Fn(&mut Operands<'_, '_>) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.grammar.add_binary_op_on_demand(lexeme, precedence, eval);
    }

    /// Registers a unary operator.
    pub fn add_unary_op(
        &mut self,
        lexeme: impl Into<String>,
        eval: impl Fn(Value) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.grammar.add_unary_op(lexeme, eval);
    }

    /// Removes a previously registered operator.
    pub fn remove_op(&mut self, lexeme: &str) {
        self.grammar.remove_op(lexeme);
    }
}

/// A compiled expression: parse once, evaluate against many contexts.
///
/// Repeated evaluation against equal contexts returns equal results; the
/// expression holds no hidden state.
#[derive(Debug, Clone)]
pub struct Expression<'g> {
    grammar: &'g Grammar,
    ast: Ast,
}

impl<'g> Expression<'g> {
    /// The core entry point: lexes and parses `source` under `grammar`.
    pub fn compile(grammar: &'g Grammar, source: &str) -> ExprResult<Self> {
        let ast = Parser::parse_source(grammar, source)?;
        Ok(Self { grammar, ast })
    }

    /// Evaluates against a context. Assignments write through to it.
    pub fn evaluate(&self, context: &mut Context) -> ExprResult<Value> {
        self.evaluate_with_tracer(context, &mut NoopTracer)
    }

    /// Evaluates with an observer attached.
    pub fn evaluate_with_tracer(&self, context: &mut Context, tracer: &mut dyn EvalTracer) -> ExprResult<Value> {
        let mut evaluator = Evaluator::new(self.grammar, &self.ast, context, tracer);
        evaluator.eval(self.ast.root_id())
    }

    /// The compiled syntax tree.
    #[must_use]
    pub fn ast(&self) -> &Ast {
        &self.ast
    }
}
