//! Tree-walking evaluation: AST + context to value.
//!
//! The evaluator keeps three pieces of state: the grammar (read-only), the
//! host context (mutated by assignments), and the relative context — the
//! current element of the subject array while a filter body runs. Relative
//! state is never global: each filter iteration builds a sub-evaluator that
//! shares the absolute context and carries its own element.

use crate::{
    error::{Error, ErrorKind, ExprResult},
    expressions::{Ast, CallPool, Expr, NodeId, TemplatePart},
    grammar::{BinaryEval, Element, Grammar},
    tracer::EvalTracer,
    value::{Context, Value},
};

/// Bound on evaluator recursion. The parser bounds nested sub-parses, but a
/// long left-leaning operator spine still deepens the walk one level per
/// operator, so evaluation carries its own guard.
#[cfg(not(debug_assertions))]
pub(crate) const MAX_EVAL_DEPTH: usize = 500;
/// Lower limit in debug builds, where stack frames are much larger.
#[cfg(debug_assertions)]
pub(crate) const MAX_EVAL_DEPTH: usize = 100;

/// Operand thunks handed to on-demand binary operators. The operator calls
/// [`left`](Self::left) and/or [`right`](Self::right) as it sees fit; an
/// operand it never requests is never evaluated.
pub struct Operands<'o, 'a> {
    evaluator: &'o mut Evaluator<'a>,
    left: NodeId,
    right: NodeId,
}

impl Operands<'_, '_> {
    /// Evaluates the left operand.
    pub fn left(&mut self) -> ExprResult<Value> {
        self.evaluator.eval(self.left)
    }

    /// Evaluates the right operand.
    pub fn right(&mut self) -> ExprResult<Value> {
        self.evaluator.eval(self.right)
    }
}

/// Walks one AST against one context.
pub(crate) struct Evaluator<'a> {
    grammar: &'a Grammar,
    ast: &'a Ast,
    context: &'a mut Context,
    /// The filter's current element, when evaluating a filter body.
    relative: Option<&'a Value>,
    tracer: &'a mut dyn EvalTracer,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(grammar: &'a Grammar, ast: &'a Ast, context: &'a mut Context, tracer: &'a mut dyn EvalTracer) -> Self {
        Self {
            grammar,
            ast,
            context,
            relative: None,
            tracer,
            depth: 0,
        }
    }

    /// Evaluates the node at `id`.
    pub fn eval(&mut self, id: NodeId) -> ExprResult<Value> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(Error::new(
                ErrorKind::NestingTooDeep,
                "Expression exceeds the maximum evaluation depth",
            ));
        }
        self.depth += 1;
        let result = self.eval_node(id);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, id: NodeId) -> ExprResult<Value> {
        let grammar = self.grammar;
        let expr = self.ast.expr(id);
        self.tracer.on_node(expr.kind_name());
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier { name, from, relative } => match from {
                Some(subject) => {
                    let mut subject = self.eval(*subject)?;
                    // Dotted chains project arrays onto their first element,
                    // one level deep, before the property read.
                    if let Value::Array(items) = subject {
                        subject = items.into_iter().next().unwrap_or(Value::Undefined);
                    }
                    Ok(property(&subject, name))
                }
                None if *relative => Ok(self.relative.map_or(Value::Undefined, |element| property(element, name))),
                None => Ok(self.context.get(name).cloned().unwrap_or(Value::Undefined)),
            },
            Expr::Unary { op, right } => {
                let right = right.ok_or_else(missing_operand)?;
                let value = self.eval(right)?;
                match grammar.element(op) {
                    Some(Element::UnaryOp { eval }) => eval(value),
                    _ => Err(unknown_operator("Unary", op)),
                }
            }
            Expr::Binary { op, left, right } => {
                let right = right.ok_or_else(missing_operand)?;
                match grammar.element(op) {
                    Some(Element::BinaryOp { eval, .. }) => match eval {
                        BinaryEval::Strict(eval) => {
                            let left = self.eval(*left)?;
                            let right = self.eval(right)?;
                            eval(left, right)
                        }
                        BinaryEval::OnDemand(eval) => {
                            let mut operands = Operands {
                                evaluator: self,
                                left: *left,
                                right,
                            };
                            eval(&mut operands)
                        }
                        BinaryEval::Assign => Err(unknown_operator("Binary", op)),
                    },
                    _ => Err(unknown_operator("Binary", op)),
                }
            }
            Expr::Assign { target, value } => {
                let value = value.ok_or_else(missing_operand)?;
                let name = match self.ast.expr(*target) {
                    Expr::Identifier {
                        name,
                        from: None,
                        relative: false,
                    } => name.clone(),
                    _ => {
                        return Err(Error::new(
                            ErrorKind::AssignmentTarget,
                            "Left side of assignment must be a variable name",
                        ));
                    }
                };
                let value = self.eval(value)?;
                self.context.insert(name, value.clone());
                Ok(value)
            }
            Expr::Sequence { exprs } => {
                let mut result = Value::Undefined;
                for id in exprs {
                    result = self.eval(*id)?;
                }
                Ok(result)
            }
            Expr::Array { elements } => {
                let mut items = Vec::with_capacity(elements.len());
                for id in elements {
                    items.push(self.eval(*id)?);
                }
                Ok(Value::Array(items))
            }
            Expr::Object { entries } => {
                let mut map = indexmap::IndexMap::with_capacity(entries.len());
                for (key, id) in entries {
                    let value = self.eval(*id)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            Expr::Template { parts } => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Static(text) => out.push_str(text),
                        TemplatePart::Interpolation(id) => {
                            let value = self.eval(*id)?;
                            // Nullish interpolations render as nothing.
                            if !value.is_nullish() {
                                out.push_str(&value.to_string());
                            }
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.eval(*test)?;
                if test.is_truthy() {
                    match consequent {
                        Some(consequent) => self.eval(*consequent),
                        // Elided consequent: `t ?: a` re-yields the test.
                        None => Ok(test),
                    }
                } else {
                    let alternate = alternate.ok_or_else(missing_operand)?;
                    self.eval(alternate)
                }
            }
            Expr::Call { name, pool, args } => {
                self.tracer.on_call(*pool, name);
                let callable = match pool {
                    CallPool::Functions => grammar.get_function(name),
                    CallPool::Transforms => grammar.get_transform(name),
                };
                let Some(callable) = callable else {
                    return Err(Error::new(
                        ErrorKind::UnknownCallable,
                        format!("Jexl {pool} {name} is not defined."),
                    ));
                };
                let mut values = Vec::with_capacity(args.len());
                for id in args {
                    values.push(self.eval(*id)?);
                }
                callable(&values)
            }
            Expr::Filter {
                subject,
                expr,
                relative,
            } => {
                let subject = self.eval(*subject)?;
                if *relative {
                    self.filter_relative(subject, *expr)
                } else {
                    self.filter_index(subject, *expr)
                }
            }
        }
    }

    /// Relative filter: keeps the elements for which the body is truthy.
    /// Nullish subjects filter to an empty array; a non-array subject is
    /// treated as a one-element array.
    fn filter_relative(&mut self, subject: Value, expr: NodeId) -> ExprResult<Value> {
        let items = match subject {
            Value::Array(items) => items,
            Value::Null | Value::Undefined => Vec::new(),
            other => vec![other],
        };
        let mut passing = Vec::new();
        for item in &items {
            let mut sub = Evaluator {
                grammar: self.grammar,
                ast: self.ast,
                context: &mut *self.context,
                relative: Some(item),
                tracer: &mut *self.tracer,
                depth: self.depth,
            };
            if sub.eval(expr)?.is_truthy() {
                passing.push(item.clone());
            }
        }
        Ok(Value::Array(passing))
    }

    /// Index form: the body evaluates to an index or key applied to the
    /// subject. Nullish subjects index to undefined.
    fn filter_index(&mut self, subject: Value, expr: NodeId) -> ExprResult<Value> {
        let index = self.eval(expr)?;
        Ok(match (subject, index) {
            (Value::Null | Value::Undefined, _) => Value::Undefined,
            (Value::Array(items), Value::Number(n)) => element_at(items, n),
            (subject @ Value::Array(_), Value::String(key)) => property(&subject, &key),
            (Value::Object(map), index) => map.get(&index.to_string()).cloned().unwrap_or(Value::Undefined),
            (Value::String(s), Value::Number(n)) => char_at(&s, n),
            (subject @ Value::String(_), Value::String(key)) => property(&subject, &key),
            _ => Value::Undefined,
        })
    }
}

/// Property read dispatched by subject tag. Strings and arrays expose their
/// native `length`; reading any property of a nullish value yields
/// undefined without raising.
fn property(subject: &Value, name: &str) -> Value {
    match subject {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Undefined),
        Value::String(s) if name == "length" => Value::Number(s.chars().count() as f64),
        Value::Array(items) if name == "length" => Value::Number(items.len() as f64),
        _ => Value::Undefined,
    }
}

/// Array element at a numeric index; fractional, negative, and
/// out-of-range indexes yield undefined.
fn element_at(mut items: Vec<Value>, index: f64) -> Value {
    if index.fract() != 0.0 || index < 0.0 || index >= items.len() as f64 {
        return Value::Undefined;
    }
    items.swap_remove(index as usize)
}

/// Character of a string at a numeric index, as a one-character string.
fn char_at(s: &str, index: f64) -> Value {
    if index.fract() != 0.0 || index < 0.0 {
        return Value::Undefined;
    }
    s.chars()
        .nth(index as usize)
        .map_or(Value::Undefined, |c| Value::String(c.to_string()))
}

fn missing_operand() -> Error {
    Error::new(
        ErrorKind::IncompleteExpression,
        "Missing operand in expression tree",
    )
}

fn unknown_operator(arity: &str, op: &str) -> Error {
    Error::new(
        ErrorKind::UnknownCallable,
        format!("{arity} operator {op} is not defined"),
    )
}
