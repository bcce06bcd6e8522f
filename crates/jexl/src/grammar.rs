//! The grammar: a data object mapping lexemes to element descriptors, plus
//! the function and transform registries.
//!
//! All three pipeline stages consume it: the lexer asks which lexemes exist
//! and what token kind they carry, the parser reads only `precedence`, and
//! the evaluator reads only the `eval` callables. Registering or removing
//! elements changes tokenization, so compiled expressions must be rebuilt
//! afterwards — the facade enforces that through borrowing.

use std::{cmp::Ordering, fmt, sync::Arc};

use ahash::AHashMap;

use crate::{
    error::ExprResult,
    evaluate::Operands,
    lex::TokenKind,
    value::Value,
};

/// A unary operator evaluator.
pub type UnaryFn = Arc<dyn Fn(Value) -> ExprResult<Value> + Send + Sync>;

/// A strict binary operator evaluator; both operands are already evaluated.
pub type BinaryFn = Arc<dyn Fn(Value, Value) -> ExprResult<Value> + Send + Sync>;

/// An on-demand binary operator evaluator. It receives [`Operands`] thunks
/// and decides itself which operands to evaluate, enabling short-circuit or
/// lazy semantics.
pub type OnDemandFn = Arc<dyn Fn(&mut Operands<'_, '_>) -> ExprResult<Value> + Send + Sync>;

/// A host-registered expression function or transform.
pub type ExpressionFn = Arc<dyn Fn(&[Value]) -> ExprResult<Value> + Send + Sync>;

/// How a binary operator evaluates its operands.
#[derive(Clone)]
pub enum BinaryEval {
    /// Evaluate left then right, then apply.
    Strict(BinaryFn),
    /// Hand thunks to the operator; it evaluates what it needs.
    OnDemand(OnDemandFn),
    /// Reserved for the `=` lexeme. The parser intercepts it and builds an
    /// assignment node, so this evaluator is never invoked.
    Assign,
}

/// One grammar element: what a lexeme means.
#[derive(Clone)]
pub enum Element {
    /// A structural delimiter; carries only its token kind.
    Punctuation(TokenKind),
    /// A unary operator. Unary binds tighter than any binary operator, so
    /// no precedence is stored.
    UnaryOp { eval: UnaryFn },
    /// A binary operator with a precedence and an evaluation strategy.
    BinaryOp { precedence: u32, eval: BinaryEval },
}

impl Element {
    /// The token kind the lexer assigns to this element's lexeme.
    #[must_use]
    pub fn token_kind(&self) -> TokenKind {
        match self {
            Self::Punctuation(kind) => *kind,
            Self::UnaryOp { .. } => TokenKind::UnaryOp,
            Self::BinaryOp { .. } => TokenKind::BinaryOp,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punctuation(kind) => write!(f, "Punctuation({kind})"),
            Self::UnaryOp { .. } => f.write_str("UnaryOp"),
            Self::BinaryOp { precedence, .. } => write!(f, "BinaryOp {{ precedence: {precedence} }}"),
        }
    }
}

/// The grammar table plus the function and transform registries.
///
/// A plain data object with no interior synchronization: evaluating on
/// multiple threads is fine as long as nobody mutates the grammar
/// concurrently (registration takes `&mut self`).
#[derive(Clone)]
pub struct Grammar {
    elements: AHashMap<String, Element>,
    functions: AHashMap<String, ExpressionFn>,
    transforms: AHashMap<String, ExpressionFn>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Grammar {
    fn default() -> Self {
        let mut grammar = Self {
            elements: AHashMap::new(),
            functions: AHashMap::new(),
            transforms: AHashMap::new(),
        };
        grammar.install_default_elements();
        grammar
    }
}

impl Grammar {
    /// Looks up the element registered for a lexeme.
    #[must_use]
    pub fn element(&self, lexeme: &str) -> Option<&Element> {
        self.elements.get(lexeme)
    }

    /// Precedence of a binary operator lexeme, if one is registered.
    #[must_use]
    pub fn binary_precedence(&self, lexeme: &str) -> Option<u32> {
        match self.elements.get(lexeme) {
            Some(Element::BinaryOp { precedence, .. }) => Some(*precedence),
            _ => None,
        }
    }

    /// All registered lexemes, longest first, for the lexer's maximal-munch
    /// operator scan.
    #[must_use]
    pub fn lexemes_longest_first(&self) -> Vec<&str> {
        let mut lexemes: Vec<&str> = self.elements.keys().map(String::as_str).collect();
        lexemes.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        lexemes
    }

    /// Registers a strict binary operator. An existing element under the
    /// same lexeme is replaced.
    pub fn add_binary_op(
        &mut self,
        lexeme: impl Into<String>,
        precedence: u32,
        eval: impl Fn(Value, Value) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.elements.insert(
            lexeme.into(),
            Element::BinaryOp {
                precedence,
                eval: BinaryEval::Strict(Arc::new(eval)),
            },
        );
    }

    /// Registers an on-demand binary operator: `eval` receives operand
    /// thunks and may skip evaluating either side.
    pub fn add_binary_op_on_demand(
        &mut self,
        lexeme: impl Into<String>,
        precedence: u32,
        eval: impl Fn(&mut Operands<'_, '_>) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.elements.insert(
            lexeme.into(),
            Element::BinaryOp {
                precedence,
                eval: BinaryEval::OnDemand(Arc::new(eval)),
            },
        );
    }

    /// Registers a unary operator.
    pub fn add_unary_op(
        &mut self,
        lexeme: impl Into<String>,
        eval: impl Fn(Value) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.elements.insert(
            lexeme.into(),
            Element::UnaryOp {
                eval: Arc::new(eval),
            },
        );
    }

    /// Removes a previously registered unary or binary operator. Punctuation
    /// cannot be removed; unknown lexemes are ignored.
    pub fn remove_op(&mut self, lexeme: &str) {
        if matches!(
            self.elements.get(lexeme),
            Some(Element::UnaryOp { .. } | Element::BinaryOp { .. })
        ) {
            self.elements.remove(lexeme);
        }
    }

    /// Registers an expression function callable as `name(args…)`.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Registers several expression functions at once.
    pub fn add_functions(&mut self, entries: impl IntoIterator<Item = (String, ExpressionFn)>) {
        self.functions.extend(entries);
    }

    /// Looks up an expression function.
    #[must_use]
    pub fn get_function(&self, name: &str) -> Option<&ExpressionFn> {
        self.functions.get(name)
    }

    /// Registers a transform usable as `value | name(args…)`.
    pub fn add_transform(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.transforms.insert(name.into(), Arc::new(f));
    }

    /// Registers several transforms at once.
    pub fn add_transforms(&mut self, entries: impl IntoIterator<Item = (String, ExpressionFn)>) {
        self.transforms.extend(entries);
    }

    /// Looks up a transform.
    #[must_use]
    pub fn get_transform(&self, name: &str) -> Option<&ExpressionFn> {
        self.transforms.get(name)
    }

    fn punctuation(&mut self, lexeme: &str, kind: TokenKind) {
        self.elements.insert(lexeme.to_owned(), Element::Punctuation(kind));
    }

    /// Installs the default language surface: delimiters, the reserved `=`,
    /// short-circuit logic, comparisons, membership, arithmetic, and `!`.
    fn install_default_elements(&mut self) {
        self.punctuation(".", TokenKind::Dot);
        self.punctuation("[", TokenKind::OpenBracket);
        self.punctuation("]", TokenKind::CloseBracket);
        self.punctuation("|", TokenKind::Pipe);
        self.punctuation("{", TokenKind::OpenCurl);
        self.punctuation("}", TokenKind::CloseCurl);
        self.punctuation(":", TokenKind::Colon);
        self.punctuation(",", TokenKind::Comma);
        self.punctuation("(", TokenKind::OpenParen);
        self.punctuation(")", TokenKind::CloseParen);
        self.punctuation("?", TokenKind::Question);
        self.punctuation(";", TokenKind::Semicolon);

        self.elements.insert(
            "=".to_owned(),
            Element::BinaryOp {
                precedence: 2,
                eval: BinaryEval::Assign,
            },
        );

        self.add_binary_op_on_demand("||", 10, |ops| {
            let left = ops.left()?;
            if left.is_truthy() { Ok(left) } else { ops.right() }
        });
        self.add_binary_op_on_demand("&&", 10, |ops| {
            let left = ops.left()?;
            if left.is_truthy() { ops.right() } else { Ok(left) }
        });

        self.add_binary_op("==", 20, |l, r| Ok(Value::Bool(l.loose_eq(&r))));
        self.add_binary_op("!=", 20, |l, r| Ok(Value::Bool(!l.loose_eq(&r))));
        self.add_binary_op("<", 20, |l, r| Ok(compare(&l, &r, Ordering::is_lt)));
        self.add_binary_op("<=", 20, |l, r| Ok(compare(&l, &r, Ordering::is_le)));
        self.add_binary_op(">", 20, |l, r| Ok(compare(&l, &r, Ordering::is_gt)));
        self.add_binary_op(">=", 20, |l, r| Ok(compare(&l, &r, Ordering::is_ge)));
        self.add_binary_op("in", 20, |l, r| Ok(Value::Bool(membership(&l, &r))));

        self.add_binary_op("+", 30, |l, r| Ok(add(&l, &r)));
        self.add_binary_op("-", 30, numeric(|l, r| l - r));
        self.add_binary_op("*", 40, numeric(|l, r| l * r));
        self.add_binary_op("/", 40, numeric(|l, r| l / r));
        self.add_binary_op("//", 40, numeric(|l, r| (l / r).floor()));
        self.add_binary_op("%", 50, numeric(|l, r| l % r));
        self.add_binary_op("^", 50, numeric(f64::powf));

        self.add_unary_op("!", |v| Ok(Value::Bool(!v.is_truthy())));
    }
}

/// Lifts a pure double operation into a strict binary evaluator.
fn numeric(op: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> impl Fn(Value, Value) -> ExprResult<Value> {
    move |l, r| Ok(Value::Number(op(l.to_number(), r.to_number())))
}

/// `+`: concatenation when either side stringifies (string, array, object),
/// double addition otherwise.
fn add(l: &Value, r: &Value) -> Value {
    let stringy = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
    if stringy(l) || stringy(r) {
        Value::String(format!("{l}{r}"))
    } else {
        Value::Number(l.to_number() + r.to_number())
    }
}

/// Ordering comparison: lexicographic when both sides are strings, numeric
/// coercion otherwise. Incomparable operands (NaN involved) are false.
fn compare(l: &Value, r: &Value, check: impl Fn(Ordering) -> bool) -> Value {
    let ordering = match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    };
    Value::Bool(ordering.is_some_and(check))
}

/// `in`: substring test against strings, strict element membership against
/// arrays, false for everything else.
fn membership(l: &Value, r: &Value) -> bool {
    match r {
        Value::String(haystack) => haystack.contains(&l.to_string()),
        Value::Array(items) => items.iter().any(|item| item == l),
        _ => false,
    }
}
