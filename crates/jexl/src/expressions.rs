//! The abstract syntax tree produced by the parser.
//!
//! Nodes live in an [`Ast`]'s flat node arena and reference each other by index,
//! so the tree serializes flat and the parser can walk parent links for
//! operator-precedence promotion. Parent links are transient parser
//! bookkeeping; the evaluator never reads them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, IntoStaticStr};

use crate::value::Value;

/// Index of a node inside its [`Ast`] arena.
pub type NodeId = usize;

/// Which registry a call resolves against.
///
/// The string representation is the singular noun used in error messages
/// ("Jexl Function foo is not defined.").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum CallPool {
    #[strum(serialize = "Function")]
    Functions,
    #[strum(serialize = "Transform")]
    Transforms,
}

/// One piece of a template literal, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    /// Literal text, emitted verbatim (escape sequences included).
    Static(String),
    /// An `${…}` interpolation, already parsed into the same arena.
    Interpolation(NodeId),
}

/// An expression node.
///
/// `Option<NodeId>` operand slots are filled in by the parser as operands
/// arrive; `complete()` guarantees they are all present in a finished tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A primitive literal: boolean, number, or string.
    Literal(Value),
    /// A variable reference or member access.
    Identifier {
        name: String,
        /// Subject subtree when this is a member access (`a.b` stores `a`).
        from: Option<NodeId>,
        /// True when the identifier resolves against the current filter
        /// element (`.price` inside `items[.price > 10]`).
        relative: bool,
    },
    /// A unary operator application; binds tighter than any binary operator.
    Unary { op: String, right: Option<NodeId> },
    /// A binary operator application.
    Binary {
        op: String,
        left: NodeId,
        right: Option<NodeId>,
    },
    /// An array literal, elements in source order.
    Array { elements: Vec<NodeId> },
    /// An object literal; entries preserve insertion order, later duplicate
    /// keys overwrite in place.
    Object { entries: IndexMap<String, NodeId> },
    /// A function or transform call. Transforms are sugar: `x|f(a)` is
    /// `Call { name: f, pool: Transforms, args: [x, a] }`.
    Call {
        name: String,
        pool: CallPool,
        args: SmallVec<[NodeId; 4]>,
    },
    /// A filter (`relative` true, yields an array) or indexer (`relative`
    /// false, yields one element) applied to a subject.
    Filter {
        subject: NodeId,
        expr: NodeId,
        relative: bool,
    },
    /// A ternary; an elided consequent (`t ?: a`) re-yields the test value.
    Conditional {
        test: NodeId,
        consequent: Option<NodeId>,
        alternate: Option<NodeId>,
    },
    /// A backtick template literal.
    Template { parts: Vec<TemplatePart> },
    /// Two or more `;`-separated expressions; the last one's value wins.
    Sequence { exprs: SmallVec<[NodeId; 4]> },
    /// An assignment; `target` is always a bare identifier node.
    Assign { target: NodeId, value: Option<NodeId> },
}

impl Expr {
    /// Short node-kind label, used by tracers and error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "Literal",
            Self::Identifier { .. } => "Identifier",
            Self::Unary { .. } => "UnaryExpression",
            Self::Binary { .. } => "BinaryExpression",
            Self::Array { .. } => "ArrayLiteral",
            Self::Object { .. } => "ObjectLiteral",
            Self::Call { .. } => "FunctionCall",
            Self::Filter { .. } => "FilterExpression",
            Self::Conditional { .. } => "ConditionalExpression",
            Self::Template { .. } => "TemplateLiteral",
            Self::Sequence { .. } => "SequenceExpression",
            Self::Assign { .. } => "AssignmentExpression",
        }
    }

    /// Shifts every child reference by `delta`. Used when a sub-parse
    /// (template interpolation) is grafted into an enclosing arena.
    pub(crate) fn shift_children(&mut self, delta: usize) {
        match self {
            Self::Literal(_) => {}
            Self::Identifier { from, .. } => {
                if let Some(id) = from {
                    *id += delta;
                }
            }
            Self::Unary { right, .. } => {
                if let Some(id) = right {
                    *id += delta;
                }
            }
            Self::Binary { left, right, .. } => {
                *left += delta;
                if let Some(id) = right {
                    *id += delta;
                }
            }
            Self::Array { elements } => {
                for id in elements {
                    *id += delta;
                }
            }
            Self::Object { entries } => {
                for id in entries.values_mut() {
                    *id += delta;
                }
            }
            Self::Call { args, .. } => {
                for id in args {
                    *id += delta;
                }
            }
            Self::Filter { subject, expr, .. } => {
                *subject += delta;
                *expr += delta;
            }
            Self::Conditional {
                test,
                consequent,
                alternate,
            } => {
                *test += delta;
                if let Some(id) = consequent {
                    *id += delta;
                }
                if let Some(id) = alternate {
                    *id += delta;
                }
            }
            Self::Template { parts } => {
                for part in parts {
                    if let TemplatePart::Interpolation(id) = part {
                        *id += delta;
                    }
                }
            }
            Self::Sequence { exprs } => {
                for id in exprs {
                    *id += delta;
                }
            }
            Self::Assign { target, value } => {
                *target += delta;
                if let Some(id) = value {
                    *id += delta;
                }
            }
        }
    }
}

/// One arena slot: the expression plus its transient parent link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AstNode {
    pub expr: Expr,
    /// Parent index used by the parser's precedence walk; meaningless after
    /// `complete()`.
    pub parent: Option<NodeId>,
}

/// A finished abstract syntax tree: a flat arena plus the root index.
///
/// Built once by the parser and evaluated any number of times against
/// distinct contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    pub(crate) nodes: Vec<AstNode>,
    pub(crate) root: NodeId,
}

impl Ast {
    /// Returns the root expression.
    #[must_use]
    pub fn root(&self) -> &Expr {
        &self.nodes[self.root].expr
    }

    /// Returns the expression stored at `id`.
    #[must_use]
    pub fn expr(&self, id: NodeId) -> &Expr {
        &self.nodes[id].expr
    }

    /// Root node index.
    #[must_use]
    pub fn root_id(&self) -> NodeId {
        self.root
    }
}
