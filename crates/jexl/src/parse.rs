//! Streaming state-machine parser: token stream to AST.
//!
//! The canonical entry points are [`Parser::add_token`] (one token at a
//! time) and the terminal [`Parser::complete`]. There is no backtracking:
//! each state admits a fixed set of token kinds, and every sub-expression
//! (parenthesized group, filter body, call argument, object value, array
//! element, ternary branch) is parsed by a nested parser. Nested parsers
//! are realized as a frame stack over one shared node arena: pushing a
//! frame spawns the sub-parse, and a stop token (or the end of input, for
//! ternary alternates) pops it and hands the finished subtree to the
//! enclosing frame's handler.
//!
//! Operator precedence is handled by promotion: a binary operator walks up
//! the transient parent links from the cursor while it out-ranks (or ties,
//! for left associativity) the ancestor operator, then wraps whatever it
//! stopped at as its left operand.

use smallvec::SmallVec;

use crate::{
    error::{Error, ErrorKind, ExprResult},
    expressions::{Ast, AstNode, CallPool, Expr, NodeId, TemplatePart},
    grammar::{BinaryEval, Element, Grammar},
    lex::{Lexer, RawTemplatePart, Token, TokenKind, TokenValue},
    value::Value,
};

/// Maximum nesting depth for sub-parses (parens, brackets, braces, ternary
/// branches, template interpolations). Nested structures become nested
/// evaluator calls later, so the bound keeps evaluation stack-safe.
#[cfg(not(debug_assertions))]
pub(crate) const MAX_NESTING_DEPTH: u16 = 200;
/// Lower limit in debug builds, where stack frames are much larger.
#[cfg(debug_assertions)]
pub(crate) const MAX_NESTING_DEPTH: u16 = 35;

/// Parser states. States marked completable in [`completable`] may legally
/// end an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// An operand must come next (start of expression, after an operator).
    ExpectOperand,
    /// A complete operand sits at the cursor; a binary operator may follow.
    ExpectBinOp,
    /// After `|`; the next identifier names a transform.
    ExpectTransform,
    /// Inside an object literal, before a key.
    ExpectObjKey,
    /// Between an object key and its `:`.
    ExpectKeyValSep,
    /// A complete identifier chain sits at the cursor.
    Identifier,
    /// After a `.`; the next identifier continues the chain.
    Traverse,
    /// After a transform name; `(` may open its argument list.
    PostTransform,
    /// After a call's closing `)`.
    PostArgs,
    /// Sub-parse: filter/indexer body, ends at `]`.
    Filter,
    /// Sub-parse: parenthesized group, ends at `)`.
    SubExpression,
    /// Sub-parse: one call argument, ends at `,` or `)`.
    ArgVal,
    /// Sub-parse: one object value, ends at `,` or `}`.
    ObjVal,
    /// Sub-parse: one array element, ends at `,` or `]`.
    ArrayVal,
    /// Sub-parse: ternary consequent, ends at `:`.
    TernaryMid,
    /// Sub-parse: ternary alternate, ends where the enclosing parse ends.
    TernaryEnd,
}

/// Whether an expression may legally end in this state.
fn completable(state: State) -> bool {
    matches!(
        state,
        State::ExpectBinOp | State::Identifier | State::PostTransform | State::PostArgs | State::TernaryEnd
    )
}

/// Stop tokens for a sub-parse state: the token kinds that end the nested
/// parser, each mapped to the state the enclosing frame resumes in. `None`
/// as the slice marker means the nested parser inherits the enclosing
/// frame's stop map and its stop also stops the parent (ternary alternates
/// run until the surrounding parse ends).
fn sub_stops(state: State) -> Option<(&'static [(TokenKind, State)], bool)> {
    match state {
        State::Filter => Some((&[(TokenKind::CloseBracket, State::Identifier)], false)),
        State::SubExpression => Some((&[(TokenKind::CloseParen, State::ExpectBinOp)], false)),
        State::ArgVal => Some((
            &[(TokenKind::Comma, State::ArgVal), (TokenKind::CloseParen, State::PostArgs)],
            false,
        )),
        State::ObjVal => Some((
            &[
                (TokenKind::Comma, State::ExpectObjKey),
                (TokenKind::CloseCurl, State::ExpectBinOp),
            ],
            false,
        )),
        State::ArrayVal => Some((
            &[
                (TokenKind::Comma, State::ArrayVal),
                (TokenKind::CloseBracket, State::ExpectBinOp),
            ],
            false,
        )),
        State::TernaryMid => Some((&[(TokenKind::Colon, State::TernaryEnd)], false)),
        State::TernaryEnd => Some((&[], true)),
        _ => None,
    }
}

type StopMap = SmallVec<[(TokenKind, State); 2]>;

/// One nested parser: its state machine position, its in-progress tree, and
/// the tokens that end it.
struct Frame {
    state: State,
    tree: Option<NodeId>,
    cursor: Option<NodeId>,
    stop_map: StopMap,
    /// The stop map was inherited, so a stop token (or `;`/end of input)
    /// also closes the enclosing frame.
    propagate: bool,
    /// A relative identifier was placed somewhere in this sub-parse.
    relative: bool,
    /// The next identifier takes the cursor as its `from` chain.
    next_ident_encapsulate: bool,
    /// The next identifier resolves against the filter's current element.
    next_ident_relative: bool,
    /// Pending object-literal key awaiting its value.
    obj_key: Option<String>,
}

impl Frame {
    fn new(stop_map: StopMap, propagate: bool) -> Self {
        Self {
            state: State::ExpectOperand,
            tree: None,
            cursor: None,
            stop_map,
            propagate,
            relative: false,
            next_ident_encapsulate: false,
            next_ident_relative: false,
            obj_key: None,
        }
    }

    fn stop_for(&self, kind: TokenKind) -> Option<State> {
        self.stop_map
            .iter()
            .find(|(stop, _)| *stop == kind)
            .map(|(_, state)| *state)
    }
}

/// Result of a finished sub-parse, handed to the enclosing frame.
struct Finished {
    tree: Option<NodeId>,
    relative: bool,
    propagate: bool,
}

/// The streaming parser. Feed tokens with [`add_token`](Self::add_token),
/// then call [`complete`](Self::complete) to take the finished [`Ast`].
pub struct Parser<'g> {
    grammar: &'g Grammar,
    nodes: Vec<AstNode>,
    frames: Vec<Frame>,
    /// Roots of `;`-separated expressions collected at the top level.
    sequence: SmallVec<[NodeId; 4]>,
    /// Source reassembled from token raws, for error messages.
    expr_str: String,
    /// Template-interpolation recursion depth of this parser.
    depth: u16,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self::with_depth(grammar, 0)
    }

    fn with_depth(grammar: &'g Grammar, depth: u16) -> Self {
        Self {
            grammar,
            nodes: Vec::new(),
            frames: vec![Frame::new(SmallVec::new(), false)],
            sequence: SmallVec::new(),
            expr_str: String::new(),
            depth,
        }
    }

    /// Parses a whole source string: lex, stream the tokens in, complete.
    pub fn parse_source(grammar: &'g Grammar, source: &str) -> ExprResult<Ast> {
        Self::parse_source_at_depth(grammar, source, 0)
    }

    fn parse_source_at_depth(grammar: &'g Grammar, source: &str, depth: u16) -> ExprResult<Ast> {
        let tokens = Lexer::new(grammar).tokenize(source)?;
        let mut parser = Self::with_depth(grammar, depth);
        for token in &tokens {
            parser.add_token(token)?;
        }
        parser.complete()
    }

    /// Consumes one token, mutating the in-progress tree.
    pub fn add_token(&mut self, token: &Token) -> ExprResult<()> {
        self.expr_str.push_str(&token.raw);
        self.handle(token)
    }

    /// Finishes the parse and returns the AST.
    pub fn complete(mut self) -> ExprResult<Ast> {
        // Ternary alternates (inherited stop maps) legally run to the end of
        // input; close them out first.
        while self.frames.len() > 1 {
            if !self.top().propagate {
                return Err(self.incomplete());
            }
            let finished = self.pop_frame()?;
            self.apply_sub_result(&finished)?;
        }
        let root_frame = &self.frames[0];
        if root_frame.cursor.is_some() && !completable(root_frame.state) {
            return Err(self.incomplete());
        }
        let tree = root_frame.tree;
        let root = match (tree, self.sequence.len()) {
            (Some(tree), 0) => tree,
            (Some(tree), _) => {
                self.sequence.push(tree);
                self.wrap_sequence()
            }
            (None, 0) => {
                return Err(Error::new(ErrorKind::IncompleteExpression, "Missing expression"));
            }
            (None, 1) => self.sequence[0],
            (None, _) => self.wrap_sequence(),
        };
        Ok(Ast {
            nodes: self.nodes,
            root,
        })
    }

    // --- token routing ---------------------------------------------------

    fn handle(&mut self, token: &Token) -> ExprResult<()> {
        // Stop tokens close the innermost sub-parse before anything else.
        if let Some(next_state) = self.top().stop_for(token.kind) {
            return self.stop_frame(next_state, token);
        }
        if token.kind == TokenKind::Semicolon {
            return self.semicolon(token);
        }
        self.dispatch(token)
    }

    /// A `;` finalizes the current top-level tree into the sequence list. It
    /// also closes ternary alternates on its way out, like end of input.
    fn semicolon(&mut self, token: &Token) -> ExprResult<()> {
        let (state, tree, propagate) = {
            let top = self.top();
            (top.state, top.tree, top.propagate)
        };
        if self.frames.len() == 1 {
            if !completable(state) {
                return Err(self.unexpected_token(token));
            }
            let Some(tree) = tree else {
                return Err(self.unexpected_token(token));
            };
            self.sequence.push(tree);
            let root = self.top_mut();
            *root = Frame::new(StopMap::new(), false);
            Ok(())
        } else if propagate && completable(state) {
            let finished = self.pop_frame()?;
            self.apply_sub_result(&finished)?;
            self.handle(token)
        } else {
            Err(self.unexpected_token(token))
        }
    }

    /// Closes the top frame on one of its stop tokens.
    fn stop_frame(&mut self, next_state: State, token: &Token) -> ExprResult<()> {
        let finished = self.pop_frame()?;
        self.apply_sub_result(&finished)?;
        if finished.propagate {
            // Inherited stop: the same token also stops the enclosing frame.
            self.handle(token)
        } else {
            self.top_mut().state = next_state;
            if sub_stops(next_state).is_some() {
                self.push_child_frame()?;
            }
            Ok(())
        }
    }

    /// State × token-kind dispatch: the handler table.
    fn dispatch(&mut self, token: &Token) -> ExprResult<()> {
        use State as S;
        use TokenKind as T;
        match (self.top().state, token.kind) {
            (S::ExpectOperand, T::Literal) => {
                let value = self.literal_value(token)?;
                self.place_new_at_cursor(Expr::Literal(value))?;
                self.top_mut().state = S::ExpectBinOp;
            }
            (S::ExpectOperand | S::Traverse, T::Identifier) => {
                self.identifier(token)?;
                self.top_mut().state = S::Identifier;
            }
            (S::ExpectOperand, T::UnaryOp) => {
                self.place_new_at_cursor(Expr::Unary {
                    op: token.text().to_owned(),
                    right: None,
                })?;
            }
            (S::ExpectOperand, T::OpenParen) => {
                self.enter_sub(S::SubExpression)?;
            }
            (S::ExpectOperand, T::OpenCurl) => {
                self.place_new_at_cursor(Expr::Object {
                    entries: indexmap::IndexMap::new(),
                })?;
                self.top_mut().state = S::ExpectObjKey;
            }
            (S::ExpectOperand, T::OpenBracket) => {
                self.place_new_at_cursor(Expr::Array { elements: Vec::new() })?;
                self.enter_sub(S::ArrayVal)?;
            }
            (S::ExpectOperand, T::TemplateString) => {
                self.template(token)?;
                self.top_mut().state = S::ExpectBinOp;
            }
            (
                S::ExpectOperand | S::ExpectBinOp | S::Identifier | S::PostTransform | S::PostArgs,
                T::Dot,
            ) => {
                self.dot();
                self.top_mut().state = S::Traverse;
            }
            (S::ExpectBinOp | S::Identifier | S::PostTransform | S::PostArgs, T::BinaryOp) => {
                self.binary_op(token)?;
                self.top_mut().state = S::ExpectOperand;
            }
            (S::ExpectBinOp | S::Identifier | S::PostTransform | S::PostArgs, T::Pipe) => {
                self.top_mut().state = S::ExpectTransform;
            }
            (S::ExpectBinOp | S::Identifier | S::PostTransform | S::PostArgs, T::Question) => {
                self.ternary_start()?;
                self.enter_sub(S::TernaryMid)?;
            }
            (S::ExpectBinOp | S::Identifier | S::PostTransform | S::PostArgs, T::OpenBracket) => {
                self.enter_sub(S::Filter)?;
            }
            (S::Identifier, T::OpenParen) => {
                self.function_call(token)?;
                self.enter_sub(S::ArgVal)?;
            }
            (S::PostTransform, T::OpenParen) => {
                self.enter_sub(S::ArgVal)?;
            }
            (S::ExpectTransform, T::Identifier) => {
                self.transform(token)?;
                self.top_mut().state = S::PostTransform;
            }
            (S::ExpectObjKey, T::Identifier) => {
                self.top_mut().obj_key = Some(token.text().to_owned());
                self.top_mut().state = S::ExpectKeyValSep;
            }
            (S::ExpectObjKey, T::Literal) => {
                let value = self.literal_value(token)?;
                self.top_mut().obj_key = Some(value.to_string());
                self.top_mut().state = S::ExpectKeyValSep;
            }
            (S::ExpectObjKey, T::CloseCurl) => {
                self.top_mut().state = S::ExpectBinOp;
            }
            (S::ExpectKeyValSep, T::Colon) => {
                self.enter_sub(S::ObjVal)?;
            }
            _ => return Err(self.unexpected_token(token)),
        }
        Ok(())
    }

    // --- frame plumbing --------------------------------------------------

    fn top(&self) -> &Frame {
        self.frames.last().expect("parser always has a root frame")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("parser always has a root frame")
    }

    /// Moves the top frame into a sub-parse state and spawns its nested
    /// parser.
    fn enter_sub(&mut self, state: State) -> ExprResult<()> {
        self.top_mut().state = state;
        self.push_child_frame()
    }

    fn push_child_frame(&mut self) -> ExprResult<()> {
        if self.frames.len() as u16 + self.depth >= MAX_NESTING_DEPTH {
            return Err(Error::new(
                ErrorKind::NestingTooDeep,
                "Expression exceeds the maximum nesting depth",
            ));
        }
        let parent = self.top();
        let (stops, inherit) = match sub_stops(parent.state) {
            Some((stops, inherit)) => (stops, inherit),
            None => return Err(self.invariant("sub-parse entered from a non-sub state")),
        };
        let frame = if inherit {
            Frame::new(parent.stop_map.clone(), true)
        } else {
            Frame::new(StopMap::from_slice(stops), false)
        };
        self.frames.push(frame);
        Ok(())
    }

    /// Pops the top frame, checking that its expression may legally end.
    fn pop_frame(&mut self) -> ExprResult<Finished> {
        {
            let frame = self.top();
            if frame.cursor.is_some() && !completable(frame.state) {
                return Err(self.incomplete());
            }
        }
        let frame = self.frames.pop().expect("parser always has a root frame");
        Ok(Finished {
            tree: frame.tree,
            relative: frame.relative,
            propagate: frame.propagate,
        })
    }

    /// Hands a finished sub-parse to the enclosing frame's handler.
    fn apply_sub_result(&mut self, finished: &Finished) -> ExprResult<()> {
        let parent_state = self.top().state;
        match parent_state {
            State::SubExpression => {
                let Some(tree) = finished.tree else {
                    return Err(Error::new(ErrorKind::IncompleteExpression, "Empty subexpression"));
                };
                self.place_at_cursor(tree)?;
            }
            State::Filter => {
                let Some(expr) = finished.tree else {
                    return Err(Error::new(
                        ErrorKind::IncompleteExpression,
                        "Missing filter expression",
                    ));
                };
                let subject = self.cursor()?;
                self.place_before_cursor(Expr::Filter {
                    subject,
                    expr,
                    relative: finished.relative,
                })?;
            }
            State::ArgVal => {
                // Absent trees tolerate trailing commas and empty arg lists.
                if let Some(tree) = finished.tree {
                    let cursor = self.cursor()?;
                    self.nodes[tree].parent = Some(cursor);
                    match &mut self.nodes[cursor].expr {
                        Expr::Call { args, .. } => args.push(tree),
                        _ => return Err(self.invariant("argument applied to a non-call node")),
                    }
                }
            }
            State::ObjVal => {
                let Some(tree) = finished.tree else {
                    return Err(Error::new(ErrorKind::IncompleteExpression, "Missing object value"));
                };
                let Some(key) = self.top_mut().obj_key.take() else {
                    return Err(self.invariant("object value without a pending key"));
                };
                let cursor = self.cursor()?;
                self.nodes[tree].parent = Some(cursor);
                match &mut self.nodes[cursor].expr {
                    Expr::Object { entries } => {
                        entries.insert(key, tree);
                    }
                    _ => return Err(self.invariant("object value applied to a non-object node")),
                }
            }
            State::ArrayVal => {
                if let Some(tree) = finished.tree {
                    let cursor = self.cursor()?;
                    self.nodes[tree].parent = Some(cursor);
                    match &mut self.nodes[cursor].expr {
                        Expr::Array { elements } => elements.push(tree),
                        _ => return Err(self.invariant("array element applied to a non-array node")),
                    }
                }
            }
            State::TernaryMid => {
                // An absent tree keeps the elided consequent: `t ?: a`.
                let cursor = self.cursor()?;
                if let Some(tree) = finished.tree {
                    self.nodes[tree].parent = Some(cursor);
                }
                match &mut self.nodes[cursor].expr {
                    Expr::Conditional { consequent, .. } => *consequent = finished.tree,
                    _ => return Err(self.invariant("ternary consequent applied to a non-conditional node")),
                }
            }
            State::TernaryEnd => {
                let Some(tree) = finished.tree else {
                    return Err(Error::new(
                        ErrorKind::IncompleteExpression,
                        "Missing ternary alternate",
                    ));
                };
                let cursor = self.cursor()?;
                self.nodes[tree].parent = Some(cursor);
                match &mut self.nodes[cursor].expr {
                    Expr::Conditional { alternate, .. } => *alternate = Some(tree),
                    _ => return Err(self.invariant("ternary alternate applied to a non-conditional node")),
                }
            }
            _ => return Err(self.invariant("sub-parse finished under a non-sub state")),
        }
        // Relativity discovered in a nested sub-parse belongs to the nearest
        // enclosing filter; the filter itself consumes the flag.
        if parent_state != State::Filter {
            self.top_mut().relative |= finished.relative;
        }
        Ok(())
    }

    // --- tree mechanics --------------------------------------------------

    fn push_node(&mut self, expr: Expr, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(AstNode { expr, parent });
        id
    }

    fn cursor(&self) -> ExprResult<NodeId> {
        self.top()
            .cursor
            .ok_or_else(|| self.invariant("no cursor where an operand is required"))
    }

    /// Creates a node and attaches it at the cursor's open operand slot (or
    /// as the tree root), then moves the cursor onto it.
    fn place_new_at_cursor(&mut self, expr: Expr) -> ExprResult<NodeId> {
        let parent = self.top().cursor;
        let id = self.push_node(expr, parent);
        self.place_at_cursor(id)?;
        Ok(id)
    }

    /// Attaches an existing node at the cursor's open operand slot.
    fn place_at_cursor(&mut self, id: NodeId) -> ExprResult<()> {
        match self.top().cursor {
            None => {
                self.nodes[id].parent = None;
                self.top_mut().tree = Some(id);
            }
            Some(cursor) => {
                self.nodes[id].parent = Some(cursor);
                let slot = match &mut self.nodes[cursor].expr {
                    Expr::Unary { right, .. } | Expr::Binary { right, .. } => right,
                    Expr::Assign { value, .. } => value,
                    _ => return Err(self.invariant("cursor has no open operand slot")),
                };
                if slot.is_some() {
                    return Err(self.invariant("operand slot already filled"));
                }
                *slot = Some(id);
            }
        }
        self.top_mut().cursor = Some(id);
        Ok(())
    }

    /// Wraps the cursor: `expr` (which already embeds the cursor as a
    /// child) takes the cursor's place under its parent, and the cursor
    /// moves onto the new node.
    fn place_before_cursor(&mut self, expr: Expr) -> ExprResult<NodeId> {
        let cursor = self.cursor()?;
        let parent = self.nodes[cursor].parent;
        let id = self.push_node(expr, parent);
        self.nodes[cursor].parent = Some(id);
        match parent {
            None => self.top_mut().tree = Some(id),
            Some(parent) => self.replace_child(parent, cursor, id)?,
        }
        self.top_mut().cursor = Some(id);
        Ok(id)
    }

    /// Swaps `old` for `new` in whichever child slot of `parent` holds it.
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> ExprResult<()> {
        fn swap(slot: &mut NodeId, old: NodeId, new: NodeId) -> bool {
            if *slot == old {
                *slot = new;
                true
            } else {
                false
            }
        }
        fn swap_opt(slot: &mut Option<NodeId>, old: NodeId, new: NodeId) -> bool {
            matches!(slot, Some(id) if *id == old) && {
                *slot = Some(new);
                true
            }
        }
        let replaced = match &mut self.nodes[parent].expr {
            Expr::Literal(_) => false,
            Expr::Identifier { from, .. } => swap_opt(from, old, new),
            Expr::Unary { right, .. } => swap_opt(right, old, new),
            Expr::Binary { left, right, .. } => swap(left, old, new) || swap_opt(right, old, new),
            Expr::Array { elements } => elements.iter_mut().any(|slot| swap(slot, old, new)),
            Expr::Object { entries } => entries.values_mut().any(|slot| swap(slot, old, new)),
            Expr::Call { args, .. } => args.iter_mut().any(|slot| swap(slot, old, new)),
            Expr::Filter { subject, expr, .. } => swap(subject, old, new) || swap(expr, old, new),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => swap(test, old, new) || swap_opt(consequent, old, new) || swap_opt(alternate, old, new),
            Expr::Template { parts } => parts.iter_mut().any(|part| match part {
                TemplatePart::Interpolation(slot) => swap(slot, old, new),
                TemplatePart::Static(_) => false,
            }),
            Expr::Sequence { exprs } => exprs.iter_mut().any(|slot| swap(slot, old, new)),
            Expr::Assign { target, value } => swap(target, old, new) || swap_opt(value, old, new),
        };
        if replaced {
            Ok(())
        } else {
            Err(self.invariant("node is not a child of its recorded parent"))
        }
    }

    fn wrap_sequence(&mut self) -> NodeId {
        let exprs = std::mem::take(&mut self.sequence);
        let id = self.push_node(
            Expr::Sequence { exprs: exprs.clone() },
            None,
        );
        for child in exprs {
            self.nodes[child].parent = Some(id);
        }
        id
    }

    // --- handlers --------------------------------------------------------

    /// A binary operator arrived: intercept `=`, otherwise promote by
    /// precedence and wrap the cursor as the left operand.
    fn binary_op(&mut self, token: &Token) -> ExprResult<()> {
        let op = token.text();
        if let Some(Element::BinaryOp {
            eval: BinaryEval::Assign,
            ..
        }) = self.grammar.element(op)
        {
            return self.assignment(token);
        }
        let Some(precedence) = self.grammar.binary_precedence(op) else {
            return Err(self.unexpected_token(token));
        };
        let mut cursor = self.cursor()?;
        // Left associativity: climb while the ancestor operator binds at
        // least as tightly. Unary operators always out-rank binaries; an
        // assignment binds at the reserved precedence 2.
        while let Some(parent) = self.nodes[cursor].parent {
            let parent_precedence = match &self.nodes[parent].expr {
                Expr::Binary { op, .. } => self.grammar.binary_precedence(op).unwrap_or(0),
                Expr::Unary { .. } => u32::MAX,
                Expr::Assign { .. } => 2,
                _ => break,
            };
            if parent_precedence < precedence {
                break;
            }
            cursor = parent;
        }
        self.top_mut().cursor = Some(cursor);
        self.place_before_cursor(Expr::Binary {
            op: op.to_owned(),
            left: cursor,
            right: None,
        })?;
        Ok(())
    }

    /// `=` replaces a bare-identifier cursor with an assignment whose value
    /// is parsed next. Anything else on the left is an error.
    fn assignment(&mut self, token: &Token) -> ExprResult<()> {
        let target_error = || {
            Error::new(
                ErrorKind::AssignmentTarget,
                "Left side of assignment must be a variable name",
            )
        };
        let Some(cursor) = self.top().cursor else {
            return Err(self.unexpected_token(token));
        };
        match &self.nodes[cursor].expr {
            Expr::Identifier {
                from: None,
                relative: false,
                ..
            } => {}
            _ => return Err(target_error()),
        }
        let parent = self.nodes[cursor].parent;
        let assign = self.push_node(
            Expr::Assign {
                target: cursor,
                value: None,
            },
            parent,
        );
        self.nodes[cursor].parent = Some(assign);
        match parent {
            None => self.top_mut().tree = Some(assign),
            Some(parent) => self.replace_child(parent, cursor, assign)?,
        }
        self.top_mut().cursor = Some(assign);
        Ok(())
    }

    /// `.` decides how the next identifier attaches: onto the cursor as a
    /// member access, or as a relative reference when there is no complete
    /// operand to traverse from.
    fn dot(&mut self) {
        let encapsulate = match self.top().cursor {
            None => false,
            Some(cursor) => !matches!(
                self.nodes[cursor].expr,
                Expr::Unary { right: None, .. } | Expr::Binary { right: None, .. } | Expr::Assign { value: None, .. }
            ),
        };
        let frame = self.top_mut();
        frame.next_ident_encapsulate = encapsulate;
        frame.next_ident_relative = !encapsulate;
        if frame.next_ident_relative {
            frame.relative = true;
        }
    }

    fn identifier(&mut self, token: &Token) -> ExprResult<()> {
        let name = token.text().to_owned();
        if self.top().next_ident_encapsulate {
            self.top_mut().next_ident_encapsulate = false;
            let from = self.cursor()?;
            self.place_before_cursor(Expr::Identifier {
                name,
                from: Some(from),
                relative: false,
            })?;
        } else {
            let relative = std::mem::take(&mut self.top_mut().next_ident_relative);
            self.place_new_at_cursor(Expr::Identifier {
                name,
                from: None,
                relative,
            })?;
        }
        Ok(())
    }

    /// `|name` wraps the cursor as the first argument of a transform call.
    fn transform(&mut self, token: &Token) -> ExprResult<()> {
        let cursor = self.cursor()?;
        self.place_before_cursor(Expr::Call {
            name: token.text().to_owned(),
            pool: CallPool::Transforms,
            args: SmallVec::from_slice(&[cursor]),
        })?;
        Ok(())
    }

    /// `name(` turns a bare identifier cursor into a function call.
    fn function_call(&mut self, token: &Token) -> ExprResult<()> {
        let cursor = self.cursor()?;
        let name = match &self.nodes[cursor].expr {
            Expr::Identifier {
                name,
                from: None,
                relative: false,
            } => name.clone(),
            _ => return Err(self.unexpected_token(token)),
        };
        let parent = self.nodes[cursor].parent;
        let call = self.push_node(
            Expr::Call {
                name,
                pool: CallPool::Functions,
                args: SmallVec::new(),
            },
            parent,
        );
        match parent {
            None => self.top_mut().tree = Some(call),
            Some(parent) => self.replace_child(parent, cursor, call)?,
        }
        self.top_mut().cursor = Some(call);
        Ok(())
    }

    /// `?` wraps the current tree in a conditional. Only the assignment's
    /// value spine is wrapped, so `x = a ? b : c` assigns the ternary's
    /// result.
    fn ternary_start(&mut self) -> ExprResult<()> {
        let Some(mut target) = self.top().tree else {
            return Err(self.invariant("ternary started with no tree"));
        };
        while let Expr::Assign { value: Some(value), .. } = &self.nodes[target].expr {
            target = *value;
        }
        let parent = self.nodes[target].parent;
        let conditional = self.push_node(
            Expr::Conditional {
                test: target,
                consequent: None,
                alternate: None,
            },
            parent,
        );
        self.nodes[target].parent = Some(conditional);
        match parent {
            None => self.top_mut().tree = Some(conditional),
            Some(parent) => self.replace_child(parent, target, conditional)?,
        }
        self.top_mut().cursor = Some(conditional);
        Ok(())
    }

    /// A template token: static parts pass through, interpolation sources
    /// are parsed recursively and grafted into this arena.
    fn template(&mut self, token: &Token) -> ExprResult<()> {
        let TokenValue::Template(raw_parts) = &token.value else {
            return Err(self.invariant("template token without template parts"));
        };
        let mut parts = Vec::with_capacity(raw_parts.len());
        for raw in raw_parts {
            match raw {
                RawTemplatePart::Static(text) => parts.push(TemplatePart::Static(text.clone())),
                RawTemplatePart::Interpolation(source) => {
                    let depth = self.depth + u16::try_from(self.frames.len()).unwrap_or(u16::MAX);
                    if depth >= MAX_NESTING_DEPTH {
                        return Err(Error::new(
                            ErrorKind::NestingTooDeep,
                            "Expression exceeds the maximum nesting depth",
                        ));
                    }
                    let sub = Self::parse_source_at_depth(self.grammar, source, depth)?;
                    parts.push(TemplatePart::Interpolation(self.graft(sub)));
                }
            }
        }
        self.place_new_at_cursor(Expr::Template { parts })?;
        Ok(())
    }

    /// Appends a separately parsed arena to this one, shifting its node
    /// references, and returns the translated root.
    fn graft(&mut self, sub: Ast) -> NodeId {
        let delta = self.nodes.len();
        for mut node in sub.nodes {
            node.expr.shift_children(delta);
            node.parent = node.parent.map(|parent| parent + delta);
            self.nodes.push(node);
        }
        sub.root + delta
    }

    // --- errors ----------------------------------------------------------

    fn literal_value(&self, token: &Token) -> ExprResult<Value> {
        match &token.value {
            TokenValue::Literal(value) => Ok(value.clone()),
            _ => Err(self.invariant("literal token without a literal value")),
        }
    }

    fn unexpected_token(&self, token: &Token) -> Error {
        Error::new(
            ErrorKind::UnexpectedToken,
            format!(
                "Token {} ({}) unexpected in expression: {}",
                token.raw.trim(),
                token.kind,
                self.expr_str
            ),
        )
    }

    fn incomplete(&self) -> Error {
        Error::new(
            ErrorKind::IncompleteExpression,
            format!("Unexpected end of expression: {}", self.expr_str),
        )
    }

    /// An internal consistency failure: the state machine admitted a token
    /// its handler cannot honor. Surfaces as `UnexpectedToken` rather than
    /// panicking.
    fn invariant(&self, detail: &str) -> Error {
        Error::new(
            ErrorKind::UnexpectedToken,
            format!("{detail} (in expression: {})", self.expr_str),
        )
    }
}
