//! Lexical analysis: source string to token stream.
//!
//! The scan is context-sensitive in two ways: a leading minus is absorbed
//! into a numeric literal only when the previous token could not have been a
//! left operand, and backtick template literals are sub-tokenized into
//! static text and `${…}` interpolation source strings (the parser re-lexes
//! interpolations recursively). Whitespace is elided but preserved as the
//! prefix of the next token's `raw`, so the original source can be
//! reassembled for error messages.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    error::{Error, ErrorKind, ExprResult},
    grammar::Grammar,
    value::Value,
};

/// Classification of a lexed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum TokenKind {
    Literal,
    Identifier,
    BinaryOp,
    UnaryOp,
    Dot,
    OpenBracket,
    CloseBracket,
    Pipe,
    OpenCurl,
    CloseCurl,
    Colon,
    Comma,
    OpenParen,
    CloseParen,
    Question,
    Semicolon,
    TemplateString,
}

/// Payload of a token, depending on its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenValue {
    /// A literal's host-native value (bool, number, or unquoted string).
    Literal(Value),
    /// Identifier name or operator/punctuation lexeme.
    Text(String),
    /// Ordered template parts; interpolations are raw source strings.
    Template(Vec<RawTemplatePart>),
}

/// One piece of a template literal as the lexer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawTemplatePart {
    /// Static text, escape sequences preserved verbatim.
    Static(String),
    /// The source string between `${` and its matching `}`.
    Interpolation(String),
}

/// A classified token: kind, typed value, and the raw source slice
/// (including any preceding whitespace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub raw: String,
}

impl Token {
    /// The text payload; empty for literal and template tokens.
    #[must_use]
    pub fn text(&self) -> &str {
        match &self.value {
            TokenValue::Text(s) => s,
            TokenValue::Literal(_) | TokenValue::Template(_) => "",
        }
    }
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Identifier characters: `$`, `_`, ASCII letters, Latin-1 Supplement, and
/// Cyrillic; digits allowed after the first character.
static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[$_a-zA-ZÀ-ÿЀ-ӿ][$_0-9a-zA-ZÀ-ÿЀ-ӿ]*").expect("identifier pattern is valid")
});

/// Splits a source string into classified tokens using a grammar's element
/// table for operator lexemes.
pub struct Lexer<'g> {
    grammar: &'g Grammar,
    /// Grammar lexemes, longest first, for maximal-munch operator matching.
    lexemes: Vec<&'g str>,
}

impl<'g> Lexer<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            lexemes: grammar.lexemes_longest_first(),
        }
    }

    /// Tokenizes `source` in a single left-to-right scan.
    pub fn tokenize(&self, source: &str) -> ExprResult<Vec<Token>> {
        let mut scan = Scanner::new(source);
        let mut tokens = Vec::new();
        loop {
            let whitespace_start = scan.position;
            scan.skip_whitespace();
            let raw_start = scan.position;
            let Some(first) = scan.current_char() else {
                break;
            };
            let prefix = &source[whitespace_start..raw_start];
            let previous = tokens.last().map(|token: &Token| token.kind);

            let (kind, value) = if first == '"' || first == '\'' {
                let unquoted = scan.string(first)?;
                (TokenKind::Literal, TokenValue::Literal(Value::String(unquoted)))
            } else if first == '`' {
                let parts = scan.template()?;
                (TokenKind::TemplateString, TokenValue::Template(parts))
            } else if let Some(number) = self.number(&mut scan, previous) {
                (TokenKind::Literal, TokenValue::Literal(Value::Number(number)))
            } else if let Some(word) = scan.matches(&IDENTIFIER_RE) {
                self.classify_word(word)
            } else if let Some(lexeme) = self.operator(&mut scan) {
                (lexeme.0, TokenValue::Text(lexeme.1))
            } else {
                return Err(Error::new(
                    ErrorKind::InvalidToken,
                    format!("Invalid expression token: {first}"),
                ));
            };

            tokens.push(Token {
                kind,
                value,
                raw: format!("{prefix}{}", &source[raw_start..scan.position]),
            });
        }
        Ok(tokens)
    }

    /// Attempts a numeric literal at the cursor. The leading minus is only
    /// absorbed when the previous token cannot be a left operand.
    fn number(&self, scan: &mut Scanner<'_>, previous: Option<TokenKind>) -> Option<f64> {
        let matched = NUMBER_RE.find(scan.rest())?;
        if matched.as_str().starts_with('-') && !negative_allowed(previous) {
            return None;
        }
        let parsed = matched.as_str().parse().ok()?;
        scan.position += matched.end();
        Some(parsed)
    }

    /// Classifies an identifier spelling: `true`/`false`/`null` literals and
    /// grammar lexemes spelled like identifiers (`in`) are re-classified.
    fn classify_word(&self, word: String) -> (TokenKind, TokenValue) {
        match word.as_str() {
            "true" => (TokenKind::Literal, TokenValue::Literal(Value::Bool(true))),
            "false" => (TokenKind::Literal, TokenValue::Literal(Value::Bool(false))),
            "null" => (TokenKind::Literal, TokenValue::Literal(Value::Null)),
            _ => match self.grammar.element(&word) {
                Some(element) => (element.token_kind(), TokenValue::Text(word)),
                None => (TokenKind::Identifier, TokenValue::Text(word)),
            },
        }
    }

    /// Longest-match scan over the grammar's punctuation and operator
    /// lexemes.
    fn operator(&self, scan: &mut Scanner<'_>) -> Option<(TokenKind, String)> {
        let rest = scan.rest();
        for lexeme in &self.lexemes {
            if rest.starts_with(lexeme) {
                let element = self.grammar.element(lexeme)?;
                scan.position += lexeme.len();
                return Some((element.token_kind(), (*lexeme).to_owned()));
            }
        }
        None
    }
}

/// Whether a `-` directly before digits starts a negative literal: true only
/// when the previous token cannot syntactically be a left operand.
fn negative_allowed(previous: Option<TokenKind>) -> bool {
    match previous {
        None => true,
        Some(kind) => matches!(
            kind,
            TokenKind::BinaryOp
                | TokenKind::UnaryOp
                | TokenKind::OpenParen
                | TokenKind::OpenBracket
                | TokenKind::OpenCurl
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Question
        ),
    }
}

/// Byte-position cursor over the source string.
struct Scanner<'s> {
    input: &'s str,
    position: usize,
}

impl<'s> Scanner<'s> {
    fn new(input: &'s str) -> Self {
        Self { input, position: 0 }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.position..].chars();
        chars.next();
        chars.next()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.current_char() {
            self.position += c.len_utf8();
        }
    }

    fn rest(&self) -> &'s str {
        &self.input[self.position..]
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    /// Applies an anchored pattern at the cursor, consuming the match.
    fn matches(&mut self, pattern: &Regex) -> Option<String> {
        let matched = pattern.find(self.rest())?;
        self.position += matched.end();
        Some(matched.as_str().to_owned())
    }

    /// Scans a quoted string past its opening quote, unescaping only the
    /// quote character itself (`\"` inside double quotes, `\'` inside
    /// single quotes). Every other backslash stays verbatim.
    fn string(&mut self, quote: char) -> ExprResult<String> {
        self.advance_char();
        let mut text = String::new();
        loop {
            match self.current_char() {
                None => {
                    return Err(Error::new(
                        ErrorKind::UnclosedLiteral,
                        "Unclosed string literal",
                    ));
                }
                Some('\\') if self.peek_next() == Some(quote) => {
                    text.push(quote);
                    self.advance_char();
                    self.advance_char();
                }
                Some(c) if c == quote => {
                    self.advance_char();
                    return Ok(text);
                }
                Some(c) => {
                    text.push(c);
                    self.advance_char();
                }
            }
        }
    }

    /// Scans a backtick template past its opening backtick. Escaped
    /// backticks and dollars stay in the static text as two-character
    /// sequences; the evaluator concatenates them verbatim.
    fn template(&mut self) -> ExprResult<Vec<RawTemplatePart>> {
        self.advance_char();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.current_char() {
                None => {
                    return Err(Error::new(
                        ErrorKind::UnclosedLiteral,
                        "Unclosed template literal",
                    ));
                }
                Some('\\') if matches!(self.peek_next(), Some('`' | '$')) => {
                    text.push('\\');
                    self.advance_char();
                    if let Some(escaped) = self.current_char() {
                        text.push(escaped);
                        self.advance_char();
                    }
                }
                Some('`') => {
                    self.advance_char();
                    if !text.is_empty() {
                        parts.push(RawTemplatePart::Static(text));
                    }
                    return Ok(parts);
                }
                Some('$') if self.peek_next() == Some('{') => {
                    if !text.is_empty() {
                        parts.push(RawTemplatePart::Static(std::mem::take(&mut text)));
                    }
                    parts.push(RawTemplatePart::Interpolation(self.interpolation()?));
                }
                Some(c) => {
                    text.push(c);
                    self.advance_char();
                }
            }
        }
    }

    /// Scans the source between `${` and its matching `}`. Brace depth is
    /// tracked outside of nested strings and templates.
    fn interpolation(&mut self) -> ExprResult<String> {
        self.advance_char();
        self.advance_char();
        let start = self.position;
        let mut depth = 1usize;
        loop {
            match self.current_char() {
                None => {
                    return Err(Error::new(ErrorKind::UnclosedLiteral, "Unclosed interpolation"));
                }
                Some(quote @ ('"' | '\'')) => self.skip_quoted(quote)?,
                Some('`') => self.skip_nested_template()?,
                Some('{') => {
                    depth += 1;
                    self.advance_char();
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        let source = self.input[start..self.position].to_owned();
                        self.advance_char();
                        return Ok(source);
                    }
                    self.advance_char();
                }
                Some(_) => self.advance_char(),
            }
        }
    }

    /// Skips a quoted string inside an interpolation without unescaping.
    fn skip_quoted(&mut self, quote: char) -> ExprResult<()> {
        self.advance_char();
        loop {
            match self.current_char() {
                None => {
                    return Err(Error::new(ErrorKind::UnclosedLiteral, "Unclosed interpolation"));
                }
                Some('\\') if self.peek_next() == Some(quote) => {
                    self.advance_char();
                    self.advance_char();
                }
                Some(c) => {
                    self.advance_char();
                    if c == quote {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Skips a nested backtick template inside an interpolation.
    fn skip_nested_template(&mut self) -> ExprResult<()> {
        self.advance_char();
        loop {
            match self.current_char() {
                None => {
                    return Err(Error::new(ErrorKind::UnclosedLiteral, "Unclosed interpolation"));
                }
                Some('\\') if matches!(self.peek_next(), Some('`' | '$')) => {
                    self.advance_char();
                    self.advance_char();
                }
                Some(c) => {
                    self.advance_char();
                    if c == '`' {
                        return Ok(());
                    }
                }
            }
        }
    }
}
