//! Error taxonomy shared by the lexer, parser, and evaluator.
//!
//! Every failure surfaces as a single [`Error`] carrying a stable [`ErrorKind`]
//! and a short human-readable message. Nothing is recovered inside the core:
//! an error aborts the current compile or evaluate call and reaches the host.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce an expression error.
pub type ExprResult<T> = Result<T, Error>;

/// Stable classification of everything that can go wrong in the core.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations. The string representation matches
/// the variant name exactly (e.g. `UnexpectedToken` -> "UnexpectedToken").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The lexer hit a character sequence no grammar element matches.
    InvalidToken,
    /// A string, template literal, or `${…}` interpolation never closed.
    UnclosedLiteral,
    /// The parser's current state has no handler for the incoming token.
    UnexpectedToken,
    /// `complete()` was called with a dangling operator or open delimiter.
    IncompleteExpression,
    /// The left side of `=` was not a bare variable name.
    AssignmentTarget,
    /// A function or transform was referenced but never registered.
    UnknownCallable,
    /// A registered function or transform raised; its message is propagated.
    UserCallable,
    /// Reserved: raised by variants that reject relative filters. The full
    /// filter semantics implemented here never produce it, but the taxonomy
    /// is a stable contract so hosts can match on it.
    RelativeFilterUnsupported,
    /// A parse or evaluation exceeded the nesting depth guard.
    NestingTooDeep,
}

/// The host-facing error: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates an error of the given kind with a preformatted message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wraps a failure raised by a host-registered function or transform,
    /// propagating its message unchanged.
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserCallable, message)
    }

    /// Returns the stable classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}
