//! Tests for the compile-time half of the error taxonomy: lexer and parser
//! failures surfaced by `Jexl::compile`.

use jexl::{ErrorKind, Jexl};

/// Helper to extract the error kind from a failed compile.
fn compile_err(source: &str) -> ErrorKind {
    let jexl = Jexl::new();
    let err = jexl
        .compile(source)
        .err()
        .unwrap_or_else(|| panic!("{source:?} should fail to compile"));
    err.kind()
}

// =============================================================================
// 1. lexer errors
// =============================================================================

#[test]
fn unrecognized_rune_is_invalid_token() {
    assert_eq!(compile_err("2 @ 3"), ErrorKind::InvalidToken);
    assert_eq!(compile_err("a # b"), ErrorKind::InvalidToken);
}

#[test]
fn invalid_token_message_names_the_rune() {
    let err = Jexl::new().compile("2 @ 3").unwrap_err();
    assert_eq!(err.message(), "Invalid expression token: @");
}

#[test]
fn unterminated_string_is_unclosed_literal() {
    assert_eq!(compile_err("\"abc"), ErrorKind::UnclosedLiteral);
    assert_eq!(compile_err("'abc"), ErrorKind::UnclosedLiteral);
}

#[test]
fn unterminated_template_is_unclosed_literal() {
    assert_eq!(compile_err("`abc"), ErrorKind::UnclosedLiteral);
    assert_eq!(compile_err("`${1 + 2"), ErrorKind::UnclosedLiteral);
}

// =============================================================================
// 2. parser errors
// =============================================================================

#[test]
fn operator_without_operand_is_unexpected_token() {
    assert_eq!(compile_err("2 + * 3"), ErrorKind::UnexpectedToken);
    assert_eq!(compile_err("a b"), ErrorKind::UnexpectedToken);
    assert_eq!(compile_err(", 1"), ErrorKind::UnexpectedToken);
}

#[test]
fn unexpected_token_message_echoes_token_and_source() {
    let err = Jexl::new().compile("1 + ]").unwrap_err();
    assert!(
        err.message().contains("Token ]") && err.message().contains("1 + ]"),
        "message should name the token and the source, got: {err}"
    );
}

#[test]
fn semicolon_inside_a_subexpression_is_unexpected() {
    assert_eq!(compile_err("(1; 2)"), ErrorKind::UnexpectedToken);
}

#[test]
fn dangling_operator_is_incomplete() {
    assert_eq!(compile_err("2 +"), ErrorKind::IncompleteExpression);
    assert_eq!(compile_err("!"), ErrorKind::IncompleteExpression);
}

#[test]
fn unclosed_delimiters_are_incomplete() {
    assert_eq!(compile_err("(2 + 3"), ErrorKind::IncompleteExpression);
    assert_eq!(compile_err("[1, 2"), ErrorKind::IncompleteExpression);
    assert_eq!(compile_err("{a: 1"), ErrorKind::IncompleteExpression);
    assert_eq!(compile_err("foo[.bar == 1"), ErrorKind::IncompleteExpression);
}

#[test]
fn missing_ternary_branches_are_incomplete() {
    assert_eq!(compile_err("a ? b"), ErrorKind::IncompleteExpression);
    assert_eq!(compile_err("a ? b :"), ErrorKind::IncompleteExpression);
}

#[test]
fn empty_input_is_incomplete() {
    assert_eq!(compile_err(""), ErrorKind::IncompleteExpression);
    assert_eq!(compile_err("   "), ErrorKind::IncompleteExpression);
}

#[test]
fn empty_subexpression_is_incomplete() {
    assert_eq!(compile_err("()"), ErrorKind::IncompleteExpression);
}

#[test]
fn missing_object_value_is_incomplete() {
    assert_eq!(compile_err("{a: }"), ErrorKind::IncompleteExpression);
}

// =============================================================================
// 3. assignment targets
// =============================================================================

#[test]
fn assignment_to_a_literal_is_rejected() {
    assert_eq!(compile_err("5 = 10"), ErrorKind::AssignmentTarget);
    assert_eq!(compile_err("\"str\" = 1"), ErrorKind::AssignmentTarget);
}

#[test]
fn assignment_to_a_member_access_is_rejected() {
    assert_eq!(compile_err("foo.bar = 2"), ErrorKind::AssignmentTarget);
}

#[test]
fn assignment_to_an_aggregate_is_rejected() {
    assert_eq!(compile_err("[1] = 2"), ErrorKind::AssignmentTarget);
    assert_eq!(compile_err("{a: 1} = 2"), ErrorKind::AssignmentTarget);
}

#[test]
fn assignment_target_message_is_stable() {
    let err = Jexl::new().compile("5 = 10").unwrap_err();
    assert_eq!(err.message(), "Left side of assignment must be a variable name");
}

// =============================================================================
// 4. resource limits
// =============================================================================

#[test]
fn pathological_nesting_is_rejected() {
    let source = format!("{}1{}", "(".repeat(250), ")".repeat(250));
    assert_eq!(compile_err(&source), ErrorKind::NestingTooDeep);
}

#[test]
fn reasonable_nesting_is_fine() {
    let source = format!("{}1{}", "(".repeat(10), ")".repeat(10));
    assert!(Jexl::new().compile(&source).is_ok());
}
