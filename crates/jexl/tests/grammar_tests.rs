//! Tests for the extensibility contract: registering operators, functions,
//! and transforms, removing operators, and the observational guarantees of
//! on-demand (short-circuit) evaluation.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use jexl::{Context, Error, ErrorKind, ExpressionFn, Jexl, RecordingTracer, Value};
use pretty_assertions::assert_eq;

fn eval(jexl: &Jexl, source: &str) -> Value {
    jexl.evaluate(source, &mut Context::new())
        .unwrap_or_else(|err| panic!("{source:?} failed: {err}"))
}

// =============================================================================
// 1. custom operators
// =============================================================================

/// A strict binary operator participates in precedence like any builtin.
#[test]
fn custom_binary_op_case_insensitive_equality() {
    let mut jexl = Jexl::new();
    jexl.add_binary_op("<>", 20, |l, r| {
        Ok(Value::Bool(
            l.to_string().to_lowercase() == r.to_string().to_lowercase(),
        ))
    });
    assert_eq!(eval(&jexl, r#""FoO" <> "foo""#), Value::Bool(true));
    assert_eq!(eval(&jexl, r#""FoO" <> "bar""#), Value::Bool(false));
    // Precedence 20 groups like the comparison operators.
    assert_eq!(eval(&jexl, r#""ab" <> "a" + "b""#), Value::Bool(true));
}

/// An on-demand operator controls its own operand evaluation.
#[test]
fn custom_on_demand_op_nullish_coalescing() {
    let mut jexl = Jexl::new();
    jexl.add_binary_op_on_demand("??", 10, |ops| {
        let left = ops.left()?;
        if left.is_nullish() { ops.right() } else { Ok(left) }
    });
    assert_eq!(eval(&jexl, "null ?? 5"), Value::Number(5.0));
    assert_eq!(eval(&jexl, "0 ?? 5"), Value::Number(0.0));
    assert_eq!(eval(&jexl, "missing ?? \"default\""), Value::from("default"));
}

/// The unused operand of an on-demand operator is never evaluated.
#[test]
fn on_demand_skips_the_unused_operand() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut jexl = Jexl::new();
    jexl.add_function("boom", move |_args| {
        seen.fetch_add(1, Ordering::SeqCst);
        Err(Error::user("should never run"))
    });
    jexl.add_binary_op_on_demand("??", 10, |ops| {
        let left = ops.left()?;
        if left.is_nullish() { ops.right() } else { Ok(left) }
    });
    assert_eq!(eval(&jexl, "1 ?? boom()"), Value::Number(1.0));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn custom_unary_op() {
    let mut jexl = Jexl::new();
    jexl.add_unary_op("~", |v| Ok(Value::Number(v.to_number().floor())));
    assert_eq!(eval(&jexl, "~3.7"), Value::Number(3.0));
    // Unary binds tighter than any binary operator.
    assert_eq!(eval(&jexl, "~3.7 + 1"), Value::Number(4.0));
}

/// Removing an operator removes its lexeme from the language.
#[test]
fn removed_op_no_longer_lexes() {
    let mut jexl = Jexl::new();
    jexl.remove_op("+");
    let err = jexl.compile("1 + 2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidToken);
    // Other operators are untouched.
    assert_eq!(eval(&jexl, "3 - 1"), Value::Number(2.0));
}

// =============================================================================
// 2. functions and transforms
// =============================================================================

#[test]
fn expression_functions_receive_evaluated_args() {
    let mut jexl = Jexl::new();
    jexl.add_function("max", |args| {
        Ok(Value::Number(
            args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, f64::max),
        ))
    });
    assert_eq!(eval(&jexl, "max(2, 3 * 3, 5)"), Value::Number(9.0));
}

#[test]
fn bulk_registration() {
    let mut jexl = Jexl::new();
    let double: ExpressionFn = Arc::new(|args| Ok(Value::Number(args[0].to_number() * 2.0)));
    let shout: ExpressionFn = Arc::new(|args| Ok(Value::from(args[0].to_string().to_uppercase())));
    jexl.add_functions([("double".to_owned(), double)]);
    jexl.add_transforms([("shout".to_owned(), shout)]);
    assert_eq!(eval(&jexl, "double(21)"), Value::Number(42.0));
    assert_eq!(eval(&jexl, r#""hey" | shout"#), Value::from("HEY"));
    assert!(jexl.get_function("double").is_some());
    assert!(jexl.get_transform("shout").is_some());
}

/// `x | f(a, b)` desugars to `f(x, a, b)` from the transforms pool.
#[test]
fn transform_pipe_prepends_the_subject() {
    let mut jexl = Jexl::new();
    jexl.add_transform("join", |args| {
        let Value::Array(items) = &args[0] else {
            return Err(Error::user("join expects an array"));
        };
        let sep = args.get(1).map(ToString::to_string).unwrap_or_default();
        Ok(Value::from(
            items.iter().map(ToString::to_string).collect::<Vec<_>>().join(&sep),
        ))
    });
    assert_eq!(eval(&jexl, r#"["a", "b", "c"] | join("-")"#), Value::from("a-b-c"));
}

#[test]
fn transforms_chain_left_to_right() {
    let mut jexl = Jexl::new();
    jexl.add_transform("lower", |args| Ok(Value::from(args[0].to_string().to_lowercase())));
    jexl.add_transform("trim", |args| Ok(Value::from(args[0].to_string().trim())));
    assert_eq!(eval(&jexl, r#""  LOUD  " | trim | lower"#), Value::from("loud"));
}

#[test]
fn unknown_function_message_is_stable() {
    let err = Jexl::new().evaluate("foo(1)", &mut Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCallable);
    assert_eq!(err.message(), "Jexl Function foo is not defined.");
}

#[test]
fn unknown_transform_message_is_stable() {
    let err = Jexl::new().evaluate("1 | bar", &mut Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCallable);
    assert_eq!(err.message(), "Jexl Transform bar is not defined.");
}

/// A failure inside a host callable propagates its message unchanged.
#[test]
fn user_callable_errors_propagate() {
    let mut jexl = Jexl::new();
    jexl.add_function("explode", |_args| Err(Error::user("boom")));
    let err = jexl.evaluate("explode()", &mut Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserCallable);
    assert_eq!(err.message(), "boom");
}

// =============================================================================
// 3. short-circuit guarantees
// =============================================================================

/// `false && E` never invokes anything in `E` — proven observationally with
/// a recording tracer.
#[test]
fn and_short_circuits_without_touching_the_right_branch() {
    let mut jexl = Jexl::new();
    jexl.add_function("probe", |_args| Ok(Value::Bool(true)));
    let compiled = jexl.compile("false && probe()").unwrap();
    let mut tracer = RecordingTracer::new();
    let result = compiled
        .evaluate_with_tracer(&mut Context::new(), &mut tracer)
        .unwrap();
    assert_eq!(result, Value::Bool(false));
    assert_eq!(tracer.calls, Vec::<String>::new());
    assert!(!tracer.nodes.is_empty());
}

#[test]
fn or_short_circuits_without_touching_the_right_branch() {
    let mut jexl = Jexl::new();
    jexl.add_function("probe", |_args| Ok(Value::Bool(true)));
    let compiled = jexl.compile("true || probe()").unwrap();
    let mut tracer = RecordingTracer::new();
    let result = compiled
        .evaluate_with_tracer(&mut Context::new(), &mut tracer)
        .unwrap();
    assert_eq!(result, Value::Bool(true));
    assert_eq!(tracer.calls, Vec::<String>::new());
}

/// Errors in the unused branch are never observed, even unknown callables.
#[test]
fn errors_in_the_skipped_branch_never_surface() {
    let jexl = Jexl::new();
    let result = jexl.evaluate("false && nosuchfn()", &mut Context::new()).unwrap();
    assert_eq!(result, Value::Bool(false));
}

/// The tracer sees calls when they actually run.
#[test]
fn tracer_records_executed_calls() {
    let mut jexl = Jexl::new();
    jexl.add_function("probe", |_args| Ok(Value::Bool(true)));
    let compiled = jexl.compile("true && probe()").unwrap();
    let mut tracer = RecordingTracer::new();
    compiled
        .evaluate_with_tracer(&mut Context::new(), &mut tracer)
        .unwrap();
    assert_eq!(tracer.calls, vec!["probe".to_owned()]);
}

// =============================================================================
// 4. grammar snapshots
// =============================================================================

/// Cloning a grammar decouples later registrations.
#[test]
fn cloned_grammars_diverge() {
    let mut jexl = Jexl::new();
    jexl.add_function("answer", |_args| Ok(Value::Number(42.0)));
    let snapshot = Jexl::with_grammar(jexl.grammar().clone());
    jexl.add_function("extra", |_args| Ok(Value::Null));

    assert_eq!(eval(&snapshot, "answer()"), Value::Number(42.0));
    assert_eq!(
        snapshot
            .evaluate("extra()", &mut Context::new())
            .unwrap_err()
            .kind(),
        ErrorKind::UnknownCallable
    );
}
