//! Tests for host-side value construction: building contexts from JSON,
//! feeding values in, and reading results back out.

use jexl::{Context, Jexl, Value, context_from_json};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn context_from_json_preserves_key_order() {
    let context = context_from_json(json!({"z": 1, "a": 2, "m": 3})).unwrap();
    assert_eq!(context.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
}

#[test]
fn context_from_json_rejects_non_objects() {
    assert!(context_from_json(json!([1, 2])).is_none());
    assert!(context_from_json(json!("scalar")).is_none());
    assert!(context_from_json(json!(null)).is_none());
}

#[test]
fn json_contexts_evaluate_directly() {
    let mut context = context_from_json(json!({
        "assoc": [{"first": "Lana", "last": "Kane"}],
        "age": 36,
    }))
    .unwrap();
    let jexl = Jexl::new();
    assert_eq!(
        jexl.evaluate("assoc[0].first", &mut context).unwrap(),
        Value::from("Lana")
    );
    assert_eq!(jexl.evaluate("age > 21", &mut context).unwrap(), Value::Bool(true));
}

#[test]
fn results_convert_back_to_json() {
    let mut context = Context::new();
    let jexl = Jexl::new();
    let result = jexl
        .evaluate(r#"{name: "out", tags: ["a", "b"], n: 1.5}"#, &mut context)
        .unwrap();
    assert_eq!(
        serde_json::Value::from(result),
        json!({"name": "out", "tags": ["a", "b"], "n": 1.5})
    );
}

#[test]
fn undefined_results_become_json_null() {
    let mut context = Context::new();
    let result = Jexl::new().evaluate("missing", &mut context).unwrap();
    assert_eq!(result, Value::Undefined);
    assert_eq!(serde_json::Value::from(result), json!(null));
}

#[test]
fn values_built_from_conversions_round_trip() {
    let mut context = Context::new();
    context.insert("n".to_owned(), Value::from(2));
    context.insert("s".to_owned(), Value::from("x"));
    context.insert("b".to_owned(), Value::from(true));
    context.insert("xs".to_owned(), Value::from(vec![Value::from(1), Value::from(2)]));
    let jexl = Jexl::new();
    assert_eq!(
        jexl.evaluate("b ? s + n : xs[0]", &mut context).unwrap(),
        Value::from("x2")
    );
}

#[test]
fn values_serialize_untagged() {
    let value = Value::from(serde_json::json!({"k": [1.5, null, "s"]}));
    let encoded = serde_json::to_value(&value).unwrap();
    assert_eq!(encoded, json!({"k": [1.5, null, "s"]}));
    let decoded: Value = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, value);
}
