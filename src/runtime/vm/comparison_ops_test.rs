use crate::{
    bytecode::op_code::OpCode,
    runtime::{value::Value, vm::comparison_ops::compare},
};

#[test]
fn numbers_compare_across_representations() {
    assert!(compare(OpCode::OpLess, &Value::Integer(1), &Value::Float(1.5)).unwrap());
    assert!(compare(OpCode::OpEqual, &Value::Integer(2), &Value::Float(2.0)).unwrap());
    assert!(compare(OpCode::OpGreaterEqual, &Value::Float(2.0), &Value::Integer(2)).unwrap());
}

#[test]
fn strings_compare_lexicographically() {
    assert!(compare(OpCode::OpLess, &Value::str("abc"), &Value::str("abd")).unwrap());
    assert!(!compare(OpCode::OpGreater, &Value::str("a"), &Value::str("b")).unwrap());
}

#[test]
fn equality_never_fails() {
    assert!(!compare(OpCode::OpEqual, &Value::str("1"), &Value::Integer(1)).unwrap());
    assert!(compare(OpCode::OpNotEqual, &Value::Nil, &Value::Boolean(false)).unwrap());
}

#[test]
fn nan_orders_false() {
    let nan = Value::Float(f64::NAN);
    assert!(!compare(OpCode::OpLess, &nan, &Value::Integer(1)).unwrap());
    assert!(!compare(OpCode::OpGreaterEqual, &nan, &Value::Integer(1)).unwrap());
}

#[test]
fn ordering_mixed_types_is_an_error() {
    let err = compare(OpCode::OpLess, &Value::Integer(1), &Value::str("2")).unwrap_err();
    assert_eq!(err.to_string(), "attempt to compare number with string");

    let err = compare(OpCode::OpLess, &Value::Nil, &Value::Nil).unwrap_err();
    assert_eq!(err.to_string(), "attempt to compare two nil values");
}
