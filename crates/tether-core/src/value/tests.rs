use super::*;
use serde_json::json;

fn doc(value: serde_json::Value) -> Document {
    serde_json::from_value(value).expect("fixture document should deserialize")
}

#[test]
fn json_fixtures_map_onto_untagged_values() {
    let document = doc(json!({
        "_id": 7,
        "name": "alice",
        "score": 1.5,
        "tags": ["a", "b"],
        "nested": { "ok": true },
        "gone": null,
    }));

    assert_eq!(document.get("_id"), Some(&Value::Int(7)));
    assert_eq!(document.get("name"), Some(&Value::Text("alice".to_string())));
    assert_eq!(document.get("score"), Some(&Value::Float(1.5)));
    assert_eq!(document.get("gone"), Some(&Value::Null));
    assert!(matches!(document.get("tags"), Some(Value::List(items)) if items.len() == 2));
    assert!(matches!(document.get("nested"), Some(Value::Document(inner)) if inner.contains_key("ok")));
}

#[test]
fn doc_id_reads_only_scalar_identifiers() {
    assert_eq!(DocId::from_value(&Value::Int(3)), Ok(DocId::Int(3)));
    assert_eq!(
        DocId::from_value(&Value::Text("k".to_string())),
        Ok(DocId::from("k"))
    );

    let err = DocId::from_value(&Value::Bool(true)).expect_err("bool is not an identifier");
    assert_eq!(
        err,
        ValueError::TypeMismatch {
            expected: "identifier",
            found: "bool",
        }
    );
}

#[test]
fn narrow_integers_reject_out_of_range_values() {
    let err = i32::from_value(Value::Int(i64::MAX)).expect_err("value must not fit i32");

    assert!(matches!(err, ValueError::OutOfRange { target: "i32", .. }));
    assert_eq!(u32::from_value(Value::Int(12)), Ok(12));
    assert!(u32::from_value(Value::Int(-1)).is_err());
}

#[test]
fn optional_and_list_values_nest() {
    let values = vec![Some(1_i64), None, Some(3)];
    let stored = values.to_value();

    assert_eq!(
        stored,
        Value::List(vec![Value::Int(1), Value::Null, Value::Int(3)])
    );
    assert_eq!(Vec::<Option<i64>>::from_value(stored), Ok(values));
}

#[test]
fn float_accepts_stored_integers() {
    assert_eq!(f64::from_value(Value::Int(2)), Ok(2.0));
}

#[test]
fn filter_matching_requires_every_field() {
    let document = doc(json!({ "_id": 1, "name": "bob", "age": 40 }));

    assert!(document.matches(&doc(json!({ "name": "bob" }))));
    assert!(document.matches(&Document::new()));
    assert!(!document.matches(&doc(json!({ "name": "bob", "age": 41 }))));
    assert!(!document.matches(&doc(json!({ "missing": 1 }))));
}

#[test]
fn map_keys_exist_only_for_scalars() {
    assert_eq!(Value::Int(4).as_map_key(), Some("4".to_string()));
    assert_eq!(Value::from("x").as_map_key(), Some("x".to_string()));
    assert_eq!(Value::Float(1.0).as_map_key(), None);
    assert_eq!(Value::Null.as_map_key(), None);
}
