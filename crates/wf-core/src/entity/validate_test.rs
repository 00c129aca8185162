use super::*;
use crate::entity::definition::Validators;
use crate::names::EntityName;
use serde_json::json;

fn user_mapping() -> EntityMapping {
    EntityMapping::new(EntityName::new("User"))
        .with_field(FieldDef::new("name", DataType::String).validate(Validators {
            not_empty: true,
            len: Some((2, 10)),
            ..Validators::default()
        }))
        .with_field(
            FieldDef::new("email", DataType::String)
                .not_null()
                .unique()
                .validate(Validators {
                    is_email: true,
                    ..Validators::default()
                }),
        )
        .with_field(FieldDef::new("age", DataType::Integer))
        .finalize()
        .unwrap()
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

const TS: &[&str] = &["createdAt", "updatedAt"];

#[test]
fn test_valid_record_skips_generated_key() {
    let mapping = user_mapping();
    let values = prepare_insert(
        &mapping,
        &record(json!({"name": "Ann", "email": "ann@example.com", "age": 30})),
        TS,
    )
    .unwrap();
    let names: Vec<&str> = values.iter().map(|(f, _)| f.name.as_str()).collect();
    assert_eq!(names, vec!["name", "email", "age"]);
    assert_eq!(values[2].1, Value::Int(30));
}

#[test]
fn test_missing_required_field_is_null_violation() {
    let mapping = user_mapping();
    let errs = prepare_insert(&mapping, &record(json!({"name": "Ann"})), TS).unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].field, "email");
    assert_eq!(errs[0].code, "is_null");
    assert_eq!(errs[0].message, "User.email cannot be null");
}

#[test]
fn test_all_violations_collected() {
    let mapping = user_mapping();
    let errs = prepare_insert(
        &mapping,
        &record(json!({"name": " ", "email": "not-an-email", "age": "old"})),
        TS,
    )
    .unwrap_err();
    let codes: Vec<&str> = errs.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["notEmpty", "len", "isEmail", "type"]);
    assert_eq!(errs[2].message, "Validation isEmail on email failed");
}

#[test]
fn test_default_applies_when_absent() {
    let mut mapping = user_mapping();
    if let Some(age) = mapping.fields.iter_mut().find(|f| f.name == "age") {
        age.default = Some(json!(18));
    }
    let values =
        prepare_insert(&mapping, &record(json!({"email": "a@b.co"})), TS).unwrap();
    assert!(values
        .iter()
        .any(|(f, v)| f.name == "age" && *v == Value::Int(18)));
}

#[test]
fn test_coerce_rules() {
    assert_eq!(coerce(DataType::Integer, &json!("42")), Some(Value::Int(42)));
    assert_eq!(coerce(DataType::Integer, &json!(1.5)), None);
    assert_eq!(coerce(DataType::Boolean, &json!(1)), Some(Value::Bool(true)));
    assert_eq!(coerce(DataType::Boolean, &json!("maybe")), None);
    assert_eq!(coerce(DataType::Text, &json!(7)), Some(Value::Text("7".into())));
    assert_eq!(coerce(DataType::String, &json!({"a": 1})), None);
    assert_eq!(
        coerce(DataType::Date, &json!("2024-03-01")),
        Some(Value::Text("2024-03-01 00:00:00.000".into()))
    );
    assert_eq!(
        coerce(DataType::Date, &json!("2024-03-01T10:30:00Z")),
        Some(Value::Text("2024-03-01 10:30:00.000".into()))
    );
    assert_eq!(coerce(DataType::Date, &json!("yesterday")), None);
}

#[test]
fn test_to_json() {
    assert_eq!(to_json(Value::Int(3)), json!(3));
    assert_eq!(to_json(Value::Text("x".into())), json!("x"));
    assert_eq!(to_json(Value::Null), json!(null));
}

#[test]
fn test_finalize_adds_id_and_timestamps() {
    let mapping = user_mapping();
    assert_eq!(mapping.primary_key_name(), "id");
    assert!(mapping.fields[0].is_generated());
    assert!(mapping.field("createdAt").is_some());
    assert!(mapping.field("updatedAt").is_some());
}

#[test]
fn test_finalize_rejects_duplicate_fields() {
    let err = EntityMapping::new(EntityName::new("X"))
        .with_field(FieldDef::new("a", DataType::Text))
        .with_field(FieldDef::new("a", DataType::Text))
        .finalize()
        .unwrap_err();
    assert!(err.to_string().contains("declared twice"));
}
