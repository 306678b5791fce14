//! Payload building - turns declarative state into a request body.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::error::PayloadError;
use crate::schema::{ItemType, PropertyType, ScalarKind, SchemaDefinition, SchemaDefinitionProperty};
use crate::state::{unwrap_object, DeclarativeState, StateValue};

/// Build the wire payload for a create or update request.
///
/// Computed properties are never sent. At the top level the identifier
/// property and parent properties are left out as well: the former travels in
/// the URL, the latter in the resolved path.
///
/// # Errors
///
/// Returns `PayloadError` when a required value is missing or a value does
/// not fit the declared property type.
pub fn build(state: &DeclarativeState, schema: &SchemaDefinition) -> Result<Value, PayloadError> {
    let identifier = schema.identifier_property().ok().map(|p| p.name.as_str());
    let mut payload = Map::new();

    for property in schema {
        if property.computed
            || property.is_parent_property
            || identifier == Some(property.name.as_str())
        {
            continue;
        }
        let value = state.get(&property.canonical_name());
        if let Some(built) = build_property(property, value, false)? {
            payload.insert(property.name.clone(), built);
        }
    }

    Ok(Value::Object(payload))
}

// --- Internal implementation ---

fn build_object(
    map: &BTreeMap<String, StateValue>,
    schema: &SchemaDefinition,
) -> Result<Map<String, Value>, PayloadError> {
    let mut result = Map::new();
    for property in schema {
        if property.computed {
            continue;
        }
        let value = map.get(&property.canonical_name());
        if let Some(built) = build_property(property, value, true)? {
            result.insert(property.name.clone(), built);
        }
    }
    Ok(result)
}

fn build_property(
    property: &SchemaDefinitionProperty,
    value: Option<&StateValue>,
    in_object: bool,
) -> Result<Option<Value>, PayloadError> {
    let Some(value) = value else {
        if let Some(default) = &property.default {
            return Ok(Some(default.clone()));
        }
        if property.required {
            return Err(PayloadError::NilPropertyValue {
                property: property.name.clone(),
            });
        }
        return Ok(None);
    };

    let built = match &property.property_type {
        PropertyType::List { items } => build_list(&property.name, items, value)?,
        PropertyType::Object { properties } => {
            let map = unwrap_object(&property.name, value)?;
            Value::Object(build_object(map, properties)?)
        }
        scalar => {
            // Non-list, non-object types always have a scalar kind.
            let kind = scalar.scalar().unwrap_or(ScalarKind::String);
            build_scalar(&property.name, kind, value, in_object)?
        }
    };
    Ok(Some(built))
}

fn build_list(name: &str, items: &ItemType, value: &StateValue) -> Result<Value, PayloadError> {
    let StateValue::List(elements) = value else {
        return Err(unsupported(name, value));
    };

    let mut result = Vec::with_capacity(elements.len());
    for element in elements {
        let built = match items {
            ItemType::Object { properties } => match element {
                StateValue::Map(map) => Value::Object(build_object(map, properties)?),
                other => return Err(unsupported(name, other)),
            },
            primitive => {
                let kind = primitive.scalar().unwrap_or(ScalarKind::String);
                build_scalar(name, kind, element, false)?
            }
        };
        result.push(built);
    }
    Ok(Value::Array(result))
}

/// Convert one scalar, parsing string forms back when inside an object.
fn build_scalar(
    name: &str,
    kind: ScalarKind,
    value: &StateValue,
    in_object: bool,
) -> Result<Value, PayloadError> {
    match (kind, value) {
        (ScalarKind::String, StateValue::String(s)) => Ok(Value::String(s.clone())),
        (ScalarKind::Int, StateValue::Int(i)) => Ok(Value::from(*i)),
        (ScalarKind::Number, StateValue::Int(i)) => Ok(Value::from(*i)),
        (ScalarKind::Number, StateValue::Float(f)) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| PayloadError::UnsupportedValueType {
                property: name.to_string(),
                kind: "non-finite float".to_string(),
            }),
        (ScalarKind::Bool, StateValue::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarKind::Int, StateValue::String(s)) if in_object => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| unparsable(name, s, "int")),
        (ScalarKind::Number, StateValue::String(s)) if in_object => {
            parse_number(s).ok_or_else(|| unparsable(name, s, "number"))
        }
        (ScalarKind::Bool, StateValue::String(s)) if in_object => s
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| unparsable(name, s, "bool")),
        (_, other) => Err(PayloadError::UnsupportedValueType {
            property: name.to_string(),
            kind: format!("{} value for {} property", other.kind(), kind.name()),
        }),
    }
}

/// Integers stay integers; anything else that parses goes out as a float.
fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn unsupported(name: &str, value: &StateValue) -> PayloadError {
    PayloadError::UnsupportedValueType {
        property: name.to_string(),
        kind: value.kind().to_string(),
    }
}

fn unparsable(name: &str, value: &str, expected: &'static str) -> PayloadError {
    PayloadError::UnparsableScalar {
        property: name.to_string(),
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populator::apply;
    use crate::state::wrap_object;
    use serde_json::json;

    fn object_map(entries: &[(&str, StateValue)]) -> BTreeMap<String, StateValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new(vec![
            SchemaDefinitionProperty::string("id").computed(),
            SchemaDefinitionProperty::string("displayName").required(),
            SchemaDefinitionProperty::int("size"),
            SchemaDefinitionProperty::number("ratio"),
            SchemaDefinitionProperty::bool("enabled"),
            SchemaDefinitionProperty::string("status").computed(),
            SchemaDefinitionProperty::string("cdn_id").parent_property(),
        ])
    }

    #[test]
    fn build_scalars_by_wire_name() {
        let state = DeclarativeState::new()
            .with_id("abc")
            .with("display_name", "web")
            .with("size", 3i64)
            .with("ratio", 0.5)
            .with("enabled", true);

        let payload = build(&state, &schema()).unwrap();
        assert_eq!(
            payload,
            json!({ "displayName": "web", "size": 3, "ratio": 0.5, "enabled": true })
        );
    }

    #[test]
    fn build_excludes_identifier_computed_and_parent() {
        let state = DeclarativeState::new()
            .with("id", "abc")
            .with("display_name", "web")
            .with("status", "deployed")
            .with("cdn_id", "32");

        let payload = build(&state, &schema()).unwrap();
        let object = payload.as_object().unwrap();
        assert!(object.get("id").is_none());
        assert!(object.get("status").is_none());
        assert!(object.get("cdn_id").is_none());
        assert_eq!(object.len(), 1);
    }

    #[test]
    fn build_excludes_non_computed_identifier() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::string("uuid").identifier(),
            SchemaDefinitionProperty::string("name"),
        ]);
        let state = DeclarativeState::new()
            .with("uuid", "u-1")
            .with("name", "web");
        assert_eq!(build(&state, &schema).unwrap(), json!({ "name": "web" }));
    }

    #[test]
    fn build_missing_required_errors() {
        let result = build(&DeclarativeState::new(), &schema());
        assert!(matches!(
            result,
            Err(PayloadError::NilPropertyValue { property }) if property == "displayName"
        ));
    }

    #[test]
    fn build_missing_optional_is_omitted_and_default_is_used() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::string("name"),
            SchemaDefinitionProperty::int("replicas").with_default(json!(1)),
        ]);
        let payload = build(&DeclarativeState::new(), &schema).unwrap();
        assert_eq!(payload, json!({ "replicas": 1 }));
    }

    #[test]
    fn build_rejects_unexpected_numeric_kind() {
        let state = DeclarativeState::new()
            .with("display_name", "web")
            .with("size", 1.5);
        let result = build(&state, &schema());
        assert!(matches!(
            result,
            Err(PayloadError::UnsupportedValueType { property, kind })
                if property == "size" && kind.starts_with("float")
        ));
    }

    #[test]
    fn build_list_of_primitives_keeps_order() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::list(
            "tags",
            ItemType::String,
        )]);
        let state = DeclarativeState::new().with(
            "tags",
            vec![StateValue::from("b"), StateValue::from("a")],
        );
        assert_eq!(
            build(&state, &schema).unwrap(),
            json!({ "tags": ["b", "a"] })
        );
    }

    #[test]
    fn build_list_of_objects_skips_nested_computed() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::list(
            "rules",
            ItemType::Object {
                properties: SchemaDefinition::new(vec![
                    SchemaDefinitionProperty::int("port"),
                    SchemaDefinitionProperty::string("ruleId").computed(),
                ]),
            },
        )]);
        let state = DeclarativeState::new().with(
            "rules",
            vec![StateValue::Map(object_map(&[
                ("port", StateValue::Int(80)),
                ("rule_id", "r-1".into()),
            ]))],
        );
        assert_eq!(
            build(&state, &schema).unwrap(),
            json!({ "rules": [{ "port": 80 }] })
        );
    }

    #[test]
    fn build_object_parses_string_scalars() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![
                SchemaDefinitionProperty::int("size"),
                SchemaDefinitionProperty::number("ratio"),
                SchemaDefinitionProperty::bool("enabled"),
                SchemaDefinitionProperty::string("label"),
            ]),
        )]);
        let state = DeclarativeState::new().with(
            "config",
            object_map(&[
                ("size", "10".into()),
                ("ratio", "0.25".into()),
                ("enabled", "true".into()),
                ("label", "edge".into()),
            ]),
        );
        assert_eq!(
            build(&state, &schema).unwrap(),
            json!({ "config": { "size": 10, "ratio": 0.25, "enabled": true, "label": "edge" } })
        );
    }

    #[test]
    fn build_object_unparsable_scalar_errors() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![SchemaDefinitionProperty::int("size")]),
        )]);
        let state =
            DeclarativeState::new().with("config", object_map(&[("size", "ten".into())]));
        assert!(matches!(
            build(&state, &schema),
            Err(PayloadError::UnparsableScalar { expected: "int", .. })
        ));
    }

    #[test]
    fn build_nested_object_unwraps_singleton_list() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![
                SchemaDefinitionProperty::string("name"),
                SchemaDefinitionProperty::object(
                    "limits",
                    SchemaDefinition::new(vec![SchemaDefinitionProperty::int("cpu")]),
                ),
            ]),
        )]);
        let limits = object_map(&[("cpu", StateValue::Int(2))]);
        let config = object_map(&[("name", "edge".into()), ("limits", limits.into())]);
        let state = DeclarativeState::new().with("config", wrap_object(config));

        assert_eq!(
            build(&state, &schema).unwrap(),
            json!({ "config": { "name": "edge", "limits": { "cpu": 2 } } })
        );
    }

    #[test]
    fn build_singleton_list_with_two_elements_errors() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![SchemaDefinitionProperty::string("name")]),
        )]);
        let item = StateValue::Map(object_map(&[("name", "a".into())]));
        let state = DeclarativeState::new().with("config", vec![item.clone(), item]);
        assert!(matches!(
            build(&state, &schema),
            Err(PayloadError::SingletonListShape { len: 2, .. })
        ));
    }

    #[test]
    fn build_parses_wide_numbers_inside_object() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![
                SchemaDefinitionProperty::number("limit"),
                SchemaDefinitionProperty::number("scale"),
            ]),
        )]);
        let mut state = DeclarativeState::new();
        apply(&json!({ "config": { "limit": 1e20, "scale": 2.5 } }), &schema, &mut state)
            .unwrap();

        assert_eq!(
            build(&state, &schema).unwrap(),
            json!({ "config": { "limit": 1e20, "scale": 2.5 } })
        );

        let config = object_map(&[("limit", "1e3".into())]);
        let state = DeclarativeState::new().with("config", wrap_object(config));
        assert_eq!(
            build(&state, &schema).unwrap(),
            json!({ "config": { "limit": 1000.0 } })
        );
    }
}
