//! State population - applies a remote payload to declarative state.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::PayloadError;
use crate::schema::{ItemType, PropertyType, ScalarKind, SchemaDefinition, SchemaDefinitionProperty};
use crate::state::{wrap_object, DeclarativeState, StateValue};
use crate::types::json_type_name;

/// Options for [`apply_with_options`].
#[derive(Debug, Clone, Copy)]
pub struct PopulateOptions {
    /// Keep the local order of lists flagged `ignore_order`.
    pub ignore_list_order: bool,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            ignore_list_order: true,
        }
    }
}

/// Apply a remote payload onto `state` with default options.
///
/// See [`apply_with_options`].
pub fn apply(
    payload: &Value,
    schema: &SchemaDefinition,
    state: &mut DeclarativeState,
) -> Result<(), PayloadError> {
    apply_with_options(payload, schema, state, PopulateOptions::default())
}

/// Apply a remote payload onto `state`.
///
/// Every payload key must resolve to a schema property, by wire name or
/// canonical name. The identifier is never written here (the engine owns the
/// id slot) and write-only properties keep their local value. A `null` value
/// clears the entry.
///
/// Nothing is written unless the whole payload converts successfully.
///
/// # Errors
///
/// Returns `PayloadError::UnknownRemoteProperty` for an undeclared key and
/// `PayloadError::UnsupportedValueType` for a value that does not fit its
/// property.
pub fn apply_with_options(
    payload: &Value,
    schema: &SchemaDefinition,
    state: &mut DeclarativeState,
    options: PopulateOptions,
) -> Result<(), PayloadError> {
    let Value::Object(object) = payload else {
        return Err(PayloadError::UnsupportedValueType {
            property: "<payload>".to_string(),
            kind: format!("{} payload", json_type_name(payload)),
        });
    };

    let identifier = schema.identifier_property().ok().map(|p| p.name.as_str());
    let mut staged = Vec::with_capacity(object.len());

    for (key, value) in object {
        let property = schema
            .resolve_key(key)
            .ok_or_else(|| PayloadError::UnknownRemoteProperty { key: key.clone() })?;

        if identifier == Some(property.name.as_str()) || property.write_only {
            continue;
        }

        let name = property.canonical_name();
        if value.is_null() {
            staged.push((name, None));
            continue;
        }

        let mut converted = convert_property(property, value, false)?;
        if options.ignore_list_order && property.ignore_order {
            if let (StateValue::List(remote), Some(StateValue::List(local))) =
                (&converted, state.get(&name))
            {
                converted = StateValue::List(reorder_like(local, remote));
            }
        }
        staged.push((name, Some(converted)));
    }

    state.commit(staged);
    Ok(())
}

/// Whether a local state value matches the remote payload value.
///
/// The remote value is converted the same way [`apply`] would convert it,
/// then compared with numbers normalized. A missing remote value matches
/// only a missing local value.
pub fn values_match(
    property: &SchemaDefinitionProperty,
    local: Option<&StateValue>,
    remote: Option<&Value>,
    in_object: bool,
) -> bool {
    let remote = remote.filter(|v| !v.is_null());
    match (local, remote) {
        (None, None) => true,
        (Some(local), Some(remote)) => match convert_property(property, remote, in_object) {
            Ok(converted) => local.loosely_equals(&converted),
            Err(_) => false,
        },
        _ => false,
    }
}

// --- Internal implementation ---

pub(crate) fn convert_property(
    property: &SchemaDefinitionProperty,
    value: &Value,
    in_object: bool,
) -> Result<StateValue, PayloadError> {
    let name = &property.name;
    match &property.property_type {
        PropertyType::List { items } => {
            let Value::Array(elements) = value else {
                return Err(unsupported(name, value));
            };
            let converted = elements
                .iter()
                .map(|element| convert_item(name, items, element))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StateValue::List(converted))
        }
        PropertyType::Object { properties } => {
            let Value::Object(object) = value else {
                return Err(unsupported(name, value));
            };
            let map = convert_object(name, object, properties, true)?;
            if property.uses_singleton_list() {
                Ok(wrap_object(map))
            } else {
                Ok(StateValue::Map(map))
            }
        }
        scalar => {
            let kind = scalar.scalar().unwrap_or(ScalarKind::String);
            let converted = convert_scalar(name, kind, value)?;
            if in_object {
                Ok(stringify(converted))
            } else {
                Ok(converted)
            }
        }
    }
}

fn convert_item(name: &str, items: &ItemType, value: &Value) -> Result<StateValue, PayloadError> {
    match items {
        ItemType::Object { properties } => {
            let Value::Object(object) = value else {
                return Err(unsupported(name, value));
            };
            Ok(StateValue::Map(convert_object(name, object, properties, false)?))
        }
        primitive => {
            let kind = primitive.scalar().unwrap_or(ScalarKind::String);
            convert_scalar(name, kind, value)
        }
    }
}

/// Convert a nested object. Scalars are stringified when `stringify_scalars`.
fn convert_object(
    parent: &str,
    object: &Map<String, Value>,
    schema: &SchemaDefinition,
    stringify_scalars: bool,
) -> Result<BTreeMap<String, StateValue>, PayloadError> {
    let mut map = BTreeMap::new();
    for (key, value) in object {
        let property = schema
            .resolve_key(key)
            .ok_or_else(|| PayloadError::UnknownRemoteProperty {
                key: format!("{}.{}", parent, key),
            })?;
        if value.is_null() || property.write_only {
            continue;
        }
        let converted = convert_property(property, value, stringify_scalars)?;
        map.insert(property.canonical_name(), converted);
    }
    Ok(map)
}

fn convert_scalar(name: &str, kind: ScalarKind, value: &Value) -> Result<StateValue, PayloadError> {
    match (kind, value) {
        (ScalarKind::String, Value::String(s)) => Ok(StateValue::String(s.clone())),
        (ScalarKind::Bool, Value::Bool(b)) => Ok(StateValue::Bool(*b)),
        (ScalarKind::Int, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(StateValue::Int(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(StateValue::Int(f as i64))
                }
                _ => Err(PayloadError::UnsupportedValueType {
                    property: name.to_string(),
                    kind: format!("non-integral number {} for int property", n),
                }),
            }
        }
        (ScalarKind::Number, Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(StateValue::Int(i)),
            None => Ok(StateValue::Float(n.as_f64().unwrap_or_default())),
        },
        // Scalar positions accept any scalar and keep its string form for strings.
        (ScalarKind::String, Value::Number(n)) => Ok(StateValue::String(n.to_string())),
        (ScalarKind::String, Value::Bool(b)) => Ok(StateValue::String(b.to_string())),
        (_, other) => Err(PayloadError::UnsupportedValueType {
            property: name.to_string(),
            kind: format!("{} value for {} property", json_type_name(other), kind.name()),
        }),
    }
}

fn stringify(value: StateValue) -> StateValue {
    match value.to_canonical_string() {
        Some(s) => StateValue::String(s),
        None => value,
    }
}

/// Reorder `remote` so elements also present locally keep the local order.
///
/// Elements only present remotely follow, in their remote order.
fn reorder_like(local: &[StateValue], remote: &[StateValue]) -> Vec<StateValue> {
    let mut remaining: Vec<Option<&StateValue>> = remote.iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remote.len());

    for wanted in local {
        let found = remaining
            .iter_mut()
            .find(|slot| slot.is_some_and(|v| v.loosely_equals(wanted)));
        if let Some(slot) = found {
            if let Some(value) = slot.take() {
                ordered.push(value.clone());
            }
        }
    }
    ordered.extend(remaining.into_iter().flatten().cloned());
    ordered
}

fn unsupported(name: &str, value: &Value) -> PayloadError {
    PayloadError::UnsupportedValueType {
        property: name.to_string(),
        kind: json_type_name(value).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new(vec![
            SchemaDefinitionProperty::string("id").computed(),
            SchemaDefinitionProperty::string("displayName"),
            SchemaDefinitionProperty::int("size"),
            SchemaDefinitionProperty::number("ratio"),
            SchemaDefinitionProperty::bool("enabled"),
            SchemaDefinitionProperty::string("password").write_only(),
            SchemaDefinitionProperty::string("status").computed(),
        ])
    }

    #[test]
    fn apply_scalars_under_canonical_names() {
        let mut state = DeclarativeState::new();
        let payload = json!({
            "id": "abc",
            "displayName": "web",
            "size": 3,
            "ratio": 0.5,
            "enabled": false,
            "status": "deployed"
        });
        apply(&payload, &schema(), &mut state).unwrap();

        assert_eq!(state.get("display_name"), Some(&StateValue::from("web")));
        assert_eq!(state.get("size"), Some(&StateValue::Int(3)));
        assert_eq!(state.get("ratio"), Some(&StateValue::Float(0.5)));
        assert_eq!(state.get("enabled"), Some(&StateValue::Bool(false)));
        assert_eq!(state.get("status"), Some(&StateValue::from("deployed")));
        assert!(!state.contains("id"));
        assert_eq!(state.id(), None);
    }

    #[test]
    fn apply_narrows_integral_float_for_int() {
        let mut state = DeclarativeState::new();
        apply(&json!({ "size": 4.0 }), &schema(), &mut state).unwrap();
        assert_eq!(state.get("size"), Some(&StateValue::Int(4)));

        let result = apply(&json!({ "size": 4.5 }), &schema(), &mut state);
        assert!(matches!(result, Err(PayloadError::UnsupportedValueType { .. })));
    }

    #[test]
    fn apply_accepts_canonical_keys() {
        let mut state = DeclarativeState::new();
        apply(&json!({ "display_name": "web" }), &schema(), &mut state).unwrap();
        assert_eq!(state.get("display_name"), Some(&StateValue::from("web")));
    }

    #[test]
    fn apply_unknown_key_leaves_state_untouched() {
        let mut state = DeclarativeState::new().with("size", 1i64);
        let result = apply(&json!({ "size": 9, "bogus": 1 }), &schema(), &mut state);

        assert!(matches!(
            result,
            Err(PayloadError::UnknownRemoteProperty { key }) if key == "bogus"
        ));
        assert_eq!(state.get("size"), Some(&StateValue::Int(1)));
    }

    #[test]
    fn apply_keeps_write_only_local_value() {
        let mut state = DeclarativeState::new().with("password", "secret");
        apply(&json!({ "password": "" }), &schema(), &mut state).unwrap();
        assert_eq!(state.get("password"), Some(&StateValue::from("secret")));
    }

    #[test]
    fn apply_null_clears_value() {
        let mut state = DeclarativeState::new().with("display_name", "web");
        apply(&json!({ "displayName": null }), &schema(), &mut state).unwrap();
        assert!(!state.contains("display_name"));
    }

    #[test]
    fn apply_rejects_non_object_payload() {
        let mut state = DeclarativeState::new();
        assert!(apply(&json!([1, 2]), &schema(), &mut state).is_err());
    }

    #[test]
    fn apply_array_in_scalar_position_errors() {
        let mut state = DeclarativeState::new();
        let result = apply(&json!({ "displayName": ["a"] }), &schema(), &mut state);
        assert!(matches!(
            result,
            Err(PayloadError::UnsupportedValueType { kind, .. }) if kind.starts_with("array")
        ));
    }

    #[test]
    fn apply_flat_object_stringifies_scalars() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![
                SchemaDefinitionProperty::int("size"),
                SchemaDefinitionProperty::bool("enabled"),
            ]),
        )]);
        let mut state = DeclarativeState::new();
        apply(
            &json!({ "config": { "size": 10, "enabled": true } }),
            &schema,
            &mut state,
        )
        .unwrap();

        let config = state.get("config").and_then(StateValue::as_map).unwrap();
        assert_eq!(config.get("size"), Some(&StateValue::from("10")));
        assert_eq!(config.get("enabled"), Some(&StateValue::from("true")));
    }

    #[test]
    fn apply_nested_object_uses_singleton_list() {
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
        let mut state = DeclarativeState::new();
        apply(
            &json!({ "config": { "name": "edge", "limits": { "cpu": 2 } } }),
            &schema,
            &mut state,
        )
        .unwrap();

        let list = state.get("config").and_then(StateValue::as_list).unwrap();
        assert_eq!(list.len(), 1);
        let config = list[0].as_map().unwrap();
        let limits = config.get("limits").and_then(StateValue::as_map).unwrap();
        assert_eq!(limits.get("cpu"), Some(&StateValue::from("2")));
    }

    #[test]
    fn apply_nested_unknown_key_reports_path() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![SchemaDefinitionProperty::string("name")]),
        )]);
        let mut state = DeclarativeState::new();
        let result = apply(&json!({ "config": { "other": 1 } }), &schema, &mut state);
        assert!(matches!(
            result,
            Err(PayloadError::UnknownRemoteProperty { key }) if key == "config.other"
        ));
    }

    #[test]
    fn apply_list_of_objects_keeps_types() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::list(
            "rules",
            ItemType::Object {
                properties: SchemaDefinition::new(vec![
                    SchemaDefinitionProperty::int("port"),
                    SchemaDefinitionProperty::string("action"),
                ]),
            },
        )]);
        let mut state = DeclarativeState::new();
        apply(
            &json!({ "rules": [{ "port": 80, "action": "allow" }] }),
            &schema,
            &mut state,
        )
        .unwrap();

        let rules = state.get("rules").and_then(StateValue::as_list).unwrap();
        let rule = rules[0].as_map().unwrap();
        assert_eq!(rule.get("port"), Some(&StateValue::Int(80)));
    }

    #[test]
    fn apply_ignore_order_keeps_local_order() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::list("members", ItemType::String).ignore_order()
        ]);
        let mut state = DeclarativeState::new().with(
            "members",
            vec![StateValue::from("b"), StateValue::from("a")],
        );
        apply(
            &json!({ "members": ["a", "c", "b"] }),
            &schema,
            &mut state,
        )
        .unwrap();

        assert_eq!(
            state.get("members"),
            Some(&StateValue::List(vec!["b".into(), "a".into(), "c".into()]))
        );
    }

    #[test]
    fn apply_without_ignore_order_option_takes_remote_order() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::list("members", ItemType::String).ignore_order()
        ]);
        let mut state = DeclarativeState::new().with(
            "members",
            vec![StateValue::from("b"), StateValue::from("a")],
        );
        apply_with_options(
            &json!({ "members": ["a", "b"] }),
            &schema,
            &mut state,
            PopulateOptions {
                ignore_list_order: false,
            },
        )
        .unwrap();

        assert_eq!(
            state.get("members"),
            Some(&StateValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn values_match_normalizes_numbers() {
        let property = SchemaDefinitionProperty::number("ratio");
        assert!(values_match(
            &property,
            Some(&StateValue::Int(1)),
            Some(&json!(1.0)),
            false
        ));
        assert!(!values_match(
            &property,
            Some(&StateValue::Int(1)),
            Some(&json!(2)),
            false
        ));
        assert!(values_match(&property, None, Some(&Value::Null), false));
        assert!(!values_match(&property, Some(&StateValue::Int(1)), None, false));
    }
}
