//! Immutable-field guard, run against a fresh remote read before any update.

use serde_json::{Map, Value};

use crate::error::ImmutableViolation;
use crate::populator::values_match;
use crate::schema::{ItemType, PropertyType, SchemaDefinition, SchemaDefinitionProperty};
use crate::state::{unwrap_object, DeclarativeState, StateValue};

/// Compare the local state with the remote payload on immutable properties.
///
/// A property is enforced when it is flagged `immutable` itself or sits
/// inside an enforced object or list of objects. Computed and parent
/// properties are skipped. The first difference found is reported.
pub fn check_immutable(
    state: &DeclarativeState,
    remote: &Value,
    schema: &SchemaDefinition,
) -> Result<(), ImmutableViolation> {
    let empty = Map::new();
    let remote = remote.as_object().unwrap_or(&empty);

    for property in schema {
        if property.computed || property.is_parent_property {
            continue;
        }
        let name = property.canonical_name();
        let remote_value = remote_field(remote, property, &name);
        check_property(property, state.get(&name), remote_value, false, false)?;
    }
    Ok(())
}

// --- Internal implementation ---

fn remote_field<'a>(
    remote: &'a Map<String, Value>,
    property: &SchemaDefinitionProperty,
    canonical: &str,
) -> Option<&'a Value> {
    remote
        .get(&property.name)
        .or_else(|| remote.get(canonical))
        .filter(|v| !v.is_null())
}

fn check_property(
    property: &SchemaDefinitionProperty,
    local: Option<&StateValue>,
    remote: Option<&Value>,
    inherited: bool,
    in_object: bool,
) -> Result<(), ImmutableViolation> {
    let enforced = inherited || property.immutable;

    match &property.property_type {
        PropertyType::List { .. } => check_list(property, local, remote, enforced),
        PropertyType::Object { properties } => {
            check_object(property, properties, local, remote, enforced)
        }
        _ => {
            if enforced && !values_match(property, local, remote, in_object) {
                return Err(ImmutableViolation::Value {
                    property: property.name.clone(),
                    input: render_local(local),
                    actual: render_remote(remote),
                });
            }
            Ok(())
        }
    }
}

fn check_list(
    property: &SchemaDefinitionProperty,
    local: Option<&StateValue>,
    remote: Option<&Value>,
    enforced: bool,
) -> Result<(), ImmutableViolation> {
    let local_items = local.and_then(StateValue::as_list).unwrap_or(&[]);
    let remote_items = remote
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    if let Some(item_schema) = property.nested_schema() {
        if enforced {
            if !values_match(property, local, remote, false) {
                return Err(ImmutableViolation::ListOfObjects {
                    property: property.name.clone(),
                    input: render_local(local),
                    actual: render_remote(remote),
                });
            }
            return Ok(());
        }
        // Not enforced as a whole: look for immutable leaves element by element.
        for (local_item, remote_item) in local_items.iter().zip(remote_items) {
            let (Some(local_map), Some(remote_map)) = (local_item.as_map(), remote_item.as_object())
            else {
                continue;
            };
            for nested in item_schema {
                if nested.computed {
                    continue;
                }
                let name = nested.canonical_name();
                check_property(
                    nested,
                    local_map.get(&name),
                    remote_field(remote_map, nested, &name),
                    false,
                    false,
                )?;
            }
        }
        return Ok(());
    }

    if !enforced {
        return Ok(());
    }
    if local_items.len() != remote_items.len() {
        return Err(ImmutableViolation::ListSize {
            property: property.name.clone(),
            input_len: local_items.len(),
            actual_len: remote_items.len(),
        });
    }
    let element = SchemaDefinitionProperty::new(property.name.clone(), element_type(property));
    for (local_item, remote_item) in local_items.iter().zip(remote_items) {
        if !values_match(&element, Some(local_item), Some(remote_item), false) {
            return Err(ImmutableViolation::ListElement {
                property: property.name.clone(),
                input: render_local(Some(local_item)),
                actual: render_remote(Some(remote_item)),
            });
        }
    }
    Ok(())
}

fn check_object(
    property: &SchemaDefinitionProperty,
    nested_schema: &SchemaDefinition,
    local: Option<&StateValue>,
    remote: Option<&Value>,
    enforced: bool,
) -> Result<(), ImmutableViolation> {
    let local_map = local.and_then(|v| unwrap_object(&property.name, v).ok());
    let remote_map = remote.and_then(Value::as_object);

    if enforced && (local_map.is_none() || remote_map.is_none()) {
        if local_map.is_some() != remote_map.is_some() {
            return Err(ImmutableViolation::Value {
                property: property.name.clone(),
                input: render_local(local),
                actual: render_remote(remote),
            });
        }
        return Ok(());
    }
    let (Some(local_map), Some(remote_map)) = (local_map, remote_map) else {
        return Ok(());
    };

    for nested in nested_schema {
        if nested.computed {
            continue;
        }
        let name = nested.canonical_name();
        let local_value = local_map.get(&name);
        let remote_value = remote_field(remote_map, nested, &name);

        if enforced {
            if !values_match(nested, local_value, remote_value, true) {
                return Err(ImmutableViolation::Object {
                    property: property.name.clone(),
                    sub_property: nested.name.clone(),
                    input: render_local(local_value),
                    actual: render_remote(remote_value),
                });
            }
        } else {
            check_property(nested, local_value, remote_value, false, true)?;
        }
    }
    Ok(())
}

fn element_type(property: &SchemaDefinitionProperty) -> PropertyType {
    match &property.property_type {
        PropertyType::List { items } => match items {
            ItemType::String => PropertyType::String,
            ItemType::Int => PropertyType::Int,
            ItemType::Number => PropertyType::Number,
            ItemType::Bool => PropertyType::Bool,
            ItemType::Object { properties } => PropertyType::Object {
                properties: properties.clone(),
            },
        },
        other => other.clone(),
    }
}

fn render_local(value: Option<&StateValue>) -> String {
    match value {
        Some(StateValue::String(s)) => s.clone(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
        None => "<unset>".to_string(),
    }
}

fn render_remote(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<unset>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn map(entries: &[(&str, StateValue)]) -> BTreeMap<String, StateValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn mutable_properties_are_ignored() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::string("name")]);
        let state = DeclarativeState::new().with("name", "new");
        assert!(check_immutable(&state, &json!({ "name": "old" }), &schema).is_ok());
    }

    #[test]
    fn immutable_string_change_is_rejected() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::string("region").immutable()
        ]);
        let state = DeclarativeState::new().with("region", "us-west");
        let err = check_immutable(&state, &json!({ "region": "us-east" }), &schema).unwrap_err();

        assert_eq!(
            err,
            ImmutableViolation::Value {
                property: "region".into(),
                input: "us-west".into(),
                actual: "us-east".into(),
            }
        );
        assert!(err.to_string().contains("immutable property ('region')"));
    }

    #[test]
    fn numbers_compare_by_value() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::number("size").immutable()
        ]);
        let state = DeclarativeState::new().with("size", 10i64);
        assert!(check_immutable(&state, &json!({ "size": 10.0 }), &schema).is_ok());
    }

    #[test]
    fn list_size_mismatch_is_reported_distinctly() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::list("zones", ItemType::String).immutable()
        ]);
        let state = DeclarativeState::new().with("zones", vec![StateValue::from("a")]);
        let err =
            check_immutable(&state, &json!({ "zones": ["a", "b"] }), &schema).unwrap_err();
        assert!(matches!(
            err,
            ImmutableViolation::ListSize {
                input_len: 1,
                actual_len: 2,
                ..
            }
        ));
    }

    #[test]
    fn list_element_order_matters() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::list("zones", ItemType::String).immutable()
        ]);
        let state = DeclarativeState::new().with(
            "zones",
            vec![StateValue::from("b"), StateValue::from("a")],
        );
        let err =
            check_immutable(&state, &json!({ "zones": ["a", "b"] }), &schema).unwrap_err();
        assert!(matches!(err, ImmutableViolation::ListElement { .. }));
    }

    #[test]
    fn immutable_object_reports_sub_property() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![
                SchemaDefinitionProperty::string("tier"),
                SchemaDefinitionProperty::int("size"),
            ]),
        )
        .immutable()]);
        let state = DeclarativeState::new().with(
            "config",
            map(&[("tier", "gold".into()), ("size", "10".into())]),
        );

        assert!(check_immutable(
            &state,
            &json!({ "config": { "tier": "gold", "size": 10 } }),
            &schema
        )
        .is_ok());

        let err = check_immutable(
            &state,
            &json!({ "config": { "tier": "gold", "size": 12 } }),
            &schema,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ImmutableViolation::Object {
                property: "config".into(),
                sub_property: "size".into(),
                input: "10".into(),
                actual: "12".into(),
            }
        );
    }

    #[test]
    fn immutable_leaf_inside_mutable_object() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::object(
            "config",
            SchemaDefinition::new(vec![
                SchemaDefinitionProperty::string("tier").immutable(),
                SchemaDefinitionProperty::string("label"),
            ]),
        )]);
        let state = DeclarativeState::new().with(
            "config",
            map(&[("tier", "gold".into()), ("label", "new".into())]),
        );

        assert!(check_immutable(
            &state,
            &json!({ "config": { "tier": "gold", "label": "old" } }),
            &schema
        )
        .is_ok());
        assert!(check_immutable(
            &state,
            &json!({ "config": { "tier": "silver", "label": "new" } }),
            &schema
        )
        .is_err());
    }

    #[test]
    fn immutable_list_of_objects_compares_structurally() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::list(
            "rules",
            ItemType::Object {
                properties: SchemaDefinition::new(vec![SchemaDefinitionProperty::int("port")]),
            },
        )
        .immutable()]);
        let state = DeclarativeState::new().with(
            "rules",
            vec![StateValue::Map(map(&[("port", StateValue::Int(80))]))],
        );

        assert!(check_immutable(&state, &json!({ "rules": [{ "port": 80 }] }), &schema).is_ok());
        let err = check_immutable(&state, &json!({ "rules": [{ "port": 443 }] }), &schema)
            .unwrap_err();
        assert!(matches!(err, ImmutableViolation::ListOfObjects { .. }));
    }

    #[test]
    fn immutable_leaf_inside_list_of_objects() {
        let schema = SchemaDefinition::new(vec![SchemaDefinitionProperty::list(
            "rules",
            ItemType::Object {
                properties: SchemaDefinition::new(vec![
                    SchemaDefinitionProperty::int("port").immutable(),
                    SchemaDefinitionProperty::string("action"),
                ]),
            },
        )]);
        let state = DeclarativeState::new().with(
            "rules",
            vec![StateValue::Map(map(&[
                ("port", StateValue::Int(80)),
                ("action", "deny".into()),
            ]))],
        );

        assert!(check_immutable(
            &state,
            &json!({ "rules": [{ "port": 80, "action": "allow" }] }),
            &schema
        )
        .is_ok());
        assert!(check_immutable(
            &state,
            &json!({ "rules": [{ "port": 81, "action": "deny" }] }),
            &schema
        )
        .is_err());
    }

    #[test]
    fn computed_properties_are_skipped() {
        let schema = SchemaDefinition::new(vec![
            SchemaDefinitionProperty::string("status").computed().immutable()
        ]);
        let state = DeclarativeState::new().with("status", "pending");
        assert!(check_immutable(&state, &json!({ "status": "deployed" }), &schema).is_ok());
    }
}
