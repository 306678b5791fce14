//! Subresource parent IDs, path resolution and import id parsing.

use crate::descriptor::ResourceDescriptor;
use crate::error::LifecycleError;
use crate::state::{DeclarativeState, StateValue};

/// Parent IDs read from the state, outermost parent first.
///
/// Root resources yield an empty list.
pub fn parent_ids(
    state: &DeclarativeState,
    descriptor: &ResourceDescriptor,
) -> Result<Vec<String>, LifecycleError> {
    descriptor
        .parent_properties
        .iter()
        .map(|property| {
            state
                .get(property)
                .and_then(id_string)
                .ok_or_else(|| LifecycleError::MissingParentId {
                    resource: descriptor.name.clone(),
                    property: property.clone(),
                })
        })
        .collect()
}

/// Parent IDs together with the resolved collection path.
pub fn parent_ids_and_resource_path(
    state: &DeclarativeState,
    descriptor: &ResourceDescriptor,
) -> Result<(Vec<String>, String), LifecycleError> {
    let ids = parent_ids(state, descriptor)?;
    let path = descriptor.resolve_path(&ids)?;
    Ok((ids, path))
}

/// A parsed import id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    pub parent_ids: Vec<String>,
    pub instance_id: String,
}

/// Split an import id into parent IDs and the instance id.
///
/// The id must be `parent1/.../parentN/instance`, one segment per declared
/// parent plus the instance; a root resource takes exactly one segment.
pub fn parse_import_id(
    composite: &str,
    descriptor: &ResourceDescriptor,
) -> Result<ImportId, LifecycleError> {
    let mut segments: Vec<String> = composite.split('/').map(str::to_string).collect();
    let expected = descriptor.parent_properties.len() + 1;
    if segments.len() != expected {
        return Err(LifecycleError::ParentIdCountMismatch {
            id: composite.to_string(),
            expected,
            actual: segments.len(),
        });
    }

    // Length checked above.
    let instance_id = segments.pop().unwrap_or_default();
    Ok(ImportId {
        parent_ids: segments,
        instance_id,
    })
}

/// Seed a fresh state from an import id: parent values plus the identifier.
pub fn import_state(
    composite: &str,
    descriptor: &ResourceDescriptor,
) -> Result<DeclarativeState, LifecycleError> {
    let import = parse_import_id(composite, descriptor)?;
    let mut state = DeclarativeState::new();

    for (property, id) in descriptor.parent_properties.iter().zip(import.parent_ids) {
        if descriptor.schema.property_by_canonical_name(property).is_none() {
            return Err(LifecycleError::ParentPropertyNotInSchema {
                resource: descriptor.name.clone(),
                property: property.clone(),
            });
        }
        state.set(property.clone(), id);
    }

    state.set_id(import.instance_id);
    Ok(state)
}

fn id_string(value: &StateValue) -> Option<String> {
    match value {
        StateValue::String(s) if !s.is_empty() => Some(s.clone()),
        StateValue::Int(i) => Some(i.to_string()),
        _ => None,
    }
}
