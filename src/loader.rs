//! Loading of descriptors, engine configuration and state files.
//!
//! Descriptor documents are checked against an embedded JSON Schema before
//! they are deserialized, so authoring mistakes surface with a JSON pointer
//! instead of a serde message.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::descriptor::ResourceDescriptor;
use crate::error::{DocumentIssue, LoadError};
use crate::state::DeclarativeState;
use crate::types::EngineConfig;

/// JSON Schema for descriptor documents.
const DESCRIPTOR_SCHEMA: &str = include_str!("descriptor.schema.json");

/// Load a resource descriptor from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// `LoadError::InvalidJson` if it isn't valid JSON, and
/// `LoadError::InvalidDescriptor` (or one of the consistency errors) if the
/// document doesn't describe a usable resource.
pub fn load_descriptor(path: &Path) -> Result<ResourceDescriptor, LoadError> {
    let content = read_file(path)?;
    load_descriptor_str(&content)
}

/// Load a resource descriptor from a JSON string.
///
/// # Errors
///
/// See [`load_descriptor`].
pub fn load_descriptor_str(content: &str) -> Result<ResourceDescriptor, LoadError> {
    let document: Value =
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    validate_descriptor_document(&document)?;

    let descriptor: ResourceDescriptor =
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    check_consistency(&descriptor)?;

    tracing::debug!(
        "loaded descriptor '{}' ({} properties, {} parent(s))",
        descriptor.name,
        descriptor.schema.properties.len(),
        descriptor.parent_properties.len()
    );
    Ok(descriptor)
}

/// Validate a descriptor document against the embedded schema.
///
/// Collects every issue rather than stopping at the first one.
pub fn validate_descriptor_document(document: &Value) -> Result<(), LoadError> {
    let schema: Value = serde_json::from_str(DESCRIPTOR_SCHEMA).map_err(|e| {
        LoadError::DescriptorSchema {
            message: e.to_string(),
        }
    })?;
    let validator = jsonschema::validator_for(&schema).map_err(|e| LoadError::DescriptorSchema {
        message: e.to_string(),
    })?;

    let issues: Vec<DocumentIssue> = validator
        .iter_errors(document)
        .map(|e| DocumentIssue {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(LoadError::InvalidDescriptor { issues })
    }
}

/// Load an engine configuration file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<EngineConfig, LoadError> {
    load_json(path)
}

/// Load a declarative state file.
pub fn load_state(path: &Path) -> Result<DeclarativeState, LoadError> {
    load_json(path)
}

/// Write a declarative state file as pretty-printed JSON.
pub fn save_state(path: &Path, state: &DeclarativeState) -> Result<(), LoadError> {
    let mut content =
        serde_json::to_string_pretty(state).map_err(|source| LoadError::InvalidJson { source })?;
    content.push('\n');
    std::fs::write(path, content).map_err(|source| LoadError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}

// --- Internal implementation ---

fn check_consistency(descriptor: &ResourceDescriptor) -> Result<(), LoadError> {
    let names = descriptor.schema.duplicate_canonical_names();
    if !names.is_empty() {
        return Err(LoadError::DuplicateCanonicalNames { names });
    }

    for name in &descriptor.parent_properties {
        if descriptor.schema.property_by_canonical_name(name).is_none() {
            return Err(LoadError::UnknownParentProperty { name: name.clone() });
        }
    }

    let placeholders = descriptor.placeholders().len();
    let parents = descriptor.parent_properties.len();
    if placeholders != parents {
        return Err(LoadError::ParentPlaceholderMismatch {
            path: descriptor.path.clone(),
            placeholders,
            parents,
        });
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}
