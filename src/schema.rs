//! Schema model for remote resources.
//!
//! A [`SchemaDefinition`] is an ordered list of [`SchemaDefinitionProperty`]
//! values. Each property carries its wire name (the key used in request and
//! response bodies) and a canonical name (the key used in
//! [`crate::DeclarativeState`]).
//!
//! The serialized form is the one used by descriptor files:
//!
//! ```json
//! [
//!   { "name": "id", "type": "string", "computed": true },
//!   { "name": "displayName", "type": "string", "required": true },
//!   { "name": "tags", "type": "list", "items": { "type": "string" } },
//!   { "name": "config", "type": "object", "properties": [
//!       { "name": "size", "type": "int" }
//!   ] }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::types::{ID_PROPERTY_NAME, STATUS_PROPERTY_NAME};

/// Primitive kinds shared by properties and list items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Int,
    Number,
    Bool,
}

impl ScalarKind {
    /// Human-readable name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "int",
            ScalarKind::Number => "number",
            ScalarKind::Bool => "bool",
        }
    }
}

/// Type of a schema property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertyType {
    String,
    #[serde(alias = "integer")]
    Int,
    Number,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "array")]
    List { items: ItemType },
    Object { properties: SchemaDefinition },
}

impl PropertyType {
    /// Returns the scalar kind for primitive types.
    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            PropertyType::String => Some(ScalarKind::String),
            PropertyType::Int => Some(ScalarKind::Int),
            PropertyType::Number => Some(ScalarKind::Number),
            PropertyType::Bool => Some(ScalarKind::Bool),
            PropertyType::List { .. } | PropertyType::Object { .. } => None,
        }
    }
}

/// Element type of a list property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemType {
    String,
    #[serde(alias = "integer")]
    Int,
    Number,
    #[serde(alias = "boolean")]
    Bool,
    Object { properties: SchemaDefinition },
}

impl ItemType {
    /// Returns the scalar kind for primitive items.
    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            ItemType::String => Some(ScalarKind::String),
            ItemType::Int => Some(ScalarKind::Int),
            ItemType::Number => Some(ScalarKind::Number),
            ItemType::Bool => Some(ScalarKind::Bool),
            ItemType::Object { .. } => None,
        }
    }
}

/// A single property of a resource schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinitionProperty {
    /// Wire name, as it appears in payloads.
    pub name: String,
    /// Overrides the derived canonical name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
    #[serde(flatten)]
    pub property_type: PropertyType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub force_new: bool,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default)]
    pub write_only: bool,
    #[serde(default)]
    pub ignore_order: bool,
    #[serde(default)]
    pub is_identifier: bool,
    #[serde(default)]
    pub is_status_identifier: bool,
    #[serde(default)]
    pub is_parent_property: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl SchemaDefinitionProperty {
    /// Create a property with every flag unset.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            preferred_name: None,
            property_type,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
            immutable: false,
            write_only: false,
            ignore_order: false,
            is_identifier: false,
            is_status_identifier: false,
            is_parent_property: false,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Int)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Number)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Bool)
    }

    pub fn list(name: impl Into<String>, items: ItemType) -> Self {
        Self::new(name, PropertyType::List { items })
    }

    pub fn object(name: impl Into<String>, properties: SchemaDefinition) -> Self {
        Self::new(name, PropertyType::Object { properties })
    }

    pub fn preferred_name(mut self, name: impl Into<String>) -> Self {
        self.preferred_name = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn ignore_order(mut self) -> Self {
        self.ignore_order = true;
        self
    }

    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self
    }

    pub fn status_identifier(mut self) -> Self {
        self.is_status_identifier = true;
        self
    }

    pub fn parent_property(mut self) -> Self {
        self.is_parent_property = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Key under which this property lives in the declarative state.
    pub fn canonical_name(&self) -> String {
        match &self.preferred_name {
            Some(name) => name.clone(),
            None => to_snake_case(&self.name),
        }
    }

    pub fn is_named_id(&self) -> bool {
        self.canonical_name() == ID_PROPERTY_NAME
    }

    pub fn is_named_status(&self) -> bool {
        self.canonical_name() == STATUS_PROPERTY_NAME
    }

    pub fn is_object(&self) -> bool {
        matches!(self.property_type, PropertyType::Object { .. })
    }

    pub fn is_list_of_objects(&self) -> bool {
        matches!(
            self.property_type,
            PropertyType::List {
                items: ItemType::Object { .. }
            }
        )
    }

    /// Nested schema of object properties and lists of objects.
    pub fn nested_schema(&self) -> Option<&SchemaDefinition> {
        match &self.property_type {
            PropertyType::Object { properties } => Some(properties),
            PropertyType::List {
                items: ItemType::Object { properties },
            } => Some(properties),
            _ => None,
        }
    }

    /// Whether the state holds this object as a one-element list.
    ///
    /// Applies to object properties whose nested schema has at least one
    /// object property of its own.
    pub fn uses_singleton_list(&self) -> bool {
        match &self.property_type {
            PropertyType::Object { properties } => properties.iter().any(|p| p.is_object()),
            _ => false,
        }
    }
}

/// Ordered set of properties describing one object shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDefinition {
    pub properties: Vec<SchemaDefinitionProperty>,
}

impl SchemaDefinition {
    pub fn new(properties: Vec<SchemaDefinitionProperty>) -> Self {
        Self { properties }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchemaDefinitionProperty> {
        self.properties.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Look up a property by wire name.
    pub fn property(&self, name: &str) -> Option<&SchemaDefinitionProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a property by canonical name.
    pub fn property_by_canonical_name(&self, name: &str) -> Option<&SchemaDefinitionProperty> {
        self.properties.iter().find(|p| p.canonical_name() == name)
    }

    /// Resolve a payload key: wire name first, canonical name second.
    pub fn resolve_key(&self, key: &str) -> Option<&SchemaDefinitionProperty> {
        self.property(key)
            .or_else(|| self.property_by_canonical_name(key))
    }

    /// Property holding the resource identifier.
    ///
    /// A property named `id` wins over one flagged `is_identifier`.
    pub fn identifier_property(&self) -> Result<&SchemaDefinitionProperty, SchemaError> {
        self.properties
            .iter()
            .find(|p| p.is_named_id())
            .or_else(|| self.properties.iter().find(|p| p.is_identifier))
            .ok_or(SchemaError::IdentifierNotFound)
    }

    /// Wire-name path leading to the resource status value.
    ///
    /// At each level a property flagged `is_status_identifier` wins over one
    /// named `status`. The top-level status property must be computed. When
    /// the status property is an object, the walk continues inside it.
    pub fn status_hierarchy(&self) -> Result<Vec<String>, SchemaError> {
        let mut hierarchy = Vec::new();
        let mut current = self;
        let mut top_level = true;
        loop {
            let status = current
                .properties
                .iter()
                .filter(|p| !(top_level && p.is_named_id()))
                .find(|p| p.is_status_identifier)
                .or_else(|| current.properties.iter().find(|p| p.is_named_status()))
                .ok_or(SchemaError::StatusPropertyNotFound)?;

            if top_level && !status.computed {
                return Err(SchemaError::StatusPropertyNotComputed {
                    name: status.name.clone(),
                });
            }

            hierarchy.push(status.name.clone());
            match &status.property_type {
                PropertyType::Object { properties } => {
                    current = properties;
                    top_level = false;
                }
                _ => return Ok(hierarchy),
            }
        }
    }

    /// Canonical names that occur more than once, recursively.
    pub fn duplicate_canonical_names(&self) -> Vec<String> {
        let mut duplicates = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for property in &self.properties {
            let name = property.canonical_name();
            if !seen.insert(name.clone()) && !duplicates.contains(&name) {
                duplicates.push(name);
            }
            if let Some(nested) = property.nested_schema() {
                for nested_name in nested.duplicate_canonical_names() {
                    duplicates.push(format!("{}.{}", property.name, nested_name));
                }
            }
        }
        duplicates
    }
}

impl<'a> IntoIterator for &'a SchemaDefinition {
    type Item = &'a SchemaDefinitionProperty;
    type IntoIter = std::slice::Iter<'a, SchemaDefinitionProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}

/// Normalize a wire name into lower snake case.
///
/// `"displayName"` becomes `"display_name"`, `"HTTPPort"` becomes `"http_port"`
/// and `"some-name"` becomes `"some_name"`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '.' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
