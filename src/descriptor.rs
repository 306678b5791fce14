//! Resource descriptors: everything the engine knows about one remote resource.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::SchemaDefinition;
use crate::types::Operation;

/// Completion polling metadata attached to one response status code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseDescriptor {
    #[serde(default)]
    pub polling_enabled: bool,
    #[serde(default)]
    pub pending_statuses: Vec<String>,
    #[serde(default)]
    pub target_statuses: Vec<String>,
}

impl ResponseDescriptor {
    /// A response that triggers completion polling.
    pub fn polling<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            polling_enabled: true,
            pending_statuses: pending.into_iter().map(Into::into).collect(),
            target_statuses: target.into_iter().map(Into::into).collect(),
        }
    }
}

/// One supported operation of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Response metadata keyed by HTTP status code.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<u16, ResponseDescriptor>,
    /// Polling timeout for this operation, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl OperationDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, status: u16, response: ResponseDescriptor) -> Self {
        self.responses.insert(status, response);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Response descriptor for `status`, if it has polling enabled.
    pub fn polling_response(&self, status: u16) -> Option<&ResponseDescriptor> {
        self.responses.get(&status).filter(|r| r.polling_enabled)
    }
}

/// The operations a resource exposes; a missing entry is unsupported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<OperationDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<OperationDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<OperationDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<OperationDescriptor>,
}

impl Operations {
    /// All four operations with no polling metadata.
    pub fn all() -> Self {
        Self {
            create: Some(OperationDescriptor::new()),
            read: Some(OperationDescriptor::new()),
            update: Some(OperationDescriptor::new()),
            delete: Some(OperationDescriptor::new()),
        }
    }

    pub fn get(&self, operation: Operation) -> Option<&OperationDescriptor> {
        match operation {
            Operation::Create => self.create.as_ref(),
            Operation::Read => self.read.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    fn slot(&mut self, operation: Operation) -> &mut Option<OperationDescriptor> {
        match operation {
            Operation::Create => &mut self.create,
            Operation::Read => &mut self.read,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        }
    }
}

/// Description of a remote resource, as produced by schema analysis.
///
/// Immutable once built; engines share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    /// Collection path, e.g. `/v1/cdns/{cdn_id}/firewalls`.
    pub path: String,
    pub schema: SchemaDefinition,
    #[serde(default)]
    pub operations: Operations,
    /// Canonical names of the parent properties, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_properties: Vec<String>,
}

impl ResourceDescriptor {
    /// A descriptor with no operations and no parents.
    pub fn new(name: impl Into<String>, path: impl Into<String>, schema: SchemaDefinition) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            schema,
            operations: Operations::default(),
            parent_properties: Vec::new(),
        }
    }

    pub fn with_operations(mut self, operations: Operations) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_operation(mut self, operation: Operation, descriptor: OperationDescriptor) -> Self {
        *self.operations.slot(operation) = Some(descriptor);
        self
    }

    pub fn with_parent_property(mut self, name: impl Into<String>) -> Self {
        self.parent_properties.push(name.into());
        self
    }

    pub fn operation(&self, operation: Operation) -> Option<&OperationDescriptor> {
        self.operations.get(operation)
    }

    pub fn is_subresource(&self) -> bool {
        !self.parent_properties.is_empty()
    }

    /// Placeholders of the path template, in order (`"{cdn_id}"`).
    pub fn placeholders(&self) -> Vec<&str> {
        let mut found = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            found.push(&rest[start..start + len + 1]);
            rest = &rest[start + len + 1..];
        }
        found
    }

    /// Substitute parent IDs into the path template, in placeholder order.
    pub fn resolve_path(&self, parent_ids: &[String]) -> Result<String, SchemaError> {
        let expected = self.placeholders().len();
        if parent_ids.len() > expected {
            return Err(self.path_error(format!(
                "more ids than path params: {:?}",
                parent_ids
            )));
        }
        if parent_ids.len() < expected {
            return Err(self.path_error(format!(
                "missing ids to resolve the path params properly: {:?}",
                parent_ids
            )));
        }
        if parent_ids.iter().any(|id| id.starts_with('/')) {
            return Err(self.path_error(format!(
                "parent IDs {:?} contain not supported characters (forward slashes)",
                parent_ids
            )));
        }

        // Walk the template once so inserted ids are never rescanned.
        let mut resolved = String::with_capacity(self.path.len());
        let mut ids = parent_ids.iter();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            resolved.push_str(&rest[..start]);
            match ids.next() {
                Some(id) => resolved.push_str(id),
                None => resolved.push_str(&rest[start..start + len + 1]),
            }
            rest = &rest[start + len + 1..];
        }
        resolved.push_str(rest);
        Ok(resolved)
    }

    fn path_error(&self, message: String) -> SchemaError {
        SchemaError::PathTemplate {
            template: self.path.clone(),
            message,
        }
    }
}
