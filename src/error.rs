//! Error types for the resource lifecycle engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::client::TransportError;

/// Errors while translating between declarative state and wire payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("property '{property}' is required but has no value in the local state")]
    NilPropertyValue { property: String },

    #[error("property '{property}': {kind} not supported")]
    UnsupportedValueType { property: String, kind: String },

    #[error(
        "remote payload contains property '{key}' which is not declared in the resource schema"
    )]
    UnknownRemoteProperty { key: String },

    #[error("property '{property}' must hold exactly one object in its list form, found {len}")]
    SingletonListShape { property: String, len: usize },

    #[error("property '{property}': cannot parse \"{value}\" as {expected}")]
    UnparsableScalar {
        property: String,
        value: String,
        expected: &'static str,
    },
}

/// Errors raised by schema and descriptor lookups.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("could not find any identifier property in the resource schema definition")]
    IdentifierNotFound,

    #[error("could not find any status property: the schema needs one property named 'status' or one flagged as status identifier")]
    StatusPropertyNotFound,

    #[error("status property '{name}' must be computed")]
    StatusPropertyNotComputed { name: String },

    #[error("could not resolve resource path '{template}': {message}")]
    PathTemplate { template: String, message: String },
}

/// A local value diverging from the remote one on an immutable property.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImmutableViolation {
    #[error("user attempted to update an immutable property ('{property}'): [user input: {input}; actual: {actual}]")]
    Value {
        property: String,
        input: String,
        actual: String,
    },

    #[error("user attempted to update an immutable list property ('{property}') size: [user input list size: {input_len}; actual list size: {actual_len}]")]
    ListSize {
        property: String,
        input_len: usize,
        actual_len: usize,
    },

    #[error("user attempted to update an immutable list property ('{property}') element: [user input: {input}; actual: {actual}]")]
    ListElement {
        property: String,
        input: String,
        actual: String,
    },

    #[error("user attempted to update an immutable list of objects ('{property}'): [user input: {input}; actual: {actual}]")]
    ListOfObjects {
        property: String,
        input: String,
        actual: String,
    },

    #[error("user attempted to update an immutable object ('{property}') property ('{sub_property}'): [user input: {input}; actual: {actual}]")]
    Object {
        property: String,
        sub_property: String,
        input: String,
        actual: String,
    },
}

/// Errors returned by the CRUD/import operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Failure reported by the [`crate::ApiClient`], passed through unchanged.
    #[error(transparent)]
    Transport(TransportError),

    #[error("[resource='{resource}'] resource does not support {operation} operation")]
    UnsupportedOperation {
        resource: String,
        operation: crate::types::Operation,
    },

    #[error("[resource='{resource}'] {method} {path} failed: {}", status_detail(*status, expected, body))]
    UnexpectedStatus {
        resource: String,
        method: &'static str,
        path: String,
        status: u16,
        expected: Vec<u16>,
        body: String,
    },

    #[error("[resource='{resource}'] response object returned from the API is missing mandatory identifier property '{property}'")]
    MissingIdentifier { resource: String, property: String },

    #[error("[resource='{resource}'] {operation} requires an identifier in the local state")]
    MissingStateIdentifier {
        resource: String,
        operation: crate::types::Operation,
    },

    #[error("[resource='{resource}'] could not find ID value in the state for subresource parent property '{property}'")]
    MissingParentId { resource: String, property: String },

    #[error("[resource='{resource}'] validation for immutable properties failed: {violation}. Update operation was aborted; no updates were performed")]
    ImmutablePropertyViolation {
        resource: String,
        #[source]
        violation: ImmutableViolation,
    },

    #[error("[resource='{resource}'] could not resolve status value while polling: {message}")]
    StatusFieldResolution { resource: String, message: String },

    #[error("[resource='{resource}'] timed out after {elapsed_secs}s waiting for a completion status {target:?} [valid pending statuses {pending:?}]; last observed status: {}", last_status.as_deref().unwrap_or("<none>"))]
    PollingTimeout {
        resource: String,
        pending: Vec<String>,
        target: Vec<String>,
        last_status: Option<String>,
        elapsed_secs: u64,
    },

    #[error("the import id '{id}' does not match the expected format: expected {expected} segment(s) separated by '/', got {actual}")]
    ParentIdCountMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("[resource='{resource}'] parent property '{property}' is not declared in the resource schema")]
    ParentPropertyNotInSchema { resource: String, property: String },

    #[error("[resource='{resource}'] {method} {path} returned a body that is not valid JSON: {source}")]
    InvalidResponseBody {
        resource: String,
        method: &'static str,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl LifecycleError {
    /// Whether this error reports a resource the remote API no longer has.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::UnexpectedStatus { status: 404, .. })
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Transport(_) => 3,
            LifecycleError::UnexpectedStatus { .. }
            | LifecycleError::MissingIdentifier { .. }
            | LifecycleError::ImmutablePropertyViolation { .. }
            | LifecycleError::PollingTimeout { .. }
            | LifecycleError::InvalidResponseBody { .. } => 1,
            _ => 2,
        }
    }
}

fn status_detail(status: u16, expected: &[u16], body: &str) -> String {
    match status {
        401 => format!(
            "HTTP Response Status Code {} - Unauthorized: API access is denied due to invalid credentials ({})",
            status, body
        ),
        _ => format!(
            "HTTP Response Status Code {} not matching expected one {:?} ({})",
            status, expected, body
        ),
    }
}

/// Errors while loading descriptors, configuration and state files.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Descriptor errors (exit code 2)
    #[error("embedded descriptor schema is invalid: {message}")]
    DescriptorSchema { message: String },

    #[error("invalid descriptor with {} error(s): {}", issues.len(), join_issues(issues))]
    InvalidDescriptor { issues: Vec<DocumentIssue> },

    #[error("duplicate canonical property name(s): {}", names.join(", "))]
    DuplicateCanonicalNames { names: Vec<String> },

    #[error("parent property '{name}' is not declared in the schema")]
    UnknownParentProperty { name: String },

    #[error("path '{path}' has {placeholders} placeholder(s) but {parents} parent propert(ies) are declared")]
    ParentPlaceholderMismatch {
        path: String,
        placeholders: usize,
        parents: usize,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. }
            | LoadError::ReadError { .. }
            | LoadError::WriteError { .. } => 3,
            _ => 2,
        }
    }
}

/// Single descriptor validation issue with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentIssue {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for DocumentIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_issues(issues: &[DocumentIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;

    #[test]
    fn unexpected_status_message() {
        let err = LifecycleError::UnexpectedStatus {
            resource: "cdn".into(),
            method: "POST",
            path: "/v1/cdns".into(),
            status: 500,
            expected: vec![200, 201, 202],
            body: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "[resource='cdn'] POST /v1/cdns failed: HTTP Response Status Code 500 not matching expected one [200, 201, 202] (boom)"
        );
        assert_eq!(err.exit_code(), 1);
        assert!(!err.is_not_found());
    }

    #[test]
    fn unauthorized_status_is_annotated() {
        let err = LifecycleError::UnexpectedStatus {
            resource: "cdn".into(),
            method: "GET",
            path: "/v1/cdns/1".into(),
            status: 401,
            expected: vec![200],
            body: String::new(),
        };
        assert!(err
            .to_string()
            .contains("Unauthorized: API access is denied due to invalid credentials"));
    }

    #[test]
    fn not_found_detection() {
        let err = LifecycleError::UnexpectedStatus {
            resource: "cdn".into(),
            method: "GET",
            path: "/v1/cdns/1".into(),
            status: 404,
            expected: vec![200],
            body: String::new(),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn lifecycle_exit_codes() {
        let err = LifecycleError::Transport("connection refused".into());
        assert_eq!(err.exit_code(), 3);

        let err = LifecycleError::UnsupportedOperation {
            resource: "cdn".into(),
            operation: Operation::Update,
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "[resource='cdn'] resource does not support PUT operation"
        );
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = LifecycleError::Transport("connection refused".into());
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("descriptor.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::UnknownParentProperty {
            name: "cdn_id".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn document_issue_display() {
        let issue = DocumentIssue {
            path: "/schema/0/type".into(),
            message: "\"text\" is not one of the allowed values".into(),
        };
        assert_eq!(
            issue.to_string(),
            "/schema/0/type: \"text\" is not one of the allowed values"
        );
    }

    #[test]
    fn import_mismatch_reports_counts() {
        let err = LifecycleError::ParentIdCountMismatch {
            id: "1/2/3".into(),
            expected: 2,
            actual: 3,
        };
        let message = err.to_string();
        assert!(message.contains("expected 2"));
        assert!(message.contains("got 3"));
    }
}
