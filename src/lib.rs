//! Resource Lifecycle Engine
//!
//! Drives the lifecycle (create, read, update, delete, import) of remote HTTP
//! resources described by a [`ResourceDescriptor`], translating between a
//! caller-owned [`DeclarativeState`] and JSON wire payloads.
//!
//! # Example
//!
//! ```
//! use resource_lifecycle::{build, apply, DeclarativeState, SchemaDefinition, SchemaDefinitionProperty};
//! use serde_json::json;
//!
//! let schema = SchemaDefinition::new(vec![
//!     SchemaDefinitionProperty::string("id").computed(),
//!     SchemaDefinitionProperty::string("displayName").required(),
//!     SchemaDefinitionProperty::string("status").computed(),
//! ]);
//!
//! // State is keyed by canonical (snake_case) names...
//! let mut state = DeclarativeState::new().with("display_name", "edge");
//!
//! // ...payloads by wire names. Computed properties are never sent.
//! let payload = build(&state, &schema).unwrap();
//! assert_eq!(payload, json!({ "displayName": "edge" }));
//!
//! apply(&json!({ "id": "42", "displayName": "edge", "status": "deployed" }), &schema, &mut state).unwrap();
//! assert_eq!(state.get("status").and_then(|v| v.as_str()), Some("deployed"));
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Accepted statuses |
//! |-----------|--------|-------------------|
//! | create | `POST {path}` | 200, 201, 202 |
//! | read | `GET {path}/{id}` | 200 |
//! | update | `PUT {path}/{id}` | 200, 202 |
//! | delete | `DELETE {path}/{id}` | 200, 202, 204 (404 counts as deleted) |
//!
//! Responses flagged with `polling_enabled` in the descriptor make the engine
//! poll the resource until its status reaches one of the target statuses.

mod builder;
mod client;
mod descriptor;
mod engine;
mod error;
mod immutable;
mod loader;
mod parent;
mod polling;
mod populator;
mod schema;
mod state;
mod types;

pub use builder::build;
pub use client::{ApiClient, ApiResponse, TransportError};
pub use descriptor::{OperationDescriptor, Operations, ResourceDescriptor, ResponseDescriptor};
pub use engine::ResourceEngine;
pub use error::{
    DocumentIssue, ImmutableViolation, LifecycleError, LoadError, PayloadError, SchemaError,
};
pub use immutable::check_immutable;
pub use loader::{
    load_config, load_descriptor, load_descriptor_str, load_state, save_state,
    validate_descriptor_document,
};
pub use parent::{import_state, parent_ids, parent_ids_and_resource_path, parse_import_id, ImportId};
pub use polling::{wait_for_completion, PollSpec, PollState, Poller, Refreshed};
pub use populator::{apply, apply_with_options, values_match, PopulateOptions};
pub use schema::{
    to_snake_case, ItemType, PropertyType, ScalarKind, SchemaDefinition, SchemaDefinitionProperty,
};
pub use state::{unwrap_object, wrap_object, DeclarativeState, StateValue};
pub use types::{
    json_type_name, EngineConfig, Operation, DEFAULT_DESTROYED_STATUS, ID_PROPERTY_NAME,
    STATUS_PROPERTY_NAME,
};

#[cfg(feature = "remote")]
pub use client::{HttpApiClient, HttpApiClientBuilder};
