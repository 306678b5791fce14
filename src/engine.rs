//! CRUD and import orchestration for one resource.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::builder::build;
use crate::client::{ApiClient, ApiResponse};
use crate::descriptor::{OperationDescriptor, ResourceDescriptor};
use crate::error::LifecycleError;
use crate::immutable::check_immutable;
use crate::parent::{import_state, parent_ids_and_resource_path};
use crate::polling::{wait_for_completion, PollSpec, Poller, Refreshed};
use crate::populator::{apply_with_options, PopulateOptions};
use crate::state::DeclarativeState;
use crate::types::{EngineConfig, Operation};

/// Drives the lifecycle of one remote resource.
///
/// The engine holds no per-call state: every operation takes the caller's
/// [`DeclarativeState`] and the [`ApiClient`] to talk through.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use resource_lifecycle::{
///     DeclarativeState, EngineConfig, HttpApiClient, Operations, ResourceDescriptor,
///     ResourceEngine, SchemaDefinition, SchemaDefinitionProperty,
/// };
///
/// let schema = SchemaDefinition::new(vec![
///     SchemaDefinitionProperty::string("id").computed(),
///     SchemaDefinitionProperty::string("label").required(),
/// ]);
/// let descriptor = ResourceDescriptor::new("cdn", "/v1/cdns", schema)
///     .with_operations(Operations::all());
/// let engine = ResourceEngine::new(Arc::new(descriptor), EngineConfig::default());
///
/// let client = HttpApiClient::new("https://api.example.com").unwrap();
/// let mut state = DeclarativeState::new().with("label", "edge");
/// engine.create(&mut state, &client).unwrap();
/// println!("created {}", state.id().unwrap_or_default());
/// ```
#[derive(Debug, Clone)]
pub struct ResourceEngine {
    descriptor: Arc<ResourceDescriptor>,
    config: EngineConfig,
}

impl ResourceEngine {
    pub fn new(descriptor: Arc<ResourceDescriptor>, config: EngineConfig) -> Self {
        Self { descriptor, config }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the resource from `state`.
    ///
    /// On success the identifier slot holds the new id and the state reflects
    /// the remote payload. The id is kept even if completion polling fails
    /// afterwards, so the caller can still read or delete the resource.
    pub fn create<C: ApiClient + ?Sized>(
        &self,
        state: &mut DeclarativeState,
        client: &C,
    ) -> Result<(), LifecycleError> {
        let operation = self.require_operation(Operation::Create)?;
        let (parent_ids, path) = parent_ids_and_resource_path(state, &self.descriptor)?;
        let payload = build(state, &self.descriptor.schema)?;

        tracing::debug!("[resource='{}'] POST {}", self.name(), path);
        let response = client
            .post(&path, &parent_ids, &payload)
            .map_err(LifecycleError::Transport)?;
        self.check_status(Operation::Create, &path, &response)?;

        let body = self
            .parse_body(Operation::Create, &path, &response)?
            .unwrap_or_else(|| Value::Object(Map::new()));
        let id = self.extract_identifier(&body)?;
        state.set_id(id.clone());
        tracing::info!("[resource='{}'] created with id '{}'", self.name(), id);

        let polled = self.poll_if_configured(
            operation,
            response.status,
            false,
            client,
            &path,
            &id,
            &parent_ids,
        )?;
        let payload = polled.unwrap_or(body);
        self.populate(&payload, state, false)
    }

    /// Refresh `state` from the remote resource.
    ///
    /// A resource that no longer exists fails with a 404
    /// `UnexpectedStatus`; see [`LifecycleError::is_not_found`].
    pub fn read<C: ApiClient + ?Sized>(
        &self,
        state: &mut DeclarativeState,
        client: &C,
    ) -> Result<(), LifecycleError> {
        self.require_operation(Operation::Read)?;
        let id = self.require_id(state, Operation::Read)?;
        let (parent_ids, path) = parent_ids_and_resource_path(state, &self.descriptor)?;

        let remote = self.fetch(client, &path, &id, &parent_ids)?;
        self.populate(&remote, state, true)
    }

    /// Push local changes to the remote resource.
    ///
    /// The remote resource is read first; any divergence on an immutable
    /// property aborts before the update request is sent.
    pub fn update<C: ApiClient + ?Sized>(
        &self,
        state: &mut DeclarativeState,
        client: &C,
    ) -> Result<(), LifecycleError> {
        let operation = self.require_operation(Operation::Update)?;
        let id = self.require_id(state, Operation::Update)?;
        let (parent_ids, path) = parent_ids_and_resource_path(state, &self.descriptor)?;
        let payload = build(state, &self.descriptor.schema)?;

        let remote = self.fetch(client, &path, &id, &parent_ids)?;
        check_immutable(state, &remote, &self.descriptor.schema).map_err(|violation| {
            LifecycleError::ImmutablePropertyViolation {
                resource: self.name().to_string(),
                violation,
            }
        })?;

        let instance = instance_path(&path, &id);
        tracing::debug!("[resource='{}'] PUT {}", self.name(), instance);
        let response = client
            .put(&path, &id, &parent_ids, &payload)
            .map_err(LifecycleError::Transport)?;
        self.check_status(Operation::Update, &instance, &response)?;

        let body = self.parse_body(Operation::Update, &instance, &response)?;
        let polled = self.poll_if_configured(
            operation,
            response.status,
            false,
            client,
            &path,
            &id,
            &parent_ids,
        )?;
        if let Some(payload) = polled.or(body) {
            self.populate(&payload, state, false)?;
        }
        tracing::info!("[resource='{}'] updated '{}'", self.name(), id);
        Ok(())
    }

    /// Delete the remote resource and clear the identifier slot.
    ///
    /// A resource that is already gone (404) counts as deleted.
    pub fn delete<C: ApiClient + ?Sized>(
        &self,
        state: &mut DeclarativeState,
        client: &C,
    ) -> Result<(), LifecycleError> {
        let operation = self.require_operation(Operation::Delete)?;
        let id = self.require_id(state, Operation::Delete)?;
        let (parent_ids, path) = parent_ids_and_resource_path(state, &self.descriptor)?;

        let instance = instance_path(&path, &id);
        tracing::debug!("[resource='{}'] DELETE {}", self.name(), instance);
        let response = client
            .delete(&path, &id, &parent_ids)
            .map_err(LifecycleError::Transport)?;

        if response.status == 404 {
            tracing::warn!(
                "[resource='{}'] '{}' was already gone, treating delete as done",
                self.name(),
                id
            );
            state.clear_id();
            return Ok(());
        }
        self.check_status(Operation::Delete, &instance, &response)?;

        self.poll_if_configured(
            operation,
            response.status,
            true,
            client,
            &path,
            &id,
            &parent_ids,
        )?;
        state.clear_id();
        tracing::info!("[resource='{}'] deleted '{}'", self.name(), id);
        Ok(())
    }

    /// Import an existing resource by id.
    ///
    /// Root resources take the id as is; subresources expect
    /// `parent1/.../parentN/instance`. The returned state is fully read.
    pub fn import<C: ApiClient + ?Sized>(
        &self,
        composite_id: &str,
        client: &C,
    ) -> Result<DeclarativeState, LifecycleError> {
        let mut state = import_state(composite_id, &self.descriptor)?;
        self.read(&mut state, client)?;
        tracing::info!(
            "[resource='{}'] imported '{}'",
            self.name(),
            state.id().unwrap_or_default()
        );
        Ok(state)
    }

    // --- Internal implementation ---

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn require_operation(
        &self,
        operation: Operation,
    ) -> Result<&OperationDescriptor, LifecycleError> {
        self.descriptor
            .operation(operation)
            .ok_or_else(|| LifecycleError::UnsupportedOperation {
                resource: self.name().to_string(),
                operation,
            })
    }

    fn require_id(
        &self,
        state: &DeclarativeState,
        operation: Operation,
    ) -> Result<String, LifecycleError> {
        state
            .id()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| LifecycleError::MissingStateIdentifier {
                resource: self.name().to_string(),
                operation,
            })
    }

    /// GET the instance and require a 200 with an object body.
    fn fetch<C: ApiClient + ?Sized>(
        &self,
        client: &C,
        path: &str,
        id: &str,
        parent_ids: &[String],
    ) -> Result<Value, LifecycleError> {
        let instance = instance_path(path, id);
        tracing::debug!("[resource='{}'] GET {}", self.name(), instance);
        let response = client
            .get(path, id, parent_ids)
            .map_err(LifecycleError::Transport)?;
        self.check_status(Operation::Read, &instance, &response)?;
        Ok(self
            .parse_body(Operation::Read, &instance, &response)?
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn refresh<C: ApiClient + ?Sized>(
        &self,
        client: &C,
        path: &str,
        id: &str,
        parent_ids: &[String],
    ) -> Result<Refreshed, LifecycleError> {
        match self.fetch(client, path, id, parent_ids) {
            Ok(payload) => Ok(Refreshed::Found(payload)),
            Err(err) if err.is_not_found() => Ok(Refreshed::Gone),
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn poll_if_configured<C: ApiClient + ?Sized>(
        &self,
        operation: &OperationDescriptor,
        status: u16,
        deleting: bool,
        client: &C,
        path: &str,
        id: &str,
        parent_ids: &[String],
    ) -> Result<Option<Value>, LifecycleError> {
        let Some(response) = operation.polling_response(status) else {
            return Ok(None);
        };

        let target = if deleting {
            vec![self.config.destroyed_status.clone()]
        } else {
            response.target_statuses.clone()
        };
        let spec = PollSpec {
            pending: response.pending_statuses.clone(),
            target,
            timeout: operation.timeout().unwrap_or(self.config.default_timeout),
        };
        tracing::debug!(
            "[resource='{}'] polling for {:?} (timeout {}s)",
            self.name(),
            spec.target,
            spec.timeout.as_secs()
        );

        let poller = Poller::new(
            self.name(),
            &self.descriptor.schema,
            spec,
            &self.config.destroyed_status,
        );
        wait_for_completion(poller, &self.config, || {
            self.refresh(client, path, id, parent_ids)
        })
    }

    fn check_status(
        &self,
        operation: Operation,
        path: &str,
        response: &ApiResponse,
    ) -> Result<(), LifecycleError> {
        let expected = operation.expected_statuses();
        if expected.contains(&response.status) {
            return Ok(());
        }
        Err(LifecycleError::UnexpectedStatus {
            resource: self.name().to_string(),
            method: operation.http_method(),
            path: path.to_string(),
            status: response.status,
            expected: expected.to_vec(),
            body: response
                .body
                .chars()
                .take(self.config.body_excerpt_limit)
                .collect(),
        })
    }

    fn parse_body(
        &self,
        operation: Operation,
        path: &str,
        response: &ApiResponse,
    ) -> Result<Option<Value>, LifecycleError> {
        response
            .json()
            .map_err(|source| LifecycleError::InvalidResponseBody {
                resource: self.name().to_string(),
                method: operation.http_method(),
                path: path.to_string(),
                source,
            })
    }

    fn extract_identifier(&self, body: &Value) -> Result<String, LifecycleError> {
        let property = self.descriptor.schema.identifier_property()?;
        let id = match body.get(&property.name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        id.ok_or_else(|| LifecycleError::MissingIdentifier {
            resource: self.name().to_string(),
            property: property.name.clone(),
        })
    }

    fn populate(
        &self,
        payload: &Value,
        state: &mut DeclarativeState,
        ignore_list_order: bool,
    ) -> Result<(), LifecycleError> {
        apply_with_options(
            payload,
            &self.descriptor.schema,
            state,
            PopulateOptions { ignore_list_order },
        )?;
        Ok(())
    }
}

fn instance_path(path: &str, id: &str) -> String {
    format!("{}/{}", path, id)
}
