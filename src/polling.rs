//! Completion polling for asynchronous operations.
//!
//! [`Poller`] is the state machine: each [`Poller::step`] consumes one fresh
//! read of the resource and decides whether a target status was reached.
//! [`wait_for_completion`] drives it with the configured delays until the
//! target is reached or the timeout expires.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::LifecycleError;
use crate::schema::SchemaDefinition;
use crate::types::EngineConfig;

/// Statuses and timeout governing one polling run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSpec {
    /// Statuses the resource may go through; informational only.
    pub pending: Vec<String>,
    /// Statuses that end polling successfully.
    pub target: Vec<String>,
    pub timeout: Duration,
}

/// Outcome of re-reading the resource during polling.
#[derive(Debug, Clone, PartialEq)]
pub enum Refreshed {
    Found(Value),
    /// The resource answered 404.
    Gone,
}

/// State after one polling step.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Pending {
        status: String,
    },
    Reached {
        status: String,
        /// Latest payload; `None` when the resource is gone.
        payload: Option<Value>,
    },
}

/// Polling state machine for one resource.
#[derive(Debug)]
pub struct Poller<'a> {
    resource: &'a str,
    schema: &'a SchemaDefinition,
    spec: PollSpec,
    destroyed_status: &'a str,
    started: Instant,
    ticks: u32,
    last_status: Option<String>,
}

impl<'a> Poller<'a> {
    pub fn new(
        resource: &'a str,
        schema: &'a SchemaDefinition,
        spec: PollSpec,
        destroyed_status: &'a str,
    ) -> Self {
        Self {
            resource,
            schema,
            spec,
            destroyed_status,
            started: Instant::now(),
            ticks: 0,
            last_status: None,
        }
    }

    /// Consume one refresh result.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::StatusFieldResolution` when the schema has no
    /// status property or the payload holds no string status.
    pub fn step(&mut self, refreshed: Refreshed) -> Result<PollState, LifecycleError> {
        self.ticks += 1;
        let (status, payload) = match refreshed {
            Refreshed::Gone => (self.destroyed_status.to_string(), None),
            Refreshed::Found(payload) => (self.extract_status(&payload)?, Some(payload)),
        };

        tracing::debug!(
            "[resource='{}'] poll tick {}: status '{}'",
            self.resource,
            self.ticks,
            status
        );
        self.last_status = Some(status.clone());

        if self.spec.target.contains(&status) {
            return Ok(PollState::Reached { status, payload });
        }
        if !self.spec.pending.is_empty() && !self.spec.pending.contains(&status) {
            tracing::debug!(
                "[resource='{}'] status '{}' is neither pending nor target, still waiting",
                self.resource,
                status
            );
        }
        Ok(PollState::Pending { status })
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    /// Time left before the timeout; `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.spec
            .timeout
            .checked_sub(self.started.elapsed())
            .filter(|left| !left.is_zero())
    }

    /// The timeout error for the current state.
    pub fn timeout_error(&self) -> LifecycleError {
        LifecycleError::PollingTimeout {
            resource: self.resource.to_string(),
            pending: self.spec.pending.clone(),
            target: self.spec.target.clone(),
            last_status: self.last_status.clone(),
            elapsed_secs: self.started.elapsed().as_secs(),
        }
    }

    fn extract_status(&self, payload: &Value) -> Result<String, LifecycleError> {
        let hierarchy = self
            .schema
            .status_hierarchy()
            .map_err(|e| self.resolution_error(e.to_string()))?;

        let mut current = payload;
        for key in &hierarchy {
            current = current.get(key).ok_or_else(|| {
                self.resolution_error(format!(
                    "payload has no value for status property '{}'",
                    hierarchy.join(".")
                ))
            })?;
        }

        current.as_str().map(str::to_string).ok_or_else(|| {
            self.resolution_error(format!(
                "status property '{}' does not hold a string value",
                hierarchy.join(".")
            ))
        })
    }

    fn resolution_error(&self, message: String) -> LifecycleError {
        LifecycleError::StatusFieldResolution {
            resource: self.resource.to_string(),
            message,
        }
    }
}

/// Drive `poller` until a target status is reached.
///
/// Waits `config.poll_delay` before the first read and `config.poll_interval`
/// between reads, never sleeping past the timeout. Errors from `refresh`
/// abort polling immediately.
///
/// Returns the latest payload, or `None` when the resource is gone.
pub fn wait_for_completion<F>(
    mut poller: Poller<'_>,
    config: &EngineConfig,
    mut refresh: F,
) -> Result<Option<Value>, LifecycleError>
where
    F: FnMut() -> Result<Refreshed, LifecycleError>,
{
    if !config.poll_delay.is_zero() {
        let remaining = poller.remaining().unwrap_or_default();
        std::thread::sleep(config.poll_delay.min(remaining));
    }

    loop {
        match poller.step(refresh()?)? {
            PollState::Reached { status, payload } => {
                tracing::info!(
                    "[resource='{}'] reached status '{}' after {} poll(s)",
                    poller.resource,
                    status,
                    poller.ticks()
                );
                return Ok(payload);
            }
            PollState::Pending { .. } => {}
        }

        let Some(remaining) = poller.remaining() else {
            return Err(poller.timeout_error());
        };
        std::thread::sleep(config.poll_interval.min(remaining));
    }
}
