//! Submission adapters
//!
//! An adapter turns the final wizard payload into a side effect: a create or
//! an update, chosen by the session's mode. Adapters report the entity the
//! backend now holds, or an [`ApiError`] the session can recover from.

pub mod conflict;
pub mod service;

pub use conflict::{diff, render_diff, ChangeKind, DiffEntry, Resolution};
pub use service::{ServiceDefinition, ServiceDefinitionSubmitter};

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{ApiError, NgClient};
use crate::entities::EntityKind;
use crate::wizard::WizardMode;

/// Everything an adapter needs for one submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub entity: EntityKind,
    pub mode: WizardMode,
    /// Identifier of the entity being written
    pub identifier: String,
    pub payload: Value,
}

/// Backend that persists wizard payloads
#[async_trait]
pub trait SubmissionAdapter: Send + Sync {
    /// Adapter name, used in logs and errors
    fn name(&self) -> &str;

    async fn create(&self, request: &SubmitRequest) -> Result<Value, ApiError>;

    async fn update(&self, request: &SubmitRequest) -> Result<Value, ApiError>;

    /// Create or update depending on the mode the wizard was opened in
    async fn submit(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        match request.mode {
            WizardMode::Create => self.create(request).await,
            WizardMode::Edit { .. } => self.update(request).await,
        }
    }
}

#[async_trait]
impl SubmissionAdapter for NgClient {
    fn name(&self) -> &str {
        NgClient::name(self)
    }

    async fn create(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        match request.entity {
            EntityKind::Connector => self.create_connector(&request.payload).await,
            entity => Err(ApiError::unsupported(NgClient::name(self), entity)),
        }
    }

    async fn update(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        match request.entity {
            EntityKind::Connector => self.update_connector(&request.payload).await,
            entity => Err(ApiError::unsupported(NgClient::name(self), entity)),
        }
    }
}
