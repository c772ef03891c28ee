//! In-memory service definition that owns manifest and artifact sources
//!
//! Manifest and artifact wizards do not call the network; they edit the
//! service definition the owning page holds and the page saves it as a whole.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SubmissionAdapter, SubmitRequest};
use crate::api::ApiError;
use crate::entities::EntityKind;

const PROVIDER_NAME: &str = "service-definition";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<Value>,
    /// Entries shaped `{ "sidecar": {...} }`
    #[serde(default)]
    pub sidecars: Vec<Value>,
}

/// Manifests and artifacts attached to a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Entries shaped `{ "manifest": {...} }`
    #[serde(default)]
    pub manifests: Vec<Value>,
    #[serde(default)]
    pub artifacts: ArtifactList,
}

impl ServiceDefinition {
    pub fn manifest(&self, identifier: &str) -> Option<&Value> {
        find_wrapped(&self.manifests, "manifest", identifier).map(|i| &self.manifests[i])
    }

    pub fn sidecar(&self, identifier: &str) -> Option<&Value> {
        find_wrapped(&self.artifacts.sidecars, "sidecar", identifier)
            .map(|i| &self.artifacts.sidecars[i])
    }
}

fn find_wrapped(entries: &[Value], key: &str, identifier: &str) -> Option<usize> {
    entries.iter().position(|entry| {
        entry
            .get(key)
            .and_then(|inner| inner.get("identifier"))
            .and_then(Value::as_str)
            == Some(identifier)
    })
}

/// Submission adapter writing into a [`ServiceDefinition`]
#[derive(Debug, Default)]
pub struct ServiceDefinitionSubmitter {
    definition: Mutex<ServiceDefinition>,
}

impl ServiceDefinitionSubmitter {
    pub fn new(definition: ServiceDefinition) -> Self {
        Self {
            definition: Mutex::new(definition),
        }
    }

    /// Current state of the definition
    pub fn snapshot(&self) -> ServiceDefinition {
        self.definition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_inner(self) -> ServiceDefinition {
        self.definition
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, request: &SubmitRequest, create: bool) -> Result<Value, ApiError> {
        let mut definition = self
            .definition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let payload = &request.payload;
        let identifier = request.identifier.as_str();

        let (entries, key) = match request.entity {
            EntityKind::Manifest => (&mut definition.manifests, "manifest"),
            EntityKind::Artifact if payload.get("sidecar").is_some() => {
                (&mut definition.artifacts.sidecars, "sidecar")
            }
            EntityKind::Artifact => {
                let primary = payload.get("primary").cloned().ok_or_else(|| {
                    ApiError::invalid_response(PROVIDER_NAME, "artifact payload has no slot")
                })?;
                let existing = definition.artifacts.primary.clone();
                return match (existing, create) {
                    (Some(existing), true) => Err(ApiError::conflict(
                        PROVIDER_NAME,
                        "service already has a primary artifact",
                        Some(serde_json::json!({ "primary": existing })),
                    )),
                    (None, false) => Err(ApiError::not_found(PROVIDER_NAME, identifier)),
                    _ => {
                        definition.artifacts.primary = Some(primary);
                        Ok(payload.clone())
                    }
                };
            }
            EntityKind::Connector => {
                return Err(ApiError::unsupported(PROVIDER_NAME, request.entity));
            }
        };

        match (find_wrapped(entries, key, identifier), create) {
            (Some(index), true) => Err(ApiError::conflict(
                PROVIDER_NAME,
                format!("{} '{}' already exists", key, identifier),
                Some(entries[index].clone()),
            )),
            (None, true) => {
                entries.push(payload.clone());
                Ok(payload.clone())
            }
            (Some(index), false) => {
                entries[index] = payload.clone();
                Ok(payload.clone())
            }
            (None, false) => Err(ApiError::not_found(PROVIDER_NAME, identifier)),
        }
    }
}

#[async_trait]
impl SubmissionAdapter for ServiceDefinitionSubmitter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        self.write(request, true)
    }

    async fn update(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        self.write(request, false)
    }
}
