//! Entity wizards and their payload mappings
//!
//! Each entity (connector, manifest source, artifact source) defines:
//! - the ordered steps its wizard walks through
//! - the typed output shape of every step
//! - a pure mapping from accumulated context to the request payload
//! - the reverse mapping used to prefill a wizard opened for editing

pub mod artifact;
pub mod connector;
pub mod manifest;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

pub use artifact::{ArtifactSlot, ArtifactType};
pub use connector::ConnectorType;
pub use manifest::{ManifestStoreType, ManifestType};

use crate::scope::Scope;
use crate::wizard::context::AccumulatedContext;
use crate::wizard::output::StepKind;
use crate::wizard::step::StepDefinition;

/// Errors raised while mapping between context and entity payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// A step's data is missing or malformed in the context
    #[error("step data incomplete: {0}")]
    Incomplete(String),
    /// Entity JSON lacks a required field
    #[error("entity is missing '{0}'")]
    MissingField(String),
    /// A field holds a value the wizard does not know
    #[error("unknown {field} '{value}'")]
    Unknown { field: String, value: String },
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        PayloadError::Incomplete(err.to_string())
    }
}

/// Backend entity a wizard produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Connector,
    Manifest,
    Artifact,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Connector => "connector",
            EntityKind::Manifest => "manifest",
            EntityKind::Artifact => "artifact",
        })
    }
}

/// Wizard flavour, fixed when the wizard is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardKind {
    Connector(ConnectorType),
    Manifest,
    Artifact(ArtifactSlot),
}

impl WizardKind {
    pub fn entity(&self) -> EntityKind {
        match self {
            WizardKind::Connector(_) => EntityKind::Connector,
            WizardKind::Manifest => EntityKind::Manifest,
            WizardKind::Artifact(_) => EntityKind::Artifact,
        }
    }

    pub fn title(&self) -> String {
        match self {
            WizardKind::Connector(t) => format!("{} Connector", t.label()),
            WizardKind::Manifest => "Manifest Source".to_string(),
            WizardKind::Artifact(ArtifactSlot::Primary) => "Primary Artifact".to_string(),
            WizardKind::Artifact(ArtifactSlot::Sidecar) => "Sidecar Artifact".to_string(),
        }
    }

    /// Ordered steps of this wizard
    pub fn steps(&self) -> Vec<StepDefinition> {
        match self {
            WizardKind::Connector(t) => vec![
                StepDefinition::new("overview", "Overview", StepKind::ConnectorOverview),
                StepDefinition::new(
                    "details",
                    format!("{} Details", t.label()),
                    StepKind::ConnectorDetails,
                ),
                StepDefinition::new(
                    "delegates",
                    "Delegates Setup",
                    StepKind::DelegateSelector,
                ),
            ],
            WizardKind::Manifest => vec![
                StepDefinition::new("store", "Manifest Store", StepKind::ManifestStore),
                StepDefinition::new("details", "Manifest Details", StepKind::ManifestDetails),
            ],
            WizardKind::Artifact(_) => vec![
                StepDefinition::new(
                    "repository",
                    "Artifact Repository",
                    StepKind::ArtifactRepository,
                ),
                StepDefinition::new("details", "Artifact Details", StepKind::ArtifactDetails),
            ],
        }
    }

    /// Context every session of this kind starts from
    pub fn seed(&self) -> AccumulatedContext {
        let mut ctx = AccumulatedContext::new();
        match self {
            WizardKind::Connector(t) => ctx.insert("type", json!(t)),
            WizardKind::Manifest => {}
            WizardKind::Artifact(slot) => ctx.insert("slot", json!(slot)),
        }
        ctx
    }

    /// Request payload for the accumulated context
    pub fn build_payload(
        &self,
        context: &AccumulatedContext,
        scope: &Scope,
    ) -> Result<Value, PayloadError> {
        match self {
            WizardKind::Connector(_) => connector::build_payload(context, scope),
            WizardKind::Manifest => manifest::build_payload(context),
            WizardKind::Artifact(slot) => artifact::build_payload(context, *slot),
        }
    }

    /// Context that prefills this wizard from an existing entity
    pub fn context_from_entity(&self, entity: &Value) -> Result<AccumulatedContext, PayloadError> {
        match self {
            WizardKind::Connector(_) => connector::context_from_entity(entity),
            WizardKind::Manifest => manifest::context_from_entity(entity),
            WizardKind::Artifact(slot) => artifact::context_from_entity(entity, *slot),
        }
    }

    /// Identifier of the entity described by a context
    pub fn identifier(&self, context: &AccumulatedContext) -> Option<String> {
        match self {
            WizardKind::Artifact(ArtifactSlot::Primary) => Some("primary".to_string()),
            _ => context.get_str("identifier").map(str::to_string),
        }
    }
}

/// Peel an entity wrapper such as `{ "connector": {...} }`
pub(crate) fn unwrap_entity<'a>(entity: &'a Value, key: &str) -> &'a Value {
    entity.get(key).unwrap_or(entity)
}

pub(crate) fn string_field<'a>(value: &'a Value, key: &str) -> Result<&'a str, PayloadError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PayloadError::MissingField(key.to_string()))
}

/// Turn `{ type, spec: {..} }` into `{ type, ..spec }`
pub(crate) fn flatten_typed(value: &Value) -> Value {
    let mut flat = Map::new();
    if let Some(kind) = value.get("type") {
        flat.insert("type".to_string(), kind.clone());
    }
    if let Some(Value::Object(spec)) = value.get("spec") {
        for (key, v) in spec {
            flat.insert(key.clone(), v.clone());
        }
    }
    Value::Object(flat)
}
