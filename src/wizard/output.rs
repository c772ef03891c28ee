//! Typed step outputs
//!
//! Every step commits one of a closed set of shapes. The shape is checked
//! against the step definition before anything reaches the context.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::AccumulatedContext;
use super::validation::ValidationErrors;
use crate::entities::artifact::{ArtifactDetails, ArtifactRepository};
use crate::entities::connector::{ConnectorDetails, ConnectorOverview, DelegateSelection};
use crate::entities::manifest::{ManifestDetails, ManifestStore};

/// Field validation for a step output, given the context committed so far
pub trait StepValidate {
    fn validate(&self, context: &AccumulatedContext) -> Result<(), ValidationErrors>;
}

/// Shape a step accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ConnectorOverview,
    ConnectorDetails,
    DelegateSelector,
    ManifestStore,
    ManifestDetails,
    ArtifactRepository,
    ArtifactDetails,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::ConnectorOverview => "connector_overview",
            StepKind::ConnectorDetails => "connector_details",
            StepKind::DelegateSelector => "delegate_selector",
            StepKind::ManifestStore => "manifest_store",
            StepKind::ManifestDetails => "manifest_details",
            StepKind::ArtifactRepository => "artifact_repository",
            StepKind::ArtifactDetails => "artifact_details",
        };
        f.write_str(name)
    }
}

/// Output committed by a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutput {
    ConnectorOverview(ConnectorOverview),
    ConnectorDetails(ConnectorDetails),
    DelegateSelector(DelegateSelection),
    ManifestStore(ManifestStore),
    ManifestDetails(ManifestDetails),
    ArtifactRepository(ArtifactRepository),
    ArtifactDetails(ArtifactDetails),
}

impl StepOutput {
    pub fn kind(&self) -> StepKind {
        match self {
            StepOutput::ConnectorOverview(_) => StepKind::ConnectorOverview,
            StepOutput::ConnectorDetails(_) => StepKind::ConnectorDetails,
            StepOutput::DelegateSelector(_) => StepKind::DelegateSelector,
            StepOutput::ManifestStore(_) => StepKind::ManifestStore,
            StepOutput::ManifestDetails(_) => StepKind::ManifestDetails,
            StepOutput::ArtifactRepository(_) => StepKind::ArtifactRepository,
            StepOutput::ArtifactDetails(_) => StepKind::ArtifactDetails,
        }
    }

    pub fn validate(&self, context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        match self {
            StepOutput::ConnectorOverview(o) => o.validate(context),
            StepOutput::ConnectorDetails(o) => o.validate(context),
            StepOutput::DelegateSelector(o) => o.validate(context),
            StepOutput::ManifestStore(o) => o.validate(context),
            StepOutput::ManifestDetails(o) => o.validate(context),
            StepOutput::ArtifactRepository(o) => o.validate(context),
            StepOutput::ArtifactDetails(o) => o.validate(context),
        }
    }

    /// Context keys this output contributes, without the step tag
    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            StepOutput::ConnectorOverview(o) => serde_json::to_value(o)?,
            StepOutput::ConnectorDetails(o) => serde_json::to_value(o)?,
            StepOutput::DelegateSelector(o) => serde_json::to_value(o)?,
            StepOutput::ManifestStore(o) => serde_json::to_value(o)?,
            StepOutput::ManifestDetails(o) => serde_json::to_value(o)?,
            StepOutput::ArtifactRepository(o) => serde_json::to_value(o)?,
            StepOutput::ArtifactDetails(o) => serde_json::to_value(o)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Rebuild a step's output from what the context already holds
    ///
    /// Used to accept a prefilled step unchanged.
    pub fn from_context(
        kind: StepKind,
        context: &AccumulatedContext,
    ) -> Result<StepOutput, serde_json::Error> {
        let mut fields = context.as_map().clone();
        fields.insert("step".to_string(), serde_json::to_value(kind)?);
        serde_json::from_value(Value::Object(fields))
    }
}
