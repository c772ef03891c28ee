//! Artifact source wizard: repository selection, then image details

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{string_field, PayloadError};
use crate::wizard::context::AccumulatedContext;
use crate::wizard::output::StepValidate;
use crate::wizard::validation::{ValidationErrors, Validator};

/// Hostnames accepted for Google Container Registry
pub const GCR_HOSTNAMES: &[&str] = &["gcr.io", "us.gcr.io", "eu.gcr.io", "asia.gcr.io"];

/// Whether the artifact is the service's primary image or a sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSlot {
    Primary,
    Sidecar,
}

impl ArtifactSlot {
    /// Key wrapping the artifact in the service definition
    pub fn key(&self) -> &'static str {
        match self {
            ArtifactSlot::Primary => "primary",
            ArtifactSlot::Sidecar => "sidecar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactType {
    DockerRegistry,
    Gcr,
    Ecr,
}

/// First step: registry type and its connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRepository {
    pub artifact_type: ArtifactType,
    pub connector_ref: String,
}

impl StepValidate for ArtifactRepository {
    fn validate(&self, _context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        Validator::new()
            .scoped_ref("connectorRef", "Connector", &self.connector_ref)
            .finish()
    }
}

/// Fixed tag or a regex resolved at deploy time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagType {
    #[default]
    Value,
    Regex,
}

/// Second step: image location and tag selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDetails {
    #[serde(default)]
    pub identifier: Option<String>,
    pub image_path: String,
    #[serde(default)]
    pub tag_type: TagType,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub tag_regex: Option<String>,
    #[serde(default)]
    pub registry_hostname: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl StepValidate for ArtifactDetails {
    fn validate(&self, context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();

        if context.get_str("slot") == Some("sidecar") {
            v.identifier("identifier", self.identifier.as_deref().unwrap_or_default());
        }
        v.required("imagePath", "Image path", &self.image_path);

        match self.tag_type {
            TagType::Value => {
                v.required_opt("tag", "Tag", self.tag.as_deref());
            }
            TagType::Regex => match self.tag_regex.as_deref() {
                Some(pattern) if !pattern.trim().is_empty() => {
                    v.check(
                        regex::Regex::new(pattern).is_err(),
                        "tagRegex",
                        "Tag regex is not a valid regular expression",
                    );
                }
                _ => {
                    v.check(true, "tagRegex", "Tag regex is required");
                }
            },
        }

        match context.get_str("artifactType") {
            Some("Gcr") => match self.registry_hostname.as_deref() {
                Some(host) if GCR_HOSTNAMES.contains(&host) => {}
                Some(host) if !host.is_empty() => {
                    v.check(
                        true,
                        "registryHostname",
                        format!("'{}' is not a GCR hostname", host),
                    );
                }
                _ => {
                    v.check(true, "registryHostname", "Registry hostname is required");
                }
            },
            Some("Ecr") => {
                v.required_opt("region", "Region", self.region.as_deref());
            }
            _ => {}
        }

        v.finish()
    }
}

/// Map the accumulated context into an artifact source config
pub fn build_payload(context: &AccumulatedContext, slot: ArtifactSlot) -> Result<Value, PayloadError> {
    let repository: ArtifactRepository = context.extract()?;
    let details: ArtifactDetails = context.extract()?;

    let mut spec = Map::new();
    spec.insert("connectorRef".to_string(), json!(repository.connector_ref));
    spec.insert("imagePath".to_string(), json!(details.image_path));
    match details.tag_type {
        TagType::Value => spec.insert("tag".to_string(), json!(details.tag)),
        TagType::Regex => spec.insert("tagRegex".to_string(), json!(details.tag_regex)),
    };
    match repository.artifact_type {
        ArtifactType::Gcr => {
            spec.insert("registryHostname".to_string(), json!(details.registry_hostname));
        }
        ArtifactType::Ecr => {
            spec.insert("region".to_string(), json!(details.region));
        }
        ArtifactType::DockerRegistry => {}
    }

    let mut artifact = Map::new();
    if slot == ArtifactSlot::Sidecar {
        let identifier = details
            .identifier
            .ok_or_else(|| PayloadError::Incomplete("missing field `identifier`".to_string()))?;
        artifact.insert("identifier".to_string(), json!(identifier));
    }
    artifact.insert("type".to_string(), json!(repository.artifact_type));
    artifact.insert("spec".to_string(), Value::Object(spec));

    let mut wrapped = Map::new();
    wrapped.insert(slot.key().to_string(), Value::Object(artifact));
    Ok(Value::Object(wrapped))
}

/// Flatten an artifact source config back into wizard context
pub fn context_from_entity(entity: &Value, slot: ArtifactSlot) -> Result<AccumulatedContext, PayloadError> {
    let artifact = entity.get(slot.key()).unwrap_or(entity);
    let mut ctx = AccumulatedContext::new();
    ctx.insert("slot", json!(slot));
    ctx.insert("artifactType", json!(string_field(artifact, "type")?));
    if let Some(identifier) = artifact.get("identifier") {
        ctx.insert("identifier", identifier.clone());
    }
    if let Some(Value::Object(spec)) = artifact.get("spec") {
        for key in ["connectorRef", "imagePath", "tag", "tagRegex", "registryHostname", "region"] {
            if let Some(value) = spec.get(key) {
                ctx.insert(key, value.clone());
            }
        }
        let tag_type = if spec.contains_key("tagRegex") {
            TagType::Regex
        } else {
            TagType::Value
        };
        ctx.insert("tagType", json!(tag_type));
    }
    Ok(ctx)
}
