//! Manifest source wizard: store selection, then fetch details

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{string_field, unwrap_entity, PayloadError};
use crate::wizard::context::AccumulatedContext;
use crate::wizard::output::StepValidate;
use crate::wizard::validation::{ValidationErrors, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestType {
    K8sManifest,
    Values,
    HelmChart,
    Kustomize,
    OpenshiftTemplate,
}

impl ManifestType {
    pub fn label(&self) -> &'static str {
        match self {
            ManifestType::K8sManifest => "K8s Manifest",
            ManifestType::Values => "Values YAML",
            ManifestType::HelmChart => "Helm Chart",
            ManifestType::Kustomize => "Kustomize",
            ManifestType::OpenshiftTemplate => "OpenShift Template",
        }
    }
}

/// Where manifests are fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestStoreType {
    Git,
    Github,
    Http,
}

impl ManifestStoreType {
    pub fn is_git(&self) -> bool {
        matches!(self, ManifestStoreType::Git | ManifestStoreType::Github)
    }
}

/// First step: manifest type, store type and the connector serving it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStore {
    pub manifest_type: ManifestType,
    pub store_type: ManifestStoreType,
    pub connector_ref: String,
}

impl StepValidate for ManifestStore {
    fn validate(&self, _context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        Validator::new()
            .scoped_ref("connectorRef", "Connector", &self.connector_ref)
            .check(
                self.store_type == ManifestStoreType::Http
                    && self.manifest_type != ManifestType::HelmChart,
                "storeType",
                format!(
                    "HTTP Helm stores cannot serve {} manifests",
                    self.manifest_type.label()
                ),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitFetchType {
    #[default]
    Branch,
    Commit,
}

/// Second step: identifier and what to fetch from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDetails {
    pub identifier: String,
    #[serde(default)]
    pub git_fetch_type: GitFetchType,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_id: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub chart_name: Option<String>,
    #[serde(default)]
    pub chart_version: Option<String>,
    #[serde(default)]
    pub skip_resource_versioning: bool,
}

impl StepValidate for ManifestDetails {
    fn validate(&self, context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        v.identifier("identifier", &self.identifier);

        let store: Option<ManifestStoreType> = context
            .get("storeType")
            .and_then(|s| serde_json::from_value(s.clone()).ok());
        let manifest_type: Option<ManifestType> = context
            .get("manifestType")
            .and_then(|s| serde_json::from_value(s.clone()).ok());

        let Some(store) = store else {
            v.check(true, "storeType", "Manifest store has not been selected");
            return v.finish();
        };

        if store.is_git() {
            match self.git_fetch_type {
                GitFetchType::Branch => {
                    v.required_opt("branch", "Branch", self.branch.as_deref());
                }
                GitFetchType::Commit => {
                    v.required_opt("commitId", "Commit ID", self.commit_id.as_deref());
                }
            }
            let message = if manifest_type == Some(ManifestType::HelmChart) {
                "Chart folder path is required"
            } else {
                "At least one file path is required"
            };
            v.non_empty_list("paths", message, &self.paths);
        } else {
            v.required_opt("chartName", "Chart name", self.chart_name.as_deref());
        }

        v.check(
            self.skip_resource_versioning && manifest_type != Some(ManifestType::K8sManifest),
            "skipResourceVersioning",
            "Resource versioning can only be skipped for K8s manifests",
        );

        v.finish()
    }
}

/// Map the accumulated context into a manifest config
pub fn build_payload(context: &AccumulatedContext) -> Result<Value, PayloadError> {
    let store: ManifestStore = context.extract()?;
    let details: ManifestDetails = context.extract()?;

    let mut store_spec = Map::new();
    store_spec.insert("connectorRef".to_string(), json!(store.connector_ref));
    if store.store_type.is_git() {
        store_spec.insert("gitFetchType".to_string(), json!(details.git_fetch_type));
        match details.git_fetch_type {
            GitFetchType::Branch => {
                store_spec.insert("branch".to_string(), json!(details.branch));
            }
            GitFetchType::Commit => {
                store_spec.insert("commitId".to_string(), json!(details.commit_id));
            }
        }
        let paths: Vec<&String> = details
            .paths
            .iter()
            .filter(|p| !p.trim().is_empty())
            .collect();
        if store.manifest_type == ManifestType::HelmChart {
            store_spec.insert("folderPath".to_string(), json!(paths.first()));
        } else {
            store_spec.insert("paths".to_string(), json!(paths));
        }
        if let Some(repo) = &details.repo_name {
            store_spec.insert("repoName".to_string(), json!(repo));
        }
    }

    let mut spec = Map::new();
    spec.insert(
        "store".to_string(),
        json!({ "type": store.store_type, "spec": store_spec }),
    );
    match store.manifest_type {
        ManifestType::HelmChart => {
            if let Some(chart) = &details.chart_name {
                spec.insert("chartName".to_string(), json!(chart));
            }
            if let Some(version) = &details.chart_version {
                spec.insert("chartVersion".to_string(), json!(version));
            }
        }
        ManifestType::K8sManifest => {
            spec.insert(
                "skipResourceVersioning".to_string(),
                json!(details.skip_resource_versioning),
            );
        }
        _ => {}
    }

    Ok(json!({
        "manifest": {
            "identifier": details.identifier,
            "type": store.manifest_type,
            "spec": spec,
        }
    }))
}

/// Flatten a manifest config back into wizard context
pub fn context_from_entity(entity: &Value) -> Result<AccumulatedContext, PayloadError> {
    let manifest = unwrap_entity(entity, "manifest");
    let mut ctx = AccumulatedContext::new();
    ctx.insert("identifier", json!(string_field(manifest, "identifier")?));
    ctx.insert("manifestType", json!(string_field(manifest, "type")?));

    let spec = manifest.get("spec").cloned().unwrap_or(Value::Null);
    let store = spec
        .get("store")
        .ok_or_else(|| PayloadError::MissingField("spec.store".to_string()))?;
    ctx.insert("storeType", json!(string_field(store, "type")?));

    if let Some(Value::Object(store_spec)) = store.get("spec") {
        for key in ["connectorRef", "gitFetchType", "branch", "commitId", "paths", "repoName"] {
            if let Some(value) = store_spec.get(key) {
                ctx.insert(key, value.clone());
            }
        }
        if let Some(folder) = store_spec.get("folderPath").and_then(Value::as_str) {
            ctx.insert("paths", json!([folder]));
        }
    }
    for key in ["chartName", "chartVersion", "skipResourceVersioning"] {
        if let Some(value) = spec.get(key) {
            ctx.insert(key, value.clone());
        }
    }
    Ok(ctx)
}
