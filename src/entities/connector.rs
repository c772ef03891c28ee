//! Connector wizard: overview, connection details and delegate selection
//!
//! Connectors describe how the platform reaches an external system (a Docker
//! registry, a Git host, a Kubernetes cluster, a Helm repository). The wizard
//! collects three steps and maps them into the NG API connector DTO.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{flatten_typed, string_field, unwrap_entity, PayloadError};
use crate::scope::Scope;
use crate::wizard::context::AccumulatedContext;
use crate::wizard::output::StepValidate;
use crate::wizard::validation::{ValidationErrors, Validator, MAX_DESCRIPTION_LENGTH};

/// Connector types the wizard can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorType {
    DockerRegistry,
    Git,
    Github,
    K8sCluster,
    HttpHelmRepo,
}

impl ConnectorType {
    pub fn all() -> &'static [ConnectorType] {
        &[
            ConnectorType::DockerRegistry,
            ConnectorType::Git,
            ConnectorType::Github,
            ConnectorType::K8sCluster,
            ConnectorType::HttpHelmRepo,
        ]
    }

    /// Wire name used in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::DockerRegistry => "DockerRegistry",
            ConnectorType::Git => "Git",
            ConnectorType::Github => "Github",
            ConnectorType::K8sCluster => "K8sCluster",
            ConnectorType::HttpHelmRepo => "HttpHelmRepo",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectorType::DockerRegistry => "Docker Registry",
            ConnectorType::Git => "Git",
            ConnectorType::Github => "GitHub",
            ConnectorType::K8sCluster => "Kubernetes Cluster",
            ConnectorType::HttpHelmRepo => "HTTP Helm Repository",
        }
    }

    /// Label of the URL field on the details step
    pub fn url_label(&self) -> &'static str {
        match self {
            ConnectorType::DockerRegistry => "Docker Registry URL",
            ConnectorType::Git | ConnectorType::Github => "Git URL",
            ConnectorType::K8sCluster => "Master URL",
            ConnectorType::HttpHelmRepo => "Helm Repository URL",
        }
    }

    fn is_git(self) -> bool {
        matches!(self, ConnectorType::Git | ConnectorType::Github)
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectorType::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown connector type '{}'", s))
    }
}

/// First step: display name, identifier, description and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorOverview {
    pub name: String,
    pub identifier: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StepValidate for ConnectorOverview {
    fn validate(&self, _context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        v.name("name", &self.name)
            .identifier("identifier", &self.identifier);
        if let Some(description) = &self.description {
            v.max_len("description", "Description", description, MAX_DESCRIPTION_LENGTH);
        }
        v.check(
            self.tags.keys().any(|k| k.trim().is_empty()),
            "tags",
            "Tag keys cannot be empty",
        );
        v.finish()
    }
}

/// Credentials used to reach the external system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConnectorAuth {
    Anonymous,
    #[serde(rename_all = "camelCase")]
    UsernamePassword {
        username: String,
        password_ref: String,
    },
    #[serde(rename_all = "camelCase")]
    UsernameToken { username: String, token_ref: String },
    #[serde(rename_all = "camelCase")]
    ServiceAccount { service_account_token_ref: String },
    InheritFromDelegate,
}

impl ConnectorAuth {
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorAuth::Anonymous => "Anonymous",
            ConnectorAuth::UsernamePassword { .. } => "UsernamePassword",
            ConnectorAuth::UsernameToken { .. } => "UsernameToken",
            ConnectorAuth::ServiceAccount { .. } => "ServiceAccount",
            ConnectorAuth::InheritFromDelegate => "InheritFromDelegate",
        }
    }

    fn allowed_for(&self, connector_type: ConnectorType) -> bool {
        match connector_type {
            ConnectorType::DockerRegistry | ConnectorType::HttpHelmRepo => matches!(
                self,
                ConnectorAuth::Anonymous | ConnectorAuth::UsernamePassword { .. }
            ),
            ConnectorType::Git => matches!(
                self,
                ConnectorAuth::UsernamePassword { .. } | ConnectorAuth::UsernameToken { .. }
            ),
            ConnectorType::Github => matches!(self, ConnectorAuth::UsernameToken { .. }),
            ConnectorType::K8sCluster => matches!(
                self,
                ConnectorAuth::ServiceAccount { .. } | ConnectorAuth::InheritFromDelegate
            ),
        }
    }

    fn validate_into(&self, v: &mut Validator) {
        match self {
            ConnectorAuth::UsernamePassword {
                username,
                password_ref,
            } => {
                v.required("auth.username", "Username", username)
                    .scoped_ref("auth.passwordRef", "Password secret", password_ref);
            }
            ConnectorAuth::UsernameToken {
                username,
                token_ref,
            } => {
                v.required("auth.username", "Username", username)
                    .scoped_ref("auth.tokenRef", "Token secret", token_ref);
            }
            ConnectorAuth::ServiceAccount {
                service_account_token_ref,
            } => {
                v.scoped_ref(
                    "auth.serviceAccountTokenRef",
                    "Service account token",
                    service_account_token_ref,
                );
            }
            ConnectorAuth::Anonymous | ConnectorAuth::InheritFromDelegate => {}
        }
    }

    /// Username/secret spec without the type tag
    fn spec(&self) -> Value {
        match self {
            ConnectorAuth::UsernamePassword {
                username,
                password_ref,
            } => json!({ "username": username, "passwordRef": password_ref }),
            ConnectorAuth::UsernameToken {
                username,
                token_ref,
            } => json!({ "username": username, "tokenRef": token_ref }),
            ConnectorAuth::ServiceAccount {
                service_account_token_ref,
            } => json!({ "serviceAccountTokenRef": service_account_token_ref }),
            ConnectorAuth::Anonymous | ConnectorAuth::InheritFromDelegate => Value::Null,
        }
    }

    /// `{ type, spec }` form used by registry style connectors
    fn typed(&self) -> Value {
        match self.spec() {
            Value::Null => json!({ "type": self.kind() }),
            spec => json!({ "type": self.kind(), "spec": spec }),
        }
    }
}

/// Git connectors point either at a single repository or a whole account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitConnectionType {
    Account,
    #[default]
    Repo,
}

/// Registry flavour for Docker connectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DockerProviderType {
    DockerHub,
    Harbor,
    Quay,
    #[default]
    Other,
}

/// Second step: where the system lives and how to authenticate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDetails {
    #[serde(default)]
    pub url: String,
    pub auth: ConnectorAuth,
    #[serde(default)]
    pub connection_type: Option<GitConnectionType>,
    #[serde(default)]
    pub validation_repo: Option<String>,
    #[serde(default)]
    pub provider_type: Option<DockerProviderType>,
}

impl StepValidate for ConnectorDetails {
    fn validate(&self, context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        let connector_type = match context_connector_type(context) {
            Some(t) => t,
            None => {
                v.check(true, "type", "Connector type is not set");
                return v.finish();
            }
        };

        if !self.auth.allowed_for(connector_type) {
            v.check(
                true,
                "auth",
                format!(
                    "{} authentication is not supported for {} connectors",
                    self.auth.kind(),
                    connector_type.label()
                ),
            );
        }
        self.auth.validate_into(&mut v);

        let url_label = connector_type.url_label();
        if connector_type.is_git() {
            v.git_url("url", url_label, &self.url);
            if self.connection_type == Some(GitConnectionType::Account) {
                v.required_opt(
                    "validationRepo",
                    "Test repository",
                    self.validation_repo.as_deref(),
                );
            }
        } else if !matches!(self.auth, ConnectorAuth::InheritFromDelegate) {
            // Delegate-inherited credentials carry no master URL
            v.http_url("url", url_label, &self.url);
        }

        v.finish()
    }
}

/// How the platform picks delegates to run connector tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegateMode {
    #[default]
    Any,
    Selected,
}

/// Third step: delegate selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateSelection {
    #[serde(default)]
    pub delegate_mode: DelegateMode,
    #[serde(default)]
    pub delegate_selectors: Vec<String>,
}

impl StepValidate for DelegateSelection {
    fn validate(&self, context: &AccumulatedContext) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        match self.delegate_mode {
            DelegateMode::Selected => {
                v.non_empty_list(
                    "delegateSelectors",
                    "Please select at least one delegate",
                    &self.delegate_selectors,
                );
            }
            DelegateMode::Any => {
                v.check(
                    !self.delegate_selectors.is_empty(),
                    "delegateSelectors",
                    "Delegate selectors are only used when connecting through selected delegates",
                );
                let inherits = context
                    .get("auth")
                    .and_then(|auth| auth.get("type"))
                    .and_then(Value::as_str)
                    == Some("InheritFromDelegate");
                v.check(
                    inherits,
                    "delegateMode",
                    "Inheriting credentials from a delegate requires selecting the delegate",
                );
            }
        }
        v.finish()
    }
}

/// Connector type recorded in the context by the wizard seed
pub fn context_connector_type(context: &AccumulatedContext) -> Option<ConnectorType> {
    context.get_str("type").and_then(|t| t.parse().ok())
}

/// Map the accumulated context into the NG API connector request body
pub fn build_payload(context: &AccumulatedContext, scope: &Scope) -> Result<Value, PayloadError> {
    let connector_type = context_connector_type(context).ok_or_else(|| {
        PayloadError::Unknown {
            field: "type".to_string(),
            value: context.get_str("type").unwrap_or_default().to_string(),
        }
    })?;
    let overview: ConnectorOverview = context.extract()?;
    let details: ConnectorDetails = context.extract()?;
    let delegates: DelegateSelection = context.extract()?;

    let selectors = match delegates.delegate_mode {
        DelegateMode::Any => Vec::new(),
        DelegateMode::Selected => delegates.delegate_selectors,
    };

    let spec = match connector_type {
        ConnectorType::DockerRegistry => json!({
            "dockerRegistryUrl": details.url,
            "providerType": details.provider_type.unwrap_or_default(),
            "auth": details.auth.typed(),
            "delegateSelectors": selectors,
        }),
        ConnectorType::HttpHelmRepo => json!({
            "helmRepoUrl": details.url,
            "auth": details.auth.typed(),
            "delegateSelectors": selectors,
        }),
        ConnectorType::Git | ConnectorType::Github => {
            let connection_key = if connector_type == ConnectorType::Git {
                "connectionType"
            } else {
                "type"
            };
            let mut spec = Map::new();
            spec.insert("url".to_string(), json!(details.url));
            let connection_type = details.connection_type.unwrap_or_default();
            spec.insert(connection_key.to_string(), json!(connection_type));
            // Only account-level connectors name a repository to test against
            if connection_type == GitConnectionType::Account {
                if let Some(repo) = &details.validation_repo {
                    spec.insert("validationRepo".to_string(), json!(repo));
                }
            }
            spec.insert(
                "authentication".to_string(),
                json!({ "type": "Http", "spec": details.auth.typed() }),
            );
            spec.insert("delegateSelectors".to_string(), json!(selectors));
            Value::Object(spec)
        }
        ConnectorType::K8sCluster => {
            let credential = match &details.auth {
                ConnectorAuth::InheritFromDelegate => json!({ "type": "InheritFromDelegate" }),
                auth => json!({
                    "type": "ManualConfig",
                    "spec": { "masterUrl": details.url, "auth": auth.typed() },
                }),
            };
            json!({ "credential": credential, "delegateSelectors": selectors })
        }
    };

    let mut connector = Map::new();
    connector.insert("name".to_string(), json!(overview.name));
    connector.insert("identifier".to_string(), json!(overview.identifier));
    if let Some(description) = overview.description {
        connector.insert("description".to_string(), json!(description));
    }
    connector.insert("tags".to_string(), json!(overview.tags));
    if let Some(org) = &scope.org_identifier {
        connector.insert("orgIdentifier".to_string(), json!(org));
        if let Some(project) = &scope.project_identifier {
            connector.insert("projectIdentifier".to_string(), json!(project));
        }
    }
    connector.insert("type".to_string(), json!(connector_type));
    connector.insert("spec".to_string(), spec);

    Ok(json!({ "connector": connector }))
}

/// Flatten an existing connector DTO back into wizard context
pub fn context_from_entity(entity: &Value) -> Result<AccumulatedContext, PayloadError> {
    let connector = unwrap_entity(entity, "connector");
    let connector_type: ConnectorType = string_field(connector, "type")?
        .parse()
        .map_err(|_| PayloadError::Unknown {
            field: "type".to_string(),
            value: string_field(connector, "type").unwrap_or_default().to_string(),
        })?;
    let spec = connector.get("spec").cloned().unwrap_or(Value::Null);

    let mut ctx = AccumulatedContext::new();
    ctx.insert("type", json!(connector_type));
    for key in ["name", "identifier", "description", "tags"] {
        if let Some(value) = connector.get(key) {
            ctx.insert(key, value.clone());
        }
    }

    let (url, auth) = match connector_type {
        ConnectorType::DockerRegistry => {
            if let Some(provider) = spec.get("providerType") {
                ctx.insert("providerType", provider.clone());
            }
            (spec.get("dockerRegistryUrl"), spec.get("auth").map(flatten_typed))
        }
        ConnectorType::HttpHelmRepo => {
            (spec.get("helmRepoUrl"), spec.get("auth").map(flatten_typed))
        }
        ConnectorType::Git | ConnectorType::Github => {
            let connection_key = if connector_type == ConnectorType::Git {
                "connectionType"
            } else {
                "type"
            };
            if let Some(connection) = spec.get(connection_key) {
                ctx.insert("connectionType", connection.clone());
            }
            if let Some(repo) = spec.get("validationRepo") {
                ctx.insert("validationRepo", repo.clone());
            }
            let auth = spec
                .get("authentication")
                .and_then(|a| a.get("spec"))
                .map(flatten_typed);
            (spec.get("url"), auth)
        }
        ConnectorType::K8sCluster => {
            let credential = spec.get("credential").cloned().unwrap_or(Value::Null);
            if credential.get("type").and_then(Value::as_str) == Some("ManualConfig") {
                let manual = credential.get("spec").cloned().unwrap_or(Value::Null);
                if let Some(master_url) = manual.get("masterUrl") {
                    ctx.insert("url", master_url.clone());
                }
                (None, manual.get("auth").map(flatten_typed))
            } else {
                (None, Some(json!({ "type": "InheritFromDelegate" })))
            }
        }
    };

    if let Some(url) = url {
        ctx.insert("url", url.clone());
    }
    if let Some(auth) = auth {
        ctx.insert("auth", auth);
    }

    let selectors = spec
        .get("delegateSelectors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mode = if selectors.is_empty() {
        DelegateMode::Any
    } else {
        DelegateMode::Selected
    };
    ctx.insert("delegateMode", json!(mode));
    ctx.insert("delegateSelectors", Value::Array(selectors));

    Ok(ctx)
}
