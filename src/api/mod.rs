//! NG API client
//!
//! This module provides:
//! - `NgClient`, a reqwest client scoped to an account/org/project
//! - Response envelope decoding (`{ status, data, code, message }`)
//! - Error classification into conflicts, duplicates and auth failures

pub mod error;

pub use error::ApiError;

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::scope::Scope;

const PROVIDER_NAME: &str = "ng-api";
const API_KEY_HEADER: &str = "x-api-key";

/// Envelope codes that mean the server copy moved underneath us
const CONFLICT_CODES: &[&str] = &["SCM_CONFLICT_ERROR", "RESOURCE_VERSION_CONFLICT"];
const DUPLICATE_CODE: &str = "DUPLICATE_FIELD";

/// Standard NG API response wrapper
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    #[serde(default)]
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Result of a connector connectivity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    /// SUCCESS, FAILURE or PARTIAL
    pub status: String,
    #[serde(default)]
    pub error_summary: Option<String>,
    #[serde(default)]
    pub errors: Vec<ConnectivityError>,
}

impl ConnectivityStatus {
    pub fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityError {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildDetailsResponse {
    #[serde(default)]
    build_details_list: Vec<BuildDetail>,
}

#[derive(Debug, Deserialize)]
struct BuildDetail {
    tag: String,
}

/// Client for the platform's NG REST API
#[derive(Debug, Clone)]
pub struct NgClient {
    client: reqwest::Client,
    base_url: String,
    scope: Scope,
    token: Option<String>,
}

impl NgClient {
    /// Create a client rooted at an already resolved API base URL
    pub fn new(
        base_url: impl Into<String>,
        scope: Scope,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stepwizard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scope,
            token,
        })
    }

    /// Create a client from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let base_url = config
            .api_base_url()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;
        Self::new(
            base_url,
            config.scope(),
            config.api.token.clone(),
            Duration::from_secs(config.api.timeout_secs),
        )
    }

    pub fn name(&self) -> &str {
        PROVIDER_NAME
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .query(&self.scope.query_params());
        if let Some(token) = &self.token {
            builder = builder.header(API_KEY_HEADER, token);
        }
        builder
    }

    /// Send a request and unwrap the envelope's `data`
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        identifier: &str,
    ) -> Result<T, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        if (200..300).contains(&status) {
            let envelope: ResponseEnvelope<T> = serde_json::from_str(&body)
                .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))?;
            return envelope
                .data
                .ok_or_else(|| ApiError::invalid_response(PROVIDER_NAME, "response has no data"));
        }

        Err(classify_failure(status, &body, identifier))
    }

    /// Fetch a connector, returned as `{ "connector": {...} }`
    pub async fn get_connector(&self, identifier: &str) -> Result<Value, ApiError> {
        let path = format!("connectors/{}", identifier);
        let data: Value = self
            .send(self.request(Method::GET, &path), identifier)
            .await?;
        Ok(normalize_connector(data))
    }

    pub async fn create_connector(&self, payload: &Value) -> Result<Value, ApiError> {
        let identifier = payload_identifier(payload);
        tracing::debug!(identifier = %identifier, "creating connector");
        let result = self
            .send(
                self.request(Method::POST, "connectors").json(payload),
                &identifier,
            )
            .await
            .map(normalize_connector);
        self.attach_remote(result, &identifier).await
    }

    pub async fn update_connector(&self, payload: &Value) -> Result<Value, ApiError> {
        let identifier = payload_identifier(payload);
        tracing::debug!(identifier = %identifier, "updating connector");
        let result = self
            .send(
                self.request(Method::PUT, "connectors").json(payload),
                &identifier,
            )
            .await
            .map(normalize_connector);
        self.attach_remote(result, &identifier).await
    }

    /// On conflict, fetch the server copy so the caller can diff against it
    async fn attach_remote(
        &self,
        result: Result<Value, ApiError>,
        identifier: &str,
    ) -> Result<Value, ApiError> {
        match result {
            Err(ApiError::Conflict {
                provider,
                message,
                remote: None,
            }) => {
                let remote = match self.get_connector(identifier).await {
                    Ok(remote) => Some(remote),
                    Err(e) => {
                        tracing::warn!(identifier = %identifier, error = %e, "could not fetch server copy after conflict");
                        None
                    }
                };
                Err(ApiError::Conflict {
                    provider,
                    message,
                    remote,
                })
            }
            other => other,
        }
    }

    /// Whether no connector in scope uses `identifier` yet
    pub async fn validate_unique_identifier(&self, identifier: &str) -> Result<bool, ApiError> {
        let builder = self
            .request(Method::GET, "connectors/validateUniqueIdentifier")
            .query(&[("identifier", identifier)]);
        self.send(builder, identifier).await
    }

    /// Ask the platform to verify a saved connector can reach its target
    pub async fn test_connection(&self, identifier: &str) -> Result<ConnectivityStatus, ApiError> {
        let path = format!("connectors/testConnection/{}", identifier);
        self.send(self.request(Method::POST, &path), identifier)
            .await
    }

    /// Tags available for an image behind a Docker connector
    pub async fn list_docker_tags(
        &self,
        connector_ref: &str,
        image_path: &str,
    ) -> Result<Vec<String>, ApiError> {
        let builder = self
            .request(Method::GET, "artifacts/docker/getBuildDetails")
            .query(&[("imagePath", image_path), ("connectorRef", connector_ref)]);
        let details: BuildDetailsResponse = self.send(builder, image_path).await?;
        Ok(details
            .build_details_list
            .into_iter()
            .map(|d| d.tag)
            .collect())
    }
}

/// Map a non-2xx response onto an `ApiError`
fn classify_failure(status: u16, body: &str, identifier: &str) -> ApiError {
    let envelope: Option<ResponseEnvelope<Value>> = serde_json::from_str(body).ok();
    let code = envelope.as_ref().and_then(|e| e.code.clone());
    let message = envelope
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    if code
        .as_deref()
        .is_some_and(|c| CONFLICT_CODES.contains(&c))
    {
        return ApiError::conflict(PROVIDER_NAME, message, None);
    }

    match status {
        401 => ApiError::unauthorized(PROVIDER_NAME),
        403 => ApiError::forbidden(PROVIDER_NAME),
        404 => ApiError::not_found(PROVIDER_NAME, identifier),
        409 => ApiError::conflict(PROVIDER_NAME, message, None),
        400 if code.as_deref() == Some(DUPLICATE_CODE) => {
            ApiError::duplicate(PROVIDER_NAME, identifier)
        }
        status => ApiError::http(PROVIDER_NAME, status, message),
    }
}

fn payload_identifier(payload: &Value) -> String {
    payload
        .get("connector")
        .and_then(|c| c.get("identifier"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Strip response metadata (timestamps, status) down to the connector DTO
fn normalize_connector(data: Value) -> Value {
    match data.get("connector") {
        Some(connector) => json!({ "connector": connector }),
        None => data,
    }
}
