//! API error types with conflict classification

use std::fmt;

use serde_json::Value;

use crate::entities::EntityKind;

/// Errors that can occur when submitting to or reading from a backend
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 401 Unauthorized - token invalid or expired
    Unauthorized { provider: String },
    /// 403 Forbidden - token lacks required permissions
    Forbidden { provider: String },
    /// Entity does not exist
    NotFound {
        provider: String,
        identifier: String,
    },
    /// The server holds a different version of the entity
    ///
    /// `remote` carries the server's copy when it could be fetched, so the
    /// caller can show a diff.
    Conflict {
        provider: String,
        message: String,
        remote: Option<Value>,
    },
    /// An entity with the same identifier already exists
    Duplicate {
        provider: String,
        identifier: String,
    },
    /// Network or timeout error
    NetworkError { provider: String, message: String },
    /// Other HTTP errors
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// Response body could not be decoded
    InvalidResponse { provider: String, message: String },
    /// Backend does not handle this entity
    Unsupported {
        provider: String,
        entity: EntityKind,
    },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// Check if this error should open the conflict resolution flow
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }

    /// Server copy of the entity attached to a conflict
    pub fn remote_entity(&self) -> Option<&Value> {
        match self {
            ApiError::Conflict { remote, .. } => remote.as_ref(),
            _ => None,
        }
    }

    /// Get the provider name for this error
    pub fn provider_name(&self) -> &str {
        match self {
            ApiError::Unauthorized { provider } => provider,
            ApiError::Forbidden { provider } => provider,
            ApiError::NotFound { provider, .. } => provider,
            ApiError::Conflict { provider, .. } => provider,
            ApiError::Duplicate { provider, .. } => provider,
            ApiError::NetworkError { provider, .. } => provider,
            ApiError::HttpError { provider, .. } => provider,
            ApiError::InvalidResponse { provider, .. } => provider,
            ApiError::Unsupported { provider, .. } => provider,
        }
    }

    pub fn unauthorized(provider: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            provider: provider.into(),
        }
    }

    pub fn forbidden(provider: impl Into<String>) -> Self {
        ApiError::Forbidden {
            provider: provider.into(),
        }
    }

    pub fn not_found(provider: impl Into<String>, identifier: impl Into<String>) -> Self {
        ApiError::NotFound {
            provider: provider.into(),
            identifier: identifier.into(),
        }
    }

    pub fn conflict(
        provider: impl Into<String>,
        message: impl Into<String>,
        remote: Option<Value>,
    ) -> Self {
        ApiError::Conflict {
            provider: provider.into(),
            message: message.into(),
            remote,
        }
    }

    pub fn duplicate(provider: impl Into<String>, identifier: impl Into<String>) -> Self {
        ApiError::Duplicate {
            provider: provider.into(),
            identifier: identifier.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, entity: EntityKind) -> Self {
        ApiError::Unsupported {
            provider: provider.into(),
            entity,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider } => {
                write!(f, "{}: Unauthorized (401) - check the API token", provider)
            }
            ApiError::Forbidden { provider } => {
                write!(
                    f,
                    "{}: Forbidden (403) - insufficient permissions",
                    provider
                )
            }
            ApiError::NotFound {
                provider,
                identifier,
            } => {
                write!(f, "{}: '{}' not found", provider, identifier)
            }
            ApiError::Conflict {
                provider, message, ..
            } => {
                write!(f, "{}: Conflict - {}", provider, message)
            }
            ApiError::Duplicate {
                provider,
                identifier,
            } => {
                write!(
                    f,
                    "{}: an entity with identifier '{}' already exists",
                    provider, identifier
                )
            }
            ApiError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            ApiError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", provider, status, message)
            }
            ApiError::InvalidResponse { provider, message } => {
                write!(f, "{}: Invalid response - {}", provider, message)
            }
            ApiError::Unsupported { provider, entity } => {
                write!(f, "{}: {} submissions are not supported", provider, entity)
            }
        }
    }
}

impl std::error::Error for ApiError {}
