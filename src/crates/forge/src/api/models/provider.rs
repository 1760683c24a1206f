//! Provider API models

use serde::{Deserialize, Serialize};

use crate::services::{ModelQuery, ProviderSummary};

/// Query parameters for GET /api/v1/providers/models
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelListQuery {
    pub provider: Option<String>,
    /// `true` keeps only free models
    pub free: Option<bool>,
    /// `true` keeps only models with online capability
    pub online: Option<bool>,
}

impl From<ModelListQuery> for ModelQuery {
    fn from(query: ModelListQuery) -> Self {
        ModelQuery {
            provider: query.provider,
            free_only: query.free.unwrap_or(false),
            online_only: query.online.unwrap_or(false),
        }
    }
}

/// Query parameters for GET /api/v1/providers/models/*model_id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelLookupQuery {
    pub provider: Option<String>,
}

/// Request body for POST /api/v1/providers/test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTestRequest {
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTestResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ProviderSummary> for ProviderTestResponse {
    fn from(summary: ProviderSummary) -> Self {
        if summary.status.available {
            Self {
                success: true,
                message: format!("Successfully connected to {}", summary.name),
                response_time_ms: summary.status.response_time_ms,
                error: None,
            }
        } else {
            Self {
                success: false,
                message: format!("Failed to connect to {}", summary.name),
                response_time_ms: None,
                error: Some(
                    summary
                        .status
                        .error
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::ConnectionStatus;

    #[test]
    fn test_failed_connection_message() {
        let summary = ProviderSummary {
            id: "ollama".into(),
            name: "Ollama".into(),
            status: ConnectionStatus::down("Cannot connect to Ollama at http://localhost:11434: refused"),
        };
        let response = ProviderTestResponse::from(summary);
        assert!(!response.success);
        assert_eq!(response.message, "Failed to connect to Ollama");
        assert!(response.error.unwrap().starts_with("Cannot connect to Ollama"));
    }

    #[test]
    fn test_model_query_flags() {
        let query = ModelQuery::from(ModelListQuery {
            provider: None,
            free: Some(true),
            online: None,
        });
        assert!(query.free_only);
        assert!(!query.online_only);
    }
}
