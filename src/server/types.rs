//! Response bodies for the prediction server
//!
//! This module defines the JSON structures the routes answer with. Field
//! names on the transform response follow the platform convention of
//! dotted keys, hence the serde renames.

use crate::error::ErrorResponse;
use crate::stats::{MemoryInfo, TimingStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `GET /`: identity plus the current load phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoResponse {
    pub name: String,
    pub version: String,
    pub target_type: String,
    pub state: String,
    pub timestamp: i64,
}

/// Error body for scoring routes, tagged with the request correlation id
#[derive(Debug, Serialize)]
pub struct ScoringErrorResponse {
    #[serde(flatten)]
    pub body: ErrorResponse,
    pub request_id: String,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
    /// Present and true only while the model is still loading, so a
    /// supervisor knows to keep polling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            message: "OK".to_string(),
            pending: None,
        }
    }

    pub fn loading() -> Self {
        Self {
            message: "Model is loading".to_string(),
            pending: Some(true),
        }
    }
}

/// Body of `POST /predict`: predictions serialized row-wise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionsResponse {
    pub predictions: serde_json::Value,
}

/// Body of `POST /transform`: CSV-rendered frames under dotted keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformResponse {
    #[serde(rename = "out.format")]
    pub out_format: String,
    #[serde(rename = "X.transformed")]
    pub features: String,
    #[serde(rename = "y.transformed", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Body of `GET /stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub mem_info: MemoryStats,
    pub time_info: HashMap<String, TimingStats>,
    pub uptime_seconds: f64,
}

/// Memory readings in megabytes, matching what operators expect to eyeball
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_mb: f64,
    pub available_mb: f64,
    pub used_mb: f64,
    pub rss_mb: f64,
    pub usage_percent: f64,
}

impl From<MemoryInfo> for MemoryStats {
    fn from(info: MemoryInfo) -> Self {
        let to_mb = |bytes: u64| bytes as f64 / (1024.0 * 1024.0);
        Self {
            total_mb: to_mb(info.total_bytes),
            available_mb: to_mb(info.available_bytes),
            used_mb: to_mb(info.used_bytes),
            rss_mb: to_mb(info.rss_bytes),
            usage_percent: info.usage_percentage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_ready_omits_pending() {
        let body = serde_json::to_value(HealthResponse::ok()).unwrap();
        assert_eq!(body, serde_json::json!({"message": "OK"}));
    }

    #[test]
    fn test_health_response_loading_sets_pending() {
        let body = serde_json::to_value(HealthResponse::loading()).unwrap();
        assert_eq!(body["pending"], serde_json::json!(true));
        assert_eq!(body["message"], serde_json::json!("Model is loading"));
    }

    #[test]
    fn test_transform_response_uses_dotted_keys() {
        let response = TransformResponse {
            out_format: "csv".to_string(),
            features: "a\n1\n".to_string(),
            target: Some("y\n0\n".to_string()),
        };
        let body = serde_json::to_value(response).unwrap();
        assert!(body.get("X.transformed").is_some());
        assert!(body.get("y.transformed").is_some());
        assert_eq!(body["out.format"], serde_json::json!("csv"));
    }

    #[test]
    fn test_transform_response_without_target_omits_key() {
        let response = TransformResponse {
            out_format: "csv".to_string(),
            features: "a\n1\n".to_string(),
            target: None,
        };
        let body = serde_json::to_value(response).unwrap();
        assert!(body.get("y.transformed").is_none());
    }

    #[test]
    fn test_scoring_error_keeps_envelope_and_id() {
        let error = crate::error::RunnerError::invalid_input("bad payload");
        let body = serde_json::to_value(ScoringErrorResponse {
            body: error.to_error_response(),
            request_id: "req_123".to_string(),
        })
        .unwrap();
        assert_eq!(body["request_id"], serde_json::json!("req_123"));
        assert_eq!(body["error"]["code"], serde_json::json!("INVALID_INPUT"));
    }

    #[test]
    fn test_memory_stats_converts_to_megabytes() {
        let info = MemoryInfo {
            total_bytes: 2 * 1024 * 1024 * 1024,
            available_bytes: 1024 * 1024 * 1024,
            used_bytes: 1024 * 1024 * 1024,
            rss_bytes: 256 * 1024 * 1024,
        };
        let stats = MemoryStats::from(info);
        assert!((stats.total_mb - 2048.0).abs() < f64::EPSILON);
        assert!((stats.rss_mb - 256.0).abs() < f64::EPSILON);
        assert!((stats.usage_percent - 50.0).abs() < 1e-9);
    }
}
