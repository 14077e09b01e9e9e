use serde::Serialize;
use serde_json::json;

use super::{build_http_client, transport_kind, truncate};
use crate::models::DeliveryConfig;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl HealthReport {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Probe the analysis API with `{"test": true}`. Any 2xx counts as healthy.
pub async fn check(config: &DeliveryConfig) -> HealthReport {
    let Some(api_url) = config.api_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return HealthReport::error("API URL not configured");
    };

    let client = match build_http_client(config) {
        Ok(client) => client,
        Err(e) => return HealthReport::error(e.to_string()),
    };

    let resp = match client.post(api_url).json(&json!({ "test": true })).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!("Health check transport error: {e}");
            return HealthReport::error(format!("Transport error ({}): {e}", transport_kind(&e)));
        }
    };

    let status = resp.status();
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Health check failed reading the response body: {e}");
            return HealthReport::error(format!("Transport error ({}): {e}", transport_kind(&e)));
        }
    };

    if status.is_success() {
        HealthReport {
            status: "ok",
            message: "Connection successful".to_string(),
            data: serde_json::from_str(&body).ok(),
        }
    } else {
        HealthReport::error(format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)))
    }
}
