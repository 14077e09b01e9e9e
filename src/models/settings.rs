use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Integration settings editable at runtime through the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_url: Option<String>,
    pub entry_test_id: i64,
    pub timeout: u64,
    pub retry_attempts: u32,
    pub ssl_verify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: None,
            entry_test_id: 0,
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            ssl_verify: false,
        }
    }
}

impl Settings {
    /// Build settings from stored `name -> value` pairs. Missing or unparseable
    /// values keep their defaults.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut settings = Settings::default();

        if let Some(url) = pairs.get("api_url") {
            let url = url.trim();
            settings.api_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(v) = parse_pair(pairs, "entry_test_id") {
            settings.entry_test_id = v;
        }
        if let Some(v) = parse_pair::<u64>(pairs, "timeout").filter(|v| *v > 0) {
            settings.timeout = v;
        }
        if let Some(v) = parse_pair::<u32>(pairs, "retry_attempts").filter(|v| *v > 0) {
            settings.retry_attempts = v;
        }
        if let Some(v) = pairs.get("ssl_verify") {
            settings.ssl_verify = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }

        settings
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("api_url", self.api_url.clone().unwrap_or_default()),
            ("entry_test_id", self.entry_test_id.to_string()),
            ("timeout", self.timeout.to_string()),
            ("retry_attempts", self.retry_attempts.to_string()),
            ("ssl_verify", if self.ssl_verify { "1" } else { "0" }.to_string()),
        ]
    }

    /// The monitored quiz, or `None` when enqueueing is switched off.
    pub fn target_quiz(&self) -> Option<i64> {
        (self.entry_test_id > 0).then_some(self.entry_test_id)
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            api_url: self.api_url.clone(),
            timeout: Duration::from_secs(self.timeout),
            connect_timeout: CONNECT_TIMEOUT,
            max_retries: self.retry_attempts,
            tls_verify: self.ssl_verify,
        }
    }
}

fn parse_pair<T: std::str::FromStr>(pairs: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = pairs.get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid setting {key}={raw:?}");
            None
        }
    }
}

/// Everything the delivery client needs for one pass.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub api_url: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub tls_verify: bool,
}

/// Partial update accepted by `PUT /api/v1/admin/settings`.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsPatch {
    pub api_url: Option<String>,
    pub entry_test_id: Option<i64>,
    pub timeout: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub ssl_verify: Option<bool>,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut Settings) -> Result<(), String> {
        if let Some(url) = self.api_url {
            let url = url.trim();
            if url.is_empty() {
                settings.api_url = None;
            } else if url.starts_with("http://") || url.starts_with("https://") {
                settings.api_url = Some(url.to_string());
            } else {
                return Err("api_url must start with http:// or https://".to_string());
            }
        }
        if let Some(id) = self.entry_test_id {
            if id < 1 {
                return Err("entry_test_id must be a positive integer".to_string());
            }
            settings.entry_test_id = id;
        }
        if let Some(timeout) = self.timeout {
            if !(5..=300).contains(&timeout) {
                return Err("timeout must be between 5 and 300 seconds".to_string());
            }
            settings.timeout = timeout;
        }
        if let Some(retries) = self.retry_attempts {
            if !(1..=10).contains(&retries) {
                return Err("retry_attempts must be between 1 and 10".to_string());
            }
            settings.retry_attempts = retries;
        }
        if let Some(verify) = self.ssl_verify {
            settings.ssl_verify = verify;
        }
        Ok(())
    }
}
