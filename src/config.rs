use std::net::IpAddr;
use std::time::Duration;

/// Process configuration read from the environment at startup.
///
/// Integration settings (API URL, monitored quiz, timeouts) are not here:
/// they live in the `settings` table and can change while the service runs.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub admin_token: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub dispatch_interval: Duration,
    pub retrigger_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let admin_token = env_required("ENTRANCE_ADMIN_TOKEN")?;

        let host: IpAddr = env_or("ENTRANCE_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid ENTRANCE_HOST: {e}"))?;

        let port: u16 = env_or("ENTRANCE_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid ENTRANCE_PORT: {e}"))?;

        let log_level = env_or("ENTRANCE_LOG_LEVEL", "info");

        let dispatch_interval = env_secs("ENTRANCE_DISPATCH_INTERVAL_SECS", 60)?;
        let retrigger_delay = env_secs("ENTRANCE_RETRIGGER_DELAY_SECS", 10)?;

        Ok(Config {
            database_url,
            admin_token,
            host,
            port,
            log_level,
            dispatch_interval,
            retrigger_delay,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<Duration, String> {
    let secs: u64 = env_or(key, &default.to_string())
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))?;
    if secs == 0 {
        return Err(format!("Invalid {key}: must be at least 1"));
    }
    Ok(Duration::from_secs(secs))
}
