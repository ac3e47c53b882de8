//! API configuration

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// PostgreSQL connection string; the in-memory store is used when absent
    #[serde(default)]
    pub database_url: Option<String>,

    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by `HOST`, `PORT`, `DATABASE_URL` and `RUST_LOG`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = ApiConfig {
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.bind_address(), "0.0.0.0:9090");
        assert!(config.database_url.is_none());
    }
}
