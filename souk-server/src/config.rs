//! Server configuration
//!
//! All settings come from environment variables with sensible defaults:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | HTTP_PORT | 3000 | HTTP API port |
//! | DATA_DIR | /var/lib/souk | Directory holding the engine database |
//! | EXPIRY_SWEEP_SECS | 30 | Expiration sweep interval (seconds) |
//! | PAYMENT_WEBHOOK_SECRET | (dev default) | HMAC secret for provider webhooks |
//! | ENVIRONMENT | development | development \| staging \| production |

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API port
    pub http_port: u16,
    /// Directory holding the engine database file
    pub data_dir: PathBuf,
    /// Expiration sweep interval in seconds
    pub expiry_sweep_secs: u64,
    /// Shared secret for payment webhook signature verification
    pub payment_webhook_secret: String,
    /// Runtime environment: development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/souk")),
            expiry_sweep_secs: std::env::var("EXPIRY_SWEEP_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30),
            payment_webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-webhook-secret".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// Override the paths/ports that matter in tests
    pub fn with_overrides(data_dir: impl Into<PathBuf>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.data_dir = data_dir.into();
        config.http_port = http_port;
        config
    }

    /// Path of the engine database file inside `data_dir`
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("souk.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let config = Config::with_overrides("/tmp/souk-test", 0);
        assert_eq!(config.http_port, 0);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/souk-test/souk.redb"));
    }
}
