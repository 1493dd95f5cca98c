//! Configuration management for Proofset Uploader

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Smallest payload providers accept, in bytes
pub const MIN_PAYLOAD_SIZE: u64 = 65;

/// Largest payload providers accept: 200 MiB
pub const MAX_PAYLOAD_SIZE: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Limits and pacing of the upload core
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub min_payload_size: u64,
    pub max_payload_size: u64,

    /// Delay between polls of a submitted session creation
    pub creation_poll_interval_ms: u64,

    /// Polls before a pending session creation is given up
    pub creation_poll_attempts: u32,

    /// Age after which upload records are dropped
    pub record_retention_hours: i64,

    /// How long shutdown waits for started runs to reach a terminal state
    pub shutdown_grace_secs: u64,
}

impl UploadConfig {
    pub fn creation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.creation_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            min_payload_size: MIN_PAYLOAD_SIZE,
            max_payload_size: MAX_PAYLOAD_SIZE,
            creation_poll_interval_ms: 1000,
            creation_poll_attempts: 60,
            record_retention_hours: 24,
            shutdown_grace_secs: 60,
        }
    }
}

/// In-process storage network used by the server binary
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    pub providers: Vec<String>,

    /// Standing allowance of the uploading account
    pub allowance: u64,

    /// Allowance consumed per stored byte
    pub price_per_byte: u64,

    /// Delay between transfer milestones
    pub milestone_delay_ms: u64,

    /// Attach to a provider's existing session instead of creating one per run
    pub reuse_sessions: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            providers: vec!["f0sandbox1".to_string(), "f0sandbox2".to_string()],
            allowance: 10 * 1024 * 1024 * 1024,
            price_per_byte: 1,
            milestone_delay_ms: 250,
            reuse_sessions: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            upload: UploadConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let upload = UploadConfig {
            min_payload_size: parse_var("UPLOAD_MIN_PAYLOAD_SIZE", defaults.upload.min_payload_size)?,
            max_payload_size: parse_var("UPLOAD_MAX_PAYLOAD_SIZE", defaults.upload.max_payload_size)?,
            creation_poll_interval_ms: parse_var(
                "UPLOAD_CREATION_POLL_INTERVAL_MS",
                defaults.upload.creation_poll_interval_ms,
            )?,
            creation_poll_attempts: parse_var(
                "UPLOAD_CREATION_POLL_ATTEMPTS",
                defaults.upload.creation_poll_attempts,
            )?,
            record_retention_hours: parse_var(
                "UPLOAD_RECORD_RETENTION_HOURS",
                defaults.upload.record_retention_hours,
            )?,
            shutdown_grace_secs: parse_var(
                "UPLOAD_SHUTDOWN_GRACE_SECS",
                defaults.upload.shutdown_grace_secs,
            )?,
        };

        if upload.min_payload_size > upload.max_payload_size {
            return Err(ConfigError::InvalidValue {
                name: "UPLOAD_MIN_PAYLOAD_SIZE",
                value: upload.min_payload_size.to_string(),
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            upload,
            sandbox: SandboxConfig {
                providers: env::var("SANDBOX_PROVIDERS")
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or(defaults.sandbox.providers),
                allowance: parse_var("SANDBOX_ALLOWANCE", defaults.sandbox.allowance)?,
                price_per_byte: parse_var("SANDBOX_PRICE_PER_BYTE", defaults.sandbox.price_per_byte)?,
                milestone_delay_ms: parse_var(
                    "SANDBOX_MILESTONE_DELAY_MS",
                    defaults.sandbox.milestone_delay_ms,
                )?,
                reuse_sessions: parse_var("SANDBOX_REUSE_SESSIONS", defaults.sandbox.reuse_sessions)?,
            },
        })
    }
}

/// Read `name` from the environment, falling back to `default` when unset
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_provider_limits() {
        let config = Config::default();
        assert_eq!(config.upload.min_payload_size, 65);
        assert_eq!(config.upload.max_payload_size, 200 * 1024 * 1024);
        assert_eq!(config.upload.creation_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.upload.shutdown_grace(), Duration::from_secs(60));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_parse_var_reports_bad_values() {
        // Variable names unique to this test so parallel tests don't interfere
        env::set_var("PROOFSET_TEST_PORT_OK", "8080");
        env::set_var("PROOFSET_TEST_PORT_BAD", "eighty");

        assert_eq!(parse_var::<u16>("PROOFSET_TEST_PORT_OK", 1).unwrap(), 8080);
        assert_eq!(parse_var::<u16>("PROOFSET_TEST_UNSET", 7).unwrap(), 7);
        assert!(matches!(
            parse_var::<u16>("PROOFSET_TEST_PORT_BAD", 1),
            Err(ConfigError::InvalidValue { name: "PROOFSET_TEST_PORT_BAD", .. })
        ));
    }
}
