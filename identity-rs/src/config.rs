use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    /// Provider sentinel used when an organization has not picked one.
    pub default_provider: String,
    /// SPF include host per provider name.
    pub spf_includes: HashMap<String, String>,
    /// Address receiving DMARC aggregate reports.
    pub dmarc_report_address: String,
    /// Timeout for verification-time DNS lookups, in seconds.
    pub dns_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::IdentityError::Config(e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::IdentityError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        let mut spf_includes = HashMap::new();
        spf_includes.insert("system".to_string(), "spf.platform.example".to_string());

        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:8080".to_string(),
            },
            storage: StorageConfig {
                database_url: "sqlite://identity.db?mode=rwc".to_string(),
            },
            email: EmailConfig {
                default_provider: "system".to_string(),
                spf_includes,
                dmarc_report_address: "dmarc-reports@platform.example".to_string(),
                dns_timeout_secs: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
