//! Service configuration.
//!
//! Settings are layered: TOML file → environment → CLI flags. A missing file
//! yields the defaults below.
//!
//! ```toml
//! log_level = "info"
//! log_json = false
//!
//! [server]
//! address = "0.0.0.0:8080"
//! timeout_secs = 5
//! permissive_cors = false
//!
//! [database]
//! path = ".pullreq/pullreq.db"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log levels accepted by `log_level` (case insensitive).
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    pub log_json: bool,
    pub server: ServerSection,
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub address: String,
    /// Per-request deadline enforced by the HTTP layer.
    pub timeout_secs: u64,
    /// Allow any origin (local front-end development).
    pub permissive_cors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            log_json: false,
            server: ServerSection::default(),
            database: DatabaseSection::default(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            timeout_secs: 5,
            permissive_cors: false,
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".pullreq/pullreq.db"),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the file then apply environment overrides.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LOG_LEVEL`, `LOG_JSON`, `PULL_REQ_ADDRESS`, `API_TIMEOUT_SECS`
    /// and `DB_PATH` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.log_json = json != "false" && json != "0";
        }
        if let Some(address) = lookup("PULL_REQ_ADDRESS") {
            self.server.address = address;
        }
        if let Some(timeout) = lookup("API_TIMEOUT_SECS") {
            self.server.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid API_TIMEOUT_SECS: {}", timeout))?;
        }
        if let Some(path) = lookup("DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Normalised log level, if `log_level` names a known one.
    pub fn log_level(&self) -> Option<&'static str> {
        let wanted = self.log_level.trim().to_ascii_lowercase();
        LOG_LEVELS.iter().copied().find(|level| *level == wanted)
    }

    /// Human-readable problems with the current settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.log_level().is_none() {
            warnings.push(format!(
                "Unknown log_level '{}' (expected one of: {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.server.address.trim().is_empty() {
            warnings.push("server.address is empty".to_string());
        }
        if self.server.timeout_secs == 0 {
            warnings.push("server.timeout_secs is 0; every request would time out".to_string());
        }
        if self.database.path.as_os_str().is_empty() {
            warnings.push("database.path is empty".to_string());
        }
        warnings
    }
}
