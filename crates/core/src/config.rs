//! Runtime configuration — TOML file with environment variable overrides.
//!
//! Looks for `hearth.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values. Only runtime tunables live here;
//! per-integration configuration content is supplied by the configuration
//! collaborator and stays opaque to the core.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Setup orchestrator settings.
    pub setup: SetupConfig,
    /// Service dispatch settings.
    pub service: ServiceConfig,
    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Setup orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Deadline for an integration's setup when its descriptor declares none.
    pub default_timeout_secs: u64,
    /// Deadline for an integration's unload hook during reload.
    pub unload_timeout_secs: u64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 60,
            unload_timeout_secs: 10,
        }
    }
}

/// Service dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deadline for blocking service calls that pass no explicit timeout.
    pub call_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 10,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum wait for in-flight event handlers to drain on stop.
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_secs: 5 }
    }
}

/// Errors from loading or validating the runtime configuration.
#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl RuntimeConfig {
    /// Load configuration from `hearth.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, RuntimeConfigError> {
        let mut config = Self::from_file("hearth.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self, RuntimeConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, RuntimeConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(RuntimeConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(RuntimeConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_u64("HEARTH_SETUP_TIMEOUT_SECS") {
            self.setup.default_timeout_secs = val;
        }
        if let Some(val) = env_u64("HEARTH_UNLOAD_TIMEOUT_SECS") {
            self.setup.unload_timeout_secs = val;
        }
        if let Some(val) = env_u64("HEARTH_SERVICE_CALL_TIMEOUT_SECS") {
            self.service.call_timeout_secs = val;
        }
        if let Some(val) = env_u64("HEARTH_SHUTDOWN_GRACE_SECS") {
            self.shutdown.grace_secs = val;
        }
    }

    fn validate(&self) -> Result<(), RuntimeConfigError> {
        if self.setup.default_timeout_secs == 0 {
            return Err(RuntimeConfigError::Invalid {
                reason: "setup.default_timeout_secs must be at least 1".to_string(),
            });
        }
        if self.setup.unload_timeout_secs == 0 {
            return Err(RuntimeConfigError::Invalid {
                reason: "setup.unload_timeout_secs must be at least 1".to_string(),
            });
        }
        if self.service.call_timeout_secs == 0 {
            return Err(RuntimeConfigError::Invalid {
                reason: "service.call_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn default_setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup.default_timeout_secs)
    }

    #[must_use]
    pub fn unload_timeout(&self) -> Duration {
        Duration::from_secs(self.setup.unload_timeout_secs)
    }

    #[must_use]
    pub fn service_call_timeout(&self) -> Duration {
        Duration::from_secs(self.service.call_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_secs)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}
