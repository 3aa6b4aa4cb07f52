//! Gateway settings and validation.
//!
//! Pure data; the CLI fills these from configuration files and the
//! environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default capability negotiation window.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for remote tool calls.
pub const DEFAULT_INVOCATION_TIMEOUT_MS: u64 = 60_000;

/// Timeouts and limits shared by the gateway and the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Window for `initialize` to be answered.
    pub handshake_timeout_ms: u64,

    /// Window for a full (paginated) `tools/list`.
    pub discovery_timeout_ms: u64,

    /// Default timeout for remote calls; servers may override.
    pub invocation_timeout_ms: u64,

    /// Timeout for in-process built-in tools.
    pub local_timeout_ms: u64,

    /// Grace period between closing a child's stdin and killing it.
    pub shutdown_grace_ms: u64,

    /// Consecutive invocation timeouts that fault a session.
    pub fault_after_timeouts: u32,

    /// Upper bound on concurrent connects during startup and reconcile.
    pub max_parallel_connects: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            discovery_timeout_ms: 30_000,
            invocation_timeout_ms: DEFAULT_INVOCATION_TIMEOUT_MS,
            local_timeout_ms: 30_000,
            shutdown_grace_ms: 2_000,
            fault_after_timeouts: 3,
            max_parallel_connects: 8,
        }
    }
}

impl GatewaySettings {
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub const fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub const fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub const fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local_timeout_ms)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate settings values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("discovery_timeout_ms", self.discovery_timeout_ms),
            ("invocation_timeout_ms", self.invocation_timeout_ms),
            ("local_timeout_ms", self.local_timeout_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::ZeroTimeout(name));
            }
        }

        if self.fault_after_timeouts == 0 {
            return Err(SettingsError::InvalidFaultThreshold);
        }

        if self.max_parallel_connects == 0 {
            return Err(SettingsError::InvalidParallelism);
        }

        Ok(())
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("fault_after_timeouts must be at least 1")]
    InvalidFaultThreshold,

    #[error("max_parallel_connects must be at least 1")]
    InvalidParallelism,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = GatewaySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.invocation_timeout(), Duration::from_secs(60));
        assert_eq!(settings.fault_after_timeouts, 3);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let settings = GatewaySettings {
            local_timeout_ms: 0,
            ..GatewaySettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::ZeroTimeout("local_timeout_ms"))
        );
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let settings = GatewaySettings {
            fault_after_timeouts: 0,
            ..GatewaySettings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::InvalidFaultThreshold));

        let settings = GatewaySettings {
            max_parallel_connects: 0,
            ..GatewaySettings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::InvalidParallelism));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let settings: GatewaySettings =
            serde_json::from_str(r#"{"invocation_timeout_ms": 5000}"#).unwrap();
        assert_eq!(settings.invocation_timeout_ms, 5000);
        assert_eq!(settings.handshake_timeout_ms, DEFAULT_HANDSHAKE_TIMEOUT_MS);
    }
}
