//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// How long a connection attempt may stay unresolved before it fails.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default broadcast channel capacity for wizard events.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Wizard and connection-attempt configuration.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Bound on a single connection attempt, reset on every renewed
    /// "connecting" status.
    pub connect_timeout: Duration,
    /// Whether services that do not say otherwise allow only one active
    /// account at a time.
    pub single_account_default: bool,
    /// Drop the verification connection once sign-in has been confirmed.
    pub disconnect_after_verify: bool,
    /// Capacity of the wizard event channel.
    pub event_capacity: usize,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            single_account_default: false,
            disconnect_after_verify: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl WizardConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let connect_timeout_secs: u64 = std::env::var("ACCOUNTS_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.connect_timeout.as_secs());

        let single_account_default = std::env::var("ACCOUNTS_SINGLE_ACCOUNT_DEFAULT")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(defaults.single_account_default);

        let disconnect_after_verify = std::env::var("ACCOUNTS_DISCONNECT_AFTER_VERIFY")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(defaults.disconnect_after_verify);

        let config = Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            single_account_default,
            disconnect_after_verify,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every attempt fail immediately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "connect_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "event_capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
