//! Scope configuration with type-safe validation.
//!
//! Numeric limits are `nutype` newtypes so an out-of-range value cannot be
//! constructed. `ScopeConfig` is serde (de)serializable and can also be read
//! from the environment.

use std::time::Duration;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable selecting the [`ReleaseErrorPolicy`].
pub const ENV_RELEASE_ERRORS: &str = "SCOPECORE_RELEASE_ERRORS";
/// Environment variable holding the body timeout in milliseconds.
pub const ENV_BODY_TIMEOUT_MS: &str = "SCOPECORE_BODY_TIMEOUT_MS";
/// Environment variable toggling live-scope tracking.
pub const ENV_TRACK_LEAKS: &str = "SCOPECORE_TRACK_LEAKS";

/// Upper bound on how long an async scope body may run, in milliseconds.
///
/// Validated to be between 10ms and 1 hour.
#[nutype(
    validate(greater_or_equal = 10, less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct BodyTimeoutMs(u64);

impl BodyTimeoutMs {
    /// Convert to Duration for use with `tokio::time::timeout`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// What to do when release fails after a successful body.
///
/// A release failure that accompanies a body failure is always attached to
/// the body error, whatever this policy says.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseErrorPolicy {
    /// Fail the scope with the release error, discarding the body's result.
    #[default]
    Propagate,
    /// Log the release error at `error` level and return the body's result.
    Log,
}

/// Configuration could not be built from the supplied values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value was present but could not be parsed or validated.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// The configuration key.
        key: &'static str,
        /// The rejected raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Behaviour shared by every scope flavour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Release failure handling after a successful body.
    pub release_errors: ReleaseErrorPolicy,
    /// Time limit for async scope bodies. `None` means no limit.
    pub body_timeout: Option<BodyTimeoutMs>,
    /// Register live scopes with the global monitor.
    pub track_leaks: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            release_errors: ReleaseErrorPolicy::Propagate,
            body_timeout: None,
            track_leaks: true,
        }
    }
}

impl ScopeConfig {
    /// Configuration with safe defaults: propagate release errors, no body
    /// timeout, track live scopes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the release failure policy.
    #[must_use]
    pub const fn with_release_errors(mut self, policy: ReleaseErrorPolicy) -> Self {
        self.release_errors = policy;
        self
    }

    /// Limit how long async bodies may run.
    #[must_use]
    pub const fn with_body_timeout(mut self, timeout: BodyTimeoutMs) -> Self {
        self.body_timeout = Some(timeout);
        self
    }

    /// Turn live-scope tracking on or off.
    #[must_use]
    pub const fn with_leak_tracking(mut self, enabled: bool) -> Self {
        self.track_leaks = enabled;
        self
    }

    /// Load configuration from `SCOPECORE_*` environment variables.
    ///
    /// Missing variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_RELEASE_ERRORS) {
            config.release_errors = match raw.trim().to_ascii_lowercase().as_str() {
                "propagate" => ReleaseErrorPolicy::Propagate,
                "log" => ReleaseErrorPolicy::Log,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_RELEASE_ERRORS,
                        value: raw,
                        reason: "expected 'propagate' or 'log'".to_string(),
                    })
                }
            };
        }

        if let Some(raw) = lookup(ENV_BODY_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: ENV_BODY_TIMEOUT_MS,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            let timeout =
                BodyTimeoutMs::try_new(millis).map_err(|e| ConfigError::InvalidValue {
                    key: ENV_BODY_TIMEOUT_MS,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
            config.body_timeout = Some(timeout);
        }

        if let Some(raw) = lookup(ENV_TRACK_LEAKS) {
            config.track_leaks = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_TRACK_LEAKS,
                        value: raw,
                        reason: "expected a boolean".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }
}
